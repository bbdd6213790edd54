//! Corpus handle: the vector index, sparse index and document store
//! behind one read-only value.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use super::bm25::Bm25Index;
use super::index::{Document, DocumentStore, SparseIndex, VectorIndex};
use super::vector::InMemoryVectorIndex;
use crate::embedding::Embedder;
use crate::error::RetrievalError;

/// Source label attached to the built-in documents.
pub const SAMPLE_SOURCE: &str = "sample_kb";

/// Document store backed by a hash map.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDocumentStore {
    docs: HashMap<String, Document>,
}

impl InMemoryDocumentStore {
    /// Creates a store from documents. Later duplicates replace earlier ones.
    #[must_use]
    pub fn new(documents: impl IntoIterator<Item = Document>) -> Self {
        Self {
            docs: documents.into_iter().map(|d| (d.id.clone(), d)).collect(),
        }
    }

    /// Number of stored documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    /// Returns `true` if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn fetch(&self, doc_id: &str) -> Result<Option<Document>, RetrievalError> {
        Ok(self.docs.get(doc_id).cloned())
    }
}

/// A read-only corpus snapshot shared by every turn.
///
/// Cloning is cheap; all three indexes sit behind `Arc`.
#[derive(Clone)]
pub struct KnowledgeBase {
    vector: Arc<dyn VectorIndex>,
    sparse: Arc<dyn SparseIndex>,
    documents: Arc<dyn DocumentStore>,
    len: usize,
}

impl KnowledgeBase {
    /// Wraps externally maintained indexes.
    #[must_use]
    pub fn new(
        vector: Arc<dyn VectorIndex>,
        sparse: Arc<dyn SparseIndex>,
        documents: Arc<dyn DocumentStore>,
        len: usize,
    ) -> Self {
        Self {
            vector,
            sparse,
            documents,
            len,
        }
    }

    /// Builds in-memory indexes over `documents`.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::Corpus`] for empty or duplicate ids, the
    /// embedder's error if embedding fails, or
    /// [`RetrievalError::IndexUnavailable`] if the sparse index cannot be built.
    pub async fn build(
        documents: Vec<Document>,
        embedder: &dyn Embedder,
    ) -> Result<Self, RetrievalError> {
        validate_documents(&documents)?;

        let texts: Vec<String> = documents.iter().map(|d| d.text.clone()).collect();
        let vectors = embedder.embed_batch(&texts).await?;

        let mut vector_index = InMemoryVectorIndex::new(embedder.dimensions());
        for (doc, vector) in documents.iter().zip(vectors) {
            vector_index.insert(doc.id.clone(), vector)?;
        }
        let sparse_index = Bm25Index::build(&documents)?;
        let len = documents.len();

        info!(documents = len, embedder = embedder.name(), "Built knowledge base");

        Ok(Self::new(
            Arc::new(vector_index),
            Arc::new(sparse_index),
            Arc::new(InMemoryDocumentStore::new(documents)),
            len,
        ))
    }

    /// Builds the built-in support corpus.
    ///
    /// # Errors
    ///
    /// Returns the embedder's error if embedding fails.
    pub async fn sample(embedder: &dyn Embedder) -> Result<Self, RetrievalError> {
        Self::build(sample_corpus(), embedder).await
    }

    /// Vector index handle.
    #[must_use]
    pub fn vector(&self) -> &Arc<dyn VectorIndex> {
        &self.vector
    }

    /// Sparse index handle.
    #[must_use]
    pub fn sparse(&self) -> &Arc<dyn SparseIndex> {
        &self.sparse
    }

    /// Document store handle.
    #[must_use]
    pub fn documents(&self) -> &Arc<dyn DocumentStore> {
        &self.documents
    }

    /// Number of documents in the snapshot.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the snapshot holds no documents.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl std::fmt::Debug for KnowledgeBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowledgeBase")
            .field("len", &self.len)
            .finish_non_exhaustive()
    }
}

fn validate_documents(documents: &[Document]) -> Result<(), RetrievalError> {
    let mut seen = HashSet::new();
    for doc in documents {
        if doc.id.trim().is_empty() {
            return Err(RetrievalError::Corpus {
                message: "document with empty id".to_string(),
            });
        }
        if !seen.insert(doc.id.as_str()) {
            return Err(RetrievalError::Corpus {
                message: format!("duplicate document id '{}'", doc.id),
            });
        }
    }
    Ok(())
}

/// Reads a JSON corpus file: an array of `{"id", "text", "source"?}`.
///
/// # Errors
///
/// Returns [`RetrievalError::Corpus`] if the file cannot be read or parsed.
pub fn load_corpus_file(path: &Path) -> Result<Vec<Document>, RetrievalError> {
    let raw = std::fs::read_to_string(path).map_err(|e| RetrievalError::Corpus {
        message: format!("{}: {e}", path.display()),
    })?;
    let documents: Vec<Document> =
        serde_json::from_str(&raw).map_err(|e| RetrievalError::Corpus {
            message: format!("{}: {e}", path.display()),
        })?;
    validate_documents(&documents)?;
    Ok(documents)
}

/// The built-in support knowledge base.
#[must_use]
pub fn sample_corpus() -> Vec<Document> {
    [
        (
            "kb-return-policy",
            "Our return policy allows returns within 30 days of purchase. Items must be unused and in original packaging.",
        ),
        (
            "kb-password-reset",
            "To reset your password, go to Settings > Account > Reset Password. You will receive an email with instructions.",
        ),
        (
            "kb-support-hours",
            "We offer 24/7 customer support via chat, email, and phone. Premium members get priority support.",
        ),
        (
            "kb-shipping",
            "Shipping is free for orders over $50. Standard shipping takes 3-5 business days.",
        ),
        (
            "kb-languages",
            "Our AI agent platform supports multiple languages including English, Spanish, French, German, and Japanese.",
        ),
    ]
    .into_iter()
    .map(|(id, text)| Document {
        id: id.to_string(),
        text: text.to_string(),
        source: Some(SAMPLE_SOURCE.to_string()),
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::embedding::HashEmbedder;

    #[tokio::test]
    async fn test_sample_knowledge_base() {
        let kb = KnowledgeBase::sample(&HashEmbedder::default())
            .await
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(kb.len(), 5);
        let doc = kb
            .documents()
            .fetch("kb-shipping")
            .await
            .unwrap_or_else(|_| unreachable!());
        assert!(doc.is_some_and(|d| d.text.contains("$50")));
    }

    #[tokio::test]
    async fn test_duplicate_ids_rejected() {
        let docs = vec![
            Document {
                id: "a".to_string(),
                text: "one".to_string(),
                source: None,
            },
            Document {
                id: "a".to_string(),
                text: "two".to_string(),
                source: None,
            },
        ];
        let result = KnowledgeBase::build(docs, &HashEmbedder::default()).await;
        assert!(matches!(result, Err(RetrievalError::Corpus { .. })));
    }

    #[test]
    fn test_load_corpus_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap_or_else(|_| unreachable!());
        write!(
            file,
            r#"[{{"id": "faq-1", "text": "Refunds take 5 days."}}, {{"id": "faq-2", "text": "We ship worldwide.", "source": "faq"}}]"#
        )
        .unwrap_or_else(|_| unreachable!());

        let docs = load_corpus_file(file.path()).unwrap_or_else(|_| unreachable!());
        assert_eq!(docs.len(), 2);
        assert!(docs[0].source.is_none());
        assert_eq!(docs[1].source.as_deref(), Some("faq"));
    }

    #[test]
    fn test_load_corpus_file_invalid() {
        let mut file = tempfile::NamedTempFile::new().unwrap_or_else(|_| unreachable!());
        write!(file, "{{not json").unwrap_or_else(|_| unreachable!());
        assert!(load_corpus_file(file.path()).is_err());
        assert!(load_corpus_file(Path::new("/nonexistent/corpus.json")).is_err());
    }
}
