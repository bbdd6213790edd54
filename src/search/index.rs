//! Index interfaces consumed by the hybrid retriever.
//!
//! The retriever treats every index as an externally maintained, read-only
//! collaborator. In-memory implementations live alongside these traits.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::RetrievalError;

/// A candidate document with the score the producing index assigned it.
///
/// Scores are only comparable within one ranked list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredDoc {
    /// Document identifier.
    pub doc_id: String,
    /// Path-local score (cosine similarity or BM25).
    pub score: f64,
}

impl ScoredDoc {
    /// Creates a scored document.
    #[must_use]
    pub fn new(doc_id: impl Into<String>, score: f64) -> Self {
        Self {
            doc_id: doc_id.into(),
            score,
        }
    }
}

/// A stored corpus document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Unique document identifier.
    pub id: String,
    /// Document text.
    pub text: String,
    /// Optional provenance label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Nearest-neighbour search over embedding vectors.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Returns up to `top_n` documents, best first.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::IndexUnavailable`] if the index cannot be queried.
    async fn search(&self, vector: &[f32], top_n: usize) -> Result<Vec<ScoredDoc>, RetrievalError>;
}

/// Term-statistics search over tokenized text.
#[async_trait]
pub trait SparseIndex: Send + Sync {
    /// Returns up to `top_n` documents, best first.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::IndexUnavailable`] if the index cannot be queried.
    async fn search(&self, tokens: &[String], top_n: usize)
    -> Result<Vec<ScoredDoc>, RetrievalError>;
}

/// Snippet lookup by document id.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetches a document, or `None` if the id is unknown.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::IndexUnavailable`] if the store cannot be read.
    async fn fetch(&self, doc_id: &str) -> Result<Option<Document>, RetrievalError>;
}
