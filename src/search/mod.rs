//! Hybrid retrieval: dense + BM25 with Reciprocal Rank Fusion.
//!
//! # Architecture
//!
//! ```text
//! query ─┬─ embed → VectorIndex::search ──┐
//!        │                                ├─ RRF fusion → snippets → top_k
//!        └─ tokenize → SparseIndex::search┘
//! ```
//!
//! The two paths run concurrently and are fused once both settle. A failed
//! or timed-out path contributes nothing; the outcome is marked degraded
//! but never fails.

pub mod bm25;
pub mod corpus;
pub mod fusion;
pub mod index;
pub mod vector;

use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub use bm25::{Bm25Index, tokenize};
pub use corpus::{InMemoryDocumentStore, KnowledgeBase, load_corpus_file, sample_corpus};
pub use fusion::{DEFAULT_K_RRF, FusedDoc, reciprocal_rank_fusion};
pub use index::{Document, DocumentStore, ScoredDoc, SparseIndex, VectorIndex};
pub use vector::InMemoryVectorIndex;

use crate::embedding::Embedder;
use crate::error::RetrievalError;

/// Default number of fused results.
pub const DEFAULT_TOP_K: usize = 5;
/// Default per-path candidate multiplier (`top_k * 2` candidates per path).
pub const DEFAULT_CANDIDATE_MULTIPLIER: usize = 2;
/// Default maximum snippet length in characters.
pub const DEFAULT_SNIPPET_MAX_CHARS: usize = 1000;
/// Default per-path deadline in seconds.
const DEFAULT_PATH_TIMEOUT_SECS: u64 = 10;

/// Which retrieval paths to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// Dense and sparse, fused.
    #[default]
    Hybrid,
    /// Embedding similarity only.
    Dense,
    /// BM25 only.
    Sparse,
}

impl SearchMode {
    const fn dense_enabled(self) -> bool {
        matches!(self, Self::Hybrid | Self::Dense)
    }

    const fn sparse_enabled(self) -> bool {
        matches!(self, Self::Hybrid | Self::Sparse)
    }
}

/// Configuration for hybrid retrieval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchConfig {
    /// Number of fused results to return.
    pub top_k: usize,
    /// RRF constant `k`.
    pub k_rrf: u32,
    /// Each path is asked for `top_k * candidate_multiplier` candidates.
    pub candidate_multiplier: usize,
    /// Snippets are truncated to this many characters.
    pub snippet_max_chars: usize,
    /// Paths to run.
    pub mode: SearchMode,
    /// Deadline for each path.
    pub path_timeout: Duration,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            k_rrf: DEFAULT_K_RRF,
            candidate_multiplier: DEFAULT_CANDIDATE_MULTIPLIER,
            snippet_max_chars: DEFAULT_SNIPPET_MAX_CHARS,
            mode: SearchMode::Hybrid,
            path_timeout: Duration::from_secs(DEFAULT_PATH_TIMEOUT_SECS),
        }
    }
}

impl SearchConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of fused results.
    #[must_use]
    pub const fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Sets the RRF constant.
    #[must_use]
    pub const fn with_k_rrf(mut self, k_rrf: u32) -> Self {
        self.k_rrf = k_rrf;
        self
    }

    /// Sets the candidate multiplier. Zero is treated as one.
    #[must_use]
    pub fn with_candidate_multiplier(mut self, multiplier: usize) -> Self {
        self.candidate_multiplier = multiplier.max(1);
        self
    }

    /// Sets the snippet length.
    #[must_use]
    pub const fn with_snippet_max_chars(mut self, max_chars: usize) -> Self {
        self.snippet_max_chars = max_chars;
        self
    }

    /// Sets the retrieval mode.
    #[must_use]
    pub const fn with_mode(mut self, mode: SearchMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the per-path deadline.
    #[must_use]
    pub const fn with_path_timeout(mut self, timeout: Duration) -> Self {
        self.path_timeout = timeout;
        self
    }

    /// Candidates requested from each path.
    #[must_use]
    pub const fn candidates_per_path(&self) -> usize {
        self.top_k.saturating_mul(self.candidate_multiplier)
    }
}

/// One fused, ranked context. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedContext {
    /// Document identifier.
    pub doc_id: String,
    /// Document text, truncated to the configured length.
    pub snippet: String,
    /// Provenance label, when the corpus has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// 1-based dense rank, if the dense path returned this document.
    pub dense_rank: Option<usize>,
    /// 1-based sparse rank, if the sparse path returned this document.
    pub sparse_rank: Option<usize>,
    /// RRF score.
    pub fused_score: f64,
    /// 1-based position in the final list.
    pub final_rank: usize,
}

/// Result of one retrieval call. Never an error.
#[derive(Debug, Clone, Default)]
pub struct RetrievalOutcome {
    /// Ranked contexts, `fused_score` descending.
    pub contexts: Vec<RetrievedContext>,
    /// `true` if any enabled path failed or timed out.
    ///
    /// A single-path fallback counts as degraded even though `contexts`
    /// may be non-empty; check `contexts` for whether anything was found.
    pub degraded: bool,
    /// Dense path failure, if any.
    pub dense_error: Option<RetrievalError>,
    /// Sparse path failure, if any.
    pub sparse_error: Option<RetrievalError>,
    /// Candidates returned by the dense path.
    pub dense_candidates: usize,
    /// Candidates returned by the sparse path.
    pub sparse_candidates: usize,
    /// Wall-clock time spent.
    pub duration: Duration,
}

/// Truncates to at most `max_chars` characters.
fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => text[..byte_idx].to_string(),
        None => text.to_string(),
    }
}

/// Fuses dense and sparse retrieval over a [`KnowledgeBase`].
#[derive(Clone)]
pub struct HybridRetriever {
    embedder: Arc<dyn Embedder>,
    corpus: KnowledgeBase,
    config: SearchConfig,
}

impl HybridRetriever {
    /// Creates a retriever.
    #[must_use]
    pub fn new(embedder: Arc<dyn Embedder>, corpus: KnowledgeBase, config: SearchConfig) -> Self {
        Self {
            embedder,
            corpus,
            config,
        }
    }

    /// The active configuration.
    #[must_use]
    pub const fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// The corpus handle.
    #[must_use]
    pub const fn corpus(&self) -> &KnowledgeBase {
        &self.corpus
    }

    /// Dense path: embed then nearest-neighbour search, under the path deadline.
    ///
    /// # Errors
    ///
    /// Returns the embedder or index error, or [`RetrievalError::Timeout`].
    pub async fn search_dense(
        &self,
        query: &str,
        top_n: usize,
    ) -> Result<Vec<ScoredDoc>, RetrievalError> {
        let work = async {
            let vector = self.embedder.embed(query).await?;
            self.corpus.vector().search(&vector, top_n).await
        };
        tokio::time::timeout(self.config.path_timeout, work)
            .await
            .map_err(|_| RetrievalError::Timeout {
                path: "dense".to_string(),
                timeout_ms: duration_ms(self.config.path_timeout),
            })?
    }

    /// Sparse path: tokenize then BM25, under the path deadline.
    ///
    /// # Errors
    ///
    /// Returns the index error or [`RetrievalError::Timeout`].
    pub async fn search_sparse(
        &self,
        query: &str,
        top_n: usize,
    ) -> Result<Vec<ScoredDoc>, RetrievalError> {
        let tokens = tokenize(query);
        tokio::time::timeout(
            self.config.path_timeout,
            self.corpus.sparse().search(&tokens, top_n),
        )
        .await
        .map_err(|_| RetrievalError::Timeout {
            path: "sparse".to_string(),
            timeout_ms: duration_ms(self.config.path_timeout),
        })?
    }

    /// Retrieves with the configured `top_k`.
    pub async fn retrieve(&self, query: &str) -> RetrievalOutcome {
        self.retrieve_top_k(query, self.config.top_k).await
    }

    /// Retrieves up to `top_k` fused contexts.
    ///
    /// Identical query, corpus snapshot and configuration always produce an
    /// identical ordered list.
    pub async fn retrieve_top_k(&self, query: &str, top_k: usize) -> RetrievalOutcome {
        let started = Instant::now();
        if query.trim().is_empty() || top_k == 0 {
            return RetrievalOutcome {
                duration: started.elapsed(),
                ..RetrievalOutcome::default()
            };
        }

        let candidates = top_k.saturating_mul(self.config.candidate_multiplier);
        let mode = self.config.mode;

        let dense = async {
            if mode.dense_enabled() {
                Some(self.search_dense(query, candidates).await)
            } else {
                None
            }
        };
        let sparse = async {
            if mode.sparse_enabled() {
                Some(self.search_sparse(query, candidates).await)
            } else {
                None
            }
        };
        let (dense, sparse) = tokio::join!(dense, sparse);

        let (dense_list, dense_error) = split_path("dense", dense);
        let (sparse_list, sparse_error) = split_path("sparse", sparse);
        let degraded = dense_error.is_some() || sparse_error.is_some();

        // Fuse the whole union so store misses can be backfilled.
        let union = dense_list.len() + sparse_list.len();
        let fused = reciprocal_rank_fusion(&dense_list, &sparse_list, self.config.k_rrf, union);
        let contexts = self.attach_snippets(fused, top_k).await;

        debug!(
            dense = dense_list.len(),
            sparse = sparse_list.len(),
            fused = contexts.len(),
            degraded,
            "Hybrid retrieval complete"
        );

        RetrievalOutcome {
            contexts,
            degraded,
            dense_error,
            sparse_error,
            dense_candidates: dense_list.len(),
            sparse_candidates: sparse_list.len(),
            duration: started.elapsed(),
        }
    }

    /// Looks up snippets for fused documents, preserving fused order, until
    /// `top_k` contexts are attached.
    ///
    /// Documents the store cannot produce are dropped and later ranks close up.
    async fn attach_snippets(&self, fused: Vec<FusedDoc>, top_k: usize) -> Vec<RetrievedContext> {
        let mut contexts = Vec::with_capacity(top_k.min(fused.len()));
        for doc in fused {
            if contexts.len() == top_k {
                break;
            }
            let stored = match self.corpus.documents().fetch(&doc.doc_id).await {
                Ok(Some(stored)) => stored,
                Ok(None) => {
                    warn!(doc_id = %doc.doc_id, "Fused document missing from store");
                    continue;
                }
                Err(e) => {
                    warn!(doc_id = %doc.doc_id, error = %e, "Document fetch failed");
                    continue;
                }
            };
            contexts.push(RetrievedContext {
                snippet: truncate_chars(&stored.text, self.config.snippet_max_chars),
                source: stored.source,
                doc_id: doc.doc_id,
                dense_rank: doc.dense_rank,
                sparse_rank: doc.sparse_rank,
                fused_score: doc.fused_score,
                final_rank: contexts.len() + 1,
            });
        }
        contexts
    }
}

impl std::fmt::Debug for HybridRetriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HybridRetriever")
            .field("embedder", &self.embedder.name())
            .field("corpus", &self.corpus)
            .field("config", &self.config)
            .finish()
    }
}

fn split_path(
    path: &str,
    result: Option<Result<Vec<ScoredDoc>, RetrievalError>>,
) -> (Vec<ScoredDoc>, Option<RetrievalError>) {
    match result {
        None => (Vec::new(), None),
        Some(Ok(list)) => (list, None),
        Some(Err(e)) => {
            warn!(path, error = %e, "Retrieval path failed, continuing without it");
            (Vec::new(), Some(e))
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
pub(crate) const fn duration_ms(duration: Duration) -> u64 {
    duration.as_millis() as u64
}
