//! In-memory cosine-similarity vector index.

use async_trait::async_trait;

use super::index::{ScoredDoc, VectorIndex};
use crate::error::RetrievalError;

/// Cosine similarity between two vectors.
///
/// Returns `0.0` when either vector has zero magnitude or the lengths differ.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let (mut dot, mut norm_a, mut norm_b) = (0.0_f64, 0.0_f64, 0.0_f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 { 0.0 } else { dot / denom }
}

/// Brute-force nearest-neighbour index.
///
/// Adequate for support-sized corpora; results are exact.
#[derive(Debug, Clone, Default)]
pub struct InMemoryVectorIndex {
    entries: Vec<(String, Vec<f32>)>,
    dimensions: usize,
}

impl InMemoryVectorIndex {
    /// Creates an empty index for vectors of the given width.
    #[must_use]
    pub const fn new(dimensions: usize) -> Self {
        Self {
            entries: Vec::new(),
            dimensions,
        }
    }

    /// Adds a document vector.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::IndexUnavailable`] if the vector width does
    /// not match the index.
    pub fn insert(&mut self, doc_id: impl Into<String>, vector: Vec<f32>) -> Result<(), RetrievalError> {
        if vector.len() != self.dimensions {
            return Err(RetrievalError::IndexUnavailable {
                index: "vector".to_string(),
                message: format!(
                    "dimension mismatch: expected {}, got {}",
                    self.dimensions,
                    vector.len()
                ),
            });
        }
        self.entries.push((doc_id.into(), vector));
        Ok(())
    }

    /// Number of stored vectors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no vectors are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Vector width.
    #[must_use]
    pub const fn dimensions(&self) -> usize {
        self.dimensions
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn search(&self, vector: &[f32], top_n: usize) -> Result<Vec<ScoredDoc>, RetrievalError> {
        if vector.len() != self.dimensions {
            return Err(RetrievalError::IndexUnavailable {
                index: "vector".to_string(),
                message: format!(
                    "query dimension mismatch: expected {}, got {}",
                    self.dimensions,
                    vector.len()
                ),
            });
        }
        let mut scored: Vec<ScoredDoc> = self
            .entries
            .iter()
            .map(|(id, v)| ScoredDoc::new(id.clone(), cosine_similarity(vector, v)))
            .collect();
        scored.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.doc_id.cmp(&b.doc_id))
        });
        scored.truncate(top_n);
        Ok(scored)
    }
}
