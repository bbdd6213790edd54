//! Reciprocal Rank Fusion.
//!
//! Merges the dense and sparse ranked lists by summing `1 / (k + rank)`
//! per list a document appears in. Ranks are 1-based. Working on ranks
//! rather than raw scores sidesteps the fact that cosine similarity and
//! BM25 live on unrelated scales.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::index::ScoredDoc;

/// Default RRF constant.
pub const DEFAULT_K_RRF: u32 = 60;

/// A document after fusion, before snippet lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedDoc {
    /// Document identifier.
    pub doc_id: String,
    /// 1-based rank in the dense list, if present.
    pub dense_rank: Option<usize>,
    /// 1-based rank in the sparse list, if present.
    pub sparse_rank: Option<usize>,
    /// Sum of reciprocal-rank contributions.
    pub fused_score: f64,
}

/// Contribution of one list at a 1-based rank.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn rrf_contribution(k_rrf: u32, rank: usize) -> f64 {
    1.0 / (f64::from(k_rrf) + rank as f64)
}

/// Ordering used for the fused list: score descending, then dense rank
/// ascending with absent dense ranks last, then document id.
fn fused_order(a: &FusedDoc, b: &FusedDoc) -> Ordering {
    b.fused_score
        .total_cmp(&a.fused_score)
        .then_with(|| match (a.dense_rank, b.dense_rank) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| a.doc_id.cmp(&b.doc_id))
}

/// Fuses two ranked lists and truncates to `top_k`.
///
/// Either list may be empty, which is how single-path fallback is
/// expressed: with one list empty the output order equals the other
/// list's order. A document repeated within one list keeps its first
/// (best) rank.
#[must_use]
pub fn reciprocal_rank_fusion(
    dense: &[ScoredDoc],
    sparse: &[ScoredDoc],
    k_rrf: u32,
    top_k: usize,
) -> Vec<FusedDoc> {
    let mut merged: BTreeMap<&str, FusedDoc> = BTreeMap::new();

    for (idx, doc) in dense.iter().enumerate() {
        let rank = idx + 1;
        let entry = merged.entry(doc.doc_id.as_str()).or_insert_with(|| FusedDoc {
            doc_id: doc.doc_id.clone(),
            dense_rank: None,
            sparse_rank: None,
            fused_score: 0.0,
        });
        if entry.dense_rank.is_none() {
            entry.dense_rank = Some(rank);
            entry.fused_score += rrf_contribution(k_rrf, rank);
        }
    }

    for (idx, doc) in sparse.iter().enumerate() {
        let rank = idx + 1;
        let entry = merged.entry(doc.doc_id.as_str()).or_insert_with(|| FusedDoc {
            doc_id: doc.doc_id.clone(),
            dense_rank: None,
            sparse_rank: None,
            fused_score: 0.0,
        });
        if entry.sparse_rank.is_none() {
            entry.sparse_rank = Some(rank);
            entry.fused_score += rrf_contribution(k_rrf, rank);
        }
    }

    let mut fused: Vec<FusedDoc> = merged.into_values().collect();
    fused.sort_by(fused_order);
    fused.truncate(top_k);
    fused
}
