//! Criterion benchmarks for the retrieval hot path.
//!
//! - RRF over two 100-candidate lists with half overlap
//! - FTS5 BM25 ranking over a 2,000-document corpus
//! - Hash embedding of a typical support question

use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use supportflow_rs::embedding::HashEmbedder;
use supportflow_rs::search::{
    Bm25Index, DEFAULT_K_RRF, Document, ScoredDoc, reciprocal_rank_fusion, tokenize,
};

fn ranked(prefix: usize, n: usize) -> Vec<ScoredDoc> {
    (0..n)
        .map(|i| ScoredDoc::new(format!("doc-{}", prefix + i), 1.0 / (i as f64 + 1.0)))
        .collect()
}

fn synthetic_corpus(n: usize) -> Vec<Document> {
    const WORDS: [&str; 12] = [
        "order", "refund", "shipping", "password", "account", "invoice", "warranty", "return",
        "subscription", "address", "balance", "support",
    ];
    (0..n)
        .map(|i| Document {
            id: format!("doc-{i}"),
            text: (0..40)
                .map(|j| WORDS[(i * 7 + j * 3) % WORDS.len()])
                .collect::<Vec<_>>()
                .join(" "),
            source: None,
        })
        .collect()
}

fn bench_rrf(c: &mut Criterion) {
    let dense = ranked(0, 100);
    let sparse = ranked(50, 100);
    c.bench_function("rrf_100x100", |b| {
        b.iter(|| reciprocal_rank_fusion(black_box(&dense), black_box(&sparse), DEFAULT_K_RRF, 5));
    });
}

fn bench_bm25(c: &mut Criterion) {
    let Ok(index) = Bm25Index::build(&synthetic_corpus(2_000)) else {
        return;
    };
    let tokens = tokenize("How do I get a refund for my order?");
    c.bench_function("bm25_rank_2k_docs", |b| {
        b.iter(|| index.rank(black_box(&tokens), 10));
    });
}

fn bench_hash_embed(c: &mut Criterion) {
    let embedder = HashEmbedder::default();
    c.bench_function("hash_embed_question", |b| {
        b.iter(|| embedder.embed_sync(black_box("Where is my order 12345 and when will it arrive?")));
    });
}

criterion_group!(benches, bench_rrf, bench_bm25, bench_hash_embed);
criterion_main!(benches);
