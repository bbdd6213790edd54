//! BM25 sparse index on SQLite FTS5.
//!
//! Documents are loaded once into an in-memory FTS5 table and ranked with
//! the built-in `bm25()` auxiliary function (`k1 = 1.2`, `b = 0.75`).
//! Query tokens become quoted FTS5 phrases joined by `OR`, so user input
//! never reaches the FTS5 query grammar.

use std::sync::Mutex;

use async_trait::async_trait;
use rusqlite::{Connection, params};
use unicode_segmentation::UnicodeSegmentation;

use super::index::{Document, ScoredDoc, SparseIndex};
use crate::error::RetrievalError;

const SCHEMA: &str = "
    CREATE VIRTUAL TABLE passages USING fts5(
        doc_id UNINDEXED,
        body,
        tokenize = 'unicode61'
    );
";

/// Tokenizes text into lowercase Unicode words.
///
/// Used for query-time tokens and by the hash embedder.
#[must_use]
pub fn tokenize(text: &str) -> Vec<String> {
    text.unicode_words().map(str::to_lowercase).collect()
}

fn sparse_err(e: impl std::fmt::Display) -> RetrievalError {
    RetrievalError::IndexUnavailable {
        index: "sparse".to_string(),
        message: e.to_string(),
    }
}

/// Builds an FTS5 `MATCH` expression: every token quoted, joined by `OR`.
fn match_expression(tokens: &[String]) -> String {
    tokens
        .iter()
        .map(|t| format!("\"{}\"", t.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(" OR ")
}

/// In-memory FTS5 index over a fixed corpus snapshot.
pub struct Bm25Index {
    conn: Mutex<Connection>,
    len: usize,
}

impl Bm25Index {
    /// Builds an index from documents.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::IndexUnavailable`] if SQLite cannot create
    /// or populate the table.
    pub fn build(documents: &[Document]) -> Result<Self, RetrievalError> {
        let mut conn = Connection::open_in_memory().map_err(sparse_err)?;
        conn.execute_batch(SCHEMA).map_err(sparse_err)?;

        let tx = conn.transaction().map_err(sparse_err)?;
        {
            let mut insert = tx
                .prepare("INSERT INTO passages (doc_id, body) VALUES (?1, ?2)")
                .map_err(sparse_err)?;
            for doc in documents {
                insert
                    .execute(params![doc.id, doc.text])
                    .map_err(sparse_err)?;
            }
        }
        tx.commit().map_err(sparse_err)?;

        Ok(Self {
            conn: Mutex::new(conn),
            len: documents.len(),
        })
    }

    /// Number of indexed documents.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the index holds no documents.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Scores the corpus against query tokens.
    ///
    /// Only documents sharing at least one term with the query are
    /// returned, ordered by score descending then document id ascending.
    /// Scores are `-bm25()`, so higher is better.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::IndexUnavailable`] if the query fails.
    pub fn rank(&self, tokens: &[String], top_n: usize) -> Result<Vec<ScoredDoc>, RetrievalError> {
        if tokens.is_empty() || top_n == 0 || self.is_empty() {
            return Ok(Vec::new());
        }
        let expression = match_expression(tokens);
        let limit = i64::try_from(top_n).unwrap_or(i64::MAX);

        let conn = self.conn.lock().map_err(sparse_err)?;
        let mut stmt = conn
            .prepare_cached(
                "SELECT doc_id, -bm25(passages) AS score
                 FROM passages
                 WHERE passages MATCH ?1
                 ORDER BY score DESC, doc_id ASC
                 LIMIT ?2",
            )
            .map_err(sparse_err)?;
        let rows = stmt
            .query_map(params![expression, limit], |row| {
                Ok(ScoredDoc::new(row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
            })
            .map_err(sparse_err)?;

        let mut scored = Vec::with_capacity(top_n);
        for row in rows {
            let doc = row.map_err(sparse_err)?;
            if doc.score > 0.0 {
                scored.push(doc);
            }
        }
        Ok(scored)
    }
}

impl std::fmt::Debug for Bm25Index {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bm25Index")
            .field("len", &self.len)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl SparseIndex for Bm25Index {
    async fn search(
        &self,
        tokens: &[String],
        top_n: usize,
    ) -> Result<Vec<ScoredDoc>, RetrievalError> {
        self.rank(tokens, top_n)
    }
}
