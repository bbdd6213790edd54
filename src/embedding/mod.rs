//! Embedding providers for the dense retrieval path.
//!
//! [`HashEmbedder`] is a deterministic, offline feature-hashing embedder
//! used by default in the CLI and in tests. [`OpenAiEmbedder`] (feature
//! `openai`) calls an OpenAI-compatible embeddings endpoint.

#[cfg(feature = "openai")]
pub mod openai;

use std::sync::Arc;

use async_trait::async_trait;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::agent::config::AgentConfig;
use crate::error::RetrievalError;
use crate::search::bm25::tokenize;

#[cfg(feature = "openai")]
pub use openai::OpenAiEmbedder;

/// Default width of [`HashEmbedder`] vectors.
pub const DEFAULT_HASH_DIMENSIONS: usize = 256;

/// Turns text into dense vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embedder name for logging and error reporting.
    fn name(&self) -> &'static str;

    /// Width of the produced vectors.
    fn dimensions(&self) -> usize;

    /// Embeds a single text.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::ProviderUnavailable`] if the provider fails.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RetrievalError>;

    /// Embeds several texts, preserving order.
    ///
    /// The default implementation calls [`Embedder::embed`] sequentially.
    ///
    /// # Errors
    ///
    /// Returns the first provider failure.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RetrievalError> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }
}

/// Which embedder to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum EmbedderKind {
    /// Offline feature-hashing embedder.
    #[default]
    Hash,
    /// OpenAI-compatible embeddings endpoint.
    #[value(name = "openai")]
    OpenAi,
}

/// Creates an embedder.
///
/// `config` is only consulted for provider-backed embedders.
///
/// # Errors
///
/// Returns [`RetrievalError::ProviderUnavailable`] if the requested
/// embedder needs configuration that is missing or a disabled feature.
pub fn create_embedder(
    kind: EmbedderKind,
    config: Option<&AgentConfig>,
) -> Result<Arc<dyn Embedder>, RetrievalError> {
    match kind {
        EmbedderKind::Hash => Ok(Arc::new(HashEmbedder::default())),
        EmbedderKind::OpenAi => {
            let Some(config) = config else {
                return Err(RetrievalError::ProviderUnavailable {
                    provider: "openai".to_string(),
                    message: "no API configuration available".to_string(),
                });
            };
            openai_embedder(config)
        }
    }
}

#[cfg(feature = "openai")]
fn openai_embedder(config: &AgentConfig) -> Result<Arc<dyn Embedder>, RetrievalError> {
    Ok(Arc::new(OpenAiEmbedder::new(config)))
}

#[cfg(not(feature = "openai"))]
fn openai_embedder(_config: &AgentConfig) -> Result<Arc<dyn Embedder>, RetrievalError> {
    Err(RetrievalError::ProviderUnavailable {
        provider: "openai".to_string(),
        message: "built without the `openai` feature".to_string(),
    })
}

/// FNV-1a, stable across platforms and releases.
pub(crate) fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0100_0000_01b3;
    bytes.iter().fold(OFFSET, |hash, b| {
        (hash ^ u64::from(*b)).wrapping_mul(PRIME)
    })
}

/// Deterministic feature-hashing embedder.
///
/// Each lowercase word and each character trigram of the padded word is
/// hashed into a signed bucket; the vector is L2-normalized. Words that
/// share stems ("return", "returns") land close together, which is enough
/// for a meaningful dense signal without a model.
#[derive(Debug, Clone, Copy)]
pub struct HashEmbedder {
    dimensions: usize,
}

impl HashEmbedder {
    /// Creates an embedder producing vectors of the given width.
    ///
    /// A width of zero is bumped to one.
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    fn add_feature(&self, vector: &mut [f32], feature: &str, weight: f32) {
        let hash = fnv1a(feature.as_bytes());
        #[allow(clippy::cast_possible_truncation)]
        let bucket = (hash % self.dimensions as u64) as usize;
        let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }

    /// Embeds text synchronously.
    #[must_use]
    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; self.dimensions];
        for word in tokenize(text) {
            self.add_feature(&mut vector, &format!("w:{word}"), 1.0);
            let padded: Vec<char> = format!("<{word}>").chars().collect();
            for gram in padded.windows(3) {
                let gram: String = gram.iter().collect();
                self.add_feature(&mut vector, &format!("g:{gram}"), 0.5);
            }
        }
        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }
        vector
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_HASH_DIMENSIONS)
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn name(&self) -> &'static str {
        "hash"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, RetrievalError> {
        Ok(self.embed_sync(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::vector::cosine_similarity;

    #[test]
    fn test_hash_embedder_deterministic() {
        let embedder = HashEmbedder::default();
        let a = embedder.embed_sync("What is your return policy?");
        let b = embedder.embed_sync("What is your return policy?");
        assert_eq!(a, b);
        assert_eq!(a.len(), DEFAULT_HASH_DIMENSIONS);
    }

    #[test]
    fn test_hash_embedder_normalized() {
        let v = HashEmbedder::default().embed_sync("reset my password");
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_hash_embedder_empty_text() {
        let v = HashEmbedder::new(8).embed_sync("   ");
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_related_text_is_closer() {
        let embedder = HashEmbedder::default();
        let query = embedder.embed_sync("return policy");
        let related = embedder.embed_sync("Our return policy allows returns within 30 days");
        let unrelated = embedder.embed_sync("We support English, Spanish and Japanese");
        assert!(cosine_similarity(&query, &related) > cosine_similarity(&query, &unrelated));
    }

    #[tokio::test]
    async fn test_embed_batch_preserves_order() {
        let embedder = HashEmbedder::default();
        let texts = vec!["shipping".to_string(), "password".to_string()];
        let batch = embedder
            .embed_batch(&texts)
            .await
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(batch[0], embedder.embed_sync("shipping"));
        assert_eq!(batch[1], embedder.embed_sync("password"));
    }

    #[test]
    fn test_create_embedder() {
        let hash = create_embedder(EmbedderKind::Hash, None).unwrap_or_else(|_| unreachable!());
        assert_eq!(hash.name(), "hash");
        assert!(create_embedder(EmbedderKind::OpenAi, None).is_err());
    }
}
