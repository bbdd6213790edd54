//! OpenAI-compatible embeddings endpoint.

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::types::CreateEmbeddingRequestArgs;
use async_trait::async_trait;

use super::Embedder;
use crate::agent::config::AgentConfig;
use crate::agent::providers::openai::openai_client;
use crate::error::RetrievalError;

/// Embedder backed by `async-openai`.
pub struct OpenAiEmbedder {
    client: Client<OpenAIConfig>,
    model: String,
    dimensions: u32,
}

impl OpenAiEmbedder {
    /// Creates an embedder from agent configuration.
    #[must_use]
    pub fn new(config: &AgentConfig) -> Self {
        Self {
            client: openai_client(config),
            model: config.embedding_model.clone(),
            dimensions: config.embedding_dimensions,
        }
    }

    fn unavailable(message: impl Into<String>) -> RetrievalError {
        RetrievalError::ProviderUnavailable {
            provider: "openai".to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Debug for OpenAiEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiEmbedder")
            .field("model", &self.model)
            .field("dimensions", &self.dimensions)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn dimensions(&self) -> usize {
        self.dimensions as usize
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, RetrievalError> {
        let mut batch = self.embed_batch(&[text.to_string()]).await?;
        batch
            .pop()
            .ok_or_else(|| Self::unavailable("empty embedding response"))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RetrievalError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.model)
            .input(texts.to_vec())
            .dimensions(self.dimensions)
            .build()
            .map_err(|e| Self::unavailable(e.to_string()))?;

        let response = self
            .client
            .embeddings()
            .create(request)
            .await
            .map_err(|e| Self::unavailable(e.to_string()))?;

        let mut data = response.data;
        if data.len() != texts.len() {
            return Err(Self::unavailable(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                data.len()
            )));
        }
        data.sort_by_key(|e| e.index);
        Ok(data.into_iter().map(|e| e.embedding).collect())
    }
}
