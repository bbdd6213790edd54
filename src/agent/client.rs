//! Backend selection.

use std::sync::Arc;

use tracing::debug;

use crate::agent::config::AgentConfig;
use crate::agent::provider::LlmProvider;
use crate::error::AgentError;

/// Builds the backend named by [`AgentConfig::provider`].
///
/// Names are matched case-insensitively. `openai` covers every
/// `OpenAI`-compatible endpoint and needs the `openai` feature.
///
/// # Errors
///
/// Returns [`AgentError::UnsupportedProvider`] for an unknown name or a
/// backend compiled out of this build.
pub fn create_provider(config: &AgentConfig) -> Result<Arc<dyn LlmProvider>, AgentError> {
    let name = config.provider.trim().to_ascii_lowercase();
    debug!(provider = %name, base_url = ?config.base_url, "Creating LLM provider");

    match name.as_str() {
        #[cfg(feature = "openai")]
        "openai" => Ok(Arc::new(crate::agent::providers::OpenAiProvider::new(config))),
        _ => Err(AgentError::UnsupportedProvider {
            name: config.provider.clone(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(provider: &str) -> AgentConfig {
        AgentConfig::builder()
            .api_key("sk-test")
            .provider(provider)
            .build()
            .unwrap_or_else(|_| unreachable!())
    }

    #[cfg(feature = "openai")]
    #[test]
    fn test_openai_any_case() {
        for name in ["openai", " OpenAI "] {
            let provider = create_provider(&config(name)).unwrap_or_else(|_| unreachable!());
            assert_eq!(provider.name(), "openai");
        }
    }

    #[test]
    fn test_unknown_provider_keeps_requested_name() {
        assert!(matches!(
            create_provider(&config("anthropic-local")),
            Err(AgentError::UnsupportedProvider { ref name }) if name == "anthropic-local"
        ));
    }
}
