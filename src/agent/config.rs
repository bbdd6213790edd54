//! Agent configuration with builder pattern and environment variable support.
//!
//! Configuration is resolved in order: explicit values → environment variables → defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::AgentError;

/// Default model for every agent.
const DEFAULT_MODEL: &str = "gpt-4o-mini";
/// Default embedding model.
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
/// Default embedding width for the default model.
const DEFAULT_EMBEDDING_DIMENSIONS: u32 = 1536;
/// Default router max tokens. Classification output is one short line.
const DEFAULT_ROUTER_MAX_TOKENS: u32 = 256;
/// Default RAG answer max tokens.
const DEFAULT_RAG_MAX_TOKENS: u32 = 1024;
/// Default tool extraction / summary max tokens.
const DEFAULT_TOOL_MAX_TOKENS: u32 = 512;
/// Default responder max tokens.
const DEFAULT_RESPONDER_MAX_TOKENS: u32 = 512;
/// Default language-generation call timeout in seconds.
const DEFAULT_LLM_TIMEOUT_SECS: u64 = 30;
/// Default tool execution timeout in seconds.
const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 10;
/// Default per-path retrieval timeout in seconds.
const DEFAULT_RETRIEVAL_TIMEOUT_SECS: u64 = 10;
/// Default internal retries per node. Never more than one.
const DEFAULT_MAX_RETRIES: u32 = 1;
/// Upper bound on internal retries per node.
const MAX_RETRIES_CAP: u32 = 1;
/// Default number of history messages shown to agents.
const DEFAULT_HISTORY_WINDOW: usize = 5;

/// Configuration for the agent system.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// LLM provider name (e.g., "openai").
    pub provider: String,
    /// API key for the provider.
    pub api_key: String,
    /// Optional base URL override (for proxies or compatible APIs).
    pub base_url: Option<String>,
    /// Model for the intent router.
    pub router_model: String,
    /// Model for grounded answer synthesis.
    pub rag_model: String,
    /// Model for tool selection and result phrasing.
    pub tool_model: String,
    /// Model for conversational replies.
    pub responder_model: String,
    /// Maximum tokens for router responses.
    pub router_max_tokens: u32,
    /// Maximum tokens for RAG answers.
    pub rag_max_tokens: u32,
    /// Maximum tokens for tool extraction and summaries.
    pub tool_max_tokens: u32,
    /// Maximum tokens for responder replies.
    pub responder_max_tokens: u32,
    /// Embedding model for the dense retrieval path.
    pub embedding_model: String,
    /// Embedding width requested from the provider.
    pub embedding_dimensions: u32,
    /// Deadline for each language-generation call.
    pub llm_timeout: Duration,
    /// Deadline for a single tool execution.
    pub tool_timeout: Duration,
    /// Deadline for each retrieval path.
    pub retrieval_timeout: Duration,
    /// Internal retries per node on transient failure (0 or 1).
    pub max_retries: u32,
    /// Number of most recent history messages passed to agents.
    pub history_window: usize,
    /// Directory containing prompt template files.
    ///
    /// When set, the agent system loads system prompts from markdown files
    /// in this directory, falling back to compiled-in defaults for any
    /// missing files.
    pub prompt_dir: Option<PathBuf>,
    /// Phrase tool results with a follow-up LLM call.
    ///
    /// When the call fails the deterministic summary is used instead.
    pub tool_summary_via_llm: bool,
    /// Let the RAG agent answer when retrieval returns nothing.
    ///
    /// When `false` a fixed insufficient-context answer is returned
    /// without calling the provider.
    pub answer_without_context: bool,
}

impl AgentConfig {
    /// Creates a new builder for `AgentConfig`.
    #[must_use]
    pub fn builder() -> AgentConfigBuilder {
        AgentConfigBuilder::default()
    }

    /// Creates configuration from environment variables with defaults.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ApiKeyMissing`] if no API key is found.
    pub fn from_env() -> Result<Self, AgentError> {
        Self::builder().from_env().build()
    }
}

/// Builder for [`AgentConfig`].
#[derive(Debug, Clone, Default)]
pub struct AgentConfigBuilder {
    provider: Option<String>,
    api_key: Option<String>,
    base_url: Option<String>,
    router_model: Option<String>,
    rag_model: Option<String>,
    tool_model: Option<String>,
    responder_model: Option<String>,
    router_max_tokens: Option<u32>,
    rag_max_tokens: Option<u32>,
    tool_max_tokens: Option<u32>,
    responder_max_tokens: Option<u32>,
    embedding_model: Option<String>,
    embedding_dimensions: Option<u32>,
    llm_timeout: Option<Duration>,
    tool_timeout: Option<Duration>,
    retrieval_timeout: Option<Duration>,
    max_retries: Option<u32>,
    history_window: Option<usize>,
    prompt_dir: Option<PathBuf>,
    tool_summary_via_llm: Option<bool>,
    answer_without_context: Option<bool>,
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

fn env_secs(name: &str) -> Option<Duration> {
    env_parse::<u64>(name).map(Duration::from_secs)
}

impl AgentConfigBuilder {
    /// Populates unset fields from environment variables.
    #[must_use]
    pub fn from_env(mut self) -> Self {
        if self.provider.is_none() {
            self.provider = std::env::var("SUPPORTFLOW_PROVIDER").ok();
        }
        if self.api_key.is_none() {
            self.api_key = std::env::var("OPENAI_API_KEY")
                .or_else(|_| std::env::var("SUPPORTFLOW_API_KEY"))
                .ok();
        }
        if self.base_url.is_none() {
            self.base_url = std::env::var("OPENAI_BASE_URL")
                .or_else(|_| std::env::var("SUPPORTFLOW_BASE_URL"))
                .ok();
        }
        if self.router_model.is_none() {
            self.router_model = std::env::var("SUPPORTFLOW_ROUTER_MODEL").ok();
        }
        if self.rag_model.is_none() {
            self.rag_model = std::env::var("SUPPORTFLOW_RAG_MODEL").ok();
        }
        if self.tool_model.is_none() {
            self.tool_model = std::env::var("SUPPORTFLOW_TOOL_MODEL").ok();
        }
        if self.responder_model.is_none() {
            self.responder_model = std::env::var("SUPPORTFLOW_RESPONDER_MODEL").ok();
        }
        if self.embedding_model.is_none() {
            self.embedding_model = std::env::var("SUPPORTFLOW_EMBEDDING_MODEL").ok();
        }
        if self.embedding_dimensions.is_none() {
            self.embedding_dimensions = env_parse("SUPPORTFLOW_EMBEDDING_DIMENSIONS");
        }
        if self.llm_timeout.is_none() {
            self.llm_timeout = env_secs("SUPPORTFLOW_LLM_TIMEOUT_SECS");
        }
        if self.tool_timeout.is_none() {
            self.tool_timeout = env_secs("SUPPORTFLOW_TOOL_TIMEOUT_SECS");
        }
        if self.retrieval_timeout.is_none() {
            self.retrieval_timeout = env_secs("SUPPORTFLOW_RETRIEVAL_TIMEOUT_SECS");
        }
        if self.max_retries.is_none() {
            self.max_retries = env_parse("SUPPORTFLOW_MAX_RETRIES");
        }
        if self.history_window.is_none() {
            self.history_window = env_parse("SUPPORTFLOW_HISTORY_WINDOW");
        }
        if self.prompt_dir.is_none() {
            self.prompt_dir = std::env::var("SUPPORTFLOW_PROMPT_DIR")
                .ok()
                .map(PathBuf::from);
        }
        if self.tool_summary_via_llm.is_none() {
            self.tool_summary_via_llm = env_parse("SUPPORTFLOW_TOOL_SUMMARY_VIA_LLM");
        }
        if self.answer_without_context.is_none() {
            self.answer_without_context = env_parse("SUPPORTFLOW_ANSWER_WITHOUT_CONTEXT");
        }
        self
    }

    /// Sets the LLM provider name.
    #[must_use]
    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Sets the API key.
    #[must_use]
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the base URL override.
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the router model.
    #[must_use]
    pub fn router_model(mut self, model: impl Into<String>) -> Self {
        self.router_model = Some(model.into());
        self
    }

    /// Sets the RAG model.
    #[must_use]
    pub fn rag_model(mut self, model: impl Into<String>) -> Self {
        self.rag_model = Some(model.into());
        self
    }

    /// Sets the tool agent model.
    #[must_use]
    pub fn tool_model(mut self, model: impl Into<String>) -> Self {
        self.tool_model = Some(model.into());
        self
    }

    /// Sets the responder model.
    #[must_use]
    pub fn responder_model(mut self, model: impl Into<String>) -> Self {
        self.responder_model = Some(model.into());
        self
    }

    /// Sets the router max tokens.
    #[must_use]
    pub const fn router_max_tokens(mut self, n: u32) -> Self {
        self.router_max_tokens = Some(n);
        self
    }

    /// Sets the RAG max tokens.
    #[must_use]
    pub const fn rag_max_tokens(mut self, n: u32) -> Self {
        self.rag_max_tokens = Some(n);
        self
    }

    /// Sets the tool agent max tokens.
    #[must_use]
    pub const fn tool_max_tokens(mut self, n: u32) -> Self {
        self.tool_max_tokens = Some(n);
        self
    }

    /// Sets the responder max tokens.
    #[must_use]
    pub const fn responder_max_tokens(mut self, n: u32) -> Self {
        self.responder_max_tokens = Some(n);
        self
    }

    /// Sets the embedding model.
    #[must_use]
    pub fn embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = Some(model.into());
        self
    }

    /// Sets the embedding width.
    #[must_use]
    pub const fn embedding_dimensions(mut self, n: u32) -> Self {
        self.embedding_dimensions = Some(n);
        self
    }

    /// Sets the language-generation call timeout.
    #[must_use]
    pub const fn llm_timeout(mut self, duration: Duration) -> Self {
        self.llm_timeout = Some(duration);
        self
    }

    /// Sets the tool execution timeout.
    #[must_use]
    pub const fn tool_timeout(mut self, duration: Duration) -> Self {
        self.tool_timeout = Some(duration);
        self
    }

    /// Sets the per-path retrieval timeout.
    #[must_use]
    pub const fn retrieval_timeout(mut self, duration: Duration) -> Self {
        self.retrieval_timeout = Some(duration);
        self
    }

    /// Sets the internal retry count. Values above one are clamped.
    #[must_use]
    pub const fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = Some(n);
        self
    }

    /// Sets the history window.
    #[must_use]
    pub const fn history_window(mut self, n: usize) -> Self {
        self.history_window = Some(n);
        self
    }

    /// Sets the prompt template directory.
    #[must_use]
    pub fn prompt_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.prompt_dir = Some(dir.into());
        self
    }

    /// Enables or disables LLM phrasing of tool results.
    #[must_use]
    pub const fn tool_summary_via_llm(mut self, enabled: bool) -> Self {
        self.tool_summary_via_llm = Some(enabled);
        self
    }

    /// Enables or disables ungrounded answers on empty retrieval.
    #[must_use]
    pub const fn answer_without_context(mut self, enabled: bool) -> Self {
        self.answer_without_context = Some(enabled);
        self
    }

    /// Builds the [`AgentConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ApiKeyMissing`] if no API key was set, or
    /// [`AgentError::Config`] if a timeout is zero.
    pub fn build(self) -> Result<AgentConfig, AgentError> {
        let api_key = self.api_key.ok_or(AgentError::ApiKeyMissing)?;

        let llm_timeout = self
            .llm_timeout
            .unwrap_or(Duration::from_secs(DEFAULT_LLM_TIMEOUT_SECS));
        let tool_timeout = self
            .tool_timeout
            .unwrap_or(Duration::from_secs(DEFAULT_TOOL_TIMEOUT_SECS));
        let retrieval_timeout = self
            .retrieval_timeout
            .unwrap_or(Duration::from_secs(DEFAULT_RETRIEVAL_TIMEOUT_SECS));
        for (name, value) in [
            ("llm_timeout", llm_timeout),
            ("tool_timeout", tool_timeout),
            ("retrieval_timeout", retrieval_timeout),
        ] {
            if value.is_zero() {
                return Err(AgentError::Config {
                    message: format!("{name} must be greater than zero"),
                });
            }
        }

        let model = |m: Option<String>| m.unwrap_or_else(|| DEFAULT_MODEL.to_string());

        Ok(AgentConfig {
            provider: self.provider.unwrap_or_else(|| "openai".to_string()),
            api_key,
            base_url: self.base_url,
            router_model: model(self.router_model),
            rag_model: model(self.rag_model),
            tool_model: model(self.tool_model),
            responder_model: model(self.responder_model),
            router_max_tokens: self.router_max_tokens.unwrap_or(DEFAULT_ROUTER_MAX_TOKENS),
            rag_max_tokens: self.rag_max_tokens.unwrap_or(DEFAULT_RAG_MAX_TOKENS),
            tool_max_tokens: self.tool_max_tokens.unwrap_or(DEFAULT_TOOL_MAX_TOKENS),
            responder_max_tokens: self
                .responder_max_tokens
                .unwrap_or(DEFAULT_RESPONDER_MAX_TOKENS),
            embedding_model: self
                .embedding_model
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
            embedding_dimensions: self
                .embedding_dimensions
                .unwrap_or(DEFAULT_EMBEDDING_DIMENSIONS),
            llm_timeout,
            tool_timeout,
            retrieval_timeout,
            max_retries: self
                .max_retries
                .unwrap_or(DEFAULT_MAX_RETRIES)
                .min(MAX_RETRIES_CAP),
            history_window: self.history_window.unwrap_or(DEFAULT_HISTORY_WINDOW),
            prompt_dir: self.prompt_dir,
            tool_summary_via_llm: self.tool_summary_via_llm.unwrap_or(true),
            answer_without_context: self.answer_without_context.unwrap_or(true),
        })
    }
}
