//! Agent trait definition and the bounded call policy.
//!
//! All agents (router, RAG, tool, responder) implement [`Agent`], which
//! builds a provider-agnostic request from the agent's fixed settings.
//! [`generate`] runs such a request under a deadline with at most one
//! internal retry.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::message::{ChatMessage, ChatRequest, TokenUsage};
use super::provider::LlmProvider;
use super::tool::{ToolCall, ToolDefinition};
use crate::core::HistoryMessage;
use crate::error::AgentError;
use crate::search::duration_ms;

/// Response from an agent execution.
#[derive(Debug, Clone, Default)]
pub struct AgentResponse {
    /// The agent's text output.
    pub content: String,
    /// Tool calls requested by the model.
    pub tool_calls: Vec<ToolCall>,
    /// Token usage across every attempt.
    pub usage: TokenUsage,
    /// Why the model stopped generating (e.g. `"stop"`, `"length"`).
    pub finish_reason: Option<String>,
    /// Provider calls made, including the retry.
    pub attempts: u32,
}

/// Deadline and retry budget for one node's external call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallPolicy {
    /// Deadline for each attempt.
    pub timeout: Duration,
    /// Retries after the first attempt (0 or 1).
    pub max_retries: u32,
}

impl CallPolicy {
    /// Creates a policy. Retries are clamped to one.
    #[must_use]
    pub fn new(timeout: Duration, max_retries: u32) -> Self {
        Self {
            timeout,
            max_retries: max_retries.min(1),
        }
    }

    /// A single attempt with no retry.
    #[must_use]
    pub const fn single(timeout: Duration) -> Self {
        Self {
            timeout,
            max_retries: 0,
        }
    }
}

/// Trait implemented by all agents in the system.
///
/// Agents encapsulate a specific role (routing, grounded answering, tool
/// use, conversation) with a fixed system prompt and model configuration.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Agent name for logging and identification.
    fn name(&self) -> &'static str;

    /// Model identifier to use for this agent.
    fn model(&self) -> &str;

    /// System prompt that defines the agent's role and behavior.
    fn system_prompt(&self) -> &str;

    /// Whether to request JSON-formatted output.
    fn json_mode(&self) -> bool {
        false
    }

    /// Sampling temperature (0.0 = deterministic, higher = more creative).
    fn temperature(&self) -> f32 {
        0.0
    }

    /// Maximum tokens for the response.
    fn max_tokens(&self) -> u32 {
        1024
    }

    /// Tool definitions offered to the model.
    fn tools(&self) -> Vec<ToolDefinition> {
        Vec::new()
    }

    /// Builds a request: system prompt, then `history`, then `user_msg`.
    fn request(&self, history: &[HistoryMessage], user_msg: &str) -> ChatRequest {
        let mut messages: Vec<ChatMessage> = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(self.system_prompt()));
        messages.extend(history.iter().map(ChatMessage::from));
        messages.push(ChatMessage::user(user_msg));

        ChatRequest {
            model: self.model().to_string(),
            messages,
            temperature: Some(self.temperature()),
            max_tokens: Some(self.max_tokens()),
            json_mode: self.json_mode(),
            tools: self.tools(),
        }
    }

    /// Executes the agent once against `provider` under `policy`.
    ///
    /// # Errors
    ///
    /// Returns the last [`AgentError`] once the retry budget is spent.
    async fn execute(
        &self,
        provider: &dyn LlmProvider,
        history: &[HistoryMessage],
        user_msg: &str,
        policy: CallPolicy,
    ) -> Result<AgentResponse, AgentError> {
        let request = self.request(history, user_msg);
        generate(self.name(), provider, &request, policy).await
    }
}

/// Sends `request` with a per-attempt deadline and bounded retry.
///
/// An attempt fails on a provider error, an elapsed deadline, or an empty
/// generation (no text and no tool calls). Only transient failures are
/// retried. Token usage is summed over attempts.
///
/// # Errors
///
/// Returns the final attempt's error.
pub async fn generate(
    agent: &str,
    provider: &dyn LlmProvider,
    request: &ChatRequest,
    policy: CallPolicy,
) -> Result<AgentResponse, AgentError> {
    let mut usage = TokenUsage::default();
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        let outcome = match tokio::time::timeout(policy.timeout, provider.chat(request)).await {
            Ok(Ok(response)) => {
                usage.accumulate(response.usage);
                if response.is_empty() {
                    Err(AgentError::EmptyResponse {
                        agent: agent.to_string(),
                    })
                } else {
                    Ok(response)
                }
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(AgentError::Timeout {
                operation: format!("{agent} generation"),
                timeout_ms: duration_ms(policy.timeout),
            }),
        };

        match outcome {
            Ok(response) => {
                debug!(agent, attempt, tokens = usage.total_tokens, "Generation complete");
                return Ok(AgentResponse {
                    content: response.content,
                    tool_calls: response.tool_calls,
                    usage,
                    finish_reason: response.finish_reason,
                    attempts: attempt,
                });
            }
            Err(e) if e.is_transient() && attempt <= policy.max_retries => {
                warn!(agent, attempt, error = %e, "Transient generation failure, retrying");
            }
            Err(e) => {
                warn!(agent, attempt, error = %e, "Generation failed");
                return Err(e);
            }
        }
    }
}

/// Strips a surrounding markdown code fence (```` ``` ```` or ```` ```json ````).
pub(crate) fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    if !trimmed.starts_with("```") {
        return trimmed;
    }
    let body = trimmed.trim_start_matches('`');
    // Drop the info string ("json", "text", ...) on the opening line.
    let body = match body.split_once('\n') {
        Some((info, rest)) if info.trim().chars().all(char::is_alphanumeric) => rest,
        _ => body,
    };
    body.trim_end().trim_end_matches('`').trim()
}
