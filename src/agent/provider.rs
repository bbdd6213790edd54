//! The seam between agents and a language-model backend.

use async_trait::async_trait;

use super::message::{ChatRequest, ChatResponse};
use crate::error::AgentError;

/// A chat-completion backend.
///
/// A provider makes exactly one call per [`LlmProvider::chat`]. Deadlines,
/// the single retry on transient failure and empty-output checks are
/// applied by [`generate`](super::traits::generate), so implementations
/// stay thin and test doubles stay trivial.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Short backend name used in logs.
    fn name(&self) -> &'static str;

    /// Sends one request.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ApiRequest`] with the HTTP status when known,
    /// so callers can tell transient failures from permanent ones.
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, AgentError>;
}
