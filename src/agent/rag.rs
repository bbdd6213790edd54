//! Retrieval-augmented answering.
//!
//! Runs the [`HybridRetriever`] and synthesizes an answer grounded in the
//! fused contexts. Retrieval never fails; when it comes back empty the
//! agent either answers with an explicit no-information context or returns
//! [`INSUFFICIENT_CONTEXT_ANSWER`] without calling the provider.

use async_trait::async_trait;
use tracing::{debug, info};

use super::config::AgentConfig;
use super::prompt::build_rag_prompt;
use super::provider::LlmProvider;
use super::traits::{Agent, AgentResponse, CallPolicy};
use crate::core::ConversationTurn;
use crate::error::AgentError;
use crate::search::{HybridRetriever, RetrievalOutcome};

/// Answer used when nothing was retrieved and ungrounded answers are disabled.
pub const INSUFFICIENT_CONTEXT_ANSWER: &str = "I couldn't find anything about that in our knowledge base. \
     Please contact our support team and they'll be happy to help.";

/// Agent that answers knowledge questions from retrieved context.
pub struct RagAgent {
    model: String,
    max_tokens: u32,
    system_prompt: String,
    policy: CallPolicy,
    answer_without_context: bool,
    retriever: HybridRetriever,
}

impl RagAgent {
    /// Creates a RAG agent over `retriever`.
    #[must_use]
    pub fn new(config: &AgentConfig, system_prompt: String, retriever: HybridRetriever) -> Self {
        Self {
            model: config.rag_model.clone(),
            max_tokens: config.rag_max_tokens,
            system_prompt,
            policy: CallPolicy::new(config.llm_timeout, config.max_retries),
            answer_without_context: config.answer_without_context,
            retriever,
        }
    }

    /// The underlying retriever.
    #[must_use]
    pub const fn retriever(&self) -> &HybridRetriever {
        &self.retriever
    }

    /// Runs hybrid retrieval for `query`. Never fails.
    pub async fn retrieve(&self, query: &str) -> RetrievalOutcome {
        let outcome = self.retriever.retrieve(query).await;
        info!(
            contexts = outcome.contexts.len(),
            degraded = outcome.degraded,
            duration_ms = crate::search::duration_ms(outcome.duration),
            "Retrieval complete"
        );
        outcome
    }

    /// Generates an answer from `retrieval`.
    ///
    /// Returns [`INSUFFICIENT_CONTEXT_ANSWER`] with no provider call when the
    /// context list is empty and ungrounded answers are disabled.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError`] if generation fails after the internal retry.
    pub async fn synthesize(
        &self,
        provider: &dyn LlmProvider,
        turn: &ConversationTurn,
        retrieval: &RetrievalOutcome,
    ) -> Result<AgentResponse, AgentError> {
        if retrieval.contexts.is_empty() && !self.answer_without_context {
            debug!(degraded = retrieval.degraded, "No context, returning fixed answer");
            return Ok(AgentResponse {
                content: INSUFFICIENT_CONTEXT_ANSWER.to_string(),
                finish_reason: Some("insufficient_context".to_string()),
                ..AgentResponse::default()
            });
        }

        let user_msg = build_rag_prompt(turn.query(), &retrieval.contexts);
        self.execute(provider, &[], &user_msg, self.policy).await
    }
}

impl std::fmt::Debug for RagAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RagAgent")
            .field("model", &self.model)
            .field("policy", &self.policy)
            .field("answer_without_context", &self.answer_without_context)
            .field("retriever", &self.retriever)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Agent for RagAgent {
    fn name(&self) -> &'static str {
        "rag"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    fn temperature(&self) -> f32 {
        0.2
    }

    fn max_tokens(&self) -> u32 {
        self.max_tokens
    }
}
