//! Conversational responder: no retrieval, no tools.

use async_trait::async_trait;

use super::config::AgentConfig;
use super::provider::LlmProvider;
use super::traits::{Agent, AgentResponse, CallPolicy};
use crate::core::ConversationTurn;
use crate::error::AgentError;

/// Agent that replies to greetings and general chat.
pub struct ResponderAgent {
    model: String,
    max_tokens: u32,
    system_prompt: String,
    history_window: usize,
    policy: CallPolicy,
}

impl ResponderAgent {
    /// Creates a responder with the given configuration and system prompt.
    #[must_use]
    pub fn new(config: &AgentConfig, system_prompt: String) -> Self {
        Self {
            model: config.responder_model.clone(),
            max_tokens: config.responder_max_tokens,
            system_prompt,
            history_window: config.history_window,
            policy: CallPolicy::new(config.llm_timeout, config.max_retries),
        }
    }

    /// Replies to `turn` using the recent history.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError`] if generation fails after the internal retry.
    pub async fn respond(
        &self,
        provider: &dyn LlmProvider,
        turn: &ConversationTurn,
    ) -> Result<AgentResponse, AgentError> {
        let history = turn.recent_history(self.history_window);
        self.execute(provider, history, turn.query(), self.policy).await
    }
}

impl std::fmt::Debug for ResponderAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponderAgent")
            .field("model", &self.model)
            .field("history_window", &self.history_window)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Agent for ResponderAgent {
    fn name(&self) -> &'static str {
        "responder"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    fn temperature(&self) -> f32 {
        0.7
    }

    fn max_tokens(&self) -> u32 {
        self.max_tokens
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::agent::message::{ChatRequest, ChatResponse};
    use crate::core::HistoryMessage;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl LlmProvider for Recorder {
        fn name(&self) -> &'static str {
            "recorder"
        }
        async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, AgentError> {
            self.seen
                .lock()
                .unwrap_or_else(|_| panic!("poisoned"))
                .push(request.messages.len());
            Ok(ChatResponse {
                content: "Hello! How can I help?".to_string(),
                ..ChatResponse::default()
            })
        }
    }

    #[tokio::test]
    async fn test_respond_uses_history_window() {
        let config = AgentConfig::builder()
            .api_key("test")
            .history_window(2)
            .build()
            .unwrap_or_else(|_| unreachable!());
        let responder = ResponderAgent::new(&config, "be friendly".to_string());
        let history = (0..6)
            .map(|i| HistoryMessage::user(format!("message {i}")))
            .collect();
        let turn = ConversationTurn::new("c", "hi there").with_history(history);

        let provider = Recorder::default();
        let response = responder
            .respond(&provider, &turn)
            .await
            .unwrap_or_else(|e| panic!("respond failed: {e}"));
        assert_eq!(response.content, "Hello! How can I help?");
        let seen = provider.seen.lock().map(|v| v.clone()).unwrap_or_default();
        // system + 2 history + user
        assert_eq!(seen, vec![4]);
    }
}
