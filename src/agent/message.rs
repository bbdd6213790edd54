//! Provider-agnostic chat types.
//!
//! Agents build a [`ChatRequest`] and read a [`ChatResponse`]; providers
//! translate both to and from their wire format.

use serde::{Deserialize, Serialize};

use super::tool::{ToolCall, ToolDefinition};
pub use crate::core::Role;
use crate::core::HistoryMessage;

/// One message sent to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Who is speaking.
    pub role: Role,
    /// Message text.
    pub content: String,
}

impl ChatMessage {
    /// Instructions for the model.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// The customer's message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// A previous assistant reply.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

impl From<&HistoryMessage> for ChatMessage {
    fn from(msg: &HistoryMessage) -> Self {
        Self {
            role: msg.role,
            content: msg.content.clone(),
        }
    }
}

/// A chat completion request.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// Model identifier.
    pub model: String,
    /// System prompt, history, then the current message.
    pub messages: Vec<ChatMessage>,
    /// Sampling temperature.
    pub temperature: Option<f32>,
    /// Completion token cap.
    pub max_tokens: Option<u32>,
    /// Ask for a single JSON object as output.
    pub json_mode: bool,
    /// Tools the model may call. Empty disables function calling.
    pub tools: Vec<ToolDefinition>,
}

impl ChatRequest {
    /// Text of the most recent user message.
    #[must_use]
    pub fn last_user_content(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }

    /// Whether function calling is enabled.
    #[must_use]
    pub fn offers_tools(&self) -> bool {
        !self.tools.is_empty()
    }
}

/// Token counts reported by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Prompt tokens.
    pub prompt_tokens: u32,
    /// Completion tokens.
    pub completion_tokens: u32,
    /// Sum of both.
    pub total_tokens: u32,
}

impl TokenUsage {
    /// Adds another call's usage to this one, saturating.
    pub const fn accumulate(&mut self, other: Self) {
        self.prompt_tokens = self.prompt_tokens.saturating_add(other.prompt_tokens);
        self.completion_tokens = self
            .completion_tokens
            .saturating_add(other.completion_tokens);
        self.total_tokens = self.total_tokens.saturating_add(other.total_tokens);
    }
}

/// A chat completion response.
#[derive(Debug, Clone, Default)]
pub struct ChatResponse {
    /// Generated text. Empty when the model only called tools.
    pub content: String,
    /// Token counts for this call.
    pub usage: TokenUsage,
    /// Native function calls, in the order the model produced them.
    pub tool_calls: Vec<ToolCall>,
    /// Why generation stopped (`"stop"`, `"length"`, `"tool_calls"`).
    pub finish_reason: Option<String>,
}

impl ChatResponse {
    /// A plain text reply.
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    /// `true` if the model produced neither text nor a tool call.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.content.trim().is_empty() && self.tool_calls.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_conversion() {
        let msg = ChatMessage::from(&HistoryMessage::assistant("Happy to help"));
        assert_eq!(msg, ChatMessage::assistant("Happy to help"));
    }

    #[test]
    fn test_last_user_content() {
        let request = ChatRequest {
            model: "m".to_string(),
            messages: vec![
                ChatMessage::system("sys"),
                ChatMessage::user("first"),
                ChatMessage::assistant("reply"),
                ChatMessage::user("second"),
            ],
            temperature: None,
            max_tokens: None,
            json_mode: false,
            tools: Vec::new(),
        };
        assert_eq!(request.last_user_content(), Some("second"));
        assert!(!request.offers_tools());
    }

    #[test]
    fn test_usage_accumulates_and_saturates() {
        let mut total = TokenUsage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        };
        total.accumulate(TokenUsage {
            prompt_tokens: 1,
            completion_tokens: 1,
            total_tokens: 2,
        });
        assert_eq!(total.total_tokens, 17);

        total.accumulate(TokenUsage {
            total_tokens: u32::MAX,
            ..TokenUsage::default()
        });
        assert_eq!(total.total_tokens, u32::MAX);
    }

    #[test]
    fn test_empty_response() {
        assert!(ChatResponse::text("  \n").is_empty());
        assert!(!ChatResponse::text("ok").is_empty());
        let call_only = ChatResponse {
            tool_calls: vec![ToolCall {
                id: "call_1".to_string(),
                name: "get_order_status".to_string(),
                arguments: "{}".to_string(),
            }],
            ..ChatResponse::default()
        };
        assert!(!call_only.is_empty());
    }

    #[test]
    fn test_message_serialization() {
        let json = serde_json::to_string(&ChatMessage::user("test")).unwrap_or_default();
        assert_eq!(json, r#"{"role":"user","content":"test"}"#);
    }
}
