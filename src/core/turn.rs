//! Conversation turns and their history.

use serde::{Deserialize, Serialize};

/// Role of a chat message participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions.
    System,
    /// User input.
    User,
    /// Assistant response.
    Assistant,
    /// Tool result.
    Tool,
}

impl Role {
    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One prior message in the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryMessage {
    /// Who sent the message.
    pub role: Role,
    /// Message text.
    pub content: String,
}

impl HistoryMessage {
    /// Creates a user history entry.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Creates an assistant history entry.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A single user query plus the conversation that preceded it.
///
/// Owned by the caller and passed by value into the orchestrator. Fields
/// are read-only after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    query: String,
    #[serde(default)]
    history: Vec<HistoryMessage>,
    conversation_id: String,
}

impl ConversationTurn {
    /// Creates a turn with no prior history.
    #[must_use]
    pub fn new(conversation_id: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            history: Vec::new(),
            conversation_id: conversation_id.into(),
        }
    }

    /// Attaches ordered prior history (oldest first).
    #[must_use]
    pub fn with_history(mut self, history: Vec<HistoryMessage>) -> Self {
        self.history = history;
        self
    }

    /// The user's query text.
    #[must_use]
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Prior messages, oldest first.
    #[must_use]
    pub fn history(&self) -> &[HistoryMessage] {
        &self.history
    }

    /// The most recent `window` history messages.
    #[must_use]
    pub fn recent_history(&self, window: usize) -> &[HistoryMessage] {
        let start = self.history.len().saturating_sub(window);
        &self.history[start..]
    }

    /// Conversation identifier.
    #[must_use]
    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recent_history_window() {
        let history: Vec<HistoryMessage> = (0..8)
            .map(|i| HistoryMessage::user(format!("m{i}")))
            .collect();
        let turn = ConversationTurn::new("c1", "hello").with_history(history);
        let recent = turn.recent_history(3);
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].content, "m5");
        assert_eq!(recent[2].content, "m7");
        assert_eq!(turn.recent_history(100).len(), 8);
        assert!(turn.recent_history(0).is_empty());
    }

    #[test]
    fn test_turn_deserialization_defaults_history() {
        let json = r#"{"query": "hi", "conversation_id": "abc"}"#;
        let turn: ConversationTurn = serde_json::from_str(json).unwrap_or_else(|_| unreachable!());
        assert_eq!(turn.query(), "hi");
        assert_eq!(turn.conversation_id(), "abc");
        assert!(turn.history().is_empty());
    }

    #[test]
    fn test_role_serialization() {
        let json = serde_json::to_string(&Role::Assistant).unwrap_or_default();
        assert_eq!(json, "\"assistant\"");
        assert_eq!(Role::Tool.to_string(), "tool");
    }
}
