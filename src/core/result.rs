//! The terminal result of a processed turn.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::intent::Intent;

/// Which specialist produced the answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentType {
    /// Retrieval-augmented generation.
    Rag,
    /// Tool execution.
    Tool,
    /// Conversational responder.
    Responder,
}

impl AgentType {
    /// The specialist that serves an intent.
    #[must_use]
    pub const fn from_intent(intent: Intent) -> Self {
        match intent {
            Intent::Knowledge => Self::Rag,
            Intent::Action => Self::Tool,
            Intent::Conversation => Self::Responder,
        }
    }

    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Rag => "rag",
            Self::Tool => "tool",
            Self::Responder => "responder",
        }
    }
}

impl std::fmt::Display for AgentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal status of a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TurnStatus {
    /// The turn completed without a latched error.
    Done,
    /// The turn completed with a latched error; the answer is a bounded apology.
    Error,
}

/// Per-turn bookkeeping attached to every [`AgentResult`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultMetadata {
    /// Conversation the turn belongs to.
    pub conversation_id: String,
    /// When processing started.
    pub started_at: DateTime<Utc>,
    /// When the result was assembled.
    pub finished_at: DateTime<Utc>,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
    /// Router confidence.
    pub route_confidence: f32,
    /// Router rationale, when one was given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
    /// Number of contexts retrieved (knowledge turns).
    pub contexts_retrieved: usize,
    /// Whether one retrieval path failed and fusion ran on the other.
    pub retrieval_degraded: bool,
    /// Tool selected (action turns).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    /// Whether the tool succeeded (action turns).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_success: Option<bool>,
    /// Tool execution time in milliseconds (action turns).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_duration_ms: Option<u64>,
    /// Nodes executed in order, e.g. `["router", "rag", "finalizer"]`.
    pub node_executions: Vec<String>,
    /// Total tokens reported by the provider across all calls.
    pub total_tokens: u32,
    /// Terminal status.
    pub status: TurnStatus,
    /// The latched error, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The answer returned to the caller for one turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResult {
    /// Final answer text. Never empty.
    pub answer: String,
    /// Specialist that produced the answer.
    pub agent_type: AgentType,
    /// Routed intent.
    pub intent: Intent,
    /// Document ids of the contexts used (knowledge turns only).
    pub sources: Vec<String>,
    /// Bookkeeping.
    pub metadata: ResultMetadata,
}

impl AgentResult {
    /// Returns `true` if the turn ended without a latched error.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.metadata.status == TurnStatus::Done
    }
}
