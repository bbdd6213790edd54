//! Intent labels and routing decisions.

use serde::{Deserialize, Serialize};

/// The three mutually exclusive intents a turn can be routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    /// Information seeking; served by retrieval-augmented generation.
    Knowledge,
    /// A request to perform an action through a tool.
    Action,
    /// Greetings, thanks and general chat.
    Conversation,
}

/// How a classifier label was recognised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelMatch {
    /// The label was one of the canonical names.
    Exact,
    /// The label was a known synonym.
    Synonym,
}

impl Intent {
    /// All intents, in routing-table order.
    pub const ALL: [Self; 3] = [Self::Knowledge, Self::Action, Self::Conversation];

    /// Maps a classifier label (case-insensitive) to an intent.
    ///
    /// Accepts the canonical names and a small set of synonyms. Returns
    /// `None` for anything else; callers decide how to fail closed.
    #[must_use]
    pub fn parse_label(label: &str) -> Option<(Self, LabelMatch)> {
        let normalized = label
            .trim()
            .trim_matches(|c: char| !c.is_alphanumeric() && c != '_' && c != '-' && c != ' ')
            .to_lowercase()
            .replace(['-', '_'], " ");

        let exact = match normalized.as_str() {
            "knowledge" => Some(Self::Knowledge),
            "action" => Some(Self::Action),
            "conversation" => Some(Self::Conversation),
            _ => None,
        };
        if let Some(intent) = exact {
            return Some((intent, LabelMatch::Exact));
        }

        let synonym = match normalized.as_str() {
            "question" | "information" | "info" | "faq" | "lookup" | "rag" | "retrieval"
            | "knowledge base" | "knowledge question" => Some(Self::Knowledge),
            "task" | "tool" | "tool use" | "tool call" | "request" | "command" | "operation" => {
                Some(Self::Action)
            }
            "chat" | "chitchat" | "small talk" | "smalltalk" | "greeting" | "social"
            | "conversational" | "general" => Some(Self::Conversation),
            _ => None,
        };
        synonym.map(|intent| (intent, LabelMatch::Synonym))
    }

    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Knowledge => "knowledge",
            Self::Action => "action",
            Self::Conversation => "conversation",
        }
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The router's verdict for one turn. Created once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteDecision {
    /// Selected intent.
    pub intent: Intent,
    /// Classifier confidence in `[0, 1]`.
    pub confidence: f32,
    /// Optional free-text rationale from the classifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}

impl RouteDecision {
    /// Creates a decision, clamping confidence into `[0, 1]`.
    ///
    /// Non-finite confidence values are treated as zero.
    #[must_use]
    pub fn new(intent: Intent, confidence: f32, rationale: Option<String>) -> Self {
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            intent,
            confidence,
            rationale: rationale.filter(|r| !r.trim().is_empty()),
        }
    }

    /// The fail-closed decision: `conversation` with zero confidence.
    #[must_use]
    pub fn fail_closed(reason: impl Into<String>) -> Self {
        Self::new(Intent::Conversation, 0.0, Some(reason.into()))
    }
}
