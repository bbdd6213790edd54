//! Turn-scoped domain types shared by the agents, the retriever and the CLI.
//!
//! Everything here is created at turn start, consumed by the finalizer and
//! discarded; nothing persists across turns.

pub mod intent;
pub mod result;
pub mod turn;

pub use intent::{Intent, LabelMatch, RouteDecision};
pub use result::{AgentResult, AgentType, ResultMetadata, TurnStatus};
pub use turn::{ConversationTurn, HistoryMessage, Role};
