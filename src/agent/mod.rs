//! Support agents and the turn orchestrator.
//!
//! Routes each conversational turn to exactly one specialist agent using a
//! pluggable provider abstraction backed by OpenAI-compatible APIs.
//!
//! # Architecture
//!
//! ```text
//! ConversationTurn → Orchestrator
//!   ├── IntentRouter (knowledge | action | conversation)
//!   ├── one branch:
//!   │   ├── RagAgent      → HybridRetriever (dense + BM25, RRF) → grounded answer
//!   │   ├── ToolAgent     → ToolRegistry (validate → execute)    → action summary
//!   │   └── ResponderAgent                                       → conversational reply
//!   └── finalize → AgentResult
//! ```
//!
//! # Feature Gate
//!
//! The `OpenAI` backend requires the `openai` feature (enabled by default):
//! ```toml
//! [dependencies]
//! supportflow-rs = { version = "...", features = ["openai"] }
//! ```

pub mod client;
pub mod config;
pub mod finalizer;
pub mod message;
pub mod observer;
pub mod orchestrator;
pub mod prompt;
pub mod provider;
pub mod providers;
pub mod rag;
pub mod responder;
pub mod router;
pub mod state;
pub mod support_tools;
pub mod tool;
pub mod tool_agent;
pub mod traits;

// Re-export key types
pub use client::create_provider;
pub use config::AgentConfig;
pub use finalizer::{APOLOGY_ANSWER, finalize};
pub use message::{ChatMessage, ChatRequest, ChatResponse, Role, TokenUsage};
pub use observer::{
    ChannelObserver, NoopObserver, ObserverSet, StageEvent, StageKind, StageObserver,
    TracingObserver,
};
pub use orchestrator::Orchestrator;
pub use prompt::PromptSet;
pub use provider::LlmProvider;
pub use rag::{INSUFFICIENT_CONTEXT_ANSWER, RagAgent};
pub use responder::ResponderAgent;
pub use router::{IntentRouter, RouteOutcome, parse_classification};
pub use state::{Event, LatchedError, OrchestrationState, Stage, next_stage};
pub use support_tools::support_registry;
pub use tool::{Tool, ToolCall, ToolDefinition, ToolInvocation, ToolRegistry, validate_arguments};
pub use tool_agent::{ACTION_FAILED_ANSWER, ToolAgent, ToolRun, ToolSelection};
pub use traits::{Agent, AgentResponse, CallPolicy, generate};
