//! Turn state machine.
//!
//! ```text
//! START ─► ROUTING ─┬─► RAG ────────┬─► DONE
//!                   ├─► TOOL ───────┤
//!                   └─► RESPONDING ─┴─► ERROR
//! ```
//!
//! [`next_stage`] is the pure transition function. [`OrchestrationState`]
//! carries the turn's append-only record: every slot is written at most
//! once and the first latched error wins.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::message::TokenUsage;
use super::tool::ToolInvocation;
use crate::core::{AgentType, Intent, RouteDecision};
use crate::error::AgentError;
use crate::search::RetrievedContext;

/// Upper bound on recorded node executions: router, one branch, finalizer.
pub const MAX_NODE_EXECUTIONS: usize = 3;

/// A stage of the turn graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Nothing has run yet.
    Start,
    /// The router is classifying the turn.
    Routing,
    /// Retrieval-augmented answering.
    Rag,
    /// Tool execution.
    Tool,
    /// Conversational reply.
    Responding,
    /// Terminal: the branch succeeded.
    Done,
    /// Terminal: the branch failed.
    Error,
}

impl Stage {
    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Routing => "routing",
            Self::Rag => "rag",
            Self::Tool => "tool",
            Self::Responding => "responding",
            Self::Done => "done",
            Self::Error => "error",
        }
    }

    /// The branch stage that serves `intent`.
    #[must_use]
    pub const fn branch_for(intent: Intent) -> Self {
        match intent {
            Intent::Knowledge => Self::Rag,
            Intent::Action => Self::Tool,
            Intent::Conversation => Self::Responding,
        }
    }

    /// Returns `true` for `Rag`, `Tool` and `Responding`.
    #[must_use]
    pub const fn is_branch(&self) -> bool {
        matches!(self, Self::Rag | Self::Tool | Self::Responding)
    }

    /// Returns `true` for `Done` and `Error`.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }

    /// The specialist behind a branch stage.
    #[must_use]
    pub const fn agent_type(&self) -> Option<AgentType> {
        match self {
            Self::Rag => Some(AgentType::Rag),
            Self::Tool => Some(AgentType::Tool),
            Self::Responding => Some(AgentType::Responder),
            _ => None,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inputs to the transition function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// Start processing.
    Begin,
    /// The router produced a decision.
    Routed(Intent),
    /// The branch finished.
    Succeeded,
    /// The branch hit an unrecoverable failure.
    Failed,
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Begin => f.write_str("begin"),
            Self::Routed(intent) => write!(f, "routed({intent})"),
            Self::Succeeded => f.write_str("succeeded"),
            Self::Failed => f.write_str("failed"),
        }
    }
}

fn invalid(from: Stage, event: impl std::fmt::Display) -> AgentError {
    AgentError::InvalidTransition {
        from: from.to_string(),
        event: event.to_string(),
    }
}

/// The transition function.
///
/// # Errors
///
/// Returns [`AgentError::InvalidTransition`] for any pair not in the graph.
pub fn next_stage(from: Stage, event: Event) -> Result<Stage, AgentError> {
    match (from, event) {
        (Stage::Start, Event::Begin) => Ok(Stage::Routing),
        (Stage::Routing, Event::Routed(intent)) => Ok(Stage::branch_for(intent)),
        (s, Event::Succeeded) if s.is_branch() => Ok(Stage::Done),
        (s, Event::Failed) if s.is_branch() => Ok(Stage::Error),
        _ => Err(invalid(from, event)),
    }
}

/// The first failure latched in a turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatchedError {
    /// Branch stage that failed.
    pub stage: Stage,
    /// The failure.
    pub error: AgentError,
}

/// Append-only record of one turn.
#[derive(Debug, Clone)]
pub struct OrchestrationState {
    conversation_id: String,
    started_at: DateTime<Utc>,
    started: Instant,
    stage: Stage,
    branch: Option<Stage>,
    route: Option<RouteDecision>,
    contexts: Option<Vec<RetrievedContext>>,
    retrieval_degraded: bool,
    invocation: Option<ToolInvocation>,
    answer: Option<String>,
    error: Option<LatchedError>,
    node_executions: Vec<&'static str>,
    usage: TokenUsage,
}

fn write_once<T>(slot: &mut Option<T>, value: T, stage: Stage, what: &str) -> Result<(), AgentError> {
    if slot.is_some() {
        return Err(invalid(stage, format_args!("{what} recorded twice")));
    }
    *slot = Some(value);
    Ok(())
}

impl OrchestrationState {
    /// Fresh state at `Start`.
    #[must_use]
    pub fn new(conversation_id: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            started_at: Utc::now(),
            started: Instant::now(),
            stage: Stage::Start,
            branch: None,
            route: None,
            contexts: None,
            retrieval_degraded: false,
            invocation: None,
            answer: None,
            error: None,
            node_executions: Vec::with_capacity(MAX_NODE_EXECUTIONS),
            usage: TokenUsage::default(),
        }
    }

    /// Applies `event` and returns the new stage.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::InvalidTransition`] if the graph has no such
    /// edge; the stage is left unchanged.
    pub fn advance(&mut self, event: Event) -> Result<Stage, AgentError> {
        let next = next_stage(self.stage, event)?;
        if next.is_branch() {
            self.branch = Some(next);
        }
        self.stage = next;
        Ok(next)
    }

    /// Records that a node ran.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::InvalidTransition`] past
    /// [`MAX_NODE_EXECUTIONS`].
    pub fn record_node(&mut self, node: &'static str) -> Result<(), AgentError> {
        if self.node_executions.len() >= MAX_NODE_EXECUTIONS {
            return Err(invalid(self.stage, format_args!("execute {node}")));
        }
        self.node_executions.push(node);
        Ok(())
    }

    /// Records the routing decision.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::InvalidTransition`] if already recorded.
    pub fn record_route(&mut self, decision: RouteDecision) -> Result<(), AgentError> {
        write_once(&mut self.route, decision, self.stage, "route")
    }

    /// Records the fused contexts.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::InvalidTransition`] if already recorded.
    pub fn record_retrieval(
        &mut self,
        contexts: Vec<RetrievedContext>,
        degraded: bool,
    ) -> Result<(), AgentError> {
        write_once(&mut self.contexts, contexts, self.stage, "retrieval")?;
        self.retrieval_degraded = degraded;
        Ok(())
    }

    /// Records the tool invocation.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::InvalidTransition`] if already recorded.
    pub fn record_invocation(&mut self, invocation: ToolInvocation) -> Result<(), AgentError> {
        write_once(&mut self.invocation, invocation, self.stage, "tool invocation")
    }

    /// Records the branch's answer text.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::InvalidTransition`] if already recorded.
    pub fn record_answer(&mut self, answer: String) -> Result<(), AgentError> {
        write_once(&mut self.answer, answer, self.stage, "answer")
    }

    /// Adds provider token usage.
    pub const fn add_usage(&mut self, usage: TokenUsage) {
        self.usage.accumulate(usage);
    }

    /// Latches `error` against the current branch.
    ///
    /// Returns `false` (and drops `error`) if an error is already latched.
    pub fn latch_error(&mut self, error: AgentError) -> bool {
        if self.error.is_some() {
            return false;
        }
        self.error = Some(LatchedError {
            stage: self.branch.unwrap_or(self.stage),
            error,
        });
        true
    }

    /// Conversation the turn belongs to.
    #[must_use]
    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    /// When the turn started.
    #[must_use]
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Time since the turn started.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Current stage.
    #[must_use]
    pub const fn stage(&self) -> Stage {
        self.stage
    }

    /// The branch the router selected, once routed.
    #[must_use]
    pub const fn branch(&self) -> Option<Stage> {
        self.branch
    }

    /// The routing decision, once recorded.
    #[must_use]
    pub const fn route(&self) -> Option<&RouteDecision> {
        self.route.as_ref()
    }

    /// Fused contexts, for knowledge turns.
    #[must_use]
    pub fn contexts(&self) -> &[RetrievedContext] {
        self.contexts.as_deref().unwrap_or_default()
    }

    /// Whether retrieval ran degraded.
    #[must_use]
    pub const fn retrieval_degraded(&self) -> bool {
        self.retrieval_degraded
    }

    /// The tool invocation, for action turns.
    #[must_use]
    pub const fn invocation(&self) -> Option<&ToolInvocation> {
        self.invocation.as_ref()
    }

    /// The branch's answer text.
    #[must_use]
    pub fn answer(&self) -> Option<&str> {
        self.answer.as_deref()
    }

    /// The latched error.
    #[must_use]
    pub const fn error(&self) -> Option<&LatchedError> {
        self.error.as_ref()
    }

    /// Nodes executed, in order.
    #[must_use]
    pub fn node_executions(&self) -> &[&'static str] {
        &self.node_executions
    }

    /// Token usage across all calls.
    #[must_use]
    pub const fn usage(&self) -> TokenUsage {
        self.usage
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    const ALL_STAGES: [Stage; 7] = [
        Stage::Start,
        Stage::Routing,
        Stage::Rag,
        Stage::Tool,
        Stage::Responding,
        Stage::Done,
        Stage::Error,
    ];

    fn event_strategy() -> impl Strategy<Value = Event> {
        prop_oneof![
            Just(Event::Begin),
            Just(Event::Routed(Intent::Knowledge)),
            Just(Event::Routed(Intent::Action)),
            Just(Event::Routed(Intent::Conversation)),
            Just(Event::Succeeded),
            Just(Event::Failed),
        ]
    }

    #[test]
    fn test_happy_paths() {
        for (intent, branch) in [
            (Intent::Knowledge, Stage::Rag),
            (Intent::Action, Stage::Tool),
            (Intent::Conversation, Stage::Responding),
        ] {
            let mut state = OrchestrationState::new("c");
            assert_eq!(state.advance(Event::Begin), Ok(Stage::Routing));
            assert_eq!(state.advance(Event::Routed(intent)), Ok(branch));
            assert_eq!(state.advance(Event::Succeeded), Ok(Stage::Done));
            assert_eq!(state.branch(), Some(branch));
        }
    }

    #[test]
    fn test_terminal_stages_accept_nothing() {
        for event in [
            Event::Begin,
            Event::Routed(Intent::Action),
            Event::Succeeded,
            Event::Failed,
        ] {
            assert!(next_stage(Stage::Done, event).is_err());
            assert!(next_stage(Stage::Error, event).is_err());
        }
    }

    #[test]
    fn test_invalid_transition_leaves_stage() {
        let mut state = OrchestrationState::new("c");
        let err = state.advance(Event::Succeeded);
        assert!(matches!(err, Err(AgentError::InvalidTransition { .. })));
        assert_eq!(state.stage(), Stage::Start);
    }

    #[test]
    fn test_first_error_wins() {
        let mut state = OrchestrationState::new("c");
        state.advance(Event::Begin).unwrap_or_else(|e| panic!("{e}"));
        state.advance(Event::Routed(Intent::Knowledge)).unwrap_or_else(|e| panic!("{e}"));
        assert!(state.latch_error(AgentError::EmptyResponse {
            agent: "rag".to_string()
        }));
        assert!(!state.latch_error(AgentError::Cancelled));
        let latched = state.error().cloned();
        assert_eq!(latched.as_ref().map(|l| l.stage), Some(Stage::Rag));
        assert!(matches!(
            latched.map(|l| l.error),
            Some(AgentError::EmptyResponse { .. })
        ));
    }

    #[test]
    fn test_slots_are_write_once() {
        let mut state = OrchestrationState::new("c");
        assert!(state.record_answer("first".to_string()).is_ok());
        assert!(state.record_answer("second".to_string()).is_err());
        assert_eq!(state.answer(), Some("first"));

        assert!(state.record_retrieval(Vec::new(), true).is_ok());
        assert!(state.record_retrieval(Vec::new(), false).is_err());
        assert!(state.retrieval_degraded());
    }

    #[test]
    fn test_node_budget() {
        let mut state = OrchestrationState::new("c");
        assert!(state.record_node("router").is_ok());
        assert!(state.record_node("rag").is_ok());
        assert!(state.record_node("finalizer").is_ok());
        assert!(state.record_node("rag").is_err());
        assert_eq!(state.node_executions(), ["router", "rag", "finalizer"]);
    }

    proptest! {
        #[test]
        fn prop_any_event_sequence_terminates_within_three_steps(
            events in proptest::collection::vec(event_strategy(), 0..20)
        ) {
            let mut stage = Stage::Start;
            let mut applied = 0usize;
            for event in events {
                if let Ok(next) = next_stage(stage, event) {
                    stage = next;
                    applied += 1;
                }
            }
            prop_assert!(applied <= 3);
            prop_assert!(ALL_STAGES.contains(&stage));
        }
    }
}
