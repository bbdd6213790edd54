//! Stage-completion notifications.
//!
//! The orchestrator emits a [`StageEvent`] when routing, retrieval, a tool
//! call and the whole turn complete. Observers are called synchronously and
//! must not block; a panicking observer is caught and skipped so it can
//! never change a turn's outcome.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::core::Intent;

/// Which stage completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// The router classified the turn.
    Routing,
    /// Hybrid retrieval finished.
    Retrieval,
    /// The tool call finished.
    Tool,
    /// The turn produced its result.
    Turn,
}

impl StageKind {
    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Routing => "routing",
            Self::Retrieval => "retrieval",
            Self::Tool => "tool",
            Self::Turn => "turn",
        }
    }
}

/// A stage-completion notification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageEvent {
    /// Conversation the turn belongs to.
    pub conversation_id: String,
    /// Completed stage.
    pub stage: StageKind,
    /// Time spent in the stage.
    pub duration_ms: u64,
    /// Stage-specific count: contexts retrieved, tools invoked, or nodes executed.
    pub count: usize,
    /// Routed intent, once known.
    pub intent: Option<Intent>,
    /// Whether the stage succeeded.
    pub success: bool,
}

/// Receives stage-completion notifications.
pub trait StageObserver: Send + Sync {
    /// Called once per completed stage. Must return promptly.
    fn on_stage(&self, event: &StageEvent);
}

/// Logs every event through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl StageObserver for TracingObserver {
    fn on_stage(&self, event: &StageEvent) {
        info!(
            conversation_id = %event.conversation_id,
            stage = event.stage.as_str(),
            duration_ms = event.duration_ms,
            count = event.count,
            intent = event.intent.map(|i| i.as_str()),
            success = event.success,
            "Stage complete"
        );
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl StageObserver for NoopObserver {
    fn on_stage(&self, _event: &StageEvent) {}
}

/// Forwards events to an unbounded channel.
///
/// Sending never blocks. Events are dropped once the receiver is gone.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<StageEvent>,
}

impl ChannelObserver {
    /// Creates an observer and the receiving end.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<StageEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl StageObserver for ChannelObserver {
    fn on_stage(&self, event: &StageEvent) {
        let _ = self.tx.send(event.clone());
    }
}

/// The observers attached to an orchestrator.
#[derive(Clone, Default)]
pub struct ObserverSet {
    observers: Vec<Arc<dyn StageObserver>>,
}

impl ObserverSet {
    /// An empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an observer.
    pub fn register(&mut self, observer: Arc<dyn StageObserver>) {
        self.observers.push(observer);
    }

    /// Number of observers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.observers.len()
    }

    /// Returns `true` if no observers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    /// Delivers `event` to every observer. Panics are caught and logged.
    pub fn emit(&self, event: &StageEvent) {
        for observer in &self.observers {
            let delivered = catch_unwind(AssertUnwindSafe(|| observer.on_stage(event)));
            if delivered.is_err() {
                warn!(stage = event.stage.as_str(), "Stage observer panicked");
            }
        }
    }
}

impl std::fmt::Debug for ObserverSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverSet")
            .field("observers", &self.observers.len())
            .finish()
    }
}
