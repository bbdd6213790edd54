//! Orchestrator for single-hop, intent-routed turns.
//!
//! Coordinates the turn pipeline: route → one branch (RAG, tool or
//! responder) → finalize. Every node future is raced against the caller's
//! [`CancellationToken`]; once it fires the in-flight call is dropped and
//! no further transitions happen.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::config::AgentConfig;
use super::finalizer::finalize;
use super::observer::{ObserverSet, StageEvent, StageKind, StageObserver, TracingObserver};
use super::prompt::PromptSet;
use super::provider::LlmProvider;
use super::rag::RagAgent;
use super::responder::ResponderAgent;
use super::router::IntentRouter;
use super::state::{Event, OrchestrationState, Stage};
use super::tool::ToolRegistry;
use super::tool_agent::ToolAgent;
use crate::core::{AgentResult, ConversationTurn};
use crate::error::AgentError;
use crate::search::{HybridRetriever, duration_ms};

/// How a branch ended.
enum BranchOutcome {
    Succeeded,
    Failed(AgentError),
}

/// Awaits `fut` unless `cancel` fires first.
async fn guarded<F: Future>(cancel: &CancellationToken, fut: F) -> Result<F::Output, AgentError> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(AgentError::Cancelled),
        out = fut => Ok(out),
    }
}

/// Orchestrates the routed turn workflow.
///
/// Holds no per-turn state: any number of turns, including turns of the
/// same conversation, can run concurrently on one orchestrator.
pub struct Orchestrator {
    provider: Arc<dyn LlmProvider>,
    router: IntentRouter,
    rag: RagAgent,
    tool: ToolAgent,
    responder: ResponderAgent,
    observers: ObserverSet,
}

impl Orchestrator {
    /// Creates an orchestrator with the given provider and configuration.
    ///
    /// Loads prompt templates from [`AgentConfig::prompt_dir`], falling
    /// back to compiled-in defaults. A [`TracingObserver`] is attached.
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        config: &AgentConfig,
        retriever: HybridRetriever,
        registry: Arc<ToolRegistry>,
    ) -> Self {
        let prompts = PromptSet::load(config.prompt_dir.as_deref());
        Self::with_prompts(provider, config, prompts, retriever, registry)
    }

    /// Creates an orchestrator with explicit prompts.
    pub fn with_prompts(
        provider: Arc<dyn LlmProvider>,
        config: &AgentConfig,
        prompts: PromptSet,
        retriever: HybridRetriever,
        registry: Arc<ToolRegistry>,
    ) -> Self {
        let mut observers = ObserverSet::new();
        observers.register(Arc::new(TracingObserver));
        Self {
            provider,
            router: IntentRouter::new(config, prompts.router),
            rag: RagAgent::new(config, prompts.rag, retriever),
            tool: ToolAgent::new(config, prompts.tool, registry),
            responder: ResponderAgent::new(config, prompts.responder),
            observers,
        }
    }

    /// Adds a stage observer.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn StageObserver>) -> Self {
        self.observers.register(observer);
        self
    }

    /// Replaces all observers, including the default tracing observer.
    #[must_use]
    pub fn with_observers(mut self, observers: ObserverSet) -> Self {
        self.observers = observers;
        self
    }

    /// Processes a turn that cannot be cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::InvalidTransition`] only on a control-logic
    /// fault. Every node failure is reflected in the returned result.
    pub async fn process(&self, turn: ConversationTurn) -> Result<AgentResult, AgentError> {
        self.process_turn(turn, &CancellationToken::new()).await
    }

    /// Processes one turn.
    ///
    /// # Steps
    ///
    /// 1. Classify intent with the router (fails closed to conversation)
    /// 2. Run exactly one branch for that intent
    /// 3. Latch the first branch failure, if any
    /// 4. Finalize into an [`AgentResult`] with a non-empty answer
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Cancelled`] if `cancel` fires before the turn
    /// completes, or [`AgentError::InvalidTransition`] on a control-logic
    /// fault. Nothing else escapes.
    pub async fn process_turn(
        &self,
        turn: ConversationTurn,
        cancel: &CancellationToken,
    ) -> Result<AgentResult, AgentError> {
        let mut state = OrchestrationState::new(turn.conversation_id());
        if cancel.is_cancelled() {
            return Err(AgentError::Cancelled);
        }

        // Step 1: Route
        state.advance(Event::Begin)?;
        state.record_node("router")?;
        let started = Instant::now();
        let routed = guarded(cancel, self.router.route(self.provider.as_ref(), &turn)).await?;
        let intent = routed.decision.intent;
        state.add_usage(routed.usage);
        state.record_route(routed.decision)?;
        self.emit(&state, StageKind::Routing, started.elapsed(), 0, routed.error.is_none());

        // Step 2: Branch
        let branch = state.advance(Event::Routed(intent))?;
        let node = branch.agent_type().map_or("responder", |a| a.as_str());
        state.record_node(node)?;
        debug!(%intent, branch = %branch, "Dispatching turn");

        let outcome = match branch {
            Stage::Rag => self.run_rag(&turn, &mut state, cancel).await?,
            Stage::Tool => self.run_tool(&turn, &mut state, cancel).await?,
            Stage::Responding => self.run_responder(&turn, &mut state, cancel).await?,
            other => {
                return Err(AgentError::InvalidTransition {
                    from: other.to_string(),
                    event: "dispatch".to_string(),
                });
            }
        };

        // Step 3: Terminal transition
        match outcome {
            BranchOutcome::Succeeded => {
                state.advance(Event::Succeeded)?;
            }
            BranchOutcome::Failed(e) => {
                warn!(branch = %branch, error = %e, "Branch failed");
                state.latch_error(e);
                state.advance(Event::Failed)?;
            }
        }

        // Step 4: Finalize
        let result = finalize(&state);
        info!(
            conversation_id = %result.metadata.conversation_id,
            intent = %result.intent,
            agent_type = %result.agent_type,
            status = ?result.metadata.status,
            duration_ms = result.metadata.duration_ms,
            "Turn complete"
        );
        self.emit(
            &state,
            StageKind::Turn,
            state.elapsed(),
            result.metadata.node_executions.len(),
            result.is_success(),
        );
        Ok(result)
    }

    async fn run_rag(
        &self,
        turn: &ConversationTurn,
        state: &mut OrchestrationState,
        cancel: &CancellationToken,
    ) -> Result<BranchOutcome, AgentError> {
        let retrieval = guarded(cancel, self.rag.retrieve(turn.query())).await?;
        state.record_retrieval(retrieval.contexts.clone(), retrieval.degraded)?;
        self.emit(
            state,
            StageKind::Retrieval,
            retrieval.duration,
            retrieval.contexts.len(),
            !retrieval.degraded,
        );

        let synthesis = self.rag.synthesize(self.provider.as_ref(), turn, &retrieval);
        match guarded(cancel, synthesis).await? {
            Ok(response) => {
                state.add_usage(response.usage);
                state.record_answer(response.content)?;
                Ok(BranchOutcome::Succeeded)
            }
            Err(e) => Ok(BranchOutcome::Failed(e)),
        }
    }

    async fn run_tool(
        &self,
        turn: &ConversationTurn,
        state: &mut OrchestrationState,
        cancel: &CancellationToken,
    ) -> Result<BranchOutcome, AgentError> {
        let started = Instant::now();
        match guarded(cancel, self.tool.run(self.provider.as_ref(), turn)).await? {
            Ok(run) => {
                state.add_usage(run.usage);
                let invoked = usize::from(!run.invocation.tool_name.is_empty());
                let success = run.invocation.success;
                let took = Duration::from_millis(run.invocation.duration_ms);
                state.record_invocation(run.invocation)?;
                state.record_answer(run.answer)?;
                self.emit(state, StageKind::Tool, took, invoked, success);
                Ok(BranchOutcome::Succeeded)
            }
            Err(e) => {
                self.emit(state, StageKind::Tool, started.elapsed(), 0, false);
                Ok(BranchOutcome::Failed(e))
            }
        }
    }

    async fn run_responder(
        &self,
        turn: &ConversationTurn,
        state: &mut OrchestrationState,
        cancel: &CancellationToken,
    ) -> Result<BranchOutcome, AgentError> {
        let reply = self.responder.respond(self.provider.as_ref(), turn);
        match guarded(cancel, reply).await? {
            Ok(response) => {
                state.add_usage(response.usage);
                state.record_answer(response.content)?;
                Ok(BranchOutcome::Succeeded)
            }
            Err(e) => Ok(BranchOutcome::Failed(e)),
        }
    }

    fn emit(
        &self,
        state: &OrchestrationState,
        stage: StageKind,
        duration: Duration,
        count: usize,
        success: bool,
    ) {
        if self.observers.is_empty() {
            return;
        }
        self.observers.emit(&StageEvent {
            conversation_id: state.conversation_id().to_string(),
            stage,
            duration_ms: duration_ms(duration),
            count,
            intent: state.route().map(|r| r.intent),
            success,
        });
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("provider", &self.provider.name())
            .field("router", &self.router)
            .field("rag", &self.rag)
            .field("tool", &self.tool)
            .field("responder", &self.responder)
            .field("observers", &self.observers)
            .finish()
    }
}
