//! Turns an [`OrchestrationState`] into the caller-facing [`AgentResult`].
//!
//! The answer is never empty: a latched error, a missing answer or a blank
//! answer all yield [`APOLOGY_ANSWER`].

use chrono::Utc;

use super::state::{OrchestrationState, Stage};
use crate::core::{AgentResult, AgentType, Intent, ResultMetadata, TurnStatus};
use crate::search::duration_ms;

/// Fallback answer for failed turns.
pub const APOLOGY_ANSWER: &str = "I'm sorry, something went wrong while handling your request. \
     Please try again in a moment.";

/// Longest error text retained in metadata, in characters.
const MAX_ERROR_CHARS: usize = 500;

fn bounded(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}

/// Assembles the result for a finished turn.
///
/// `agent_type` follows the branch that ran (or failed); a turn that never
/// reached a branch reports `responder`, matching the fail-closed intent.
#[must_use]
pub fn finalize(state: &OrchestrationState) -> AgentResult {
    let route = state.route();
    let intent = route.map_or(Intent::Conversation, |r| r.intent);
    let agent_type = state
        .branch()
        .and_then(|b| b.agent_type())
        .unwrap_or_else(|| AgentType::from_intent(intent));

    let latched = state.error();
    let answer = match (latched, state.answer()) {
        (None, Some(text)) if !text.trim().is_empty() => text.trim().to_string(),
        _ => APOLOGY_ANSWER.to_string(),
    };
    let status = if latched.is_some() || state.stage() == Stage::Error {
        TurnStatus::Error
    } else {
        TurnStatus::Done
    };

    let sources = if status == TurnStatus::Done && agent_type == AgentType::Rag {
        state.contexts().iter().map(|c| c.doc_id.clone()).collect()
    } else {
        Vec::new()
    };

    let invocation = state.invocation();
    let mut node_executions: Vec<String> = state
        .node_executions()
        .iter()
        .map(|n| (*n).to_string())
        .collect();
    node_executions.push("finalizer".to_string());

    let metadata = ResultMetadata {
        conversation_id: state.conversation_id().to_string(),
        started_at: state.started_at(),
        finished_at: Utc::now(),
        duration_ms: duration_ms(state.elapsed()),
        route_confidence: route.map_or(0.0, |r| r.confidence),
        rationale: route.and_then(|r| r.rationale.clone()),
        contexts_retrieved: state.contexts().len(),
        retrieval_degraded: state.retrieval_degraded(),
        tool_name: invocation
            .map(|i| i.tool_name.clone())
            .filter(|n| !n.is_empty()),
        tool_success: invocation.map(|i| i.success),
        tool_duration_ms: invocation.map(|i| i.duration_ms),
        node_executions,
        total_tokens: state.usage().total_tokens,
        status,
        error: latched.map(|l| bounded(&l.error.to_string(), MAX_ERROR_CHARS)),
    };

    AgentResult {
        answer,
        agent_type,
        intent,
        sources,
        metadata,
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::agent::state::Event;
    use crate::core::RouteDecision;
    use crate::error::AgentError;
    use crate::search::RetrievedContext;

    fn routed(intent: Intent) -> OrchestrationState {
        let mut state = OrchestrationState::new("conv-1");
        state.record_node("router").unwrap_or_else(|e| panic!("{e}"));
        state.advance(Event::Begin).unwrap_or_else(|e| panic!("{e}"));
        state
            .record_route(RouteDecision::new(intent, 0.9, Some("why".to_string())))
            .unwrap_or_else(|e| panic!("{e}"));
        state.advance(Event::Routed(intent)).unwrap_or_else(|e| panic!("{e}"));
        state
    }

    fn context(doc_id: &str) -> RetrievedContext {
        RetrievedContext {
            doc_id: doc_id.to_string(),
            snippet: "text".to_string(),
            source: None,
            dense_rank: Some(1),
            sparse_rank: Some(1),
            fused_score: 2.0 / 61.0,
            final_rank: 1,
        }
    }

    #[test]
    fn test_rag_done() {
        let mut state = routed(Intent::Knowledge);
        state.record_node("rag").unwrap_or_else(|e| panic!("{e}"));
        state
            .record_retrieval(vec![context("kb-shipping")], false)
            .unwrap_or_else(|e| panic!("{e}"));
        state
            .record_answer("Shipping is free over $50 [kb-shipping].".to_string())
            .unwrap_or_else(|e| panic!("{e}"));
        state.advance(Event::Succeeded).unwrap_or_else(|e| panic!("{e}"));

        let result = finalize(&state);
        assert_eq!(result.agent_type, AgentType::Rag);
        assert_eq!(result.sources, vec!["kb-shipping"]);
        assert!(result.is_success());
        assert_eq!(result.metadata.node_executions, vec!["router", "rag", "finalizer"]);
        assert_eq!(result.metadata.contexts_retrieved, 1);
        assert_eq!(result.metadata.conversation_id, "conv-1");
    }

    #[test]
    fn test_error_yields_apology() {
        let mut state = routed(Intent::Conversation);
        state.record_node("responder").unwrap_or_else(|e| panic!("{e}"));
        state.latch_error(AgentError::Timeout {
            operation: "responder generation".to_string(),
            timeout_ms: 30_000,
        });
        state.advance(Event::Failed).unwrap_or_else(|e| panic!("{e}"));

        let result = finalize(&state);
        assert_eq!(result.answer, APOLOGY_ANSWER);
        assert_eq!(result.agent_type, AgentType::Responder);
        assert_eq!(result.metadata.status, TurnStatus::Error);
        assert!(
            result
                .metadata
                .error
                .as_deref()
                .is_some_and(|e| e.contains("timed out"))
        );
    }

    #[test]
    fn test_blank_answer_replaced() {
        let mut state = routed(Intent::Action);
        state.record_answer("   ".to_string()).unwrap_or_else(|e| panic!("{e}"));
        state.advance(Event::Succeeded).unwrap_or_else(|e| panic!("{e}"));
        let result = finalize(&state);
        assert!(!result.answer.trim().is_empty());
        assert_eq!(result.agent_type, AgentType::Tool);
    }

    #[test]
    fn test_error_text_bounded() {
        let long = "x".repeat(MAX_ERROR_CHARS * 2);
        let bounded = bounded(&long, MAX_ERROR_CHARS);
        assert_eq!(bounded.chars().count(), MAX_ERROR_CHARS + 1);
    }
}
