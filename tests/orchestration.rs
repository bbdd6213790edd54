//! End-to-end turns through the orchestrator with a scripted provider.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use supportflow_rs::agent::{
    ACTION_FAILED_ANSWER, APOLOGY_ANSWER, ChannelObserver, ObserverSet, StageKind,
};
use supportflow_rs::core::{AgentType, ConversationTurn, HistoryMessage, Intent, TurnStatus};
use supportflow_rs::error::AgentError;
use supportflow_rs::search::{HybridRetriever, SearchConfig};
use tokio_util::sync::CancellationToken;

use common::{
    BrokenOrderTool, CountingOrderTool, DownEmbedder, RAG, RESPONDER, ROUTER, ScriptedProvider,
    TOOL, orchestrator, registry_of, registry_with, retriever, sample_kb,
};

#[tokio::test]
async fn knowledge_turn_answers_from_retrieved_contexts() {
    let provider = Arc::new(
        ScriptedProvider::new()
            .reply(
                ROUTER,
                r#"{"intent":"knowledge","confidence":0.93,"rationale":"policy question"}"#,
            )
            .reply(RAG, "You can return items within 30 days [kb-return-policy]."),
    );
    let orch = orchestrator(
        provider.clone(),
        retriever().await,
        registry_with(Arc::default()),
    );

    let result = orch
        .process(ConversationTurn::new("conv-rag", "What is your return policy?"))
        .await
        .unwrap();

    assert_eq!(result.intent, Intent::Knowledge);
    assert_eq!(result.agent_type, AgentType::Rag);
    assert!(result.is_success());
    assert!(result.sources.iter().any(|s| s == "kb-return-policy"));
    assert_eq!(result.sources.len(), result.metadata.contexts_retrieved);
    assert!(!result.metadata.retrieval_degraded);
    assert_eq!(
        result.metadata.node_executions,
        vec!["router", "rag", "finalizer"]
    );
    assert!((result.metadata.route_confidence - 0.93).abs() < f32::EPSILON);

    let rag_requests = provider.requests_for(RAG);
    assert_eq!(rag_requests.len(), 1);
    let prompt = rag_requests[0].last_user_content().unwrap_or_default();
    assert!(prompt.contains("kb-return-policy"));
    assert!(prompt.contains("What is your return policy?"));
}

#[tokio::test]
async fn action_turn_calls_tool_once_with_extracted_arguments() {
    let tool = Arc::new(CountingOrderTool::default());
    let provider = Arc::new(
        ScriptedProvider::new()
            .reply(ROUTER, "action|order lookup")
            .tool_call(TOOL, "get_order_status", json!({"order_id": "12345"}))
            .reply(TOOL, "Your order 12345 has shipped."),
    );
    let orch = orchestrator(provider.clone(), retriever().await, registry_with(tool.clone()));

    let result = orch
        .process(ConversationTurn::new("conv-tool", "Where is my order 12345?"))
        .await
        .unwrap();

    assert_eq!(result.agent_type, AgentType::Tool);
    assert_eq!(result.answer, "Your order 12345 has shipped.");
    assert!(result.sources.is_empty());
    assert_eq!(tool.calls(), 1);
    let args = tool.last_args.lock().unwrap().clone().unwrap();
    assert_eq!(args.get("order_id"), Some(&json!("12345")));
    assert_eq!(
        result.metadata.tool_name.as_deref(),
        Some("get_order_status")
    );
    assert_eq!(result.metadata.tool_success, Some(true));

    // Selection advertises the tools; phrasing does not.
    let tool_requests = provider.requests_for(TOOL);
    assert_eq!(tool_requests.len(), 2);
    assert_eq!(tool_requests[0].tools.len(), 1);
    assert!(tool_requests[1].tools.is_empty());
}

#[tokio::test]
async fn missing_argument_never_reaches_the_tool() {
    let tool = Arc::new(CountingOrderTool::default());
    let provider = Arc::new(
        ScriptedProvider::new()
            .reply(ROUTER, "action")
            .tool_call(TOOL, "get_order_status", json!({})),
    );
    let orch = orchestrator(provider.clone(), retriever().await, registry_with(tool.clone()));

    let result = orch
        .process(ConversationTurn::new("conv-missing", "Where is my order?"))
        .await
        .unwrap();

    assert_eq!(tool.calls(), 0);
    assert_eq!(result.agent_type, AgentType::Tool);
    assert_eq!(result.metadata.tool_success, Some(false));
    assert!(result.answer.contains("order id"));
    // No phrasing call after a validation failure.
    assert_eq!(provider.requests_for(TOOL).len(), 1);
}

#[tokio::test]
async fn panicking_tool_becomes_failed_action() {
    let provider = Arc::new(
        ScriptedProvider::new()
            .reply(ROUTER, "action")
            .tool_call(TOOL, "get_order_status", json!({"order_id": "12345"})),
    );
    let orch = orchestrator(
        provider.clone(),
        retriever().await,
        registry_of(Arc::new(BrokenOrderTool)),
    );

    let result = orch
        .process(ConversationTurn::new("conv-broken", "Where is my order 12345?"))
        .await
        .unwrap();

    assert_eq!(result.agent_type, AgentType::Tool);
    assert_eq!(result.metadata.tool_success, Some(false));
    assert!(result.answer.starts_with(ACTION_FAILED_ANSWER));
    assert_eq!(provider.requests_for(TOOL).len(), 1);
}

#[tokio::test]
async fn malformed_classification_falls_back_to_conversation() {
    let provider = Arc::new(
        ScriptedProvider::new()
            .reply(ROUTER, "¯\\_(ツ)_/¯")
            .reply(RESPONDER, "Happy to help! What do you need?"),
    );
    let orch = orchestrator(
        provider.clone(),
        retriever().await,
        registry_with(Arc::default()),
    );

    let result = orch
        .process(ConversationTurn::new("conv-malformed", "hmm"))
        .await
        .unwrap();

    assert_eq!(result.intent, Intent::Conversation);
    assert_eq!(result.agent_type, AgentType::Responder);
    assert_eq!(result.answer, "Happy to help! What do you need?");
    assert!(result.metadata.route_confidence.abs() < f32::EPSILON);
    assert!(result.is_success());
    assert!(provider.requests_for(RAG).is_empty());
    assert!(provider.requests_for(TOOL).is_empty());
}

#[tokio::test]
async fn generation_failure_yields_apology_with_error_status() {
    let server_error = || AgentError::ApiRequest {
        message: "upstream overloaded".to_string(),
        status: Some(503),
    };
    let provider = Arc::new(
        ScriptedProvider::new()
            .reply(ROUTER, "conversation")
            .fail(RESPONDER, server_error())
            .fail(RESPONDER, server_error()),
    );
    let orch = orchestrator(
        provider.clone(),
        retriever().await,
        registry_with(Arc::default()),
    );

    let result = orch
        .process(ConversationTurn::new("conv-fail", "hello there"))
        .await
        .unwrap();

    assert_eq!(result.answer, APOLOGY_ANSWER);
    assert_eq!(result.metadata.status, TurnStatus::Error);
    assert_eq!(result.agent_type, AgentType::Responder);
    assert!(
        result
            .metadata
            .error
            .as_deref()
            .is_some_and(|e| e.contains("upstream overloaded"))
    );
    assert_eq!(
        result.metadata.node_executions,
        vec!["router", "responder", "finalizer"]
    );
    // One retry on a transient failure, never more.
    assert_eq!(provider.requests_for(RESPONDER).len(), 2);
}

#[tokio::test]
async fn dense_outage_degrades_to_sparse_only() {
    let provider = Arc::new(
        ScriptedProvider::new()
            .reply(ROUTER, "knowledge")
            .reply(RAG, "Shipping is free over $50 [kb-shipping]."),
    );
    let degraded = HybridRetriever::new(Arc::new(DownEmbedder), sample_kb().await, SearchConfig::new());
    let (channel, mut events) = ChannelObserver::channel();
    let mut observers = ObserverSet::new();
    observers.register(Arc::new(channel));
    let orch = orchestrator(provider, degraded, registry_with(Arc::default()))
        .with_observers(observers);

    let result = orch
        .process(ConversationTurn::new("conv-degraded", "How much does shipping cost?"))
        .await
        .unwrap();

    assert!(result.is_success());
    assert!(result.metadata.retrieval_degraded);
    assert!(result.sources.iter().any(|s| s == "kb-shipping"));

    let mut stages = Vec::new();
    while let Ok(event) = events.try_recv() {
        stages.push((event.stage, event.success));
    }
    assert_eq!(
        stages,
        vec![
            (StageKind::Routing, true),
            (StageKind::Retrieval, false),
            (StageKind::Turn, true),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn cancellation_stops_an_in_flight_turn() {
    let provider = Arc::new(
        ScriptedProvider::new()
            .reply(ROUTER, "conversation")
            .reply(RESPONDER, "too late")
            .delay(RESPONDER, Duration::from_secs(10)),
    );
    let orch = orchestrator(
        provider.clone(),
        retriever().await,
        registry_with(Arc::default()),
    );
    let cancel = CancellationToken::new();

    let (outcome, ()) = tokio::join!(
        orch.process_turn(ConversationTurn::new("conv-cancel", "hi"), &cancel),
        async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            cancel.cancel();
        }
    );

    assert_eq!(outcome.err(), Some(AgentError::Cancelled));
    assert_eq!(provider.requests_for(RESPONDER).len(), 1);
}

#[tokio::test]
async fn responder_sees_recent_history() {
    let provider = Arc::new(
        ScriptedProvider::new()
            .reply(ROUTER, "conversation")
            .reply(RESPONDER, "You're welcome!"),
    );
    let orch = orchestrator(
        provider.clone(),
        retriever().await,
        registry_with(Arc::default()),
    );
    let turn = ConversationTurn::new("conv-history", "thanks!").with_history(vec![
        HistoryMessage::user("Where is order 12345?"),
        HistoryMessage::assistant("It shipped yesterday."),
    ]);

    let result = orch.process(turn).await.unwrap();
    assert_eq!(result.answer, "You're welcome!");

    let request = &provider.requests_for(RESPONDER)[0];
    let contents: Vec<&str> = request.messages.iter().map(|m| m.content.as_str()).collect();
    assert!(contents.contains(&"It shipped yesterday."));
    assert_eq!(contents.last(), Some(&"thanks!"));
}

#[tokio::test]
async fn concurrent_turns_share_one_orchestrator() {
    let provider = Arc::new(
        ScriptedProvider::new()
            .reply(ROUTER, "conversation")
            .reply(ROUTER, "conversation")
            .reply(RESPONDER, "one")
            .reply(RESPONDER, "two"),
    );
    let orch = orchestrator(
        provider.clone(),
        retriever().await,
        registry_with(Arc::default()),
    );

    let (a, b) = tokio::join!(
        orch.process(ConversationTurn::new("same", "hello")),
        orch.process(ConversationTurn::new("same", "hi again")),
    );
    let mut answers = vec![a.unwrap().answer, b.unwrap().answer];
    answers.sort();
    assert_eq!(answers, vec!["one", "two"]);
    assert_eq!(provider.call_count(), 4);
}
