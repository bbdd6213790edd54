//! Shared fixtures for integration tests.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use supportflow_rs::agent::tool::ToolArguments;
use supportflow_rs::agent::{
    AgentConfig, ChatRequest, ChatResponse, LlmProvider, Orchestrator, PromptSet, Tool, ToolCall,
    ToolRegistry,
};
use supportflow_rs::embedding::{Embedder, HashEmbedder};
use supportflow_rs::error::{AgentError, RetrievalError, ToolExecutionError};
use supportflow_rs::search::{HybridRetriever, KnowledgeBase, SearchConfig, sample_corpus};

pub const ROUTER: &str = "router";
pub const RAG: &str = "rag";
pub const TOOL: &str = "tool";
pub const RESPONDER: &str = "responder";

/// Provider that replays scripted replies per model, in order.
///
/// A model with no reply left answers with a non-transient API error.
#[derive(Default)]
pub struct ScriptedProvider {
    replies: Mutex<HashMap<String, VecDeque<Result<ChatResponse, AgentError>>>>,
    delays: HashMap<String, Duration>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, model: &str, content: &str) -> Self {
        self.push(
            model,
            Ok(ChatResponse {
                content: content.to_string(),
                ..ChatResponse::default()
            }),
        )
    }

    pub fn tool_call(self, model: &str, tool: &str, arguments: Value) -> Self {
        self.push(
            model,
            Ok(ChatResponse {
                tool_calls: vec![ToolCall {
                    id: "call_1".to_string(),
                    name: tool.to_string(),
                    arguments: arguments.to_string(),
                }],
                finish_reason: Some("tool_calls".to_string()),
                ..ChatResponse::default()
            }),
        )
    }

    pub fn fail(self, model: &str, error: AgentError) -> Self {
        self.push(model, Err(error))
    }

    pub fn delay(mut self, model: &str, delay: Duration) -> Self {
        self.delays.insert(model.to_string(), delay);
        self
    }

    fn push(self, model: &str, reply: Result<ChatResponse, AgentError>) -> Self {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(model.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    /// Requests received so far for `model`.
    pub fn requests_for(&self, model: &str) -> Vec<ChatRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|r| r.model == model)
            .cloned()
            .collect()
    }

    pub fn call_count(&self) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, AgentError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());
        if let Some(delay) = self.delays.get(&request.model) {
            tokio::time::sleep(*delay).await;
        }
        let next = self
            .replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(&request.model)
            .and_then(VecDeque::pop_front);
        next.unwrap_or_else(|| {
            Err(AgentError::ApiRequest {
                message: format!("no scripted reply for {}", request.model),
                status: Some(400),
            })
        })
    }
}

/// Order-status tool that records every call it receives.
#[derive(Default)]
pub struct CountingOrderTool {
    pub calls: AtomicUsize,
    pub last_args: Mutex<Option<ToolArguments>>,
}

impl CountingOrderTool {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Tool for CountingOrderTool {
    fn name(&self) -> &'static str {
        "get_order_status"
    }

    fn description(&self) -> &'static str {
        "Get the status of an order by order ID"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "order_id": { "type": "string" } },
            "required": ["order_id"],
            "additionalProperties": false
        })
    }

    async fn call(&self, args: ToolArguments) -> Result<Value, ToolExecutionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let order_id = args.get("order_id").cloned().unwrap_or(Value::Null);
        *self
            .last_args
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(args);
        Ok(json!({ "order_id": order_id, "status": "shipped" }))
    }
}

/// Order-status tool whose lookup indexes past the end of an empty list.
pub struct BrokenOrderTool;

#[async_trait]
impl Tool for BrokenOrderTool {
    fn name(&self) -> &'static str {
        "get_order_status"
    }

    fn description(&self) -> &'static str {
        "Get the status of an order by order ID"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "order_id": { "type": "string" } },
            "required": ["order_id"]
        })
    }

    #[allow(clippy::indexing_slicing)]
    async fn call(&self, _args: ToolArguments) -> Result<Value, ToolExecutionError> {
        let rows: Vec<Value> = Vec::new();
        Ok(rows[3].clone())
    }
}

/// Embedder whose provider is always down.
pub struct DownEmbedder;

#[async_trait]
impl Embedder for DownEmbedder {
    fn name(&self) -> &'static str {
        "down"
    }

    fn dimensions(&self) -> usize {
        supportflow_rs::embedding::DEFAULT_HASH_DIMENSIONS
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, RetrievalError> {
        Err(RetrievalError::ProviderUnavailable {
            provider: "down".to_string(),
            message: "connection refused".to_string(),
        })
    }
}

pub fn config() -> AgentConfig {
    AgentConfig::builder()
        .api_key("test-key")
        .router_model(ROUTER)
        .rag_model(RAG)
        .tool_model(TOOL)
        .responder_model(RESPONDER)
        .llm_timeout(Duration::from_secs(30))
        .build()
        .unwrap()
}

/// Sample knowledge base indexed with the hash embedder.
pub async fn sample_kb() -> KnowledgeBase {
    KnowledgeBase::build(sample_corpus(), &HashEmbedder::default())
        .await
        .unwrap()
}

pub async fn retriever() -> HybridRetriever {
    HybridRetriever::new(
        Arc::new(HashEmbedder::default()),
        sample_kb().await,
        SearchConfig::new(),
    )
}

pub fn registry_with(tool: Arc<CountingOrderTool>) -> Arc<ToolRegistry> {
    registry_of(tool)
}

pub fn registry_of(tool: Arc<dyn Tool>) -> Arc<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    registry.register(tool).unwrap();
    Arc::new(registry)
}

pub fn orchestrator(
    provider: Arc<ScriptedProvider>,
    retriever: HybridRetriever,
    registry: Arc<ToolRegistry>,
) -> Orchestrator {
    Orchestrator::with_prompts(
        provider,
        &config(),
        PromptSet::defaults(),
        retriever,
        registry,
    )
}
