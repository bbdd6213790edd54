//! Tool agent: one validated tool call per action turn.
//!
//! The model selects a tool through native function calling, or, when the
//! provider answers in text, through a JSON object
//! `{"tool": ..., "arguments": {...}}`. The selection is untrusted: it is
//! size-capped, parsed and validated against the tool's schema before the
//! callable runs. Tool failures never escape; they become a
//! "couldn't complete that action" answer.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use super::config::AgentConfig;
use super::message::TokenUsage;
use super::prompt::build_tool_summary_prompt;
use super::provider::LlmProvider;
use super::tool::{ToolDefinition, ToolInvocation, ToolRegistry};
use super::traits::{Agent, CallPolicy, generate, strip_code_fence};
use crate::core::ConversationTurn;
use crate::error::{AgentError, ToolError, ToolValidationError};

/// Largest argument payload accepted from the model, in bytes.
const MAX_ARGUMENT_BYTES: usize = 16 * 1024;

/// Opening of every answer for a failed action.
pub const ACTION_FAILED_ANSWER: &str = "I'm sorry, I couldn't complete that action.";

/// The tool and arguments the model asked for.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSelection {
    /// Requested tool name.
    pub tool: String,
    /// Requested arguments (validated later against the schema).
    pub arguments: Value,
}

/// Outcome of the tool branch.
#[derive(Debug, Clone)]
pub struct ToolRun {
    /// The single invocation, successful or not.
    pub invocation: ToolInvocation,
    /// User-facing answer.
    pub answer: String,
    /// Tokens spent on selection and phrasing.
    pub usage: TokenUsage,
}

/// Agent that performs actions with registered tools.
pub struct ToolAgent {
    model: String,
    max_tokens: u32,
    system_prompt: String,
    history_window: usize,
    policy: CallPolicy,
    tool_timeout: std::time::Duration,
    summary_via_llm: bool,
    registry: Arc<ToolRegistry>,
}

impl ToolAgent {
    /// Creates a tool agent over `registry`.
    #[must_use]
    pub fn new(config: &AgentConfig, system_prompt: String, registry: Arc<ToolRegistry>) -> Self {
        Self {
            model: config.tool_model.clone(),
            max_tokens: config.tool_max_tokens,
            system_prompt,
            history_window: config.history_window,
            policy: CallPolicy::new(config.llm_timeout, config.max_retries),
            tool_timeout: config.tool_timeout,
            summary_via_llm: config.tool_summary_via_llm,
            registry,
        }
    }

    /// The tool registry.
    #[must_use]
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Selects, validates and runs one tool, then phrases the outcome.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError`] only when tool selection itself cannot be
    /// generated after the internal retry. Validation and execution
    /// failures are reported in the returned [`ToolRun`].
    pub async fn run(
        &self,
        provider: &dyn LlmProvider,
        turn: &ConversationTurn,
    ) -> Result<ToolRun, AgentError> {
        let history = turn.recent_history(self.history_window);
        let response = self.execute(provider, history, turn.query(), self.policy).await?;
        let mut usage = response.usage;

        let selection = if response.tool_calls.is_empty() {
            parse_text_selection(&response.content)
        } else {
            if response.tool_calls.len() > 1 {
                warn!(
                    requested = response.tool_calls.len(),
                    "Model requested several tools, using the first"
                );
            }
            let call = &response.tool_calls[0];
            parse_arguments(&call.name, &call.arguments).map(|arguments| ToolSelection {
                tool: call.name.clone(),
                arguments,
            })
        };

        let invocation = match selection {
            Ok(selection) => {
                debug!(tool = %selection.tool, "Tool selected");
                self.registry
                    .invoke(&selection.tool, selection.arguments, self.tool_timeout)
                    .await
            }
            Err(e) => {
                warn!(error = %e, "Tool selection rejected");
                let tool = match &e {
                    ToolValidationError::UnknownTool { tool }
                    | ToolValidationError::InvalidArguments { tool, .. } => tool.clone(),
                    _ => String::new(),
                };
                ToolInvocation::rejected(tool, Value::Null, e)
            }
        };

        info!(
            tool = %invocation.tool_name,
            success = invocation.success,
            duration_ms = invocation.duration_ms,
            "Tool invocation complete"
        );

        let answer = if invocation.success {
            match self.phrase(provider, turn, &invocation).await {
                Some((text, phrase_usage)) => {
                    usage.accumulate(phrase_usage);
                    text
                }
                None => summarize_success(&invocation),
            }
        } else {
            summarize_failure(&invocation)
        };

        Ok(ToolRun {
            invocation,
            answer,
            usage,
        })
    }

    /// Asks the model to phrase a successful result. `None` means use the
    /// deterministic summary.
    async fn phrase(
        &self,
        provider: &dyn LlmProvider,
        turn: &ConversationTurn,
        invocation: &ToolInvocation,
    ) -> Option<(String, TokenUsage)> {
        if !self.summary_via_llm {
            return None;
        }
        let outcome = invocation.result.clone().unwrap_or(Value::Null);
        let user_msg = build_tool_summary_prompt(turn.query(), &invocation.tool_name, &outcome);
        let mut request = self.request(&[], &user_msg);
        request.tools.clear();

        match generate(self.name(), provider, &request, self.policy).await {
            Ok(response) => Some((response.content.trim().to_string(), response.usage)),
            Err(e) => {
                warn!(error = %e, "Result phrasing failed, using plain summary");
                None
            }
        }
    }
}

impl std::fmt::Debug for ToolAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolAgent")
            .field("model", &self.model)
            .field("policy", &self.policy)
            .field("tool_timeout", &self.tool_timeout)
            .field("summary_via_llm", &self.summary_via_llm)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Agent for ToolAgent {
    fn name(&self) -> &'static str {
        "tool"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    fn max_tokens(&self) -> u32 {
        self.max_tokens
    }

    fn tools(&self) -> Vec<ToolDefinition> {
        self.registry.definitions()
    }
}

/// Parses a native tool call's JSON argument string.
fn parse_arguments(tool: &str, raw: &str) -> Result<Value, ToolValidationError> {
    if raw.len() > MAX_ARGUMENT_BYTES {
        return Err(ToolValidationError::InvalidArguments {
            tool: tool.to_string(),
            message: format!("arguments exceed {MAX_ARGUMENT_BYTES} bytes"),
        });
    }
    if raw.trim().is_empty() {
        return Ok(Value::Object(Map::new()));
    }
    serde_json::from_str(raw).map_err(|e| ToolValidationError::InvalidArguments {
        tool: tool.to_string(),
        message: format!("arguments are not valid JSON: {e}"),
    })
}

/// Parses a text-mode selection.
///
/// Accepts `{"tool", "arguments"}` and the planner shape
/// `{"tool_calls": [{"tool", "parameters"}]}`; only the first call is used.
fn parse_text_selection(content: &str) -> Result<ToolSelection, ToolValidationError> {
    let body = strip_code_fence(content);
    if body.len() > MAX_ARGUMENT_BYTES {
        return Err(ToolValidationError::NoToolSelected {
            message: format!("selection exceeds {MAX_ARGUMENT_BYTES} bytes"),
        });
    }
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return Err(ToolValidationError::NoToolSelected {
            message: "model did not select a tool".to_string(),
        });
    };

    let call = match value.get("tool_calls").and_then(Value::as_array) {
        Some(calls) => {
            if calls.len() > 1 {
                warn!(requested = calls.len(), "Model planned several tools, using the first");
            }
            calls.first().cloned().unwrap_or(Value::Null)
        }
        None => value,
    };

    let tool = ["tool", "name"]
        .iter()
        .find_map(|k| call.get(*k).and_then(Value::as_str))
        .map(str::trim)
        .filter(|t| !t.is_empty());
    let Some(tool) = tool else {
        return Err(ToolValidationError::NoToolSelected {
            message: "no tool named in model output".to_string(),
        });
    };
    let arguments = ["arguments", "parameters"]
        .iter()
        .find_map(|k| call.get(*k).cloned())
        .unwrap_or_else(|| Value::Object(Map::new()));

    Ok(ToolSelection {
        tool: tool.to_string(),
        arguments,
    })
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "none".to_string(),
        other => other.to_string(),
    }
}

/// Plain-text summary of a successful invocation.
#[must_use]
pub fn summarize_success(invocation: &ToolInvocation) -> String {
    let action = invocation.tool_name.replace('_', " ");
    let details = match &invocation.result {
        Some(Value::Object(fields)) => fields
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| format!("{}: {}", k.replace('_', " "), display_value(v)))
            .collect::<Vec<_>>()
            .join("; "),
        Some(other) => display_value(other),
        None => String::new(),
    };
    if details.is_empty() {
        format!("Done: {action} completed.")
    } else {
        format!("Done: {action} completed. {details}.")
    }
}

/// User-facing answer for a failed or rejected invocation.
#[must_use]
pub fn summarize_failure(invocation: &ToolInvocation) -> String {
    let hint = match &invocation.error {
        Some(ToolError::Validation(ToolValidationError::MissingArgument { argument, .. })) => {
            format!("I need the {} to do that.", argument.replace('_', " "))
        }
        Some(ToolError::Validation(ToolValidationError::NoToolSelected { .. })) => {
            "I'm not able to perform that kind of request.".to_string()
        }
        Some(ToolError::Execution(e)) if e.timed_out => {
            "The service took too long to respond. Please try again shortly.".to_string()
        }
        _ => "Please check the details and try again.".to_string(),
    };
    format!("{ACTION_FAILED_ANSWER} {hint}")
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;
    use crate::agent::message::{ChatRequest, ChatResponse};
    use crate::agent::support_tools::support_registry;
    use crate::agent::tool::ToolCall;

    /// Answers the selection call from `selection` and the phrasing call
    /// from `phrasing`.
    struct TwoStep {
        selection: ChatResponse,
        phrasing: Result<ChatResponse, AgentError>,
        calls: AtomicUsize,
        offered_tools: Mutex<Vec<usize>>,
    }

    impl TwoStep {
        fn new(selection: ChatResponse, phrasing: Result<ChatResponse, AgentError>) -> Self {
            Self {
                selection,
                phrasing,
                calls: AtomicUsize::new(0),
                offered_tools: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LlmProvider for TwoStep {
        fn name(&self) -> &'static str {
            "two-step"
        }
        async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, AgentError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.offered_tools
                .lock()
                .unwrap_or_else(|_| panic!("poisoned"))
                .push(request.tools.len());
            if request.tools.is_empty() {
                self.phrasing.clone()
            } else {
                Ok(self.selection.clone())
            }
        }
    }

    fn native(name: &str, arguments: &str) -> ChatResponse {
        ChatResponse {
            tool_calls: vec![ToolCall {
                id: "call_1".to_string(),
                name: name.to_string(),
                arguments: arguments.to_string(),
            }],
            finish_reason: Some("tool_calls".to_string()),
            ..ChatResponse::default()
        }
    }

    fn text(content: &str) -> ChatResponse {
        ChatResponse {
            content: content.to_string(),
            ..ChatResponse::default()
        }
    }

    fn agent(summary_via_llm: bool) -> ToolAgent {
        let config = AgentConfig::builder()
            .api_key("test")
            .tool_summary_via_llm(summary_via_llm)
            .build()
            .unwrap_or_else(|_| unreachable!());
        let registry = support_registry().unwrap_or_else(|_| unreachable!());
        ToolAgent::new(&config, "use tools".to_string(), Arc::new(registry))
    }

    #[tokio::test]
    async fn test_native_call_phrased_by_model() {
        let provider = TwoStep::new(
            native("get_order_status", r#"{"order_id":"12345"}"#),
            Ok(text("Your order 12345 is on its way.")),
        );
        let run = agent(true)
            .run(&provider, &ConversationTurn::new("c", "Check order 12345"))
            .await
            .unwrap_or_else(|e| panic!("run failed: {e}"));
        assert!(run.invocation.success);
        assert_eq!(run.invocation.arguments, json!({"order_id": "12345"}));
        assert_eq!(run.answer, "Your order 12345 is on its way.");
        let offered = provider.offered_tools.lock().map(|v| v.clone()).unwrap_or_default();
        assert_eq!(offered, vec![4, 0]);
    }

    #[tokio::test]
    async fn test_phrasing_failure_falls_back() {
        let provider = TwoStep::new(
            native("get_order_status", r#"{"order_id":"12345"}"#),
            Err(AgentError::ApiRequest {
                message: "down".to_string(),
                status: Some(500),
            }),
        );
        let run = agent(true)
            .run(&provider, &ConversationTurn::new("c", "Check order 12345"))
            .await
            .unwrap_or_else(|e| panic!("run failed: {e}"));
        assert!(run.invocation.success);
        assert!(run.answer.starts_with("Done: get order status completed."));
        assert!(run.answer.contains("order id: 12345"));
    }

    #[tokio::test]
    async fn test_text_selection() {
        let provider = TwoStep::new(
            text("```json\n{\"tool\": \"get_account_balance\", \"arguments\": {\"user_id\": \"u1\"}}\n```"),
            Ok(text("unused")),
        );
        let run = agent(false)
            .run(&provider, &ConversationTurn::new("c", "balance for u1"))
            .await
            .unwrap_or_else(|e| panic!("run failed: {e}"));
        assert!(run.invocation.success);
        assert_eq!(run.invocation.tool_name, "get_account_balance");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_no_tool_selected_is_user_visible() {
        let provider = TwoStep::new(text("I can't help with that."), Ok(text("unused")));
        let run = agent(true)
            .run(&provider, &ConversationTurn::new("c", "bake me a cake"))
            .await
            .unwrap_or_else(|e| panic!("run failed: {e}"));
        assert!(!run.invocation.success);
        assert!(matches!(
            run.invocation.error,
            Some(ToolError::Validation(ToolValidationError::NoToolSelected { .. }))
        ));
        assert!(run.answer.starts_with(ACTION_FAILED_ANSWER));
    }

    #[tokio::test]
    async fn test_missing_argument_answer() {
        let provider = TwoStep::new(native("get_order_status", "{}"), Ok(text("unused")));
        let run = agent(true)
            .run(&provider, &ConversationTurn::new("c", "where is my order"))
            .await
            .unwrap_or_else(|e| panic!("run failed: {e}"));
        assert!(!run.invocation.success);
        assert!(run.answer.contains("I need the order id"));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_selection_failure_is_error() {
        struct Down;
        #[async_trait]
        impl LlmProvider for Down {
            fn name(&self) -> &'static str {
                "down"
            }
            async fn chat(&self, _request: &ChatRequest) -> Result<ChatResponse, AgentError> {
                Err(AgentError::ApiRequest {
                    message: "down".to_string(),
                    status: None,
                })
            }
        }
        let result = agent(true)
            .run(&Down, &ConversationTurn::new("c", "cancel sub_1"))
            .await;
        assert!(result.is_err());
    }

    #[test]
    fn test_oversized_arguments_rejected() {
        let raw = format!(r#"{{"order_id":"{}"}}"#, "9".repeat(MAX_ARGUMENT_BYTES));
        assert!(matches!(
            parse_arguments("get_order_status", &raw),
            Err(ToolValidationError::InvalidArguments { .. })
        ));
    }

    #[test]
    fn test_planner_shape_accepted() {
        let selection = parse_text_selection(
            r#"{"needs_tools": true, "tool_calls": [{"tool": "cancel_subscription", "parameters": {"subscription_id": "s1"}}, {"tool": "get_account_balance", "parameters": {}}], "reasoning": "x"}"#,
        )
        .unwrap_or_else(|e| panic!("rejected: {e}"));
        assert_eq!(selection.tool, "cancel_subscription");
        assert_eq!(selection.arguments, json!({"subscription_id": "s1"}));
    }

    #[test]
    fn test_null_tool_is_no_selection() {
        assert!(matches!(
            parse_text_selection(r#"{"tool": null, "arguments": {}}"#),
            Err(ToolValidationError::NoToolSelected { .. })
        ));
    }
}
