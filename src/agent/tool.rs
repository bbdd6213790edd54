//! Tool definitions, registry, argument validation and guarded execution.
//!
//! Tools are statically typed: each declares a JSON Schema generated with
//! `schemars` from its argument struct. Arguments produced by the model are
//! untrusted and are validated against that schema before the callable is
//! reached. Execution is bounded by a timeout and panics are caught, so a
//! misbehaving tool always surfaces as a [`ToolExecutionError`].
//! Catching a panic needs `panic = "unwind"`; every profile in the crate
//! manifest keeps it.

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::FutureExt;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::{AgentError, ToolError, ToolExecutionError, ToolValidationError};
use crate::search::duration_ms;

/// Validated tool arguments.
pub type ToolArguments = Map<String, Value>;

/// A tool definition that can be sent to an LLM for function-calling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name (must match a registry entry).
    pub name: String,
    /// Human-readable description of what the tool does.
    pub description: String,
    /// JSON Schema object describing the tool's parameters.
    pub parameters: Value,
}

/// A tool call requested by the LLM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique identifier for this call (assigned by the provider).
    pub id: String,
    /// Name of the tool to invoke.
    pub name: String,
    /// JSON-encoded arguments for the tool.
    pub arguments: String,
}

/// Generates the parameter schema for an argument struct.
///
/// Drops the `$schema` and `title` keys, which function-calling APIs do
/// not expect.
#[must_use]
pub fn schema_for_args<T: JsonSchema>() -> Value {
    let mut value = schemars::schema_for!(T).to_value();
    if let Some(obj) = value.as_object_mut() {
        obj.remove("$schema");
        obj.remove("title");
    }
    value
}

/// A callable registered at startup.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique tool name.
    fn name(&self) -> &'static str;

    /// What the tool does, shown to the model.
    fn description(&self) -> &'static str;

    /// JSON Schema of the arguments.
    fn parameters(&self) -> Value;

    /// Runs the tool on already-validated arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ToolExecutionError`] if the operation fails.
    async fn call(&self, args: ToolArguments) -> Result<Value, ToolExecutionError>;

    /// The definition advertised to the model.
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }
}

/// Deserializes validated arguments into a typed struct.
///
/// # Errors
///
/// Returns [`ToolExecutionError`] if the shape does not match.
pub fn parse_args<T: for<'de> Deserialize<'de>>(
    tool: &str,
    args: ToolArguments,
) -> Result<T, ToolExecutionError> {
    serde_json::from_value(Value::Object(args)).map_err(|e| ToolExecutionError {
        tool: tool.to_string(),
        message: format!("argument decoding failed: {e}"),
        timed_out: false,
    })
}

const fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn matches_type(value: &Value, ty: &str) -> bool {
    match ty {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        _ => true,
    }
}

/// Validates model-produced arguments against a tool's schema.
///
/// Checks that `args` is an object, that every `required` property is
/// present and non-null, and that each property with a declared `type`
/// (a string or an array of strings) has a matching JSON type. Properties
/// not in the schema are rejected when `additionalProperties` is `false`.
///
/// # Errors
///
/// Returns the first [`ToolValidationError`] found.
pub fn validate_arguments(
    tool: &str,
    schema: &Value,
    args: &Value,
) -> Result<ToolArguments, ToolValidationError> {
    let Some(obj) = args.as_object() else {
        return Err(ToolValidationError::InvalidArguments {
            tool: tool.to_string(),
            message: format!("expected a JSON object, found {}", json_type_name(args)),
        });
    };

    let empty = Map::new();
    let properties = schema
        .get("properties")
        .and_then(Value::as_object)
        .unwrap_or(&empty);

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for name in required.iter().filter_map(Value::as_str) {
            if obj.get(name).is_none_or(Value::is_null) {
                return Err(ToolValidationError::MissingArgument {
                    tool: tool.to_string(),
                    argument: name.to_string(),
                });
            }
        }
    }

    let closed = schema.get("additionalProperties") == Some(&Value::Bool(false));

    for (name, value) in obj {
        let Some(prop) = properties.get(name) else {
            if closed {
                return Err(ToolValidationError::InvalidArguments {
                    tool: tool.to_string(),
                    message: format!("unexpected argument '{name}'"),
                });
            }
            continue;
        };
        let allowed: Vec<&str> = match prop.get("type") {
            Some(Value::String(t)) => vec![t.as_str()],
            Some(Value::Array(ts)) => ts.iter().filter_map(Value::as_str).collect(),
            _ => continue,
        };
        if !allowed.is_empty() && !allowed.iter().any(|t| matches_type(value, t)) {
            return Err(ToolValidationError::TypeMismatch {
                tool: tool.to_string(),
                argument: name.clone(),
                expected: allowed.join(" | "),
                found: json_type_name(value).to_string(),
            });
        }
    }

    Ok(obj.clone())
}

/// The record of the single tool call made in an action turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolInvocation {
    /// Tool name as requested (may be unknown or empty).
    pub tool_name: String,
    /// Arguments as requested.
    pub arguments: Value,
    /// Result payload on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Structured error on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolError>,
    /// Whether the tool ran and succeeded.
    pub success: bool,
    /// Time spent in validation and execution.
    pub duration_ms: u64,
}

impl ToolInvocation {
    /// A call rejected before execution.
    #[must_use]
    pub fn rejected(tool_name: impl Into<String>, arguments: Value, error: ToolValidationError) -> Self {
        Self {
            tool_name: tool_name.into(),
            arguments,
            result: None,
            error: Some(ToolError::Validation(error)),
            success: false,
            duration_ms: 0,
        }
    }
}

/// Registered tools, keyed by name.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Config`] if the name is already taken.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), AgentError> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(AgentError::Config {
                message: format!("tool '{name}' registered twice"),
            });
        }
        self.tools.insert(name, tool);
        Ok(())
    }

    /// Looks up a tool by name.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    /// Definitions for every registered tool, sorted by name.
    #[must_use]
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.definition()).collect()
    }

    /// Number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Returns `true` if no tools are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Resolves, validates and runs one tool call.
    ///
    /// Never fails: every outcome, including unknown tools, invalid
    /// arguments, errors, timeouts and panics, is recorded in the returned
    /// [`ToolInvocation`].
    pub async fn invoke(&self, name: &str, arguments: Value, timeout: Duration) -> ToolInvocation {
        let started = Instant::now();

        let Some(tool) = self.lookup(name) else {
            warn!(tool = name, "Model selected an unknown tool");
            return ToolInvocation::rejected(
                name,
                arguments,
                ToolValidationError::UnknownTool {
                    tool: name.to_string(),
                },
            );
        };

        let args = match validate_arguments(name, &tool.parameters(), &arguments) {
            Ok(args) => args,
            Err(e) => {
                warn!(tool = name, error = %e, "Tool arguments rejected");
                let mut invocation = ToolInvocation::rejected(name, arguments, e);
                invocation.duration_ms = duration_ms(started.elapsed());
                return invocation;
            }
        };

        let call = AssertUnwindSafe(tool.call(args)).catch_unwind();
        let outcome = match tokio::time::timeout(timeout, call).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(e))) => Err(e),
            Ok(Err(_panic)) => Err(ToolExecutionError {
                tool: name.to_string(),
                message: "tool panicked".to_string(),
                timed_out: false,
            }),
            Err(_) => Err(ToolExecutionError {
                tool: name.to_string(),
                message: format!("timed out after {} ms", duration_ms(timeout)),
                timed_out: true,
            }),
        };
        let elapsed = duration_ms(started.elapsed());

        match outcome {
            Ok(value) => {
                debug!(tool = name, duration_ms = elapsed, "Tool succeeded");
                ToolInvocation {
                    tool_name: name.to_string(),
                    arguments,
                    result: Some(value),
                    error: None,
                    success: true,
                    duration_ms: elapsed,
                }
            }
            Err(e) => {
                warn!(tool = name, error = %e, duration_ms = elapsed, "Tool failed");
                ToolInvocation {
                    tool_name: name.to_string(),
                    arguments,
                    result: None,
                    error: Some(ToolError::Execution(e)),
                    success: false,
                    duration_ms: elapsed,
                }
            }
        }
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .finish()
    }
}
