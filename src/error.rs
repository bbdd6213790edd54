//! Error types for supportflow-rs.
//!
//! Each layer gets its own error enum so nodes can return typed
//! success-or-failure results that the orchestrator interprets:
//!
//! - [`AgentError`]: language-generation, configuration and control faults
//! - [`RetrievalError`]: embedding provider and index failures
//! - [`ToolError`]: tool argument validation and execution failures
//! - [`CommandError`]: CLI-level failures

use serde::Serialize;
use thiserror::Error;

/// Crate-level result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type.
#[derive(Error, Debug)]
pub enum Error {
    /// Agent or orchestration failure.
    #[error(transparent)]
    Agent(#[from] AgentError),

    /// Retrieval failure.
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),

    /// Tool failure.
    #[error(transparent)]
    Tool(#[from] ToolError),

    /// CLI command failure.
    #[error(transparent)]
    Command(#[from] CommandError),

    /// I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised by agents, providers and the orchestration state machine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AgentError {
    /// No API key was configured.
    #[error("API key missing: set OPENAI_API_KEY or SUPPORTFLOW_API_KEY")]
    ApiKeyMissing,

    /// Unknown provider name.
    #[error("unsupported provider: {name}")]
    UnsupportedProvider {
        /// Provider name that was requested.
        name: String,
    },

    /// Invalid configuration value.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the problem.
        message: String,
    },

    /// The provider call failed.
    #[error("API request failed: {message}")]
    ApiRequest {
        /// Provider error message.
        message: String,
        /// HTTP status, when known.
        status: Option<u16>,
    },

    /// A bounded external call exceeded its deadline.
    #[error("{operation} timed out after {timeout_ms} ms")]
    Timeout {
        /// What was being awaited.
        operation: String,
        /// The deadline that elapsed.
        timeout_ms: u64,
    },

    /// The provider returned output that could not be parsed.
    #[error("failed to parse response: {message}")]
    ResponseParse {
        /// Parse failure description.
        message: String,
        /// Raw response content.
        content: String,
    },

    /// The provider returned an empty generation.
    #[error("{agent} agent received an empty response")]
    EmptyResponse {
        /// Agent that issued the call.
        agent: String,
    },

    /// A state transition the orchestration graph does not allow.
    ///
    /// This is a control-logic invariant violation and the only error
    /// that escapes a turn besides cancellation.
    #[error("invalid state transition from {from} on {event}")]
    InvalidTransition {
        /// Stage the machine was in.
        from: String,
        /// Event that was applied.
        event: String,
    },

    /// The caller cancelled the turn.
    #[error("turn cancelled")]
    Cancelled,
}

impl AgentError {
    /// Returns `true` for failures worth one internal retry.
    ///
    /// Provider transport failures, timeouts and empty generations are
    /// transient; parse and configuration errors are not.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::ApiRequest { status, .. } => match status {
                Some(code) => *code == 408 || *code == 429 || *code >= 500,
                None => true,
            },
            Self::Timeout { .. } | Self::EmptyResponse { .. } => true,
            _ => false,
        }
    }
}

/// Errors raised by the dense or sparse retrieval paths.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RetrievalError {
    /// The embedding provider could not be reached or failed.
    #[error("embedding provider {provider} unavailable: {message}")]
    ProviderUnavailable {
        /// Embedder name.
        provider: String,
        /// Failure description.
        message: String,
    },

    /// A vector, sparse or document index failed.
    #[error("{index} index unavailable: {message}")]
    IndexUnavailable {
        /// Index name.
        index: String,
        /// Failure description.
        message: String,
    },

    /// A retrieval path exceeded its deadline.
    #[error("{path} retrieval timed out after {timeout_ms} ms")]
    Timeout {
        /// Retrieval path (`dense` or `sparse`).
        path: String,
        /// The deadline that elapsed.
        timeout_ms: u64,
    },

    /// The corpus could not be loaded or is malformed.
    #[error("corpus error: {message}")]
    Corpus {
        /// Failure description.
        message: String,
    },
}

/// Argument validation failures. The tool callable is never invoked
/// when one of these is produced.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToolValidationError {
    /// The generator selected no tool.
    #[error("no tool selected: {message}")]
    NoToolSelected {
        /// Why nothing could be selected.
        message: String,
    },

    /// The selected tool is not registered.
    #[error("unknown tool: {tool}")]
    UnknownTool {
        /// Requested tool name.
        tool: String,
    },

    /// A required argument is absent.
    #[error("{tool}: missing required argument '{argument}'")]
    MissingArgument {
        /// Tool name.
        tool: String,
        /// Argument name.
        argument: String,
    },

    /// An argument has the wrong JSON type.
    #[error("{tool}: argument '{argument}' expected {expected}, found {found}")]
    TypeMismatch {
        /// Tool name.
        tool: String,
        /// Argument name.
        argument: String,
        /// Declared JSON type.
        expected: String,
        /// Observed JSON type.
        found: String,
    },

    /// The argument payload is not a JSON object or is malformed.
    #[error("{tool}: invalid arguments: {message}")]
    InvalidArguments {
        /// Tool name.
        tool: String,
        /// Failure description.
        message: String,
    },
}

/// A failure while running a validated tool.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("{tool}: {message}")]
pub struct ToolExecutionError {
    /// Tool name.
    pub tool: String,
    /// Failure description.
    pub message: String,
    /// Whether the failure was a timeout.
    pub timed_out: bool,
}

/// Errors produced by the Tool Agent.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "stage", content = "error", rename_all = "snake_case")]
pub enum ToolError {
    /// Arguments were rejected before execution.
    #[error("tool validation failed: {0}")]
    Validation(#[from] ToolValidationError),

    /// The tool ran and failed.
    #[error("tool execution failed: {0}")]
    Execution(#[from] ToolExecutionError),
}

impl ToolError {
    /// Returns `true` if the tool was rejected before execution.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

/// Errors raised by CLI commands.
#[derive(Error, Debug)]
pub enum CommandError {
    /// Invalid command-line argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Input file could not be read or parsed.
    #[error("failed to load {path}: {message}")]
    Load {
        /// File path.
        path: String,
        /// Failure description.
        message: String,
    },

    /// Output could not be rendered.
    #[error("output error: {0}")]
    Output(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        let transport = AgentError::ApiRequest {
            message: "connection reset".to_string(),
            status: None,
        };
        assert!(transport.is_transient());

        let throttled = AgentError::ApiRequest {
            message: "slow down".to_string(),
            status: Some(429),
        };
        assert!(throttled.is_transient());

        let bad_request = AgentError::ApiRequest {
            message: "bad".to_string(),
            status: Some(400),
        };
        assert!(!bad_request.is_transient());

        let timeout = AgentError::Timeout {
            operation: "rag generation".to_string(),
            timeout_ms: 100,
        };
        assert!(timeout.is_transient());
        assert!(!AgentError::Cancelled.is_transient());
        assert!(!AgentError::ApiKeyMissing.is_transient());
    }

    #[test]
    fn test_tool_error_serialization() {
        let err = ToolError::Validation(ToolValidationError::MissingArgument {
            tool: "get_order_status".to_string(),
            argument: "order_id".to_string(),
        });
        let json = serde_json::to_string(&err).unwrap_or_default();
        assert!(json.contains("\"stage\":\"validation\""));
        assert!(json.contains("\"kind\":\"missing_argument\""));
        assert!(json.contains("order_id"));
        assert!(err.is_validation());
    }

    #[test]
    fn test_error_display() {
        let err = ToolExecutionError {
            tool: "get_account_balance".to_string(),
            message: "ledger offline".to_string(),
            timed_out: false,
        };
        assert_eq!(err.to_string(), "get_account_balance: ledger offline");

        let err = AgentError::InvalidTransition {
            from: "done".to_string(),
            event: "routed".to_string(),
        };
        assert!(err.to_string().contains("done"));
    }
}
