//! Chat completions over any `OpenAI`-compatible endpoint via `async-openai`.
//!
//! The base URL override in [`AgentConfig`] points the client at Azure,
//! a local gateway or a self-hosted model server.

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    ChatCompletionTool, ChatCompletionToolArgs, ChatCompletionToolType,
    CreateChatCompletionRequest, CreateChatCompletionRequestArgs, CreateChatCompletionResponse,
    FunctionObjectArgs, ResponseFormat,
};
use async_trait::async_trait;
use tracing::trace;

use crate::agent::config::AgentConfig;
use crate::agent::message::{ChatMessage, ChatRequest, ChatResponse, Role, TokenUsage};
use crate::agent::provider::LlmProvider;
use crate::agent::tool::{ToolCall, ToolDefinition};
use crate::error::AgentError;

/// Client for the configured key and base URL.
pub(crate) fn openai_client(config: &AgentConfig) -> Client<OpenAIConfig> {
    let mut settings = OpenAIConfig::new().with_api_key(&config.api_key);
    if let Some(base_url) = &config.base_url {
        settings = settings.with_api_base(base_url);
    }
    Client::with_config(settings)
}

/// Maps an SDK error onto [`AgentError::ApiRequest`].
///
/// The SDK only exposes an HTTP status on transport errors. Request
/// errors reported by the API and local argument errors are tagged 400
/// so they are not retried; everything else has no status and counts as
/// transient.
pub(crate) fn map_openai_error(err: OpenAIError) -> AgentError {
    let status = match &err {
        OpenAIError::Reqwest(e) => e.status().map(|s| s.as_u16()),
        OpenAIError::ApiError(api) if api.r#type.as_deref() == Some("invalid_request_error") => {
            Some(400)
        }
        OpenAIError::InvalidArgument(_) => Some(400),
        _ => None,
    };
    AgentError::ApiRequest {
        message: err.to_string(),
        status,
    }
}

/// Converts one message to the wire type.
///
/// Tool-role history has no originating call id in a support transcript,
/// so it is replayed as assistant text.
fn wire_message(msg: &ChatMessage) -> Result<ChatCompletionRequestMessage, OpenAIError> {
    let content = msg.content.clone();
    Ok(match msg.role {
        Role::System => ChatCompletionRequestSystemMessageArgs::default()
            .content(content)
            .build()?
            .into(),
        Role::User => ChatCompletionRequestUserMessageArgs::default()
            .content(content)
            .build()?
            .into(),
        Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
            .content(content)
            .build()?
            .into(),
        Role::Tool => ChatCompletionRequestAssistantMessageArgs::default()
            .content(format!("Tool result: {content}"))
            .build()?
            .into(),
    })
}

fn wire_tool(def: &ToolDefinition) -> Result<ChatCompletionTool, OpenAIError> {
    ChatCompletionToolArgs::default()
        .r#type(ChatCompletionToolType::Function)
        .function(
            FunctionObjectArgs::default()
                .name(def.name.clone())
                .description(def.description.clone())
                .parameters(def.parameters.clone())
                .build()?,
        )
        .build()
}

/// Builds the wire request.
fn wire_request(request: &ChatRequest) -> Result<CreateChatCompletionRequest, OpenAIError> {
    let messages = request
        .messages
        .iter()
        .map(wire_message)
        .collect::<Result<Vec<_>, _>>()?;

    let mut args = CreateChatCompletionRequestArgs::default();
    args.model(request.model.clone()).messages(messages);
    if let Some(temperature) = request.temperature {
        args.temperature(temperature);
    }
    if let Some(max_tokens) = request.max_tokens {
        args.max_completion_tokens(max_tokens);
    }
    if request.json_mode {
        args.response_format(ResponseFormat::JsonObject);
    }
    if request.offers_tools() {
        let tools = request
            .tools
            .iter()
            .map(wire_tool)
            .collect::<Result<Vec<_>, _>>()?;
        args.tools(tools);
    }
    args.build()
}

/// Reads the first choice of a completion.
fn from_wire(response: CreateChatCompletionResponse) -> ChatResponse {
    let usage = response.usage.map_or_else(TokenUsage::default, |u| TokenUsage {
        prompt_tokens: u.prompt_tokens,
        completion_tokens: u.completion_tokens,
        total_tokens: u.total_tokens,
    });

    let Some(choice) = response.choices.into_iter().next() else {
        return ChatResponse {
            usage,
            ..ChatResponse::default()
        };
    };

    // Serialized form gives the API's own spelling ("tool_calls", "stop").
    let finish_reason = choice
        .finish_reason
        .and_then(|reason| serde_json::to_value(reason).ok())
        .and_then(|value| value.as_str().map(str::to_string));

    let tool_calls = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|call| ToolCall {
            id: call.id,
            name: call.function.name,
            arguments: call.function.arguments,
        })
        .collect();

    ChatResponse {
        content: choice.message.content.unwrap_or_default(),
        usage,
        tool_calls,
        finish_reason,
    }
}

/// `OpenAI`-compatible chat provider.
pub struct OpenAiProvider {
    client: Client<OpenAIConfig>,
}

impl OpenAiProvider {
    /// Creates a provider from agent configuration.
    #[must_use]
    pub fn new(config: &AgentConfig) -> Self {
        Self {
            client: openai_client(config),
        }
    }
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider").finish_non_exhaustive()
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, AgentError> {
        let wire = wire_request(request).map_err(map_openai_error)?;
        trace!(model = %request.model, messages = request.messages.len(), "Sending chat completion");

        let response = self
            .client
            .chat()
            .create(wire)
            .await
            .map_err(map_openai_error)?;
        Ok(from_wire(response))
    }
}
