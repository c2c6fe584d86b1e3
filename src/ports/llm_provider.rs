//! LLM Provider Port - Interface for LLM provider integrations.
//!
//! This port abstracts all interactions with LLM vendors, letting the agent
//! layer request completions and tool calls without coupling to a specific
//! wire protocol. Three incompatible protocols hide behind it: the
//! chat-completions style, the message-API style, and the
//! generate-content style.
//!
//! # Design
//!
//! - Supports both blocking and streaming completions
//! - Provider-agnostic message and tool-definition format
//! - Tool-call ids are vendor-assigned and echoed verbatim in results
//! - Streamed tool-call arguments arrive as ordered fragments that
//!   concatenate into valid JSON
//! - Usage is reported only when the vendor supplies it

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Boxed chunk stream returned by [`LlmProvider::stream`].
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<LlmStreamChunk, LlmError>> + Send>>;

/// Port for LLM vendor interactions.
///
/// Implementations translate between the neutral call model and one
/// vendor's wire protocol. Adapters never retry; any vendor failure
/// propagates unmodified as [`LlmError::Provider`].
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Generate a single completion (non-streaming).
    async fn call(
        &self,
        options: CallOptions,
        cancel: CancellationToken,
    ) -> Result<LlmResponse, LlmError>;

    /// Generate a streaming completion.
    ///
    /// The stream ends with [`LlmStreamChunk::Done`]. For every tool call
    /// the stream carries exactly one `ToolCallStart`, zero or more
    /// `ToolCallDelta`s whose fragments concatenate in arrival order into
    /// valid JSON, then exactly one `ToolCallEnd`, all before `Done`.
    async fn stream(
        &self,
        options: CallOptions,
        cancel: CancellationToken,
    ) -> Result<ChunkStream, LlmError>;

    /// Provider name for routing tables and logs (e.g. "openai").
    fn name(&self) -> &'static str;
}

/// Options for one LLM call.
#[derive(Debug, Clone)]
pub struct CallOptions {
    /// Model identifier, used by the client for routing.
    pub model: String,
    /// Conversation messages (system prompt + history + user message).
    pub messages: Vec<LlmMessage>,
    /// Tools the model may request on this call.
    pub tools: Vec<LlmToolDefinition>,
    /// Maximum tokens to generate.
    pub max_tokens: Option<u32>,
    /// Temperature for response randomness.
    pub temperature: Option<f32>,
}

impl CallOptions {
    /// Creates options for the given model with no messages or tools.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            messages: Vec::new(),
            tools: Vec::new(),
            max_tokens: None,
            temperature: None,
        }
    }

    /// Adds a message.
    pub fn with_message(mut self, message: LlmMessage) -> Self {
        self.messages.push(message);
        self
    }

    /// Replaces the message list.
    pub fn with_messages(mut self, messages: Vec<LlmMessage>) -> Self {
        self.messages = messages;
        self
    }

    /// Replaces the tool list.
    pub fn with_tools(mut self, tools: Vec<LlmToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    /// Sets the maximum tokens to generate.
    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    /// Sets the temperature.
    pub fn with_temperature(mut self, temp: f32) -> Self {
        self.temperature = Some(temp);
        self
    }
}

/// A message in the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmMessage {
    /// Who sent this message.
    pub role: MessageRole,
    /// Message content.
    pub content: String,
    /// For Tool-role messages: the id of the call this message answers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl LlmMessage {
    /// Creates a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
            tool_call_id: None,
        }
    }

    /// Creates a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
            tool_call_id: None,
        }
    }

    /// Creates an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
            tool_call_id: None,
        }
    }

    /// Creates a tool-result message answering the given call id.
    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Tool,
            content: content.into(),
            tool_call_id: Some(call_id.into()),
        }
    }
}

/// Role of the message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System instructions (guides model behavior).
    System,
    /// User input.
    User,
    /// Assistant (model) response.
    Assistant,
    /// Result of a tool the model requested.
    Tool,
}

/// Definition of a tool exposed to the model.
///
/// Immutable once registered. `parameters` is a JSON-schema-like object
/// that adapters map to the vendor's function/tool schema shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmToolDefinition {
    /// Unique tool name (e.g. "send_invoice_reminder").
    pub name: String,
    /// Human-readable description for the model.
    pub description: String,
    /// JSON Schema for the arguments.
    pub parameters: serde_json::Value,
}

impl LlmToolDefinition {
    /// Creates a new tool definition.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// A tool call requested by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmToolCall {
    /// Vendor-assigned call id, echoed verbatim in the result message.
    pub id: String,
    /// Name of the requested tool.
    pub name: String,
    /// Raw JSON text of the arguments.
    pub arguments: String,
}

impl LlmToolCall {
    /// Creates a new tool call.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    /// Parses the argument text as JSON.
    pub fn parsed_arguments(&self) -> Result<serde_json::Value, LlmError> {
        serde_json::from_str(&self.arguments)
            .map_err(|e| LlmError::parse(format!("tool call '{}' arguments: {}", self.name, e)))
    }
}

/// Response from one LLM call.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    /// Generated text content, if any.
    pub content: Option<String>,
    /// Tool calls the model requested, in request order.
    pub tool_calls: Vec<LlmToolCall>,
    /// Why the model stopped generating.
    pub finish_reason: FinishReason,
    /// Token usage, if the vendor reported it.
    pub usage: Option<TokenUsage>,
}

impl LlmResponse {
    /// Creates a plain text response.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: Vec::new(),
            finish_reason: FinishReason::Stop,
            usage: None,
        }
    }

    /// Creates a tool-call response.
    pub fn tool_calls(calls: Vec<LlmToolCall>) -> Self {
        Self {
            content: None,
            tool_calls: calls,
            finish_reason: FinishReason::ToolCalls,
            usage: None,
        }
    }

    /// Attaches usage information.
    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }
}

/// Reason the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Natural stop (end of response).
    Stop,
    /// The model requested one or more tool calls.
    ToolCalls,
}

/// Token usage reported by the vendor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens in the prompt.
    pub prompt_tokens: u32,
    /// Tokens in the completion.
    pub completion_tokens: u32,
    /// Total tokens (prompt + completion).
    pub total_tokens: u32,
}

impl TokenUsage {
    /// Creates new token usage.
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// One chunk of a streaming completion.
///
/// # Invariant
///
/// For a given call id the stream carries exactly one `ToolCallStart`,
/// zero or more `ToolCallDelta`s whose fragments concatenate in arrival
/// order into valid JSON, then exactly one `ToolCallEnd`, all before
/// `Done`.
#[derive(Debug, Clone, PartialEq)]
pub enum LlmStreamChunk {
    /// A fragment of generated text.
    Text(String),
    /// A tool call began.
    ToolCallStart {
        /// Vendor-assigned call id.
        id: String,
        /// Name of the requested tool.
        name: String,
    },
    /// A fragment of a tool call's JSON arguments.
    ToolCallDelta {
        /// Call id this fragment belongs to.
        id: String,
        /// Argument text fragment.
        fragment: String,
    },
    /// A tool call's arguments are complete.
    ToolCallEnd {
        /// Call id that completed.
        id: String,
        /// Full concatenated argument JSON text.
        arguments: String,
    },
    /// The stream is complete.
    Done {
        /// Why generation stopped.
        finish_reason: FinishReason,
        /// Usage, if the vendor reported it.
        usage: Option<TokenUsage>,
    },
}

/// LLM call errors.
#[derive(Debug, Clone, Error)]
pub enum LlmError {
    /// Vendor-reported failure; code and message preserved verbatim.
    #[error("provider error {code}: {message}")]
    Provider {
        /// Vendor error code (HTTP status or vendor-specific code).
        code: String,
        /// Vendor error message, unmodified.
        message: String,
    },

    /// The client-side deadline elapsed.
    #[error("request timed out after {timeout_secs}s")]
    Timeout {
        /// Configured timeout.
        timeout_secs: u64,
    },

    /// No provider is registered for the requested model.
    #[error("no provider registered for model '{0}'")]
    UnknownModel(String),

    /// Network error during request.
    #[error("network error: {0}")]
    Network(String),

    /// Failed to parse the vendor response.
    #[error("parse error: {0}")]
    Parse(String),

    /// The caller cancelled the request.
    #[error("request cancelled")]
    Cancelled,
}

impl LlmError {
    /// Creates a provider error with the vendor's code and message.
    pub fn provider(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Creates a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    /// Creates a parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }
}
