//! Anthropic Provider - message-API wire protocol.
//!
//! The system prompt moves to the dedicated `system` field. Tool results
//! map to `user`-role messages holding a `tool_result` block keyed by
//! `tool_use_id`. Streamed tool input arrives as `input_json_delta`
//! fragments split across multiple events; fragments for one block
//! concatenate in arrival order into the call's argument JSON.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, Response};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::ports::{
    CallOptions, ChunkStream, FinishReason, LlmError, LlmMessage, LlmProvider, LlmResponse,
    LlmStreamChunk, LlmToolCall, MessageRole, TokenUsage,
};

use super::sse::SseParser;

/// Anthropic API version header value.
const ANTHROPIC_API_VERSION: &str = "2023-06-01";

/// Fallback when the caller sets no limit; the field is mandatory on this
/// wire protocol.
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Configuration for the Anthropic provider.
#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    /// API key for authentication.
    api_key: Secret<String>,
    /// Base URL for the API.
    pub base_url: String,
}

impl AnthropicConfig {
    /// Creates a new configuration with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Secret::new(api_key.into()),
            base_url: "https://api.anthropic.com".to_string(),
        }
    }

    /// Sets the base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    fn api_key(&self) -> &str {
        self.api_key.expose_secret()
    }
}

/// Anthropic message-API provider.
pub struct AnthropicProvider {
    config: AnthropicConfig,
    client: Client,
}

impl AnthropicProvider {
    /// Creates a new provider.
    pub fn new(config: AnthropicConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }

    fn messages_url(&self) -> String {
        format!("{}/v1/messages", self.config.base_url)
    }

    fn to_wire_request(options: &CallOptions, stream: bool) -> WireRequest {
        // The system message leaves the list and becomes the system field.
        let system = options
            .messages
            .iter()
            .find(|m| m.role == MessageRole::System)
            .map(|m| m.content.clone());

        let messages = options
            .messages
            .iter()
            .filter(|m| m.role != MessageRole::System)
            .map(to_wire_message)
            .collect();

        let tools: Vec<WireTool> = options
            .tools
            .iter()
            .map(|tool| WireTool {
                name: tool.name.clone(),
                description: tool.description.clone(),
                input_schema: tool.parameters.clone(),
            })
            .collect();

        WireRequest {
            model: options.model.clone(),
            system,
            messages,
            tools: if tools.is_empty() { None } else { Some(tools) },
            max_tokens: options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            temperature: options.temperature,
            stream: if stream { Some(true) } else { None },
        }
    }

    async fn send(
        &self,
        options: &CallOptions,
        stream: bool,
        cancel: &CancellationToken,
    ) -> Result<Response, LlmError> {
        let request = self
            .client
            .post(self.messages_url())
            .header("x-api-key", self.config.api_key())
            .header("anthropic-version", ANTHROPIC_API_VERSION)
            .json(&Self::to_wire_request(options, stream))
            .send();

        let response = tokio::select! {
            result = request => result.map_err(|e| LlmError::network(e.to_string()))?,
            _ = cancel.cancelled() => return Err(LlmError::Cancelled),
        };

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(LlmError::provider(status.as_u16().to_string(), body))
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    async fn call(
        &self,
        options: CallOptions,
        cancel: CancellationToken,
    ) -> Result<LlmResponse, LlmError> {
        let response = self.send(&options, false, &cancel).await?;
        let wire: WireResponse = response
            .json()
            .await
            .map_err(|e| LlmError::parse(e.to_string()))?;

        let mut content = String::new();
        let mut tool_calls = Vec::new();
        for block in wire.content {
            match block {
                WireContentBlock::Text { text } => content.push_str(&text),
                WireContentBlock::ToolUse { id, name, input } => {
                    tool_calls.push(LlmToolCall::new(id, name, input.to_string()));
                }
            }
        }

        let finish_reason = match wire.stop_reason.as_deref() {
            Some("tool_use") => FinishReason::ToolCalls,
            _ if !tool_calls.is_empty() => FinishReason::ToolCalls,
            _ => FinishReason::Stop,
        };

        Ok(LlmResponse {
            content: if content.is_empty() {
                None
            } else {
                Some(content)
            },
            tool_calls,
            finish_reason,
            usage: wire
                .usage
                .map(|u| TokenUsage::new(u.input_tokens, u.output_tokens)),
        })
    }

    async fn stream(
        &self,
        options: CallOptions,
        cancel: CancellationToken,
    ) -> Result<ChunkStream, LlmError> {
        let response = self.send(&options, true, &cancel).await?;
        let (tx, rx) = mpsc::channel::<Result<LlmStreamChunk, LlmError>>(32);

        tokio::spawn(async move {
            let mut bytes = response.bytes_stream();
            let mut parser = SseParser::new();
            let mut state = StreamState::default();

            loop {
                let next = tokio::select! {
                    next = bytes.next() => next,
                    _ = cancel.cancelled() => {
                        let _ = tx.send(Err(LlmError::Cancelled)).await;
                        return;
                    }
                };
                match next {
                    Some(Ok(chunk)) => {
                        for event in parser.push(&chunk) {
                            match state.handle_event(event.event.as_deref(), &event.data) {
                                Ok(chunks) => {
                                    for chunk in chunks {
                                        if tx.send(Ok(chunk)).await.is_err() {
                                            return;
                                        }
                                    }
                                }
                                Err(failure) => {
                                    let _ = tx.send(Err(failure)).await;
                                    return;
                                }
                            }
                        }
                    }
                    Some(Err(failure)) => {
                        let _ = tx.send(Err(LlmError::network(failure.to_string()))).await;
                        return;
                    }
                    None => return,
                }
            }
        });

        Ok(Box::pin(futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|chunk| (chunk, rx))
        })))
    }

    fn name(&self) -> &'static str {
        "anthropic"
    }
}

fn to_wire_message(message: &LlmMessage) -> WireMessage {
    match message.role {
        MessageRole::Tool => WireMessage {
            role: "user",
            content: WireMessageContent::Blocks(vec![WireRequestBlock::ToolResult {
                tool_use_id: message.tool_call_id.clone().unwrap_or_default(),
                content: message.content.clone(),
            }]),
        },
        MessageRole::Assistant => WireMessage {
            role: "assistant",
            content: WireMessageContent::Text(message.content.clone()),
        },
        // System messages are extracted before this point.
        _ => WireMessage {
            role: "user",
            content: WireMessageContent::Text(message.content.clone()),
        },
    }
}

/// Accumulates `input_json_delta` fragments per content block.
#[derive(Debug, Default)]
struct StreamState {
    /// Tool-use blocks by index: call id and accumulated input JSON.
    blocks: HashMap<u64, (String, String)>,
    /// Stop reason announced by `message_delta`, reported at `message_stop`.
    stop_reason: Option<String>,
    usage: Option<TokenUsage>,
}

impl StreamState {
    fn handle_event(
        &mut self,
        event: Option<&str>,
        data: &str,
    ) -> Result<Vec<LlmStreamChunk>, LlmError> {
        let mut chunks = Vec::new();
        match event {
            Some("content_block_start") => {
                let start: WireBlockStart =
                    serde_json::from_str(data).map_err(|e| LlmError::parse(e.to_string()))?;
                if let WireResponseBlockInfo::ToolUse { id, name, .. } = start.content_block {
                    self.blocks.insert(start.index, (id.clone(), String::new()));
                    chunks.push(LlmStreamChunk::ToolCallStart { id, name });
                }
            }
            Some("content_block_delta") => {
                let delta: WireBlockDelta =
                    serde_json::from_str(data).map_err(|e| LlmError::parse(e.to_string()))?;
                match delta.delta {
                    WireDelta::TextDelta { text } => {
                        if !text.is_empty() {
                            chunks.push(LlmStreamChunk::Text(text));
                        }
                    }
                    WireDelta::InputJsonDelta { partial_json } => {
                        if let Some((id, accum)) = self.blocks.get_mut(&delta.index) {
                            accum.push_str(&partial_json);
                            if !partial_json.is_empty() {
                                chunks.push(LlmStreamChunk::ToolCallDelta {
                                    id: id.clone(),
                                    fragment: partial_json,
                                });
                            }
                        }
                    }
                }
            }
            Some("content_block_stop") => {
                let stop: WireBlockStop =
                    serde_json::from_str(data).map_err(|e| LlmError::parse(e.to_string()))?;
                if let Some((id, arguments)) = self.blocks.remove(&stop.index) {
                    chunks.push(LlmStreamChunk::ToolCallEnd { id, arguments });
                }
            }
            Some("message_delta") => {
                let delta: WireMessageDelta =
                    serde_json::from_str(data).map_err(|e| LlmError::parse(e.to_string()))?;
                self.stop_reason = delta.delta.stop_reason;
                if let Some(usage) = delta.usage {
                    self.usage = Some(TokenUsage::new(
                        usage.input_tokens.unwrap_or(0),
                        usage.output_tokens,
                    ));
                }
            }
            Some("message_stop") => {
                let finish_reason = match self.stop_reason.as_deref() {
                    Some("tool_use") => FinishReason::ToolCalls,
                    _ => FinishReason::Stop,
                };
                chunks.push(LlmStreamChunk::Done {
                    finish_reason,
                    usage: self.usage.take(),
                });
            }
            Some("error") => {
                let error: WireStreamError =
                    serde_json::from_str(data).map_err(|e| LlmError::parse(e.to_string()))?;
                return Err(LlmError::provider(
                    error.error.error_type.unwrap_or_else(|| "error".into()),
                    error.error.message.unwrap_or_default(),
                ));
            }
            // message_start, ping, and unknown events carry nothing we use.
            _ => {}
        }
        Ok(chunks)
    }
}

// ----- Wire types -----

#[derive(Debug, Serialize)]
struct WireRequest {
    model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool>>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: WireMessageContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum WireMessageContent {
    Text(String),
    Blocks(Vec<WireRequestBlock>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireRequestBlock {
    ToolResult {
        tool_use_id: String,
        content: String,
    },
}

#[derive(Debug, Serialize)]
struct WireTool {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    content: Vec<WireContentBlock>,
    stop_reason: Option<String>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct WireBlockStart {
    index: u64,
    content_block: WireResponseBlockInfo,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireResponseBlockInfo {
    // Text blocks stream their content through deltas; the start event
    // carries nothing we keep.
    Text {},
    ToolUse { id: String, name: String },
}

#[derive(Debug, Deserialize)]
struct WireBlockDelta {
    index: u64,
    delta: WireDelta,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireDelta {
    TextDelta { text: String },
    InputJsonDelta { partial_json: String },
}

#[derive(Debug, Deserialize)]
struct WireBlockStop {
    index: u64,
}

#[derive(Debug, Deserialize)]
struct WireMessageDelta {
    delta: WireMessageDeltaInner,
    usage: Option<WireStreamUsage>,
}

#[derive(Debug, Deserialize)]
struct WireMessageDeltaInner {
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireStreamUsage {
    input_tokens: Option<u32>,
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct WireStreamError {
    error: WireStreamErrorInner,
}

#[derive(Debug, Deserialize)]
struct WireStreamErrorInner {
    #[serde(rename = "type")]
    error_type: Option<String>,
    message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::LlmToolDefinition;
    use serde_json::json;

    #[test]
    fn system_message_moves_to_system_field() {
        let options = CallOptions::new("claude-sonnet-4-20250514")
            .with_message(LlmMessage::system("instruktion"))
            .with_message(LlmMessage::user("hej"));

        let wire = AnthropicProvider::to_wire_request(&options, false);
        let json = serde_json::to_value(&wire).unwrap();

        assert_eq!(json["system"], "instruktion");
        assert_eq!(json["messages"].as_array().unwrap().len(), 1);
        assert_eq!(json["messages"][0]["role"], "user");
    }

    #[test]
    fn tool_result_becomes_tool_result_block() {
        let options = CallOptions::new("claude-sonnet-4-20250514")
            .with_message(LlmMessage::tool_result("toolu_1", "{\"ok\":true}"));

        let wire = AnthropicProvider::to_wire_request(&options, false);
        let json = serde_json::to_value(&wire).unwrap();

        let block = &json["messages"][0]["content"][0];
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(block["type"], "tool_result");
        assert_eq!(block["tool_use_id"], "toolu_1");
    }

    #[test]
    fn tool_definitions_use_input_schema() {
        let options = CallOptions::new("claude-sonnet-4-20250514").with_tools(vec![
            LlmToolDefinition::new("get_invoice_status", "Look up", json!({"type": "object"})),
        ]);

        let wire = AnthropicProvider::to_wire_request(&options, false);
        let json = serde_json::to_value(&wire).unwrap();

        assert_eq!(json["tools"][0]["name"], "get_invoice_status");
        assert!(json["tools"][0]["input_schema"].is_object());
    }

    #[test]
    fn max_tokens_defaults_when_unset() {
        let options = CallOptions::new("claude-sonnet-4-20250514");
        let wire = AnthropicProvider::to_wire_request(&options, false);
        assert_eq!(wire.max_tokens, DEFAULT_MAX_TOKENS);
    }

    #[test]
    fn stream_state_accumulates_input_json_fragments() {
        let mut state = StreamState::default();

        let start = state
            .handle_event(
                Some("content_block_start"),
                r#"{"index":1,"content_block":{"type":"tool_use","id":"toolu_1","name":"send_invoice_reminder","input":{}}}"#,
            )
            .unwrap();
        assert!(matches!(
            &start[0],
            LlmStreamChunk::ToolCallStart { id, name }
                if id == "toolu_1" && name == "send_invoice_reminder"
        ));

        state
            .handle_event(
                Some("content_block_delta"),
                r#"{"index":1,"delta":{"type":"input_json_delta","partial_json":"{\"invoice_id\":"}}"#,
            )
            .unwrap();
        state
            .handle_event(
                Some("content_block_delta"),
                r#"{"index":1,"delta":{"type":"input_json_delta","partial_json":"\"F-1001\"}"}}"#,
            )
            .unwrap();

        let stop = state
            .handle_event(Some("content_block_stop"), r#"{"index":1}"#)
            .unwrap();
        match &stop[0] {
            LlmStreamChunk::ToolCallEnd { id, arguments } => {
                assert_eq!(id, "toolu_1");
                let parsed: serde_json::Value = serde_json::from_str(arguments).unwrap();
                assert_eq!(parsed, json!({"invoice_id": "F-1001"}));
            }
            other => panic!("expected end, got {:?}", other),
        }
    }

    #[test]
    fn stream_state_reports_tool_use_stop_reason_at_message_stop() {
        let mut state = StreamState::default();
        state
            .handle_event(
                Some("message_delta"),
                r#"{"delta":{"stop_reason":"tool_use"},"usage":{"output_tokens":42}}"#,
            )
            .unwrap();

        let done = state.handle_event(Some("message_stop"), "{}").unwrap();
        match done.last().unwrap() {
            LlmStreamChunk::Done {
                finish_reason,
                usage,
            } => {
                assert_eq!(*finish_reason, FinishReason::ToolCalls);
                assert_eq!(usage.unwrap().completion_tokens, 42);
            }
            other => panic!("expected done, got {:?}", other),
        }
    }

    #[test]
    fn stream_state_emits_text_deltas() {
        let mut state = StreamState::default();
        let chunks = state
            .handle_event(
                Some("content_block_delta"),
                r#"{"index":0,"delta":{"type":"text_delta","text":"Hej"}}"#,
            )
            .unwrap();

        assert_eq!(chunks, vec![LlmStreamChunk::Text("Hej".to_string())]);
    }

    #[test]
    fn stream_error_event_is_a_provider_error() {
        let mut state = StreamState::default();
        let result = state.handle_event(
            Some("error"),
            r#"{"error":{"type":"overloaded_error","message":"Overloaded"}}"#,
        );

        match result {
            Err(LlmError::Provider { code, message }) => {
                assert_eq!(code, "overloaded_error");
                assert_eq!(message, "Overloaded");
            }
            other => panic!("expected provider error, got {:?}", other),
        }
    }

    #[test]
    fn non_streaming_tool_use_blocks_become_calls() {
        let wire: WireResponse = serde_json::from_str(
            r#"{
                "content": [
                    {"type":"text","text":"Jag kollar."},
                    {"type":"tool_use","id":"toolu_1","name":"get_invoice_status",
                     "input":{"invoice_id":"F-1"}}
                ],
                "stop_reason": "tool_use",
                "usage": {"input_tokens": 10, "output_tokens": 20}
            }"#,
        )
        .unwrap();

        assert_eq!(wire.content.len(), 2);
        assert_eq!(wire.stop_reason.as_deref(), Some("tool_use"));
    }
}
