//! OpenAI Provider - chat-completions wire protocol.
//!
//! The system prompt stays inline as a `system` message. Tool results map
//! to `tool`-role messages keyed by `tool_call_id`. Streamed tool calls
//! arrive as argument deltas indexed by position: a new call begins only
//! when an unseen index appears, and fragments for one index concatenate
//! in arrival order into the call's argument JSON.

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

/// Configuration for the OpenAI provider.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// API key for authentication.
    api_key: Secret<String>,
    /// Base URL for the API.
    pub base_url: String,
}

impl OpenAiConfig {
    /// Creates a new configuration with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Secret::new(api_key.into()),
            base_url: "https://api.openai.com".to_string(),
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

/// OpenAI chat-completions provider.
pub struct OpenAiProvider {
    config: OpenAiConfig,
    client: Client,
}

impl OpenAiProvider {
    /// Creates a new provider.
    pub fn new(config: OpenAiConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }

    fn completions_url(&self) -> String {
        format!("{}/v1/chat/completions", self.config.base_url)
    }

    fn to_wire_request(options: &CallOptions, stream: bool) -> WireRequest {
        let messages = options.messages.iter().map(to_wire_message).collect();
        let tools: Vec<WireTool> = options
            .tools
            .iter()
            .map(|tool| WireTool {
                kind: "function",
                function: WireFunction {
                    name: tool.name.clone(),
                    description: tool.description.clone(),
                    parameters: tool.parameters.clone(),
                },
            })
            .collect();

        WireRequest {
            model: options.model.clone(),
            messages,
            tools: if tools.is_empty() { None } else { Some(tools) },
            max_tokens: options.max_tokens,
            temperature: options.temperature,
            stream,
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
            .post(self.completions_url())
            .bearer_auth(self.config.api_key())
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
        // Vendor failure: code and message pass through verbatim.
        let body = response.text().await.unwrap_or_default();
        Err(LlmError::provider(status.as_u16().to_string(), body))
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
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

        let choice = wire
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::parse("response carried no choices"))?;

        let tool_calls: Vec<LlmToolCall> = choice
            .message
            .tool_calls
            .into_iter()
            .map(|call| LlmToolCall::new(call.id, call.function.name, call.function.arguments))
            .collect();

        let finish_reason = match choice.finish_reason.as_deref() {
            Some("tool_calls") => FinishReason::ToolCalls,
            _ if !tool_calls.is_empty() => FinishReason::ToolCalls,
            _ => FinishReason::Stop,
        };

        Ok(LlmResponse {
            content: choice.message.content,
            tool_calls,
            finish_reason,
            usage: wire
                .usage
                .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens)),
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
                        // Discard any unterminated accumulation.
                        let _ = tx.send(Err(LlmError::Cancelled)).await;
                        return;
                    }
                };
                match next {
                    Some(Ok(chunk)) => {
                        for event in parser.push(&chunk) {
                            if event.data == "[DONE]" {
                                return;
                            }
                            match state.handle_data(&event.data) {
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
        "openai"
    }
}

fn to_wire_message(message: &LlmMessage) -> WireMessage {
    let role = match message.role {
        MessageRole::System => "system",
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
        MessageRole::Tool => "tool",
    };
    WireMessage {
        role,
        content: message.content.clone(),
        tool_call_id: message.tool_call_id.clone(),
    }
}

/// Accumulates indexed tool-call deltas across stream events.
#[derive(Debug, Default)]
struct StreamState {
    /// Call ids in order of first appearance, addressed by vendor index.
    index_to_id: HashMap<u64, String>,
    /// Accumulated argument text per call id.
    arguments: HashMap<String, String>,
    /// First-appearance order for closing calls.
    order: Vec<String>,
}

impl StreamState {
    /// Parses one SSE data payload into neutral chunks.
    fn handle_data(&mut self, data: &str) -> Result<Vec<LlmStreamChunk>, LlmError> {
        let wire: WireStreamChunk =
            serde_json::from_str(data).map_err(|e| LlmError::parse(e.to_string()))?;

        let mut chunks = Vec::new();
        let Some(choice) = wire.choices.into_iter().next() else {
            return Ok(chunks);
        };

        if let Some(content) = choice.delta.content {
            if !content.is_empty() {
                chunks.push(LlmStreamChunk::Text(content));
            }
        }

        for call in choice.delta.tool_calls {
            let id = match self.index_to_id.get(&call.index) {
                Some(id) => id.clone(),
                None => {
                    // A new call begins only when an unseen index appears.
                    let id = call
                        .id
                        .clone()
                        .unwrap_or_else(|| format!("call_{}", call.index));
                    let name = call
                        .function
                        .as_ref()
                        .and_then(|f| f.name.clone())
                        .unwrap_or_default();
                    self.index_to_id.insert(call.index, id.clone());
                    self.arguments.insert(id.clone(), String::new());
                    self.order.push(id.clone());
                    chunks.push(LlmStreamChunk::ToolCallStart {
                        id: id.clone(),
                        name,
                    });
                    id
                }
            };

            if let Some(fragment) = call.function.and_then(|f| f.arguments) {
                if !fragment.is_empty() {
                    self.arguments
                        .entry(id.clone())
                        .or_default()
                        .push_str(&fragment);
                    chunks.push(LlmStreamChunk::ToolCallDelta { id, fragment });
                }
            }
        }

        if let Some(reason) = choice.finish_reason.as_deref() {
            let finish_reason = if reason == "tool_calls" {
                // Close every accumulated call, in request order.
                for id in self.order.drain(..) {
                    let arguments = self.arguments.remove(&id).unwrap_or_default();
                    chunks.push(LlmStreamChunk::ToolCallEnd { id, arguments });
                }
                FinishReason::ToolCalls
            } else {
                FinishReason::Stop
            };
            chunks.push(LlmStreamChunk::Done {
                finish_reason,
                usage: wire
                    .usage
                    .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens)),
            });
        }

        Ok(chunks)
    }
}

// ----- Wire types -----

#[derive(Debug, Serialize)]
struct WireRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunction,
}

#[derive(Debug, Serialize)]
struct WireFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    id: String,
    function: WireFunctionCall,
}

#[derive(Debug, Deserialize)]
struct WireFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct WireStreamChunk {
    #[serde(default)]
    choices: Vec<WireStreamChoice>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireStreamChoice {
    delta: WireStreamDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct WireStreamDelta {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireStreamToolCall>,
}

#[derive(Debug, Deserialize)]
struct WireStreamToolCall {
    index: u64,
    id: Option<String>,
    function: Option<WireStreamFunction>,
}

#[derive(Debug, Deserialize)]
struct WireStreamFunction {
    name: Option<String>,
    arguments: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::LlmToolDefinition;
    use serde_json::json;

    #[test]
    fn wire_request_maps_roles_and_tool_results() {
        let options = CallOptions::new("gpt-4o")
            .with_message(LlmMessage::system("instruktion"))
            .with_message(LlmMessage::user("hej"))
            .with_message(LlmMessage::tool_result("call_1", "{\"ok\":true}"));

        let wire = OpenAiProvider::to_wire_request(&options, false);
        let json = serde_json::to_value(&wire).unwrap();

        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][2]["role"], "tool");
        assert_eq!(json["messages"][2]["tool_call_id"], "call_1");
        assert!(json.get("tools").is_none());
    }

    #[test]
    fn wire_request_maps_tool_definitions() {
        let options = CallOptions::new("gpt-4o").with_tools(vec![LlmToolDefinition::new(
            "get_invoice_status",
            "Look up an invoice",
            json!({"type": "object"}),
        )]);

        let wire = OpenAiProvider::to_wire_request(&options, true);
        let json = serde_json::to_value(&wire).unwrap();

        assert_eq!(json["tools"][0]["type"], "function");
        assert_eq!(json["tools"][0]["function"]["name"], "get_invoice_status");
        assert_eq!(json["stream"], true);
    }

    #[test]
    fn stream_state_accumulates_indexed_deltas() {
        let mut state = StreamState::default();

        let first = state
            .handle_data(
                r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_a","function":{"name":"get_invoice_status","arguments":""}}]},"finish_reason":null}]}"#,
            )
            .unwrap();
        assert!(matches!(
            &first[0],
            LlmStreamChunk::ToolCallStart { id, name }
                if id == "call_a" && name == "get_invoice_status"
        ));

        state
            .handle_data(
                r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"invoice_id\":"}}]},"finish_reason":null}]}"#,
            )
            .unwrap();
        state
            .handle_data(
                r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"\"F-1\"}"}}]},"finish_reason":null}]}"#,
            )
            .unwrap();

        let last = state
            .handle_data(r#"{"choices":[{"delta":{},"finish_reason":"tool_calls"}]}"#)
            .unwrap();

        // Exactly one end, with the concatenated fragments parsing as the
        // same JSON a blocking call would return.
        let ends: Vec<_> = last
            .iter()
            .filter(|c| matches!(c, LlmStreamChunk::ToolCallEnd { .. }))
            .collect();
        assert_eq!(ends.len(), 1);
        match ends[0] {
            LlmStreamChunk::ToolCallEnd { id, arguments } => {
                assert_eq!(id, "call_a");
                let parsed: serde_json::Value = serde_json::from_str(arguments).unwrap();
                assert_eq!(parsed, json!({"invoice_id": "F-1"}));
            }
            _ => unreachable!(),
        }
        assert!(matches!(
            last.last().unwrap(),
            LlmStreamChunk::Done {
                finish_reason: FinishReason::ToolCalls,
                ..
            }
        ));
    }

    #[test]
    fn stream_state_starts_second_call_on_new_index() {
        let mut state = StreamState::default();
        state
            .handle_data(
                r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_a","function":{"name":"a","arguments":"{}"}}]},"finish_reason":null}]}"#,
            )
            .unwrap();

        let second = state
            .handle_data(
                r#"{"choices":[{"delta":{"tool_calls":[{"index":1,"id":"call_b","function":{"name":"b","arguments":"{}"}}]},"finish_reason":null}]}"#,
            )
            .unwrap();
        assert!(matches!(
            &second[0],
            LlmStreamChunk::ToolCallStart { id, .. } if id == "call_b"
        ));

        // Ends come in first-appearance order.
        let last = state
            .handle_data(r#"{"choices":[{"delta":{},"finish_reason":"tool_calls"}]}"#)
            .unwrap();
        let end_ids: Vec<&str> = last
            .iter()
            .filter_map(|c| match c {
                LlmStreamChunk::ToolCallEnd { id, .. } => Some(id.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(end_ids, vec!["call_a", "call_b"]);
    }

    #[test]
    fn stream_state_emits_text_deltas() {
        let mut state = StreamState::default();
        let chunks = state
            .handle_data(r#"{"choices":[{"delta":{"content":"Hej"},"finish_reason":null}]}"#)
            .unwrap();

        assert_eq!(chunks, vec![LlmStreamChunk::Text("Hej".to_string())]);
    }

    #[test]
    fn stream_state_reports_usage_only_when_present() {
        let mut state = StreamState::default();
        let chunks = state
            .handle_data(
                r#"{"choices":[{"delta":{},"finish_reason":"stop"}],"usage":{"prompt_tokens":10,"completion_tokens":4}}"#,
            )
            .unwrap();

        match chunks.last().unwrap() {
            LlmStreamChunk::Done { usage, .. } => {
                assert_eq!(usage.unwrap().total_tokens, 14);
            }
            _ => panic!("expected done"),
        }

        let without = state
            .handle_data(r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#)
            .unwrap();
        match without.last().unwrap() {
            LlmStreamChunk::Done { usage, .. } => assert!(usage.is_none()),
            _ => panic!("expected done"),
        }
    }

    #[test]
    fn malformed_stream_data_is_a_parse_error() {
        let mut state = StreamState::default();
        assert!(matches!(
            state.handle_data("{not json"),
            Err(LlmError::Parse(_))
        ));
    }
}
