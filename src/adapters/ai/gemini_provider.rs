//! Gemini Provider - generate-content wire protocol.
//!
//! The system prompt moves to `systemInstruction`. Tool definitions are
//! grouped under one `functionDeclarations` entry. This vendor assigns no
//! call ids and delivers function calls whole, never as deltas: the
//! adapter keys calls by function name and a stream emits
//! `ToolCallStart` immediately followed by `ToolCallEnd`. Tool results
//! map to `functionResponse` parts named after the call id.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, Response};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::ports::{
    CallOptions, ChunkStream, FinishReason, LlmError, LlmMessage, LlmProvider, LlmResponse,
    LlmStreamChunk, LlmToolCall, MessageRole, TokenUsage,
};

use super::sse::SseParser;

/// Configuration for the Gemini provider.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    /// API key passed as a query parameter.
    api_key: Secret<String>,
    /// Base URL for the API.
    pub base_url: String,
}

impl GeminiConfig {
    /// Creates a new configuration with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Secret::new(api_key.into()),
            base_url: "https://generativelanguage.googleapis.com".to_string(),
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

/// Gemini generate-content provider.
pub struct GeminiProvider {
    config: GeminiConfig,
    client: Client,
}

impl GeminiProvider {
    /// Creates a new provider.
    pub fn new(config: GeminiConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }

    fn generate_url(&self, model: &str, stream: bool) -> String {
        let method = if stream {
            "streamGenerateContent?alt=sse&key="
        } else {
            "generateContent?key="
        };
        format!(
            "{}/v1beta/models/{}:{}{}",
            self.config.base_url,
            model,
            method,
            self.config.api_key()
        )
    }

    fn to_wire_request(options: &CallOptions) -> WireRequest {
        let system_instruction = options
            .messages
            .iter()
            .find(|m| m.role == MessageRole::System)
            .map(|m| WireContent {
                role: None,
                parts: vec![WirePart::Text {
                    text: m.content.clone(),
                }],
            });

        let contents = options
            .messages
            .iter()
            .filter(|m| m.role != MessageRole::System)
            .map(to_wire_content)
            .collect();

        let declarations: Vec<WireFunctionDeclaration> = options
            .tools
            .iter()
            .map(|tool| WireFunctionDeclaration {
                name: tool.name.clone(),
                description: tool.description.clone(),
                parameters: tool.parameters.clone(),
            })
            .collect();

        WireRequest {
            system_instruction,
            contents,
            tools: if declarations.is_empty() {
                None
            } else {
                Some(vec![WireToolGroup {
                    function_declarations: declarations,
                }])
            },
            generation_config: WireGenerationConfig {
                max_output_tokens: options.max_tokens,
                temperature: options.temperature,
            },
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
            .post(self.generate_url(&options.model, stream))
            .json(&Self::to_wire_request(options))
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
impl LlmProvider for GeminiProvider {
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

        let candidate = wire
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::parse("response carried no candidates"))?;

        let mut content = String::new();
        let mut tool_calls = Vec::new();
        for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
            match part {
                WireResponsePart::Text { text } => content.push_str(&text),
                WireResponsePart::FunctionCall { function_call } => {
                    // No vendor ids on this protocol: the name is the key.
                    tool_calls.push(LlmToolCall::new(
                        function_call.name.clone(),
                        function_call.name,
                        function_call.args.to_string(),
                    ));
                }
            }
        }

        let finish_reason = if tool_calls.is_empty() {
            FinishReason::Stop
        } else {
            FinishReason::ToolCalls
        };

        Ok(LlmResponse {
            content: if content.is_empty() {
                None
            } else {
                Some(content)
            },
            tool_calls,
            finish_reason,
            usage: wire.usage_metadata.map(|u| {
                TokenUsage::new(u.prompt_token_count, u.candidates_token_count)
            }),
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
                    None => {
                        // The last frame carries finishReason; emit Done.
                        for chunk in state.finish() {
                            let _ = tx.send(Ok(chunk)).await;
                        }
                        return;
                    }
                }
            }
        });

        Ok(Box::pin(futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|chunk| (chunk, rx))
        })))
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}

fn to_wire_content(message: &LlmMessage) -> WireContent {
    match message.role {
        MessageRole::Tool => WireContent {
            role: Some("user"),
            parts: vec![WirePart::FunctionResponse {
                function_response: WireFunctionResponse {
                    name: message.tool_call_id.clone().unwrap_or_default(),
                    response: serde_json::from_str(&message.content)
                        .unwrap_or_else(|_| Value::String(message.content.clone())),
                },
            }],
        },
        MessageRole::Assistant => WireContent {
            role: Some("model"),
            parts: vec![WirePart::Text {
                text: message.content.clone(),
            }],
        },
        _ => WireContent {
            role: Some("user"),
            parts: vec![WirePart::Text {
                text: message.content.clone(),
            }],
        },
    }
}

/// Tracks whether any function call arrived, to pick the finish reason.
#[derive(Debug, Default)]
struct StreamState {
    saw_function_call: bool,
    finished: bool,
    usage: Option<TokenUsage>,
}

impl StreamState {
    fn handle_data(&mut self, data: &str) -> Result<Vec<LlmStreamChunk>, LlmError> {
        let wire: WireResponse =
            serde_json::from_str(data).map_err(|e| LlmError::parse(e.to_string()))?;

        if let Some(usage) = wire.usage_metadata {
            self.usage = Some(TokenUsage::new(
                usage.prompt_token_count,
                usage.candidates_token_count,
            ));
        }

        let mut chunks = Vec::new();
        let Some(candidate) = wire.candidates.into_iter().next() else {
            return Ok(chunks);
        };

        for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
            match part {
                WireResponsePart::Text { text } => {
                    if !text.is_empty() {
                        chunks.push(LlmStreamChunk::Text(text));
                    }
                }
                WireResponsePart::FunctionCall { function_call } => {
                    // Calls arrive whole: start immediately followed by end.
                    self.saw_function_call = true;
                    let arguments = function_call.args.to_string();
                    chunks.push(LlmStreamChunk::ToolCallStart {
                        id: function_call.name.clone(),
                        name: function_call.name.clone(),
                    });
                    chunks.push(LlmStreamChunk::ToolCallEnd {
                        id: function_call.name,
                        arguments,
                    });
                }
            }
        }

        if candidate.finish_reason.is_some() && !self.finished {
            self.finished = true;
            chunks.push(self.done_chunk());
        }

        Ok(chunks)
    }

    /// Emits Done if the stream closed without an explicit finishReason.
    fn finish(&mut self) -> Vec<LlmStreamChunk> {
        if self.finished {
            return Vec::new();
        }
        self.finished = true;
        vec![self.done_chunk()]
    }

    fn done_chunk(&mut self) -> LlmStreamChunk {
        LlmStreamChunk::Done {
            finish_reason: if self.saw_function_call {
                FinishReason::ToolCalls
            } else {
                FinishReason::Stop
            },
            usage: self.usage.take(),
        }
    }
}

// ----- Wire types -----

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<WireContent>,
    contents: Vec<WireContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireToolGroup>>,
    generation_config: WireGenerationConfig,
}

#[derive(Debug, Serialize)]
struct WireContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<WirePart>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum WirePart {
    Text {
        text: String,
    },
    FunctionResponse {
        #[serde(rename = "functionResponse")]
        function_response: WireFunctionResponse,
    },
}

#[derive(Debug, Serialize)]
struct WireFunctionResponse {
    name: String,
    response: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireToolGroup {
    function_declarations: Vec<WireFunctionDeclaration>,
}

#[derive(Debug, Serialize)]
struct WireFunctionDeclaration {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireResponse {
    #[serde(default)]
    candidates: Vec<WireCandidate>,
    usage_metadata: Option<WireUsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireCandidate {
    content: Option<WireResponseContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireResponseContent {
    #[serde(default)]
    parts: Vec<WireResponsePart>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireResponsePart {
    Text {
        text: String,
    },
    FunctionCall {
        #[serde(rename = "functionCall")]
        function_call: WireFunctionCall,
    },
}

#[derive(Debug, Deserialize)]
struct WireFunctionCall {
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireUsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}
