//! Mock LLM Provider for testing.
//!
//! Configurable implementation of the LlmProvider port so tests run
//! without calling real vendor APIs.
//!
//! # Features
//!
//! - Scripted responses and stream chunks, consumed in order
//! - Error injection
//! - Simulated latency for timeout testing
//! - Call capture for verification
//!
//! # Example
//!
//! ```ignore
//! let provider = MockLlmProvider::new()
//!     .with_text_response("Hej! Fakturan är betald.")
//!     .with_delay(Duration::from_millis(50));
//! ```

use async_trait::async_trait;
use futures::stream;
use futures::StreamExt;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::ports::{
    CallOptions, ChunkStream, FinishReason, LlmError, LlmProvider, LlmResponse, LlmStreamChunk,
    LlmToolCall,
};

/// One scripted behavior, consumed per call.
#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// Return this response (streams synthesize chunks from it).
    Response(MockResponseSpec),
    /// Emit exactly these chunks (calls fold them into a response).
    Chunks(Vec<LlmStreamChunk>),
    /// Fail with this error.
    Error(LlmError),
}

/// A scripted completion.
#[derive(Debug, Clone)]
pub struct MockResponseSpec {
    /// Text content, if any.
    pub content: Option<String>,
    /// Tool calls the mock model requests.
    pub tool_calls: Vec<LlmToolCall>,
}

/// Mock LLM provider with scripted behaviors.
///
/// When the script runs out the mock repeats its last behavior, so loop
/// tests can script one tool-call response and drive the agent into its
/// round bound.
#[derive(Clone, Default)]
pub struct MockLlmProvider {
    script: Arc<Mutex<VecDeque<MockBehavior>>>,
    last: Arc<Mutex<Option<MockBehavior>>>,
    calls: Arc<Mutex<Vec<CallOptions>>>,
    delay: Duration,
}

impl MockLlmProvider {
    /// Creates a mock with an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts a plain text response.
    pub fn with_text_response(self, content: impl Into<String>) -> Self {
        self.push(MockBehavior::Response(MockResponseSpec {
            content: Some(content.into()),
            tool_calls: Vec::new(),
        }))
    }

    /// Scripts a tool-call response.
    pub fn with_tool_call_response(self, calls: Vec<LlmToolCall>) -> Self {
        self.push(MockBehavior::Response(MockResponseSpec {
            content: None,
            tool_calls: calls,
        }))
    }

    /// Scripts a raw chunk sequence.
    pub fn with_chunks(self, chunks: Vec<LlmStreamChunk>) -> Self {
        self.push(MockBehavior::Chunks(chunks))
    }

    /// Scripts an error.
    pub fn with_error(self, error: LlmError) -> Self {
        self.push(MockBehavior::Error(error))
    }

    /// Sets a simulated latency per request.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Returns the captured call options, in call order.
    pub fn captured_calls(&self) -> Vec<CallOptions> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of calls made so far.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn push(self, behavior: MockBehavior) -> Self {
        self.script.lock().unwrap().push_back(behavior);
        self
    }

    fn next_behavior(&self) -> Option<MockBehavior> {
        let mut script = self.script.lock().unwrap();
        match script.pop_front() {
            Some(behavior) => {
                *self.last.lock().unwrap() = Some(behavior.clone());
                Some(behavior)
            }
            None => self.last.lock().unwrap().clone(),
        }
    }

    async fn wait(&self, cancel: &CancellationToken) -> Result<(), LlmError> {
        if self.delay.is_zero() {
            return Ok(());
        }
        tokio::select! {
            _ = sleep(self.delay) => Ok(()),
            _ = cancel.cancelled() => Err(LlmError::Cancelled),
        }
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    async fn call(
        &self,
        options: CallOptions,
        cancel: CancellationToken,
    ) -> Result<LlmResponse, LlmError> {
        self.calls.lock().unwrap().push(options);
        self.wait(&cancel).await?;
        if cancel.is_cancelled() {
            return Err(LlmError::Cancelled);
        }

        match self.next_behavior() {
            Some(MockBehavior::Response(spec)) => Ok(spec_to_response(spec)),
            Some(MockBehavior::Chunks(chunks)) => Ok(fold_chunks(chunks)),
            Some(MockBehavior::Error(error)) => Err(error),
            None => Ok(LlmResponse::text("")),
        }
    }

    async fn stream(
        &self,
        options: CallOptions,
        cancel: CancellationToken,
    ) -> Result<ChunkStream, LlmError> {
        self.calls.lock().unwrap().push(options);
        self.wait(&cancel).await?;

        let chunks = match self.next_behavior() {
            Some(MockBehavior::Chunks(chunks)) => chunks,
            Some(MockBehavior::Response(spec)) => spec_to_chunks(spec),
            Some(MockBehavior::Error(error)) => return Err(error),
            None => vec![LlmStreamChunk::Done {
                finish_reason: FinishReason::Stop,
                usage: None,
            }],
        };

        let cancel = cancel.clone();
        let iter = chunks.into_iter().map(Ok).collect::<Vec<_>>();
        let stream = stream::iter(iter).take_while(move |_| {
            let open = !cancel.is_cancelled();
            async move { open }
        });
        Ok(Box::pin(stream))
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

fn spec_to_response(spec: MockResponseSpec) -> LlmResponse {
    if spec.tool_calls.is_empty() {
        LlmResponse::text(spec.content.unwrap_or_default())
    } else {
        let mut response = LlmResponse::tool_calls(spec.tool_calls);
        response.content = spec.content;
        response
    }
}

fn spec_to_chunks(spec: MockResponseSpec) -> Vec<LlmStreamChunk> {
    let mut chunks = Vec::new();
    if let Some(content) = spec.content.clone() {
        chunks.push(LlmStreamChunk::Text(content));
    }
    for call in &spec.tool_calls {
        chunks.push(LlmStreamChunk::ToolCallStart {
            id: call.id.clone(),
            name: call.name.clone(),
        });
        chunks.push(LlmStreamChunk::ToolCallDelta {
            id: call.id.clone(),
            fragment: call.arguments.clone(),
        });
        chunks.push(LlmStreamChunk::ToolCallEnd {
            id: call.id.clone(),
            arguments: call.arguments.clone(),
        });
    }
    let finish_reason = if spec.tool_calls.is_empty() {
        FinishReason::Stop
    } else {
        FinishReason::ToolCalls
    };
    chunks.push(LlmStreamChunk::Done {
        finish_reason,
        usage: None,
    });
    chunks
}

fn fold_chunks(chunks: Vec<LlmStreamChunk>) -> LlmResponse {
    let mut content = String::new();
    let mut names = std::collections::HashMap::new();
    let mut calls = Vec::new();
    let mut finish_reason = FinishReason::Stop;
    let mut usage = None;

    for chunk in chunks {
        match chunk {
            LlmStreamChunk::Text(text) => content.push_str(&text),
            LlmStreamChunk::ToolCallStart { id, name } => {
                names.insert(id, name);
            }
            LlmStreamChunk::ToolCallDelta { .. } => {}
            LlmStreamChunk::ToolCallEnd { id, arguments } => {
                let name = names.get(&id).cloned().unwrap_or_default();
                calls.push(LlmToolCall::new(id, name, arguments));
            }
            LlmStreamChunk::Done {
                finish_reason: reason,
                usage: reported,
            } => {
                finish_reason = reason;
                usage = reported;
            }
        }
    }

    LlmResponse {
        content: if content.is_empty() {
            None
        } else {
            Some(content)
        },
        tool_calls: calls,
        finish_reason,
        usage,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn options() -> CallOptions {
        CallOptions::new("mock-model")
    }

    #[tokio::test]
    async fn scripted_text_response_is_returned() {
        let provider = MockLlmProvider::new().with_text_response("hej");
        let response = provider
            .call(options(), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(response.content.as_deref(), Some("hej"));
        assert_eq!(response.finish_reason, FinishReason::Stop);
    }

    #[tokio::test]
    async fn script_is_consumed_in_order_then_repeats() {
        let provider = MockLlmProvider::new()
            .with_text_response("first")
            .with_text_response("second");

        let cancel = CancellationToken::new();
        let a = provider.call(options(), cancel.clone()).await.unwrap();
        let b = provider.call(options(), cancel.clone()).await.unwrap();
        let c = provider.call(options(), cancel).await.unwrap();

        assert_eq!(a.content.as_deref(), Some("first"));
        assert_eq!(b.content.as_deref(), Some("second"));
        assert_eq!(c.content.as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn tool_call_response_sets_finish_reason() {
        let provider = MockLlmProvider::new().with_tool_call_response(vec![LlmToolCall::new(
            "call_1",
            "get_invoice_status",
            r#"{"invoice_id":"F-1"}"#,
        )]);

        let response = provider
            .call(options(), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(response.finish_reason, FinishReason::ToolCalls);
        assert_eq!(response.tool_calls.len(), 1);
    }

    #[tokio::test]
    async fn stream_synthesizes_chunks_from_response() {
        let provider = MockLlmProvider::new().with_tool_call_response(vec![LlmToolCall::new(
            "call_1",
            "get_invoice_status",
            r#"{"invoice_id":"F-1"}"#,
        )]);

        let stream = provider
            .stream(options(), CancellationToken::new())
            .await
            .unwrap();
        let chunks: Vec<_> = stream.collect().await;

        assert!(matches!(
            chunks[0].as_ref().unwrap(),
            LlmStreamChunk::ToolCallStart { .. }
        ));
        assert!(matches!(
            chunks.last().unwrap().as_ref().unwrap(),
            LlmStreamChunk::Done { .. }
        ));
    }

    #[tokio::test]
    async fn error_script_propagates() {
        let provider =
            MockLlmProvider::new().with_error(LlmError::provider("500", "internal error"));
        let result = provider.call(options(), CancellationToken::new()).await;
        assert!(matches!(result, Err(LlmError::Provider { .. })));
    }

    #[tokio::test]
    async fn captures_call_options() {
        let provider = MockLlmProvider::new().with_text_response("ok");
        provider
            .call(
                CallOptions::new("gpt-4o").with_max_tokens(10),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        let calls = provider.captured_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].model, "gpt-4o");
    }
}
