//! LLM Client - routes neutral calls to a provider and enforces deadlines.
//!
//! Pure routing: a model id resolves to a provider through an explicit
//! lookup table, never through runtime type inspection. The client adds a
//! deadline on top of each call and cancels the shared token when it
//! elapses. No retries, no business logic.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::ports::{CallOptions, ChunkStream, LlmError, LlmProvider, LlmResponse};

/// The closed set of supported vendors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    /// Chat-completions-style API.
    OpenAi,
    /// Message-API-style with system field and tool_use blocks.
    Anthropic,
    /// Generate-content-style with functionDeclarations.
    Gemini,
}

/// Explicit model-id → provider lookup table.
///
/// Exact entries are checked first, then prefix rules in declaration
/// order.
#[derive(Debug, Clone, Default)]
pub struct ModelRoutes {
    exact: HashMap<String, ProviderKind>,
    prefixes: Vec<(String, ProviderKind)>,
}

impl ModelRoutes {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard table for the three supported vendors.
    pub fn standard() -> Self {
        Self::new()
            .with_prefix("gpt-", ProviderKind::OpenAi)
            .with_prefix("o1", ProviderKind::OpenAi)
            .with_prefix("claude-", ProviderKind::Anthropic)
            .with_prefix("gemini-", ProviderKind::Gemini)
    }

    /// Adds an exact model-id entry.
    pub fn with_model(mut self, model: impl Into<String>, provider: ProviderKind) -> Self {
        self.exact.insert(model.into(), provider);
        self
    }

    /// Adds a prefix rule.
    pub fn with_prefix(mut self, prefix: impl Into<String>, provider: ProviderKind) -> Self {
        self.prefixes.push((prefix.into(), provider));
        self
    }

    /// Resolves a model id to its provider.
    pub fn resolve(&self, model: &str) -> Option<ProviderKind> {
        if let Some(provider) = self.exact.get(model) {
            return Some(*provider);
        }
        self.prefixes
            .iter()
            .find(|(prefix, _)| model.starts_with(prefix))
            .map(|(_, provider)| *provider)
    }
}

/// Routes neutral calls to the registered provider adapters.
pub struct LlmClient {
    providers: HashMap<ProviderKind, Arc<dyn LlmProvider>>,
    routes: ModelRoutes,
    timeout: Duration,
}

impl LlmClient {
    /// Creates a client with the given routing table and deadline.
    pub fn new(routes: ModelRoutes, timeout: Duration) -> Self {
        Self {
            providers: HashMap::new(),
            routes,
            timeout,
        }
    }

    /// Registers the adapter for one provider kind.
    pub fn with_provider(mut self, kind: ProviderKind, provider: Arc<dyn LlmProvider>) -> Self {
        self.providers.insert(kind, provider);
        self
    }

    /// Returns the configured deadline.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn provider_for(&self, model: &str) -> Result<&Arc<dyn LlmProvider>, LlmError> {
        let kind = self
            .routes
            .resolve(model)
            .ok_or_else(|| LlmError::UnknownModel(model.to_string()))?;
        self.providers
            .get(&kind)
            .ok_or_else(|| LlmError::UnknownModel(model.to_string()))
    }

    /// Forwards a call to the provider for `options.model`, bounded by the
    /// deadline. On expiry the shared token is cancelled and the failure
    /// surfaces as [`LlmError::Timeout`].
    pub async fn call(
        &self,
        options: CallOptions,
        cancel: &CancellationToken,
    ) -> Result<LlmResponse, LlmError> {
        let provider = self.provider_for(&options.model)?;
        debug!(model = %options.model, provider = provider.name(), "dispatching llm call");

        let child = cancel.child_token();
        match tokio::time::timeout(self.timeout, provider.call(options, child.clone())).await {
            Ok(result) => result,
            Err(_) => {
                child.cancel();
                Err(LlmError::Timeout {
                    timeout_secs: self.timeout.as_secs(),
                })
            }
        }
    }

    /// Opens a stream from the provider for `options.model`. The deadline
    /// bounds stream establishment; chunk arrival is governed by the
    /// caller's token.
    pub async fn stream(
        &self,
        options: CallOptions,
        cancel: &CancellationToken,
    ) -> Result<ChunkStream, LlmError> {
        let provider = self.provider_for(&options.model)?;
        debug!(model = %options.model, provider = provider.name(), "opening llm stream");

        let child = cancel.child_token();
        match tokio::time::timeout(self.timeout, provider.stream(options, child.clone())).await {
            Ok(result) => result,
            Err(_) => {
                child.cancel();
                Err(LlmError::Timeout {
                    timeout_secs: self.timeout.as_secs(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::ai::MockLlmProvider;

    fn client_with_mock(mock: MockLlmProvider, timeout: Duration) -> LlmClient {
        LlmClient::new(
            ModelRoutes::standard().with_model("mock-model", ProviderKind::OpenAi),
            timeout,
        )
        .with_provider(ProviderKind::OpenAi, Arc::new(mock))
    }

    #[test]
    fn routes_resolve_exact_before_prefix() {
        let routes = ModelRoutes::standard().with_model("gpt-special", ProviderKind::Gemini);

        assert_eq!(routes.resolve("gpt-special"), Some(ProviderKind::Gemini));
        assert_eq!(routes.resolve("gpt-4o"), Some(ProviderKind::OpenAi));
        assert_eq!(
            routes.resolve("claude-sonnet-4-20250514"),
            Some(ProviderKind::Anthropic)
        );
        assert_eq!(routes.resolve("gemini-2.0-flash"), Some(ProviderKind::Gemini));
        assert_eq!(routes.resolve("llama-3"), None);
    }

    #[tokio::test]
    async fn call_routes_to_registered_provider() {
        let mock = MockLlmProvider::new().with_text_response("hej");
        let client = client_with_mock(mock.clone(), Duration::from_secs(5));

        let response = client
            .call(CallOptions::new("gpt-4o"), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(response.content.as_deref(), Some("hej"));
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn unknown_model_fails_without_calling_provider() {
        let mock = MockLlmProvider::new().with_text_response("hej");
        let client = client_with_mock(mock.clone(), Duration::from_secs(5));

        let result = client
            .call(CallOptions::new("llama-3"), &CancellationToken::new())
            .await;

        assert!(matches!(result, Err(LlmError::UnknownModel(_))));
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn deadline_converts_to_timeout_error() {
        let mock = MockLlmProvider::new()
            .with_text_response("slow")
            .with_delay(Duration::from_millis(200));
        let client = client_with_mock(mock, Duration::from_millis(20));

        let result = client
            .call(CallOptions::new("gpt-4o"), &CancellationToken::new())
            .await;

        assert!(matches!(result, Err(LlmError::Timeout { .. })));
    }

    #[tokio::test]
    async fn provider_error_propagates_unmodified() {
        let mock = MockLlmProvider::new()
            .with_error(LlmError::provider("429", "Rate limit reached for requests"));
        let client = client_with_mock(mock, Duration::from_secs(5));

        let result = client
            .call(CallOptions::new("gpt-4o"), &CancellationToken::new())
            .await;

        match result {
            Err(LlmError::Provider { code, message }) => {
                assert_eq!(code, "429");
                assert_eq!(message, "Rate limit reached for requests");
            }
            other => panic!("expected provider error, got {:?}", other),
        }
    }
}
