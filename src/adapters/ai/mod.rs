//! AI adapters - one per vendor wire protocol, plus the test mock.

mod anthropic_provider;
mod gemini_provider;
mod mock_provider;
mod openai_provider;
mod sse;

pub use anthropic_provider::{AnthropicConfig, AnthropicProvider};
pub use gemini_provider::{GeminiConfig, GeminiProvider};
pub use mock_provider::{MockBehavior, MockLlmProvider, MockResponseSpec};
pub use openai_provider::{OpenAiConfig, OpenAiProvider};
