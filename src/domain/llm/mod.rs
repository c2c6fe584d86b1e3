//! LLM module - routing client over the provider adapters.

mod client;

pub use client::{LlmClient, ModelRoutes, ProviderKind};
