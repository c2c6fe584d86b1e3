//! Application configuration module
//!
//! Type-safe configuration loading from environment variables using the
//! `config` and `dotenvy` crates. Configuration is loaded with the
//! `FINASSIST` prefix and nested values use double underscores as
//! separators.
//!
//! # Example
//!
//! ```no_run
//! use finassist::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//! ```

mod ai;
mod error;
mod orchestration;

pub use ai::AiConfig;
pub use error::{ConfigError, ValidationError};
pub use orchestration::OrchestrationConfig;

use serde::Deserialize;

/// Root application configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// LLM provider configuration (keys, models, timeout)
    #[serde(default)]
    pub ai: AiConfig,

    /// Classifier, agent, and orchestrator tuning
    #[serde(default)]
    pub orchestration: OrchestrationConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// # Environment Variable Format
    ///
    /// - `FINASSIST__AI__OPENAI_API_KEY=sk-...` -> `ai.openai_api_key`
    /// - `FINASSIST__ORCHESTRATION__MAX_AGENT_ROUNDS=5`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if values cannot be parsed into the expected
    /// types.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (development)
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("FINASSIST")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration values
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.ai.validate()?;
        self.orchestration.validate()?;
        Ok(())
    }
}
