//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("Invalid request timeout")]
    InvalidTimeout,

    #[error("No LLM provider configured")]
    NoProviderConfigured,

    #[error("Classifier threshold must be within [0, 1]")]
    InvalidThreshold,

    #[error("Agent round bound must be at least 1")]
    InvalidRoundBound,

    #[error("Step parallelism must be at least 1")]
    InvalidParallelism,
}
