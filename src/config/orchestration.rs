//! Orchestration tuning configuration

use serde::Deserialize;

use super::error::ValidationError;

/// Tuning knobs for the classifier, agents, and orchestrator
#[derive(Debug, Clone, Deserialize)]
pub struct OrchestrationConfig {
    /// Classification confidence below this asks a clarifying question
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,

    /// Pattern confidence below this invokes the LLM classifier tier
    #[serde(default = "default_llm_tier_threshold")]
    pub llm_tier_threshold: f32,

    /// Maximum tool rounds per agent turn
    #[serde(default = "default_max_rounds")]
    pub max_agent_rounds: usize,

    /// Maximum workflow steps dispatched concurrently
    #[serde(default = "default_parallel_steps")]
    pub max_parallel_steps: usize,

    /// Seconds before an unresolved confirmation expires
    #[serde(default = "default_confirmation_ttl")]
    pub confirmation_ttl_secs: u64,
}

fn default_confidence_threshold() -> f32 {
    0.6
}

fn default_llm_tier_threshold() -> f32 {
    0.75
}

fn default_max_rounds() -> usize {
    5
}

fn default_parallel_steps() -> usize {
    4
}

fn default_confirmation_ttl() -> u64 {
    1800
}

impl OrchestrationConfig {
    /// Validate orchestration configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(0.0..=1.0).contains(&self.confidence_threshold)
            || !(0.0..=1.0).contains(&self.llm_tier_threshold)
        {
            return Err(ValidationError::InvalidThreshold);
        }
        if self.max_agent_rounds == 0 {
            return Err(ValidationError::InvalidRoundBound);
        }
        if self.max_parallel_steps == 0 {
            return Err(ValidationError::InvalidParallelism);
        }
        Ok(())
    }
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            llm_tier_threshold: default_llm_tier_threshold(),
            max_agent_rounds: default_max_rounds(),
            max_parallel_steps: default_parallel_steps(),
            confirmation_ttl_secs: default_confirmation_ttl(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(OrchestrationConfig::default().validate().is_ok());
    }

    #[test]
    fn out_of_range_threshold_is_invalid() {
        let config = OrchestrationConfig {
            confidence_threshold: 1.2,
            ..OrchestrationConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidThreshold)
        ));
    }

    #[test]
    fn zero_rounds_is_invalid() {
        let config = OrchestrationConfig {
            max_agent_rounds: 0,
            ..OrchestrationConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidRoundBound)
        ));
    }

    #[test]
    fn zero_parallelism_is_invalid() {
        let config = OrchestrationConfig {
            max_parallel_steps: 0,
            ..OrchestrationConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidParallelism)
        ));
    }
}
