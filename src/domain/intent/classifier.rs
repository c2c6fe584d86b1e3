//! Classifier trait and the tiered fallback policy.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::agent::AgentContext;
use crate::ports::LlmError;

use super::types::Intent;

/// Maps raw user text to an [`Intent`].
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Classifies one utterance in the given request context.
    async fn classify(
        &self,
        utterance: &str,
        context: &AgentContext,
    ) -> Result<Intent, ClassifierError>;
}

/// Classification failures.
#[derive(Debug, Error)]
pub enum ClassifierError {
    /// The LLM tier failed.
    #[error("llm classification failed: {0}")]
    Llm(#[from] LlmError),

    /// The model's structured reply could not be interpreted.
    #[error("malformed classification reply: {0}")]
    Malformed(String),
}

/// Two-tier strategy: patterns first, LLM assist when the pattern tier is
/// unsure, pattern best-guess when the LLM tier fails.
///
/// The fallback policy is explicit here rather than spread across call
/// sites.
pub struct TieredClassifier {
    patterns: Arc<dyn Classifier>,
    llm: Option<Arc<dyn Classifier>>,
    llm_threshold: f32,
}

impl TieredClassifier {
    /// Creates a tiered classifier.
    ///
    /// The LLM tier runs when the pattern tier's confidence falls below
    /// `llm_threshold`; pass `None` to run pattern-only.
    pub fn new(
        patterns: Arc<dyn Classifier>,
        llm: Option<Arc<dyn Classifier>>,
        llm_threshold: f32,
    ) -> Self {
        Self {
            patterns,
            llm,
            llm_threshold,
        }
    }
}

#[async_trait]
impl Classifier for TieredClassifier {
    async fn classify(
        &self,
        utterance: &str,
        context: &AgentContext,
    ) -> Result<Intent, ClassifierError> {
        let pattern_intent = self.patterns.classify(utterance, context).await?;

        if pattern_intent.confidence >= self.llm_threshold {
            return Ok(pattern_intent);
        }

        let Some(llm) = &self.llm else {
            return Ok(pattern_intent);
        };

        debug!(
            confidence = pattern_intent.confidence,
            "pattern tier unsure, asking llm tier"
        );
        match llm.classify(utterance, context).await {
            Ok(intent) => Ok(intent),
            Err(failure) => {
                warn!(%failure, "llm tier failed, using pattern best guess");
                Ok(pattern_intent)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::{AssistantDomain, CompanyId, ConversationId, UserId};

    struct FixedClassifier(Intent);

    #[async_trait]
    impl Classifier for FixedClassifier {
        async fn classify(
            &self,
            _utterance: &str,
            _context: &AgentContext,
        ) -> Result<Intent, ClassifierError> {
            Ok(self.0.clone())
        }
    }

    struct FailingClassifier;

    #[async_trait]
    impl Classifier for FailingClassifier {
        async fn classify(
            &self,
            _utterance: &str,
            _context: &AgentContext,
        ) -> Result<Intent, ClassifierError> {
            Err(ClassifierError::Malformed("not json".into()))
        }
    }

    fn test_context() -> AgentContext {
        AgentContext::new(
            UserId::new("user-1").unwrap(),
            CompanyId::new("acme-ab").unwrap(),
            ConversationId::new(),
        )
    }

    fn intent(category: &str, confidence: f32) -> Intent {
        Intent::new(category, AssistantDomain::Invoicing, confidence)
    }

    #[tokio::test]
    async fn confident_pattern_result_skips_llm_tier() {
        let tiered = TieredClassifier::new(
            Arc::new(FixedClassifier(intent("send_reminder", 0.9))),
            Some(Arc::new(FixedClassifier(intent("from_llm", 1.0)))),
            0.6,
        );

        let result = tiered.classify("skicka påminnelse", &test_context()).await.unwrap();
        assert_eq!(result.category, "send_reminder");
    }

    #[tokio::test]
    async fn unsure_pattern_result_asks_llm_tier() {
        let tiered = TieredClassifier::new(
            Arc::new(FixedClassifier(intent("vague", 0.3))),
            Some(Arc::new(FixedClassifier(intent("from_llm", 0.8)))),
            0.6,
        );

        let result = tiered.classify("hjälp mig", &test_context()).await.unwrap();
        assert_eq!(result.category, "from_llm");
    }

    #[tokio::test]
    async fn llm_failure_falls_back_to_pattern_guess() {
        let tiered = TieredClassifier::new(
            Arc::new(FixedClassifier(intent("vague", 0.3))),
            Some(Arc::new(FailingClassifier)),
            0.6,
        );

        let result = tiered.classify("hjälp mig", &test_context()).await.unwrap();
        assert_eq!(result.category, "vague");
        assert_eq!(result.confidence, 0.3);
    }

    #[tokio::test]
    async fn missing_llm_tier_uses_pattern_result() {
        let tiered = TieredClassifier::new(
            Arc::new(FixedClassifier(intent("vague", 0.3))),
            None,
            0.6,
        );

        let result = tiered.classify("hjälp mig", &test_context()).await.unwrap();
        assert_eq!(result.category, "vague");
    }
}
