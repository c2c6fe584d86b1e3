//! EventPublisher port - step lifecycle events from the orchestrator.
//!
//! The orchestrator announces workflow step dispatch and completion here
//! without knowing the transport. Adapters may fan out to websockets, a
//! queue, or keep events in memory for tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::foundation::{AssistantDomain, ConversationId, StepId};

/// One orchestration lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrchestrationEvent {
    /// A workflow step was handed to its domain agent.
    StepDispatched {
        conversation_id: ConversationId,
        step_id: StepId,
        domain: AssistantDomain,
    },
    /// A workflow step finished.
    StepCompleted {
        conversation_id: ConversationId,
        step_id: StepId,
        domain: AssistantDomain,
    },
    /// Every step of the plan finished.
    PlanCompleted {
        conversation_id: ConversationId,
        steps: usize,
    },
}

/// Port for publishing orchestration events.
///
/// Delivery is at-least-once; handlers may see duplicates.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publishes a single event.
    async fn publish(&self, event: OrchestrationEvent) -> Result<(), EventPublishError>;
}

/// Event publication failures.
#[derive(Debug, Clone, Error)]
pub enum EventPublishError {
    /// The transport is unreachable.
    #[error("event transport unavailable: {0}")]
    Unavailable(String),
}

/// Publisher that drops every event. Default when no transport is wired.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventPublisher;

#[async_trait]
impl EventPublisher for NoopEventPublisher {
    async fn publish(&self, _event: OrchestrationEvent) -> Result<(), EventPublishError> {
        Ok(())
    }
}
