//! Orchestrator - classify → plan → dispatch → aggregate.
//!
//! Wires the classifier, planner, and the per-domain agents into one
//! request pipeline. Independent workflow steps run concurrently with
//! bounded parallelism; dependent steps run strictly after their
//! dependencies complete.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::StreamExt;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::agent::{AgentContext, AgentError, AgentReply, BaseAgent};
use crate::domain::foundation::{AssistantDomain, StepId};
use crate::domain::intent::{Classifier, ClassifierError, Intent};
use crate::domain::tools::PendingConfirmation;
use crate::domain::workflow::{WorkflowPlanner, WorkflowStep};
use crate::ports::{EventPublisher, LlmMessage, OrchestrationEvent};

/// Orchestration failures.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// A plan step targets a domain with no registered agent.
    #[error("no agent registered for domain '{0}'")]
    UnknownDomain(AssistantDomain),

    /// Classification failed outright.
    #[error(transparent)]
    Classification(#[from] ClassifierError),

    /// A dispatched agent failed.
    #[error(transparent)]
    Agent(#[from] AgentError),
}

/// Aggregated response for one user request.
#[derive(Debug, Clone)]
pub struct OrchestratorResponse {
    /// Aggregated answer text, step results in plan order.
    pub content: String,
    /// The classified intent, when classification ran to completion.
    pub intent: Option<Intent>,
    /// Confirmations created anywhere in the plan.
    pub pending_confirmations: Vec<PendingConfirmation>,
    /// True when the assistant asked a clarifying question instead of
    /// dispatching.
    pub needs_clarification: bool,
}

/// Request pipeline over the domain agents.
pub struct Orchestrator {
    classifier: Arc<dyn Classifier>,
    planner: WorkflowPlanner,
    agents: HashMap<AssistantDomain, Arc<BaseAgent>>,
    events: Arc<dyn EventPublisher>,
    confidence_threshold: f32,
    max_parallel_steps: usize,
}

impl Orchestrator {
    /// Creates an orchestrator.
    pub fn new(
        classifier: Arc<dyn Classifier>,
        events: Arc<dyn EventPublisher>,
        confidence_threshold: f32,
        max_parallel_steps: usize,
    ) -> Self {
        Self {
            classifier,
            planner: WorkflowPlanner::new(),
            agents: HashMap::new(),
            events,
            confidence_threshold,
            max_parallel_steps: max_parallel_steps.max(1),
        }
    }

    /// Registers the agent for one domain.
    pub fn with_agent(mut self, agent: Arc<BaseAgent>) -> Self {
        self.agents.insert(agent.profile().domain, agent);
        self
    }

    /// Handles one user request end to end.
    pub async fn handle(
        &self,
        context: &AgentContext,
        history: &[LlmMessage],
        user_message: &str,
        cancel: &CancellationToken,
    ) -> Result<OrchestratorResponse, OrchestratorError> {
        let intent = self.classifier.classify(user_message, context).await?;
        debug!(
            category = %intent.category,
            domain = %intent.target_domain,
            confidence = intent.confidence,
            "classified request"
        );

        if intent.confidence < self.confidence_threshold {
            info!(confidence = intent.confidence, "asking for clarification");
            return Ok(OrchestratorResponse {
                content: "Jag är inte säker på vad du vill göra. Gäller det fakturor, \
                          bokföring, skatt, kunder eller rapporter?"
                    .to_string(),
                intent: Some(intent),
                pending_confirmations: Vec::new(),
                needs_clarification: true,
            });
        }

        let plan = self.planner.plan(&intent);
        let context = context.clone().with_intent(intent.clone());

        let mut completed: HashSet<StepId> = HashSet::new();
        let mut replies: Vec<(StepId, AgentReply)> = Vec::new();

        while !plan.is_complete(&completed) {
            let wave = plan.executable_steps(&completed);
            if wave.is_empty() {
                // Unsatisfiable dependencies would loop forever otherwise.
                warn!("plan has unexecutable remainder; stopping");
                break;
            }

            let dispatched: Vec<_> = wave
                .iter()
                .map(|step| self.dispatch(step, &context, history, user_message, cancel))
                .collect();

            let wave_results: Vec<(StepId, Result<AgentReply, OrchestratorError>)> =
                futures::stream::iter(dispatched)
                    .buffered(self.max_parallel_steps)
                    .collect()
                    .await;

            for (step_id, result) in wave_results {
                let reply = result?;
                completed.insert(step_id);
                replies.push((step_id, reply));
            }
        }

        let _ = self
            .events
            .publish(OrchestrationEvent::PlanCompleted {
                conversation_id: context.conversation_id,
                steps: completed.len(),
            })
            .await;

        // Aggregate in plan order, not completion order.
        let mut contents = Vec::new();
        let mut pending = Vec::new();
        for step in plan.steps() {
            if let Some((_, reply)) = replies.iter().find(|(id, _)| *id == step.id) {
                if !reply.content.is_empty() {
                    contents.push(reply.content.clone());
                }
                pending.extend(reply.pending_confirmations.iter().cloned());
            }
        }

        Ok(OrchestratorResponse {
            content: contents.join("\n\n"),
            intent: Some(intent),
            pending_confirmations: pending,
            needs_clarification: false,
        })
    }

    /// Dispatches one step to its domain agent.
    ///
    /// Returns a future resolving to the step id and the agent's reply,
    /// so a wave of these can run concurrently while completion is still
    /// attributed per step.
    async fn dispatch(
        &self,
        step: &WorkflowStep,
        context: &AgentContext,
        history: &[LlmMessage],
        user_message: &str,
        cancel: &CancellationToken,
    ) -> (StepId, Result<AgentReply, OrchestratorError>) {
        let step_id = step.id;
        let Some(agent) = self.agents.get(&step.domain) else {
            return (step_id, Err(OrchestratorError::UnknownDomain(step.domain)));
        };

        let _ = self
            .events
            .publish(OrchestrationEvent::StepDispatched {
                conversation_id: context.conversation_id,
                step_id,
                domain: step.domain,
            })
            .await;
        debug!(step = %step_id, domain = %step.domain, action = %step.action, "dispatching step");

        let message = step_message(step, user_message);
        let result = agent
            .run_turn(context, history, &message, cancel)
            .await
            .map_err(OrchestratorError::from);

        let _ = self
            .events
            .publish(OrchestrationEvent::StepCompleted {
                conversation_id: context.conversation_id,
                step_id,
                domain: step.domain,
            })
            .await;

        (step_id, result)
    }
}

/// The message a step's agent sees. Single-step plans pass the user's
/// words through untouched; fan-out steps get the step action as framing.
fn step_message(step: &WorkflowStep, user_message: &str) -> String {
    if step.depends_on.is_empty() && step.action != "reconcile" {
        user_message.to_string()
    } else {
        format!("{} (steg: {})", user_message, step.action)
    }
}
