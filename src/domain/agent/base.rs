//! Base Agent - the call → tool → result loop for one domain handler.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use futures::{Stream, StreamExt};
use serde_json::json;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::domain::llm::LlmClient;
use crate::domain::tools::{PendingConfirmation, ToolError, ToolOutcome, ToolRegistry};
use crate::ports::{
    AuditLog, AuditRecord, AuditStatus, CallOptions, FinishReason, LlmError, LlmMessage,
    LlmResponse, LlmStreamChunk, LlmToolCall,
};

use super::context::AgentContext;
use super::profile::AgentProfile;

/// Errors that end an agent turn.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The loop hit its round bound. The caller gets this generic
    /// failure; full detail goes to the audit log.
    #[error("the request could not be completed")]
    MaxIterationsExceeded {
        /// Configured bound that was exceeded.
        max_rounds: usize,
    },

    /// Provider or timeout failure, unmodified.
    #[error(transparent)]
    Llm(#[from] LlmError),

    /// The confirmation store or audit log failed.
    #[error("storage failure: {0}")]
    Storage(String),
}

impl From<ToolError> for AgentError {
    fn from(err: ToolError) -> Self {
        // Only storage failures escape the registry on the execute path.
        AgentError::Storage(err.to_string())
    }
}

/// Final result of one agent turn.
#[derive(Debug, Clone)]
pub struct AgentReply {
    /// The model's final answer.
    pub content: String,
    /// Confirmations created during the turn, awaiting external resolve.
    pub pending_confirmations: Vec<PendingConfirmation>,
    /// Tool rounds the turn used.
    pub rounds_used: usize,
}

/// Events emitted by the streaming turn variant.
#[derive(Debug, Clone)]
pub enum AgentEvent {
    /// A fragment of generated text.
    TextDelta(String),
    /// A tool is about to execute; text emission is suspended.
    ToolStarted {
        /// Tool name.
        name: String,
    },
    /// A tool finished and its result was appended.
    ToolCompleted {
        /// Tool name.
        name: String,
        /// Whether the invocation succeeded.
        success: bool,
    },
    /// A mutating tool was parked; the boundary must resolve it.
    ConfirmationRequired(PendingConfirmation),
    /// The turn finished with this final answer.
    Completed(AgentReply),
}

/// Drives the call → tool → result loop for one domain handler.
pub struct BaseAgent {
    profile: AgentProfile,
    llm: Arc<LlmClient>,
    tools: Arc<ToolRegistry>,
    audit: Arc<dyn AuditLog>,
}

impl BaseAgent {
    /// Creates an agent for the given profile.
    pub fn new(
        profile: AgentProfile,
        llm: Arc<LlmClient>,
        tools: Arc<ToolRegistry>,
        audit: Arc<dyn AuditLog>,
    ) -> Self {
        Self {
            profile,
            llm,
            tools,
            audit,
        }
    }

    /// The profile this agent runs.
    pub fn profile(&self) -> &AgentProfile {
        &self.profile
    }

    fn initial_messages(&self, history: &[LlmMessage], user_message: &str) -> Vec<LlmMessage> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(LlmMessage::system(&self.profile.system_prompt));
        messages.extend(history.iter().cloned());
        messages.push(LlmMessage::user(user_message));
        messages
    }

    fn call_options(&self, messages: Vec<LlmMessage>) -> CallOptions {
        CallOptions::new(&self.profile.model)
            .with_messages(messages)
            .with_tools(self.tools.llm_definitions_for(&self.profile.allowed_tools))
    }

    /// Runs one blocking turn.
    pub async fn run_turn(
        &self,
        context: &AgentContext,
        history: &[LlmMessage],
        user_message: &str,
        cancel: &CancellationToken,
    ) -> Result<AgentReply, AgentError> {
        let mut messages = self.initial_messages(history, user_message);
        let mut pending_confirmations = Vec::new();
        let mut rounds = 0usize;

        loop {
            let response = self.llm.call(self.call_options(messages.clone()), cancel).await?;

            match response.finish_reason {
                FinishReason::Stop => {
                    let content = response.content.unwrap_or_default();
                    debug!(domain = %self.profile.domain, rounds, "turn finished");
                    return Ok(AgentReply {
                        content,
                        pending_confirmations,
                        rounds_used: rounds,
                    });
                }
                FinishReason::ToolCalls => {
                    rounds += 1;
                    if rounds > self.profile.max_rounds {
                        self.audit_round_overflow(context, &response).await;
                        return Err(AgentError::MaxIterationsExceeded {
                            max_rounds: self.profile.max_rounds,
                        });
                    }

                    let outcomes = self
                        .execute_calls(&response.tool_calls, context)
                        .await?;
                    for (call, outcome) in response.tool_calls.iter().zip(outcomes) {
                        if let ToolOutcome::Pending(confirmation) = &outcome {
                            pending_confirmations.push(confirmation.clone());
                        }
                        messages.push(tool_result_message(call, &outcome));
                    }
                }
            }
        }
    }

    /// Runs one streaming turn.
    ///
    /// Text deltas are forwarded as they arrive. On a completed tool-call
    /// boundary text emission suspends, the tool executes, its result is
    /// appended, and generation resumes. The model never receives a
    /// continuation before its own tool results are appended. Cancelling
    /// the token discards any unterminated tool-call accumulation.
    pub fn run_turn_streaming(
        &self,
        context: &AgentContext,
        history: &[LlmMessage],
        user_message: &str,
        cancel: &CancellationToken,
    ) -> impl Stream<Item = Result<AgentEvent, AgentError>> + Send + 'static {
        let (tx, rx) = mpsc::channel::<Result<AgentEvent, AgentError>>(32);

        let agent = StreamingTurn {
            profile: self.profile.clone(),
            llm: self.llm.clone(),
            tools: self.tools.clone(),
            audit: self.audit.clone(),
            context: context.clone(),
            cancel: cancel.clone(),
        };
        let messages = self.initial_messages(history, user_message);

        tokio::spawn(async move {
            let result = agent.drive(messages, tx.clone()).await;
            if let Err(failure) = result {
                let _ = tx.send(Err(failure)).await;
            }
        });

        futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        })
    }

    /// Executes requested calls concurrently; the returned outcomes are in
    /// request order regardless of completion order.
    async fn execute_calls(
        &self,
        calls: &[LlmToolCall],
        context: &AgentContext,
    ) -> Result<Vec<ToolOutcome>, AgentError> {
        let futures = calls.iter().map(|call| {
            let args = parse_call_arguments(call);
            self.tools.execute(&call.name, args, context)
        });

        join_all(futures)
            .await
            .into_iter()
            .collect::<Result<Vec<_>, ToolError>>()
            .map_err(AgentError::from)
    }

    async fn audit_round_overflow(&self, context: &AgentContext, response: &LlmResponse) {
        let requested: Vec<&str> = response.tool_calls.iter().map(|c| c.name.as_str()).collect();
        warn!(
            domain = %self.profile.domain,
            max_rounds = self.profile.max_rounds,
            ?requested,
            "agent exceeded tool round bound"
        );

        let record = AuditRecord::new(
            "agent_loop",
            json!({
                "domain": self.profile.domain,
                "max_rounds": self.profile.max_rounds,
                "requested_tools": requested,
            }),
            AuditStatus::Error,
            context.user_id.clone(),
        )
        .with_error(format!(
            "tool round bound of {} exceeded",
            self.profile.max_rounds
        ));

        if let Err(failure) = self.audit.append(record).await {
            warn!(%failure, "failed to audit round overflow");
        }
    }
}

/// Owned state for one spawned streaming turn.
struct StreamingTurn {
    profile: AgentProfile,
    llm: Arc<LlmClient>,
    tools: Arc<ToolRegistry>,
    audit: Arc<dyn AuditLog>,
    context: AgentContext,
    cancel: CancellationToken,
}

impl StreamingTurn {
    async fn drive(
        &self,
        mut messages: Vec<LlmMessage>,
        tx: mpsc::Sender<Result<AgentEvent, AgentError>>,
    ) -> Result<(), AgentError> {
        let mut content = String::new();
        let mut pending_confirmations = Vec::new();
        let mut rounds = 0usize;

        loop {
            let options = CallOptions::new(&self.profile.model)
                .with_messages(messages.clone())
                .with_tools(self.tools.llm_definitions_for(&self.profile.allowed_tools));
            let mut chunks = self.llm.stream(options, &self.cancel).await?;

            // Per-round accumulation: names by call id, results in request
            // order. Entries without a ToolCallEnd are discarded on cancel.
            let mut call_names: HashMap<String, String> = HashMap::new();
            let mut round_results: Vec<(LlmToolCall, ToolOutcome)> = Vec::new();
            let mut finish_reason = None;

            while let Some(chunk) = chunks.next().await {
                if self.cancel.is_cancelled() {
                    debug!("stream cancelled; discarding in-flight accumulation");
                    return Err(AgentError::Llm(LlmError::Cancelled));
                }

                match chunk? {
                    LlmStreamChunk::Text(delta) => {
                        content.push_str(&delta);
                        let _ = tx.send(Ok(AgentEvent::TextDelta(delta))).await;
                    }
                    LlmStreamChunk::ToolCallStart { id, name } => {
                        call_names.insert(id, name);
                    }
                    LlmStreamChunk::ToolCallDelta { .. } => {
                        // Fragments are accumulated by the adapter; the
                        // agent only acts on completed calls.
                    }
                    LlmStreamChunk::ToolCallEnd { id, arguments } => {
                        let name = call_names.get(&id).cloned().unwrap_or_default();
                        let call = LlmToolCall::new(id, name, arguments);

                        // Text emission is suspended while the tool runs.
                        let _ = tx
                            .send(Ok(AgentEvent::ToolStarted {
                                name: call.name.clone(),
                            }))
                            .await;
                        let outcome = self
                            .tools
                            .execute(&call.name, parse_call_arguments(&call), &self.context)
                            .await?;

                        match &outcome {
                            ToolOutcome::Pending(confirmation) => {
                                pending_confirmations.push(confirmation.clone());
                                let _ = tx
                                    .send(Ok(AgentEvent::ConfirmationRequired(
                                        confirmation.clone(),
                                    )))
                                    .await;
                            }
                            ToolOutcome::Completed(result) => {
                                let _ = tx
                                    .send(Ok(AgentEvent::ToolCompleted {
                                        name: call.name.clone(),
                                        success: result.success,
                                    }))
                                    .await;
                            }
                        }
                        round_results.push((call, outcome));
                    }
                    LlmStreamChunk::Done {
                        finish_reason: reason,
                        ..
                    } => {
                        finish_reason = Some(reason);
                        break;
                    }
                }
            }

            match finish_reason {
                Some(FinishReason::ToolCalls) => {
                    rounds += 1;
                    if rounds > self.profile.max_rounds {
                        self.audit_overflow(&round_results).await;
                        return Err(AgentError::MaxIterationsExceeded {
                            max_rounds: self.profile.max_rounds,
                        });
                    }
                    // Results were produced in request order; the model
                    // sees them appended before any continuation.
                    for (call, outcome) in round_results.drain(..) {
                        messages.push(tool_result_message(&call, &outcome));
                    }
                }
                Some(FinishReason::Stop) => {
                    let reply = AgentReply {
                        content,
                        pending_confirmations,
                        rounds_used: rounds,
                    };
                    let _ = tx.send(Ok(AgentEvent::Completed(reply))).await;
                    return Ok(());
                }
                None => {
                    // Stream ended without Done: treat as cancelled.
                    return Err(AgentError::Llm(LlmError::Cancelled));
                }
            }
        }
    }

    async fn audit_overflow(&self, round_results: &[(LlmToolCall, ToolOutcome)]) {
        let requested: Vec<&str> = round_results.iter().map(|(c, _)| c.name.as_str()).collect();
        let record = AuditRecord::new(
            "agent_loop",
            json!({
                "domain": self.profile.domain,
                "max_rounds": self.profile.max_rounds,
                "requested_tools": requested,
            }),
            AuditStatus::Error,
            self.context.user_id.clone(),
        )
        .with_error(format!(
            "tool round bound of {} exceeded",
            self.profile.max_rounds
        ));
        if let Err(failure) = self.audit.append(record).await {
            warn!(%failure, "failed to audit round overflow");
        }
    }
}

/// Arguments for the registry; malformed JSON is wrapped so schema
/// validation reports the failure back to the model.
fn parse_call_arguments(call: &LlmToolCall) -> serde_json::Value {
    call.parsed_arguments()
        .unwrap_or_else(|_| json!({ "_malformed_arguments": call.arguments }))
}

/// Builds the tool-role message for one outcome, tagged with the original
/// call id.
fn tool_result_message(call: &LlmToolCall, outcome: &ToolOutcome) -> LlmMessage {
    let payload = match outcome {
        ToolOutcome::Completed(result) => {
            serde_json::to_string(result).unwrap_or_else(|_| "{}".to_string())
        }
        ToolOutcome::Pending(confirmation) => json!({
            "status": "pending_confirmation",
            "confirmation_id": confirmation.confirmation_id(),
            "summary": confirmation.summary(),
        })
        .to_string(),
    };
    LlmMessage::tool_result(&call.id, payload)
}
