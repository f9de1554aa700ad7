//! The reasoning loop: a bounded oracle/tool state machine.
//!
//! ```text
//! AWAITING_ORACLE ──tool calls──▶ DISPATCHING_TOOLS ──all results──▶ AWAITING_ORACLE
//!        │                                  │
//!        ├──final text──▶ DONE              └──protocol fault──▶ ABORTED
//!        └──cap / oracle fault / cancel──▶ ABORTED
//! ```
//!
//! One batch is awaited in full before the next oracle query, and its
//! results are appended in request order. Tool-level errors are appended
//! like any other result; only protocol and oracle faults abort.

use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::conversation::ConversationContext;
use super::errors::AgentError;
use crate::inference::{Oracle, OracleError, OracleResponse};
use crate::mcp_client::McpClient;

// ─── Configuration ───────────────────────────────────────────────────────────

/// Loop bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopConfig {
    /// Maximum tool-dispatching iterations before the task is aborted.
    pub max_iterations: u32,
    /// Deadline for one oracle query.
    pub oracle_timeout: Duration,
    /// Deadline for one tool call.
    pub tool_timeout: Duration,
    /// Run the calls of one batch concurrently.
    pub parallel_tool_calls: bool,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            oracle_timeout: Duration::from_secs(120),
            tool_timeout: Duration::from_secs(30),
            parallel_tool_calls: true,
        }
    }
}

// ─── State ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoopPhase {
    AwaitingOracle,
    DispatchingTools,
    Done,
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    FinalAnswer,
    MaxIterationsExceeded,
    FatalError,
    Cancelled,
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TerminationReason::FinalAnswer => "final_answer",
            TerminationReason::MaxIterationsExceeded => "max_iterations_exceeded",
            TerminationReason::FatalError => "fatal_error",
            TerminationReason::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoopState {
    pub phase: LoopPhase,
    /// Number of AWAITING_ORACLE → DISPATCHING_TOOLS transitions.
    pub iteration_count: u32,
    pub terminated: bool,
    pub termination_reason: Option<TerminationReason>,
}

impl LoopState {
    fn new() -> Self {
        Self {
            phase: LoopPhase::AwaitingOracle,
            iteration_count: 0,
            terminated: false,
            termination_reason: None,
        }
    }

    fn enter(&mut self, phase: LoopPhase) {
        tracing::debug!(from = ?self.phase, to = ?phase, iteration = self.iteration_count, "loop transition");
        self.phase = phase;
    }

    fn terminate(&mut self, reason: TerminationReason) {
        let phase = if reason == TerminationReason::FinalAnswer {
            LoopPhase::Done
        } else {
            LoopPhase::Aborted
        };
        self.enter(phase);
        self.terminated = true;
        self.termination_reason = Some(reason);
    }
}

/// Everything the loop hands back: never a silent empty result.
#[derive(Debug)]
pub struct LoopOutcome {
    pub state: LoopState,
    pub final_answer: Option<String>,
    /// Description of the fault behind a `fatal_error` termination.
    pub fatal_error: Option<String>,
    pub oracle_queries: u32,
    /// The full context, partial on abort.
    pub context: ConversationContext,
}

impl LoopOutcome {
    /// A task that failed before the first oracle query.
    pub(crate) fn fatal_before_start(context: ConversationContext, error: &AgentError) -> Self {
        let mut state = LoopState::new();
        state.terminate(TerminationReason::FatalError);
        Self {
            state,
            final_answer: None,
            fatal_error: Some(error.to_string()),
            oracle_queries: 0,
            context,
        }
    }

    pub fn reason(&self) -> Option<TerminationReason> {
        self.state.termination_reason
    }

    pub fn is_final_answer(&self) -> bool {
        self.reason() == Some(TerminationReason::FinalAnswer)
    }

    /// One-line explanation for an aborted task.
    pub fn abort_message(&self) -> Option<String> {
        match self.reason()? {
            TerminationReason::FinalAnswer => None,
            TerminationReason::MaxIterationsExceeded => Some(format!(
                "Agent reached maximum iterations ({}) without completing analysis.",
                self.state.iteration_count
            )),
            TerminationReason::FatalError => Some(format!(
                "Task aborted: {}",
                self.fatal_error.as_deref().unwrap_or("unknown error")
            )),
            TerminationReason::Cancelled => Some("Task cancelled.".to_string()),
        }
    }
}

// ─── ReasoningLoop ───────────────────────────────────────────────────────────

/// Drives one task against one client and one oracle.
pub struct ReasoningLoop<'a> {
    client: &'a McpClient,
    oracle: &'a dyn Oracle,
    config: LoopConfig,
    cancel: CancellationToken,
}

impl<'a> ReasoningLoop<'a> {
    pub fn new(client: &'a McpClient, oracle: &'a dyn Oracle, config: LoopConfig) -> Self {
        Self {
            client,
            oracle,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Observe `token`; cancellation lands at the next phase boundary.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Run until a final answer, the iteration cap, a fatal fault, or
    /// cancellation.
    pub async fn run(&self, mut context: ConversationContext) -> LoopOutcome {
        let catalog = self.client.catalog().descriptors();
        let mut state = LoopState::new();
        let mut oracle_queries = 0u32;
        let mut final_answer = None;
        let mut fatal_error = None;

        tracing::info!(
            max_iterations = self.config.max_iterations,
            tool_count = catalog.len(),
            parallel = self.config.parallel_tool_calls,
            "reasoning loop started"
        );

        loop {
            // ── AWAITING_ORACLE ──────────────────────────────────────────
            state.enter(LoopPhase::AwaitingOracle);
            if self.cancel.is_cancelled() {
                state.terminate(TerminationReason::Cancelled);
                break;
            }
            if state.iteration_count >= self.config.max_iterations {
                tracing::warn!(
                    iterations = state.iteration_count,
                    "iteration cap reached"
                );
                state.terminate(TerminationReason::MaxIterationsExceeded);
                break;
            }

            oracle_queries += 1;
            let response = self.query_oracle(&context, catalog).await;
            let calls = match response {
                Ok(OracleResponse::FinalText(text)) => {
                    context.push_final_text(text.clone());
                    final_answer = Some(text);
                    state.terminate(TerminationReason::FinalAnswer);
                    break;
                }
                Ok(OracleResponse::ToolCalls(calls)) if calls.is_empty() => {
                    let err = AgentError::from(OracleError::EmptyResponse);
                    tracing::error!(error = %err, "oracle returned an empty batch");
                    fatal_error = Some(err.to_string());
                    state.terminate(TerminationReason::FatalError);
                    break;
                }
                Ok(OracleResponse::ToolCalls(calls)) => calls,
                Err(err) => {
                    tracing::error!(error = %err, "oracle query failed");
                    fatal_error = Some(err.to_string());
                    state.terminate(TerminationReason::FatalError);
                    break;
                }
            };

            // The oracle turn is recorded even if the batch never runs.
            context.push_tool_calls(calls.clone());

            // ── DISPATCHING_TOOLS ────────────────────────────────────────
            if self.cancel.is_cancelled() {
                state.terminate(TerminationReason::Cancelled);
                break;
            }
            state.iteration_count += 1;
            state.enter(LoopPhase::DispatchingTools);

            tracing::info!(
                iteration = state.iteration_count,
                batch_size = calls.len(),
                tools = ?calls.iter().map(|c| c.tool_name.as_str()).collect::<Vec<_>>(),
                "dispatching tool batch"
            );

            match self
                .client
                .call_batch(&calls, self.config.tool_timeout, self.config.parallel_tool_calls)
                .await
            {
                Ok(results) => context.push_results(results),
                Err(err) => {
                    let err = AgentError::from(err);
                    tracing::error!(error = %err, "tool batch failed");
                    fatal_error = Some(err.to_string());
                    state.terminate(TerminationReason::FatalError);
                    break;
                }
            }
        }

        tracing::info!(
            reason = ?state.termination_reason,
            iterations = state.iteration_count,
            oracle_queries,
            context_len = context.len(),
            "reasoning loop finished"
        );

        LoopOutcome {
            state,
            final_answer,
            fatal_error,
            oracle_queries,
            context,
        }
    }

    /// Query under the oracle deadline, enforced here as well as by the
    /// oracle itself.
    async fn query_oracle(
        &self,
        context: &ConversationContext,
        catalog: &[crate::protocol::ToolDescriptor],
    ) -> Result<OracleResponse, AgentError> {
        let deadline = self.config.oracle_timeout;
        match tokio::time::timeout(deadline, self.oracle.query(context, catalog, deadline)).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(OracleError::Timeout {
                duration_ms: deadline.as_millis() as u64,
            }
            .into()),
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
