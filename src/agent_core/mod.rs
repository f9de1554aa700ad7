//! Agent core: the planner's reasoning loop.
//!
//! Submodules:
//! - `conversation`: the append-only transcript of one task
//! - `prompt`: the SOC analyst system prompt
//! - `reasoning_loop`: the AWAITING_ORACLE / DISPATCHING_TOOLS state machine
//! - `planner`: connect → discover → loop → close
//! - `errors`: faults that abort a task

pub mod conversation;
pub mod errors;
pub mod planner;
pub mod prompt;
pub mod reasoning_loop;

pub use conversation::{ConversationContext, OracleTurn, Turn};
pub use errors::AgentError;
pub use planner::{run_task, run_with_client, TaskOptions};
pub use reasoning_loop::{
    LoopConfig, LoopOutcome, LoopPhase, LoopState, ReasoningLoop, TerminationReason,
};
