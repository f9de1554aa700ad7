//! Agent core error types.

use thiserror::Error;

use crate::inference::OracleError;
use crate::mcp_client::McpError;

/// Unrecoverable faults that abort a task.
///
/// Tool-level failures never appear here; they are `ToolResult`s.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Connection, transport, or discovery failure.
    #[error("tool protocol failure: {0}")]
    Protocol(#[from] McpError),

    /// Malformed, absent, or timed-out oracle reply.
    #[error("oracle failure: {0}")]
    Oracle(#[from] OracleError),
}
