//! MCP client error types.
//!
//! Everything here is fatal to the current task. Tool-level failures never
//! show up as an `McpError`; they travel inside `ToolResult`.

use thiserror::Error;

use crate::protocol::FrameError;

/// Errors that can occur on the planner side of a session.
#[derive(Debug, Error)]
pub enum McpError {
    /// The session could not be established (connect, spawn, or handshake).
    #[error("connection to '{endpoint}' failed: {reason}")]
    Connection { endpoint: String, reason: String },

    /// Read/write failure or malformed framing mid-session.
    #[error("transport error on '{endpoint}': {reason}")]
    Transport { endpoint: String, reason: String },

    /// The host published a catalog that cannot be trusted.
    #[error("discovery failed: {reason}")]
    Discovery { reason: String },

    /// Host returned a JSON-RPC error response.
    #[error("server error [{code}]: {message}")]
    ServerError {
        code: i32,
        message: String,
        data: Option<serde_json::Value>,
    },

    /// A protocol request (not a tool call) exceeded its deadline.
    #[error("request '{method}' timed out after {timeout_ms}ms")]
    Timeout { method: String, timeout_ms: u64 },

    /// Endpoint string or host command could not be understood.
    #[error("config error: {reason}")]
    Config { reason: String },
}

impl McpError {
    pub(crate) fn transport(endpoint: &str, err: impl std::fmt::Display) -> Self {
        McpError::Transport {
            endpoint: endpoint.to_string(),
            reason: err.to_string(),
        }
    }

    pub(crate) fn from_frame(endpoint: &str, err: FrameError) -> Self {
        Self::transport(endpoint, err)
    }
}
