//! MCP client: the planner side of the tool protocol.
//!
//! This module handles:
//! - Opening a session to a tool host (TCP, or a spawned child over stdio)
//! - JSON-RPC 2.0 request/response multiplexing on that session
//! - Tool discovery and catalog validation
//! - Tool call dispatch, single or batched, with deadlines
//!
//! The reasoning loop drives everything through [`McpClient`].

pub mod catalog;
pub mod client;
pub mod discovery;
pub mod errors;
pub mod lifecycle;
pub mod transport;

pub use catalog::Catalog;
pub use client::McpClient;
pub use errors::McpError;
pub use transport::{open_session, Endpoint, Session};
