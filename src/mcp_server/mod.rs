//! Tool host: registry, handler seam, and the JSON-RPC server loop.
//!
//! The host answers `initialize`, `tools/list` and `tools/call` over any
//! async byte stream (TCP connections, its own stdio, in-memory pipes).

pub mod handler;
pub mod registry;
pub mod server;
pub mod tools;

pub use handler::{HandlerError, Tool, ToolHandler};
pub use registry::{RegistryError, ToolRegistry};
pub use server::ToolHost;
