//! Wire protocol shared by the planner and the tool host.
//!
//! - `types`: JSON-RPC 2.0 envelopes, MCP payloads, tool call data model
//! - `schema`: structural input schemas and argument validation
//! - `codec`: line-delimited framing over async byte streams

pub mod codec;
pub mod schema;
pub mod types;

pub use codec::{FrameError, MessageReader, MessageWriter};
pub use schema::{FieldKind, FieldSpec, InputSchema, SchemaError};
pub use types::{
    ErrorDetail, ErrorKind, JsonRpcMessage, JsonRpcRequest, JsonRpcResponse, PeerInfo,
    ToolCallRequest, ToolDescriptor, ToolResult, ToolStatus,
};
