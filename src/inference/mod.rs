//! Inference: the oracle boundary.
//!
//! - [`Oracle`]: the trait the reasoning loop queries
//! - [`OracleResponse`]: tool calls XOR final text
//! - [`InferenceClient`]: OpenAI-compatible chat completions (Ollama by default)

pub mod client;
pub mod errors;
pub mod oracle;
pub mod types;

pub use client::{build_messages, parse_chat_response, InferenceClient};
pub use errors::OracleError;
pub use oracle::{Oracle, OracleResponse};
