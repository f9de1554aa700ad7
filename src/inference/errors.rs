//! Oracle error types.
//!
//! Every variant is fatal to the reasoning loop: the oracle boundary fails
//! closed rather than guessing at a malformed reply.

use thiserror::Error;

/// Errors that can occur while querying the oracle.
#[derive(Debug, Error)]
pub enum OracleError {
    /// TCP/HTTP connection to the model endpoint failed.
    #[error("connection failed to {endpoint}: {reason}")]
    ConnectionFailed { endpoint: String, reason: String },

    /// The oracle did not answer within its deadline.
    #[error("oracle timeout after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// Non-2xx HTTP response from the model endpoint.
    #[error("HTTP {status}: {body}")]
    HttpError { status: u16, body: String },

    /// The reply is not a chat completion we can read.
    #[error("malformed oracle response: {reason}")]
    MalformedResponse { reason: String },

    /// The reply carried neither tool calls nor text.
    #[error("oracle returned neither tool calls nor a final answer")]
    EmptyResponse,

    /// A tool call in the reply could not be parsed.
    #[error("tool call parse error: {reason}")]
    ToolCallParseError { raw: String, reason: String },

    /// Configuration loading or validation error.
    #[error("config error: {reason}")]
    ConfigError { reason: String },
}

impl OracleError {
    /// Extract the error body text, if this is an `HttpError`.
    pub fn error_body(&self) -> Option<&str> {
        match self {
            OracleError::HttpError { body, .. } => Some(body),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_body_http_error() {
        let err = OracleError::HttpError {
            status: 500,
            body: "model not loaded".to_string(),
        };
        assert_eq!(err.error_body(), Some("model not loaded"));
        assert_eq!(err.to_string(), "HTTP 500: model not loaded");
    }

    #[test]
    fn test_error_body_non_http() {
        let err = OracleError::Timeout { duration_ms: 5 };
        assert!(err.error_body().is_none());
    }
}
