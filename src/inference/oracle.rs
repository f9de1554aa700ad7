//! The oracle boundary consumed by the reasoning loop.

use std::time::Duration;

use async_trait::async_trait;

use super::errors::OracleError;
use crate::agent_core::conversation::ConversationContext;
use crate::protocol::{ToolCallRequest, ToolDescriptor};

/// What the oracle decided: call tools, or answer. Never both, never neither.
#[derive(Debug, Clone, PartialEq)]
pub enum OracleResponse {
    /// A non-empty batch of tool calls.
    ToolCalls(Vec<ToolCallRequest>),
    /// The terminal natural-language answer.
    FinalText(String),
}

impl OracleResponse {
    /// Classify a raw reply.
    ///
    /// Blank text counts as absent, since tool-calling replies usually carry
    /// `""` content. Tool calls together with real text are rejected, and so
    /// is a reply with neither.
    pub fn from_parts(
        tool_calls: Vec<ToolCallRequest>,
        text: Option<String>,
    ) -> Result<Self, OracleError> {
        let text = text.filter(|t| !t.trim().is_empty());
        match (tool_calls.is_empty(), text) {
            (false, None) => Ok(OracleResponse::ToolCalls(tool_calls)),
            (true, Some(text)) => Ok(OracleResponse::FinalText(text)),
            (false, Some(text)) => Err(OracleError::MalformedResponse {
                reason: format!(
                    "reply carries {} tool call(s) and {} chars of text",
                    tool_calls.len(),
                    text.len()
                ),
            }),
            (true, None) => Err(OracleError::EmptyResponse),
        }
    }
}

/// A decision-making component that sees the whole context and the catalog.
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Decide the next step. Must honor `deadline`; the loop also enforces it.
    async fn query(
        &self,
        context: &ConversationContext,
        catalog: &[ToolDescriptor],
        deadline: Duration,
    ) -> Result<OracleResponse, OracleError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_calls_with_text_are_rejected() {
        let calls = vec![ToolCallRequest::new("c1", "get_recent_alerts", json!({}))];
        assert!(matches!(
            OracleResponse::from_parts(calls, Some("Final: BLOCK it".into())),
            Err(OracleError::MalformedResponse { .. })
        ));
    }

    #[test]
    fn test_tool_calls_with_blank_text_are_accepted() {
        let calls = vec![ToolCallRequest::new("c1", "get_recent_alerts", json!({}))];
        let resp = OracleResponse::from_parts(calls.clone(), Some(" \n".into())).unwrap();
        assert_eq!(resp, OracleResponse::ToolCalls(calls));
    }

    #[test]
    fn test_text_only_is_final() {
        let resp = OracleResponse::from_parts(vec![], Some("Done.".into())).unwrap();
        assert_eq!(resp, OracleResponse::FinalText("Done.".into()));
    }

    #[test]
    fn test_neither_is_empty_response() {
        assert!(matches!(
            OracleResponse::from_parts(vec![], None),
            Err(OracleError::EmptyResponse)
        ));
        assert!(matches!(
            OracleResponse::from_parts(vec![], Some("   \n".into())),
            Err(OracleError::EmptyResponse)
        ));
    }
}
