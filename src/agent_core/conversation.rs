//! ConversationContext: the append-only transcript of one task.
//!
//! Holds the system instructions, the user task, every oracle turn and every
//! tool result in the order they happened. Owned by a single reasoning loop;
//! nothing is ever removed or rewritten.

use serde::Serialize;

use crate::protocol::{ToolCallRequest, ToolResult};

/// What the oracle produced on one turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OracleTurn {
    /// Final answer text. `None` on a tool-calling turn.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,
}

/// One entry of the transcript.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "role", content = "content", rename_all = "snake_case")]
pub enum Turn {
    System(String),
    User(String),
    Oracle(OracleTurn),
    ToolResult(ToolResult),
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationContext {
    turns: Vec<Turn>,
}

impl ConversationContext {
    /// Seed a context with the system instructions and the user task.
    pub fn new(system: impl Into<String>, task: impl Into<String>) -> Self {
        Self {
            turns: vec![Turn::System(system.into()), Turn::User(task.into())],
        }
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// Record a tool-calling oracle turn.
    pub fn push_tool_calls(&mut self, calls: Vec<ToolCallRequest>) {
        self.turns.push(Turn::Oracle(OracleTurn {
            text: None,
            tool_calls: calls,
        }));
    }

    /// Record the terminal oracle answer.
    pub fn push_final_text(&mut self, text: impl Into<String>) {
        self.turns.push(Turn::Oracle(OracleTurn {
            text: Some(text.into()),
            tool_calls: Vec::new(),
        }));
    }

    /// Append one batch of results, in the order given.
    pub fn push_results(&mut self, results: impl IntoIterator<Item = ToolResult>) {
        self.turns
            .extend(results.into_iter().map(Turn::ToolResult));
    }

    /// All tool results so far, in append order.
    pub fn tool_results(&self) -> impl Iterator<Item = &ToolResult> {
        self.turns.iter().filter_map(|turn| match turn {
            Turn::ToolResult(result) => Some(result),
            _ => None,
        })
    }

    /// Number of oracle turns recorded.
    pub fn oracle_turns(&self) -> usize {
        self.turns
            .iter()
            .filter(|turn| matches!(turn, Turn::Oracle(_)))
            .count()
    }

    /// Pretty JSON for diagnostics output.
    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(&self.turns).unwrap_or_else(|e| format!("<unserializable: {e}>"))
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ErrorDetail, ErrorKind};
    use serde_json::json;

    #[test]
    fn test_new_context_has_system_then_user() {
        let ctx = ConversationContext::new("be careful", "check alerts");
        assert_eq!(ctx.len(), 2);
        assert_eq!(ctx.turns()[0], Turn::System("be careful".into()));
        assert_eq!(ctx.turns()[1], Turn::User("check alerts".into()));
        assert_eq!(ctx.oracle_turns(), 0);
    }

    #[test]
    fn test_results_keep_append_order() {
        let mut ctx = ConversationContext::new("s", "u");
        let a = ToolCallRequest::new("a", "get_recent_alerts", json!({}));
        let b = ToolCallRequest::new("b", "nope", json!({}));
        ctx.push_tool_calls(vec![a.clone(), b.clone()]);
        ctx.push_results(vec![
            ToolResult::ok(&a, json!({"alert_count": 0})),
            ToolResult::error(&b, ErrorDetail::unknown_tool("nope")),
        ]);

        let ids: Vec<_> = ctx.tool_results().map(|r| r.call_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(
            ctx.tool_results().nth(1).and_then(|r| r.error_kind()),
            Some(ErrorKind::UnknownTool)
        );
        assert_eq!(ctx.oracle_turns(), 1);
    }

    #[test]
    fn test_json_shape() {
        let mut ctx = ConversationContext::new("s", "u");
        ctx.push_final_text("all clear");
        let value: serde_json::Value = serde_json::from_str(&ctx.to_json_pretty()).unwrap();
        assert_eq!(value[0]["role"], "system");
        assert_eq!(value[2]["role"], "oracle");
        assert_eq!(value[2]["content"]["text"], "all clear");
        assert!(value[2]["content"].get("tool_calls").is_none());
    }
}
