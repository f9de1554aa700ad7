//! OpenAI Chat Completions wire types.
//!
//! Used to build requests from the conversation context and to parse the
//! non-streaming response.

use serde::{Deserialize, Serialize};

use crate::protocol::ToolDescriptor;

// ─── Request Types ───────────────────────────────────────────────────────────

/// A single message in the conversation.
///
/// Serialization notes for OpenAI-compatible local models:
/// - `content` must be `""` (not `null`) for assistant messages with tool calls.
///   Ollama misreads `null` content and loses the tool call round-trip.
/// - `tool_call_id` and `tool_calls` are skipped when `None`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    #[serde(serialize_with = "serialize_content")]
    pub content: Option<String>,
    /// Tool call results are sent back as `tool` role messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Assistant messages may contain tool calls.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallResponse>>,
}

impl ChatMessage {
    pub fn system(text: &str) -> Self {
        Self::plain(Role::System, text)
    }

    pub fn user(text: &str) -> Self {
        Self::plain(Role::User, text)
    }

    pub fn assistant(text: Option<String>, tool_calls: Option<Vec<ToolCallResponse>>) -> Self {
        Self {
            role: Role::Assistant,
            content: text,
            tool_call_id: None,
            tool_calls,
        }
    }

    pub fn tool(call_id: &str, content: String) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content),
            tool_call_id: Some(call_id.to_string()),
            tool_calls: None,
        }
    }

    fn plain(role: Role, text: &str) -> Self {
        Self {
            role,
            content: Some(text.to_string()),
            tool_call_id: None,
            tool_calls: None,
        }
    }
}

/// Emit `""` instead of `null` when `content` is `None`.
fn serialize_content<S>(value: &Option<String>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    match value {
        Some(s) => serializer.serialize_str(s),
        None => serializer.serialize_str(""),
    }
}

/// Message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// Tool definition sent in the request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub r#type: String,
    pub function: FunctionDefinition,
}

impl From<&ToolDescriptor> for ToolDefinition {
    fn from(descriptor: &ToolDescriptor) -> Self {
        Self {
            r#type: "function".to_string(),
            function: FunctionDefinition {
                name: descriptor.name.clone(),
                description: descriptor.description.clone(),
                parameters: descriptor.input_schema.to_json_schema(),
            },
        }
    }
}

/// Function definition within a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Request body for `POST /v1/chat/completions`.
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDefinition>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub stream: bool,
}

// ─── Response Types ──────────────────────────────────────────────────────────

/// Tool call as carried in an assistant message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallResponse {
    pub id: String,
    pub r#type: String,
    pub function: FunctionCallResponse,
}

/// Function call details. `arguments` is a JSON-encoded string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCallResponse {
    pub name: String,
    pub arguments: String,
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{FieldKind, FieldSpec, InputSchema};

    #[test]
    fn test_none_content_serializes_as_empty_string() {
        let msg = ChatMessage::assistant(None, Some(vec![]));
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["content"], "");
        assert_eq!(json["role"], "assistant");
    }

    #[test]
    fn test_tool_message_carries_call_id() {
        let msg = ChatMessage::tool("call_1", "{}".into());
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "tool");
        assert_eq!(json["tool_call_id"], "call_1");
        assert!(json.get("tool_calls").is_none());
    }

    #[test]
    fn test_tool_definition_from_descriptor() {
        let descriptor = ToolDescriptor {
            name: "check_ip_reputation".into(),
            description: "Check an IP".into(),
            input_schema: InputSchema::new()
                .field(FieldSpec::required("ip_address", FieldKind::String)),
        };
        let def = ToolDefinition::from(&descriptor);
        let json = serde_json::to_value(&def).unwrap();
        assert_eq!(json["type"], "function");
        assert_eq!(json["function"]["name"], "check_ip_reputation");
        assert_eq!(json["function"]["parameters"]["required"][0], "ip_address");
    }
}
