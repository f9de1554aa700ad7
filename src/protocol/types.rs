//! Wire types shared by the planner and the tool host.
//!
//! JSON-RPC 2.0 envelopes, MCP method names and payloads, and the
//! tool-level data model (`ToolDescriptor`, `ToolCallRequest`, `ToolResult`).

use serde::{Deserialize, Serialize};

use super::schema::InputSchema;

// ─── Protocol Constants ──────────────────────────────────────────────────────

/// JSON-RPC version string carried on every message.
pub const JSONRPC_VERSION: &str = "2.0";

/// Protocol revision negotiated during `initialize`.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Method names used on the wire.
pub mod methods {
    /// Handshake request (planner → host).
    pub const INITIALIZE: &str = "initialize";
    /// Handshake completion notification (planner → host).
    pub const INITIALIZED: &str = "notifications/initialized";
    /// Catalog discovery request.
    pub const TOOLS_LIST: &str = "tools/list";
    /// Tool invocation request.
    pub const TOOLS_CALL: &str = "tools/call";
    /// Teardown notification; the host closes the connection.
    pub const SHUTDOWN: &str = "shutdown";
}

// ─── JSON-RPC 2.0 ───────────────────────────────────────────────────────────

/// JSON-RPC 2.0 request or notification (a notification has no `id`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl JsonRpcRequest {
    /// Create a new JSON-RPC request.
    pub fn new(id: u64, method: &str, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id),
            method: method.to_string(),
            params,
        }
    }

    /// Create a notification (no response expected).
    pub fn notification(method: &str, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: None,
            method: method.to_string(),
            params,
        }
    }

    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// JSON-RPC 2.0 response message (success or error).
///
/// `id` is `None` only for errors about a request whose id could not be read
/// (e.g. a parse error).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn success(id: u64, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id),
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Option<u64>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// Any message that can appear on the wire.
///
/// Requests are tried first: a response never carries `method`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcMessage {
    Request(JsonRpcRequest),
    Response(JsonRpcResponse),
}

/// Well-known JSON-RPC error codes.
pub mod error_codes {
    /// Invalid JSON was received.
    pub const PARSE_ERROR: i32 = -32700;
    /// The JSON sent is not a valid Request object.
    pub const INVALID_REQUEST: i32 = -32600;
    /// The method does not exist or is not available.
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Invalid method parameters.
    pub const INVALID_PARAMS: i32 = -32602;
    /// Internal JSON-RPC error.
    pub const INTERNAL_ERROR: i32 = -32603;
}

// ─── Handshake ───────────────────────────────────────────────────────────────

/// Identity of one side of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerInfo {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
}

/// `initialize` request parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    pub protocol_version: String,
    pub client_info: PeerInfo,
}

/// `initialize` response payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    pub protocol_version: String,
    pub server_info: PeerInfo,
    #[serde(default)]
    pub capabilities: serde_json::Value,
}

// ─── Tools ───────────────────────────────────────────────────────────────────

/// A published tool: unique name, human-readable description, argument shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: InputSchema,
}

/// `tools/call` request parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallToolParams {
    pub name: String,
    #[serde(default)]
    pub arguments: serde_json::Value,
}

/// A content block in a `tools/call` result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: "text".to_string(),
            text: text.into(),
        }
    }
}

/// `tools/call` response payload.
///
/// Tool-level failures travel here with `is_error: true`; JSON-RPC errors
/// are reserved for protocol faults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallToolResult {
    #[serde(rename = "isError", default)]
    pub is_error: bool,
    #[serde(default)]
    pub content: Vec<ContentBlock>,
    #[serde(
        rename = "structuredContent",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub structured_content: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
}

impl CallToolResult {
    /// Successful result. The payload is echoed as text for plain MCP clients.
    pub fn ok(payload: serde_json::Value) -> Self {
        let text = serde_json::to_string_pretty(&payload).unwrap_or_else(|_| payload.to_string());
        Self {
            is_error: false,
            content: vec![ContentBlock::text(text)],
            structured_content: Some(payload),
            error: None,
        }
    }

    pub fn failed(detail: ErrorDetail) -> Self {
        Self {
            is_error: true,
            content: vec![ContentBlock::text(detail.message.clone())],
            structured_content: None,
            error: Some(detail),
        }
    }
}

// ─── Tool Calls & Results ────────────────────────────────────────────────────

/// A single tool invocation requested by the oracle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Unique within one oracle turn.
    pub call_id: String,
    pub tool_name: String,
    pub arguments: serde_json::Value,
}

impl ToolCallRequest {
    pub fn new(call_id: impl Into<String>, tool_name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            arguments,
        }
    }
}

/// Outcome status of a tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Ok,
    Error,
}

/// Classification of a tool-level failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    UnknownTool,
    InvalidArguments,
    HandlerError,
    Timeout,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::UnknownTool => "UnknownTool",
            ErrorKind::InvalidArguments => "InvalidArguments",
            ErrorKind::HandlerError => "HandlerError",
            ErrorKind::Timeout => "Timeout",
        };
        f.write_str(s)
    }
}

/// Structured description of a tool-level failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorDetail {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn unknown_tool(name: &str) -> Self {
        Self::new(ErrorKind::UnknownTool, format!("unknown tool: '{name}'"))
    }
}

/// Result of one tool call, owned by the reasoning loop once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub call_id: String,
    pub tool_name: String,
    pub status: ToolStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<ErrorDetail>,
}

impl ToolResult {
    pub fn ok(request: &ToolCallRequest, payload: serde_json::Value) -> Self {
        Self {
            call_id: request.call_id.clone(),
            tool_name: request.tool_name.clone(),
            status: ToolStatus::Ok,
            payload: Some(payload),
            error_detail: None,
        }
    }

    pub fn error(request: &ToolCallRequest, detail: ErrorDetail) -> Self {
        Self {
            call_id: request.call_id.clone(),
            tool_name: request.tool_name.clone(),
            status: ToolStatus::Error,
            payload: None,
            error_detail: Some(detail),
        }
    }

    /// Build a result from the host's `tools/call` payload.
    ///
    /// An error result without a structured detail is reported as a
    /// `HandlerError` carrying the text content.
    pub fn from_wire(request: &ToolCallRequest, wire: CallToolResult) -> Self {
        if wire.is_error {
            let detail = wire.error.unwrap_or_else(|| {
                let text = wire
                    .content
                    .iter()
                    .map(|c| c.text.as_str())
                    .collect::<Vec<_>>()
                    .join("\n");
                ErrorDetail::new(ErrorKind::HandlerError, text)
            });
            return Self::error(request, detail);
        }

        let payload = match wire.structured_content {
            Some(value) => value,
            None => {
                let text = wire
                    .content
                    .iter()
                    .map(|c| c.text.as_str())
                    .collect::<Vec<_>>()
                    .join("\n");
                serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text))
            }
        };
        Self::ok(request, payload)
    }

    pub fn is_ok(&self) -> bool {
        self.status == ToolStatus::Ok
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error_detail.as_ref().map(|d| d.kind)
    }

    /// Render the result as the JSON text shown to the oracle.
    pub fn render(&self) -> String {
        let body = match (&self.payload, &self.error_detail) {
            (_, Some(detail)) => serde_json::json!({
                "status": self.status,
                "error": detail,
            }),
            (Some(payload), None) => serde_json::json!({
                "status": self.status,
                "result": payload,
            }),
            (None, None) => serde_json::json!({ "status": self.status }),
        };
        body.to_string()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_omits_params_when_none() {
        let req = JsonRpcRequest::new(1, methods::INITIALIZE, None);
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"jsonrpc\":\"2.0\""));
        assert!(json.contains("\"id\":1"));
        assert!(!json.contains("params"));
    }

    #[test]
    fn test_notification_has_no_id() {
        let note = JsonRpcRequest::notification(methods::INITIALIZED, None);
        let json = serde_json::to_string(&note).unwrap();
        assert!(!json.contains("\"id\""));
        assert!(note.is_notification());
    }

    #[test]
    fn test_message_distinguishes_request_and_response() {
        let req: JsonRpcMessage =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":3,"method":"tools/list"}"#).unwrap();
        assert!(matches!(req, JsonRpcMessage::Request(ref r) if r.method == "tools/list"));

        let resp: JsonRpcMessage =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":3,"result":{"tools":[]}}"#).unwrap();
        assert!(matches!(resp, JsonRpcMessage::Response(ref r) if r.id == Some(3)));
    }

    #[test]
    fn test_parse_error_response_has_null_id() {
        let resp = JsonRpcResponse::failure(None, error_codes::PARSE_ERROR, "bad json");
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("\"id\":null"));
        assert!(json.contains("-32700"));
    }

    #[test]
    fn test_error_kind_serializes_by_variant_name() {
        let detail = ErrorDetail::new(ErrorKind::InvalidArguments, "missing field");
        let json = serde_json::to_value(&detail).unwrap();
        assert_eq!(json["kind"], "InvalidArguments");
    }

    #[test]
    fn test_from_wire_success_prefers_structured_content() {
        let req = ToolCallRequest::new("c1", "get_recent_alerts", serde_json::json!({}));
        let wire = CallToolResult::ok(serde_json::json!({"alert_count": 2}));
        let result = ToolResult::from_wire(&req, wire);
        assert!(result.is_ok());
        assert_eq!(result.call_id, "c1");
        assert_eq!(result.payload.unwrap()["alert_count"], 2);
    }

    #[test]
    fn test_from_wire_text_only_error_becomes_handler_error() {
        let req = ToolCallRequest::new("c2", "x", serde_json::json!({}));
        let wire = CallToolResult {
            is_error: true,
            content: vec![ContentBlock::text("boom")],
            structured_content: None,
            error: None,
        };
        let result = ToolResult::from_wire(&req, wire);
        assert_eq!(result.error_kind(), Some(ErrorKind::HandlerError));
        assert_eq!(result.error_detail.unwrap().message, "boom");
    }

    #[test]
    fn test_render_includes_error_detail() {
        let req = ToolCallRequest::new("c3", "check_ip_reputation", serde_json::json!({}));
        let result = ToolResult::error(&req, ErrorDetail::new(ErrorKind::Timeout, "took too long"));
        let text = result.render();
        assert!(text.contains("\"status\":\"error\""));
        assert!(text.contains("Timeout"));
        assert!(text.contains("took too long"));
    }
}
