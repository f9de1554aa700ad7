//! OpenAI-compatible inference client.
//!
//! Sends non-streaming chat completion requests to a local LLM endpoint
//! (Ollama's `/v1` by default) and turns the reply into a strict
//! [`OracleResponse`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::Deserialize;
use uuid::Uuid;

use super::errors::OracleError;
use super::oracle::{Oracle, OracleResponse};
use super::types::{
    ChatCompletionRequest, ChatMessage, FunctionCallResponse, ToolCallResponse, ToolDefinition,
};
use crate::agent_core::conversation::{ConversationContext, Turn};
use crate::config::OracleConfig;
use crate::protocol::{ToolCallRequest, ToolDescriptor};

// ─── Constants ───────────────────────────────────────────────────────────────

/// TCP connection timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

// ─── InferenceClient ─────────────────────────────────────────────────────────

/// Client for the chat completions endpoint.
pub struct InferenceClient {
    http: HttpClient,
    base_url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl InferenceClient {
    /// Build a client. Does NOT check connectivity; that happens on the
    /// first query.
    pub fn from_config(config: &OracleConfig) -> Result<Self, OracleError> {
        let base_url = config.base_url.trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(OracleError::ConfigError {
                reason: "oracle base_url is empty".into(),
            });
        }
        if config.model.trim().is_empty() {
            return Err(OracleError::ConfigError {
                reason: "oracle model is empty".into(),
            });
        }

        let http = HttpClient::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| OracleError::ConnectionFailed {
                endpoint: base_url.clone(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            http,
            base_url,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request_body(
        &self,
        context: &ConversationContext,
        catalog: &[ToolDescriptor],
    ) -> ChatCompletionRequest {
        let tools: Option<Vec<ToolDefinition>> = if catalog.is_empty() {
            None
        } else {
            Some(catalog.iter().map(ToolDefinition::from).collect())
        };

        ChatCompletionRequest {
            model: self.model.clone(),
            messages: build_messages(context),
            tool_choice: tools.as_ref().map(|_| "auto".to_string()),
            tools,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stream: false,
        }
    }
}

#[async_trait]
impl Oracle for InferenceClient {
    async fn query(
        &self,
        context: &ConversationContext,
        catalog: &[ToolDescriptor],
        deadline: Duration,
    ) -> Result<OracleResponse, OracleError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.request_body(context, catalog);

        // Metadata only; the body grows with every tool result.
        tracing::info!(
            url = %url,
            model = %body.model,
            message_count = body.messages.len(),
            tool_count = body.tools.as_ref().map(|t| t.len()).unwrap_or(0),
            "oracle request"
        );

        let timed_out = || OracleError::Timeout {
            duration_ms: deadline.as_millis() as u64,
        };

        let response = self
            .http
            .post(&url)
            .json(&body)
            .timeout(deadline)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    timed_out()
                } else {
                    OracleError::ConnectionFailed {
                        endpoint: url.clone(),
                        reason: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(OracleError::HttpError {
                status: status.as_u16(),
                body: body_text,
            });
        }

        let body_text = response.text().await.map_err(|e| {
            if e.is_timeout() {
                timed_out()
            } else {
                OracleError::MalformedResponse {
                    reason: format!("failed to read response body: {e}"),
                }
            }
        })?;

        parse_chat_response(&body_text)
    }
}

// ─── Context → Messages ──────────────────────────────────────────────────────

/// Convert the transcript into chat messages.
///
/// Tool-calling turns become assistant messages carrying `tool_calls`; every
/// tool result becomes a `tool` message with its rendered JSON.
pub fn build_messages(context: &ConversationContext) -> Vec<ChatMessage> {
    context
        .turns()
        .iter()
        .map(|turn| match turn {
            Turn::System(text) => ChatMessage::system(text),
            Turn::User(text) => ChatMessage::user(text),
            Turn::Oracle(oracle) => {
                let calls = if oracle.tool_calls.is_empty() {
                    None
                } else {
                    Some(
                        oracle
                            .tool_calls
                            .iter()
                            .map(|call| ToolCallResponse {
                                id: call.call_id.clone(),
                                r#type: "function".to_string(),
                                function: FunctionCallResponse {
                                    name: call.tool_name.clone(),
                                    arguments: call.arguments.to_string(),
                                },
                            })
                            .collect(),
                    )
                };
                ChatMessage::assistant(oracle.text.clone(), calls)
            }
            Turn::ToolResult(result) => ChatMessage::tool(&result.call_id, result.render()),
        })
        .collect()
}

// ─── Response Parsing ────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    content: Option<String>,
    tool_calls: Option<Vec<CompletionToolCall>>,
}

#[derive(Deserialize)]
struct CompletionToolCall {
    id: Option<String>,
    function: CompletionFunction,
}

#[derive(Deserialize)]
struct CompletionFunction {
    name: String,
    #[serde(default)]
    arguments: serde_json::Value,
}

/// Parse a non-streaming chat completion body. Fails closed.
pub fn parse_chat_response(body: &str) -> Result<OracleResponse, OracleError> {
    let resp: CompletionResponse =
        serde_json::from_str(body).map_err(|e| OracleError::MalformedResponse {
            reason: format!("failed to parse chat completion: {e}"),
        })?;

    let choice = resp
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| OracleError::MalformedResponse {
            reason: "empty choices array".into(),
        })?;

    let mut tool_calls = Vec::new();
    for tc in choice.message.tool_calls.unwrap_or_default() {
        let name = tc.function.name.trim().to_string();
        if name.is_empty() {
            return Err(OracleError::ToolCallParseError {
                raw: tc.function.arguments.to_string(),
                reason: "tool call has an empty function name".into(),
            });
        }
        let arguments = parse_arguments(&tc.function.arguments)?;
        let id = tc
            .id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| format!("call_{}", Uuid::new_v4()));
        tool_calls.push(ToolCallRequest::new(id, name, arguments));
    }

    OracleResponse::from_parts(tool_calls, choice.message.content)
}

/// Arguments arrive as a JSON object, or as a string holding one.
fn parse_arguments(raw: &serde_json::Value) -> Result<serde_json::Value, OracleError> {
    match raw {
        serde_json::Value::Object(_) => Ok(raw.clone()),
        serde_json::Value::Null => Ok(serde_json::json!({})),
        serde_json::Value::String(s) if s.trim().is_empty() => Ok(serde_json::json!({})),
        serde_json::Value::String(s) => match serde_json::from_str::<serde_json::Value>(s) {
            Ok(value @ serde_json::Value::Object(_)) => Ok(value),
            Ok(_) => Err(OracleError::ToolCallParseError {
                raw: s.clone(),
                reason: "arguments are not a JSON object".into(),
            }),
            Err(e) => Err(OracleError::ToolCallParseError {
                raw: s.clone(),
                reason: e.to_string(),
            }),
        },
        other => Err(OracleError::ToolCallParseError {
            raw: other.to_string(),
            reason: "arguments are not a JSON object".into(),
        }),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ErrorDetail, FieldKind, FieldSpec, InputSchema, ToolResult};
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn config(base_url: &str) -> OracleConfig {
        OracleConfig {
            base_url: base_url.to_string(),
            ..OracleConfig::default()
        }
    }

    fn reputation_descriptor() -> ToolDescriptor {
        ToolDescriptor {
            name: "check_ip_reputation".into(),
            description: "Check an IP".into(),
            input_schema: InputSchema::new()
                .field(FieldSpec::required("ip_address", FieldKind::String)),
        }
    }

    /// Serve one HTTP exchange with a canned JSON body; yields the request body.
    async fn one_shot_server(
        status_line: &'static str,
        response_body: String,
        delay: Duration,
    ) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            let (header_end, content_length) = loop {
                let n = stream.read(&mut chunk).await.unwrap();
                assert!(n > 0, "client closed before sending headers");
                buf.extend_from_slice(&chunk[..n]);
                if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                    let headers = String::from_utf8_lossy(&buf[..pos]).to_lowercase();
                    let len = headers
                        .lines()
                        .find_map(|l| l.strip_prefix("content-length:"))
                        .and_then(|v| v.trim().parse::<usize>().ok())
                        .unwrap_or(0);
                    break (pos + 4, len);
                }
            };
            while buf.len() < header_end + content_length {
                let n = stream.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
            }
            let request_body = String::from_utf8_lossy(&buf[header_end..]).to_string();

            tokio::time::sleep(delay).await;
            let reply = format!(
                "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{response_body}",
                response_body.len()
            );
            let _ = stream.write_all(reply.as_bytes()).await;
            let _ = stream.shutdown().await;
            request_body
        });
        (format!("http://{addr}/v1"), handle)
    }

    // ─── Parsing ─────────────────────────────────────────────────────────

    #[test]
    fn test_parse_final_text() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"Risk: LOW"},"finish_reason":"stop"}]}"#;
        assert_eq!(
            parse_chat_response(body).unwrap(),
            OracleResponse::FinalText("Risk: LOW".into())
        );
    }

    #[test]
    fn test_parse_tool_calls_string_and_object_arguments() {
        let body = json!({
            "choices": [{
                "message": {
                    "content": "",
                    "tool_calls": [
                        {"id": "call_a", "type": "function",
                         "function": {"name": "get_recent_alerts", "arguments": "{\"limit\":5}"}},
                        {"type": "function",
                         "function": {"name": "check_ip_reputation", "arguments": {"ip_address": "203.0.113.7"}}}
                    ]
                }
            }]
        })
        .to_string();

        let OracleResponse::ToolCalls(calls) = parse_chat_response(&body).unwrap() else {
            panic!("expected tool calls");
        };
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].call_id, "call_a");
        assert_eq!(calls[0].arguments, json!({"limit": 5}));
        assert!(calls[1].call_id.starts_with("call_"));
        assert_eq!(calls[1].arguments["ip_address"], "203.0.113.7");
    }

    #[test]
    fn test_parse_rejects_tool_calls_alongside_text() {
        let body = r#"{"choices":[{"message":{"content":"Final: BLOCK it","tool_calls":[{"id":"x","function":{"name":"get_recent_alerts","arguments":"{}"}}]}}]}"#;
        assert!(matches!(
            parse_chat_response(body),
            Err(OracleError::MalformedResponse { .. })
        ));
    }

    #[test]
    fn test_parse_empty_arguments_string_is_empty_object() {
        let body = r#"{"choices":[{"message":{"content":null,"tool_calls":[{"id":"x","function":{"name":"get_recent_alerts","arguments":""}}]}}]}"#;
        let OracleResponse::ToolCalls(calls) = parse_chat_response(body).unwrap() else {
            panic!("expected tool calls");
        };
        assert_eq!(calls[0].arguments, json!({}));
    }

    #[test]
    fn test_parse_rejects_non_object_arguments() {
        let array_args = r#"{"choices":[{"message":{"tool_calls":[{"id":"x","function":{"name":"t","arguments":"[1,2]"}}]}}]}"#;
        assert!(matches!(
            parse_chat_response(array_args),
            Err(OracleError::ToolCallParseError { .. })
        ));

        let broken = r#"{"choices":[{"message":{"tool_calls":[{"id":"x","function":{"name":"t","arguments":"{\"limit\":"}}]}}]}"#;
        assert!(matches!(
            parse_chat_response(broken),
            Err(OracleError::ToolCallParseError { .. })
        ));

        let number = r#"{"choices":[{"message":{"tool_calls":[{"id":"x","function":{"name":"t","arguments":7}}]}}]}"#;
        assert!(matches!(
            parse_chat_response(number),
            Err(OracleError::ToolCallParseError { .. })
        ));
    }

    #[test]
    fn test_parse_rejects_empty_tool_name() {
        let body = r#"{"choices":[{"message":{"tool_calls":[{"id":"x","function":{"name":"  ","arguments":"{}"}}]}}]}"#;
        assert!(matches!(
            parse_chat_response(body),
            Err(OracleError::ToolCallParseError { .. })
        ));
    }

    #[test]
    fn test_parse_malformed_and_empty() {
        assert!(matches!(
            parse_chat_response("not json"),
            Err(OracleError::MalformedResponse { .. })
        ));
        assert!(matches!(
            parse_chat_response(r#"{"choices":[]}"#),
            Err(OracleError::MalformedResponse { .. })
        ));
        assert!(matches!(
            parse_chat_response(r#"{"choices":[{"message":{"content":""}}]}"#),
            Err(OracleError::EmptyResponse)
        ));
    }

    // ─── Messages ────────────────────────────────────────────────────────

    #[test]
    fn test_build_messages_round_trips_tool_turns() {
        let mut ctx = ConversationContext::new("system text", "task text");
        let call = ToolCallRequest::new("call_1", "check_ip_reputation", json!({"ip_address": "1.2.3.4"}));
        ctx.push_tool_calls(vec![call.clone()]);
        ctx.push_results(vec![ToolResult::error(
            &call,
            ErrorDetail::new(crate::protocol::ErrorKind::HandlerError, "boom"),
        )]);

        let messages = serde_json::to_value(build_messages(&ctx)).unwrap();
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[1]["role"], "user");
        assert_eq!(messages[2]["role"], "assistant");
        assert_eq!(messages[2]["content"], "");
        assert_eq!(messages[2]["tool_calls"][0]["id"], "call_1");
        assert_eq!(
            messages[2]["tool_calls"][0]["function"]["arguments"],
            r#"{"ip_address":"1.2.3.4"}"#
        );
        assert_eq!(messages[3]["role"], "tool");
        assert_eq!(messages[3]["tool_call_id"], "call_1");
        let rendered: serde_json::Value =
            serde_json::from_str(messages[3]["content"].as_str().unwrap()).unwrap();
        assert_eq!(rendered["status"], "error");
        assert_eq!(rendered["error"]["kind"], "HandlerError");
    }

    #[test]
    fn test_from_config_rejects_empty_model() {
        let mut cfg = config("http://localhost:11434/v1");
        cfg.model = " ".into();
        assert!(matches!(
            InferenceClient::from_config(&cfg),
            Err(OracleError::ConfigError { .. })
        ));
    }

    // ─── HTTP ────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_query_posts_tools_and_parses_reply() {
        let reply = json!({"choices":[{"message":{"content":"No threats found."}}]}).to_string();
        let (base_url, server) = one_shot_server("200 OK", reply, Duration::ZERO).await;
        let client = InferenceClient::from_config(&config(&base_url)).unwrap();

        let ctx = ConversationContext::new("s", "u");
        let resp = client
            .query(&ctx, &[reputation_descriptor()], Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(resp, OracleResponse::FinalText("No threats found.".into()));

        let sent: serde_json::Value = serde_json::from_str(&server.await.unwrap()).unwrap();
        assert_eq!(sent["model"], "llama3.1:8b");
        assert_eq!(sent["stream"], false);
        assert_eq!(sent["tool_choice"], "auto");
        assert_eq!(sent["tools"][0]["function"]["name"], "check_ip_reputation");
    }

    #[tokio::test]
    async fn test_query_omits_tools_for_empty_catalog() {
        let reply = json!({"choices":[{"message":{"content":"ok"}}]}).to_string();
        let (base_url, server) = one_shot_server("200 OK", reply, Duration::ZERO).await;
        let client = InferenceClient::from_config(&config(&base_url)).unwrap();

        client
            .query(&ConversationContext::new("s", "u"), &[], Duration::from_secs(5))
            .await
            .unwrap();
        let sent: serde_json::Value = serde_json::from_str(&server.await.unwrap()).unwrap();
        assert!(sent.get("tools").is_none());
        assert!(sent.get("tool_choice").is_none());
    }

    #[tokio::test]
    async fn test_query_http_error() {
        let (base_url, _server) =
            one_shot_server("500 Internal Server Error", "model not loaded".into(), Duration::ZERO)
                .await;
        let client = InferenceClient::from_config(&config(&base_url)).unwrap();
        let err = client
            .query(&ConversationContext::new("s", "u"), &[], Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, OracleError::HttpError { status: 500, .. }));
        assert_eq!(err.error_body(), Some("model not loaded"));
    }

    #[tokio::test]
    async fn test_query_deadline_is_timeout() {
        let reply = json!({"choices":[{"message":{"content":"late"}}]}).to_string();
        let (base_url, _server) = one_shot_server("200 OK", reply, Duration::from_secs(5)).await;
        let client = InferenceClient::from_config(&config(&base_url)).unwrap();
        let err = client
            .query(&ConversationContext::new("s", "u"), &[], Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, OracleError::Timeout { duration_ms: 100 }));
    }

    #[tokio::test]
    async fn test_query_connection_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = InferenceClient::from_config(&config(&format!("http://{addr}/v1"))).unwrap();
        let err = client
            .query(&ConversationContext::new("s", "u"), &[], Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(matches!(err, OracleError::ConnectionFailed { .. }));
    }
}
