//! JSON-RPC tool host.
//!
//! Serves one registry over any number of connections. Each connection
//! has a single writer task fed by a channel; `tools/call` requests run on
//! their own tasks so independent calls proceed concurrently and their
//! responses may go out in completion order.

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use super::registry::ToolRegistry;
use crate::protocol::codec::{FrameError, MessageReader, MessageWriter};
use crate::protocol::types::{
    error_codes, methods, CallToolParams, CallToolResult, InitializeResult, JsonRpcMessage,
    JsonRpcRequest, JsonRpcResponse, PeerInfo, JSONRPC_VERSION, PROTOCOL_VERSION,
};

/// A tool host bound to one registry.
pub struct ToolHost {
    registry: Arc<ToolRegistry>,
    info: PeerInfo,
}

impl ToolHost {
    pub fn new(registry: ToolRegistry) -> Self {
        Self::shared(Arc::new(registry))
    }

    /// Host over a registry shared with other hosts.
    pub fn shared(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            info: PeerInfo {
                name: "soc-host".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            },
        }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    // ─── Transports ──────────────────────────────────────────────────────

    /// Accept connections forever, serving each on its own task.
    pub async fn serve_tcp(self: Arc<Self>, listener: TcpListener) -> std::io::Result<()> {
        tracing::info!(addr = ?listener.local_addr().ok(), tools = self.registry.len(), "tool host listening");
        loop {
            let (stream, addr) = listener.accept().await?;
            let _ = stream.set_nodelay(true);
            let host = Arc::clone(&self);
            tokio::spawn(async move {
                let peer = addr.to_string();
                let (read, write) = stream.into_split();
                host.serve_connection(read, write, &peer).await;
            });
        }
    }

    /// Serve a single planner over this process's stdin/stdout.
    pub async fn serve_stdio(&self) {
        self.serve_connection(tokio::io::stdin(), tokio::io::stdout(), "stdio")
            .await;
    }

    // ─── Connection Loop ─────────────────────────────────────────────────

    /// Serve one connection until the peer disconnects or sends `shutdown`.
    ///
    /// Never fails: a broken stream just ends the connection.
    pub async fn serve_connection<R, W>(&self, reader: R, writer: W, peer: &str)
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        tracing::info!(peer, "connection opened");

        let (tx, mut rx) = mpsc::unbounded_channel::<JsonRpcResponse>();
        let writer_peer = peer.to_string();
        let writer_task = tokio::spawn(async move {
            let mut writer = MessageWriter::new(writer);
            while let Some(response) = rx.recv().await {
                if let Err(e) = writer.send(&response).await {
                    tracing::warn!(peer = %writer_peer, error = %e, "write failed, dropping connection");
                    break;
                }
            }
            let _ = writer.shutdown().await;
        });

        let mut reader = MessageReader::new(reader);
        let mut in_flight = JoinSet::new();

        loop {
            let request = match reader.receive().await {
                Ok(Some(JsonRpcMessage::Request(request))) => request,
                Ok(Some(JsonRpcMessage::Response(response))) => {
                    tracing::debug!(peer, id = ?response.id, "ignoring response from planner");
                    continue;
                }
                Ok(None) => {
                    tracing::info!(peer, "peer closed the connection");
                    break;
                }
                Err(FrameError::Malformed { reason, .. }) => {
                    tracing::warn!(peer, reason = %reason, "malformed frame");
                    let _ = tx.send(JsonRpcResponse::failure(
                        None,
                        error_codes::PARSE_ERROR,
                        format!("parse error: {reason}"),
                    ));
                    continue;
                }
                Err(FrameError::Io(e)) => {
                    tracing::warn!(peer, error = %e, "read failed");
                    break;
                }
            };

            let Some(id) = request.id else {
                if request.method == methods::SHUTDOWN {
                    tracing::info!(peer, "shutdown requested");
                    break;
                }
                tracing::debug!(peer, method = %request.method, "notification");
                continue;
            };

            if request.jsonrpc != JSONRPC_VERSION {
                let _ = tx.send(JsonRpcResponse::failure(
                    Some(id),
                    error_codes::INVALID_REQUEST,
                    format!("unsupported jsonrpc version '{}'", request.jsonrpc),
                ));
                continue;
            }

            match request.method.as_str() {
                methods::INITIALIZE => {
                    let _ = tx.send(self.initialize(id, &request, peer));
                }
                methods::TOOLS_LIST => {
                    let tools = self.registry.descriptors();
                    let result = serde_json::json!({ "tools": tools });
                    let _ = tx.send(JsonRpcResponse::success(id, result));
                }
                methods::TOOLS_CALL => match parse_call_params(&request) {
                    Ok(params) => {
                        let registry = Arc::clone(&self.registry);
                        let tx = tx.clone();
                        let peer = peer.to_string();
                        in_flight.spawn(async move {
                            let response = run_tool(&registry, id, params, &peer).await;
                            let _ = tx.send(response);
                        });
                    }
                    Err(message) => {
                        let _ = tx.send(JsonRpcResponse::failure(
                            Some(id),
                            error_codes::INVALID_PARAMS,
                            message,
                        ));
                    }
                },
                other => {
                    let _ = tx.send(JsonRpcResponse::failure(
                        Some(id),
                        error_codes::METHOD_NOT_FOUND,
                        format!("method not found: '{other}'"),
                    ));
                }
            }
        }

        // Let running calls finish so their responses are written.
        while in_flight.join_next().await.is_some() {}
        drop(tx);
        let _ = writer_task.await;
        tracing::info!(peer, "connection closed");
    }

    fn initialize(&self, id: u64, request: &JsonRpcRequest, peer: &str) -> JsonRpcResponse {
        let client = request
            .params
            .as_ref()
            .and_then(|p| p.get("clientInfo"))
            .and_then(|c| c.get("name"))
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        tracing::info!(peer, client, "initialize");

        let result = InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            server_info: self.info.clone(),
            capabilities: serde_json::json!({ "tools": { "listChanged": false } }),
        };
        match serde_json::to_value(result) {
            Ok(value) => JsonRpcResponse::success(id, value),
            Err(e) => JsonRpcResponse::failure(Some(id), error_codes::INTERNAL_ERROR, e.to_string()),
        }
    }
}

fn parse_call_params(request: &JsonRpcRequest) -> Result<CallToolParams, String> {
    let params = request
        .params
        .clone()
        .ok_or_else(|| "tools/call requires params".to_string())?;
    serde_json::from_value(params).map_err(|e| format!("invalid tools/call params: {e}"))
}

async fn run_tool(
    registry: &ToolRegistry,
    id: u64,
    params: CallToolParams,
    peer: &str,
) -> JsonRpcResponse {
    let start = Instant::now();
    let outcome = registry.call(&params.name, params.arguments).await;
    let elapsed_ms = start.elapsed().as_millis() as u64;

    let result = match outcome {
        Ok(payload) => {
            tracing::info!(peer, tool = %params.name, elapsed_ms, "tool ok");
            CallToolResult::ok(payload)
        }
        Err(detail) => {
            tracing::warn!(
                peer,
                tool = %params.name,
                kind = %detail.kind,
                message = %detail.message,
                elapsed_ms,
                "tool error"
            );
            CallToolResult::failed(detail)
        }
    };

    match serde_json::to_value(result) {
        Ok(value) => JsonRpcResponse::success(id, value),
        Err(e) => JsonRpcResponse::failure(Some(id), error_codes::INTERNAL_ERROR, e.to_string()),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
