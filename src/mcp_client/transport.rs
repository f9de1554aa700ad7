//! Planner-side session over a line-delimited JSON-RPC stream.
//!
//! A `Session` owns the write half of the stream and a background reader
//! task. The reader routes each response to the caller waiting on its
//! request id, so many requests may be in flight on one session (needed
//! for concurrent tool batches). A response nobody is waiting for (e.g.
//! after the caller timed out) is dropped. Malformed framing or EOF fails
//! every pending and future request on the session.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, OnceLock};
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;

use super::errors::McpError;
use super::lifecycle::HostProcess;
use crate::protocol::codec::{MessageReader, MessageWriter};
use crate::protocol::types::{
    error_codes, methods, InitializeParams, InitializeResult, JsonRpcMessage, JsonRpcRequest,
    JsonRpcResponse, PeerInfo, PROTOCOL_VERSION,
};

/// Default deadline for protocol requests (handshake, discovery).
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// ─── Endpoint ────────────────────────────────────────────────────────────────

/// Where the tool host lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// `tcp://host:port` or bare `host:port`.
    Tcp(String),
    /// `stdio:<command> [args…]`: spawn the host and talk over its stdio.
    Stdio { command: String, args: Vec<String> },
}

impl FromStr for Endpoint {
    type Err = McpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(rest) = s.strip_prefix("stdio:") {
            let mut parts = rest.split_whitespace().map(str::to_string);
            let command = parts.next().ok_or_else(|| McpError::Config {
                reason: "stdio endpoint is missing a command".into(),
            })?;
            return Ok(Endpoint::Stdio {
                command,
                args: parts.collect(),
            });
        }

        let addr = match s.split_once("://") {
            Some(("tcp", addr)) => addr,
            Some((scheme, _)) => {
                return Err(McpError::Config {
                    reason: format!("unsupported endpoint scheme '{scheme}' (use tcp:// or stdio:)"),
                })
            }
            None => s,
        };

        match addr.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {
                Ok(Endpoint::Tcp(addr.to_string()))
            }
            _ => Err(McpError::Config {
                reason: format!("endpoint '{s}' is not host:port"),
            }),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp(addr) => write!(f, "tcp://{addr}"),
            Endpoint::Stdio { command, args } if args.is_empty() => write!(f, "stdio:{command}"),
            Endpoint::Stdio { command, args } => write!(f, "stdio:{command} {}", args.join(" ")),
        }
    }
}

/// Open a session to `endpoint` and complete the handshake.
pub async fn open_session(endpoint: &Endpoint, timeout: Duration) -> Result<Session, McpError> {
    let label = endpoint.to_string();
    tracing::info!(endpoint = %label, "opening session");

    match endpoint {
        Endpoint::Tcp(addr) => {
            let stream = match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
                Ok(Ok(stream)) => stream,
                Ok(Err(e)) => {
                    return Err(McpError::Connection {
                        endpoint: label,
                        reason: e.to_string(),
                    })
                }
                Err(_) => {
                    return Err(McpError::Connection {
                        endpoint: label,
                        reason: format!("connect timed out after {}ms", timeout.as_millis()),
                    })
                }
            };
            let _ = stream.set_nodelay(true);
            let (read, write) = stream.into_split();
            Session::establish(Session::start(&label, read, write, None), timeout).await
        }
        Endpoint::Stdio { command, args } => {
            let (host, stdin, stdout) = HostProcess::spawn(command, args)?;
            Session::establish(Session::start(&label, stdout, stdin, Some(host)), timeout).await
        }
    }
}

// ─── Session ─────────────────────────────────────────────────────────────────

type BoxWriter = Box<dyn AsyncWrite + Send + Unpin>;
type Waiter = oneshot::Sender<Result<JsonRpcResponse, String>>;

#[derive(Default)]
struct Pending {
    waiters: HashMap<u64, Waiter>,
    /// Set once the stream is unusable; new requests fail immediately.
    failed: Option<String>,
}

impl Pending {
    fn fail_all(&mut self, reason: &str) {
        if self.failed.is_none() {
            self.failed = Some(reason.to_string());
        }
        for (_, waiter) in self.waiters.drain() {
            let _ = waiter.send(Err(reason.to_string()));
        }
    }
}

fn lock(pending: &StdMutex<Pending>) -> MutexGuard<'_, Pending> {
    pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// One planner ↔ host session. Single-use per task.
pub struct Session {
    label: String,
    writer: Mutex<MessageWriter<BoxWriter>>,
    pending: Arc<StdMutex<Pending>>,
    reader_task: StdMutex<Option<JoinHandle<()>>>,
    host: Mutex<Option<HostProcess>>,
    server_info: OnceLock<PeerInfo>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl Session {
    /// Open a session over an existing byte stream (in-process host, tests)
    /// and complete the handshake.
    pub async fn connect_io<R, W>(
        label: &str,
        reader: R,
        writer: W,
        timeout: Duration,
    ) -> Result<Session, McpError>
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self::establish(Self::start(label, reader, writer, None), timeout).await
    }

    /// Wire up the stream without a handshake.
    pub(crate) fn start<R, W>(
        label: &str,
        reader: R,
        writer: W,
        host: Option<HostProcess>,
    ) -> Session
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let pending = Arc::new(StdMutex::new(Pending::default()));
        let reader_task = tokio::spawn(read_loop(
            label.to_string(),
            MessageReader::new(reader),
            Arc::clone(&pending),
        ));

        Session {
            label: label.to_string(),
            writer: Mutex::new(MessageWriter::new(Box::new(writer) as BoxWriter)),
            pending,
            reader_task: StdMutex::new(Some(reader_task)),
            host: Mutex::new(host),
            server_info: OnceLock::new(),
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        }
    }

    async fn establish(session: Session, timeout: Duration) -> Result<Session, McpError> {
        match session.handshake(timeout).await {
            Ok(()) => Ok(session),
            Err(e) => {
                session.close().await;
                Err(McpError::Connection {
                    endpoint: session.label.clone(),
                    reason: format!("handshake failed: {e}"),
                })
            }
        }
    }

    async fn handshake(&self, timeout: Duration) -> Result<(), McpError> {
        let params = InitializeParams {
            protocol_version: PROTOCOL_VERSION.to_string(),
            client_info: PeerInfo {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            },
        };
        let params = serde_json::to_value(params).map_err(|e| McpError::transport(&self.label, e))?;

        let result = self
            .request_with_deadline(methods::INITIALIZE, Some(params), timeout)
            .await?;
        let init: InitializeResult = serde_json::from_value(result).map_err(|e| {
            McpError::transport(&self.label, format!("bad initialize result: {e}"))
        })?;

        tracing::info!(
            endpoint = %self.label,
            server = %init.server_info.name,
            protocol = %init.protocol_version,
            "session initialized"
        );
        let _ = self.server_info.set(init.server_info);

        self.notify(methods::INITIALIZED, None).await
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Identity the host reported during the handshake.
    pub fn server_info(&self) -> Option<&PeerInfo> {
        self.server_info.get()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Write one message.
    pub async fn send(&self, message: &JsonRpcRequest) -> Result<(), McpError> {
        if self.is_closed() {
            return Err(McpError::transport(&self.label, "session is closed"));
        }
        let mut writer = self.writer.lock().await;
        writer
            .send(message)
            .await
            .map_err(|e| McpError::from_frame(&self.label, e))
    }

    /// Send a request and wait for its result under the default deadline.
    pub async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, McpError> {
        self.request_with_deadline(method, params, DEFAULT_REQUEST_TIMEOUT)
            .await
    }

    /// Send a request and wait for its result.
    ///
    /// On timeout the pending entry is removed, so a late response is
    /// discarded by the reader.
    pub async fn request_with_deadline(
        &self,
        method: &str,
        params: Option<Value>,
        deadline: Duration,
    ) -> Result<Value, McpError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = lock(&self.pending);
            if let Some(ref reason) = pending.failed {
                return Err(McpError::transport(&self.label, reason));
            }
            pending.waiters.insert(id, tx);
        }

        tracing::debug!(endpoint = %self.label, id, method, "sending request");
        if let Err(e) = self.send(&JsonRpcRequest::new(id, method, params)).await {
            lock(&self.pending).waiters.remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(deadline, rx).await {
            Ok(Ok(Ok(response))) => extract_result(response),
            Ok(Ok(Err(reason))) => Err(McpError::transport(&self.label, reason)),
            Ok(Err(_)) => Err(McpError::transport(&self.label, "response channel dropped")),
            Err(_) => {
                lock(&self.pending).waiters.remove(&id);
                Err(McpError::Timeout {
                    method: method.to_string(),
                    timeout_ms: deadline.as_millis() as u64,
                })
            }
        }
    }

    /// Send a notification (no response expected).
    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), McpError> {
        self.send(&JsonRpcRequest::notification(method, params)).await
    }

    /// Tear down the session. Idempotent; every step is best-effort.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!(endpoint = %self.label, "closing session");

        {
            let mut writer = self.writer.lock().await;
            let _ = writer
                .send(&JsonRpcRequest::notification(methods::SHUTDOWN, None))
                .await;
            let _ = writer.shutdown().await;
        }

        lock(&self.pending).fail_all("session closed");

        let task = self
            .reader_task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(task) = task {
            task.abort();
        }

        if let Some(mut host) = self.host.lock().await.take() {
            host.shutdown().await;
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.reader_task.lock() {
            if let Some(task) = slot.take() {
                task.abort();
            }
        }
    }
}

async fn read_loop<R: AsyncRead + Unpin>(
    label: String,
    mut reader: MessageReader<R>,
    pending: Arc<StdMutex<Pending>>,
) {
    let reason = loop {
        match reader.receive().await {
            Ok(Some(JsonRpcMessage::Response(response))) => {
                let waiter = response.id.and_then(|id| lock(&pending).waiters.remove(&id));
                match waiter {
                    Some(waiter) => {
                        let _ = waiter.send(Ok(response));
                    }
                    None => tracing::debug!(
                        endpoint = %label,
                        id = ?response.id,
                        "discarding unmatched response"
                    ),
                }
            }
            Ok(Some(JsonRpcMessage::Request(request))) => {
                tracing::debug!(
                    endpoint = %label,
                    method = %request.method,
                    "ignoring host-initiated message"
                );
            }
            Ok(None) => break "host closed the connection".to_string(),
            Err(e) => break e.to_string(),
        }
    };

    tracing::warn!(endpoint = %label, reason = %reason, "session reader stopped");
    lock(&pending).fail_all(&reason);
}

// ─── Response Helpers ────────────────────────────────────────────────────────

/// Extract the result from a JSON-RPC response, converting errors to `McpError`.
pub fn extract_result(response: JsonRpcResponse) -> Result<Value, McpError> {
    if let Some(err) = response.error {
        return Err(McpError::ServerError {
            code: err.code,
            message: err.message,
            data: err.data,
        });
    }

    response.result.ok_or(McpError::ServerError {
        code: error_codes::INTERNAL_ERROR,
        message: "response missing both result and error".into(),
        data: None,
    })
}

// ─── Tests ───────────────────────────────────────────────────────────────────
