//! SOC analyst agent.
//!
//! A tool host publishing SOC investigation tools over a line-delimited
//! JSON-RPC protocol, and a planner that discovers them and drives a
//! bounded oracle/tool reasoning loop.

pub mod agent_core;
pub mod config;
pub mod inference;
pub mod mcp_client;
pub mod mcp_server;
pub mod protocol;

/// Initialize the tracing subscriber on stderr.
///
/// stdout is left alone: the stdio transport and the final report use it.
/// `RUST_LOG` overrides the default filter; `LOG_FORMAT=json` switches to
/// one JSON object per line.
pub fn init_tracing() {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("soc_agent=info,soc_host=info,warn"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let result = if json {
        fmt::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(true)
            .try_init()
    } else {
        fmt::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(false)
            .try_init()
    };

    if let Err(e) = result {
        eprintln!("tracing already initialized: {e}");
    }
}

// ─── Test Support ────────────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod test_support {
    //! Shared fixtures: in-memory host/session pairs, a spy tool, and
    //! oracle stubs.

    use std::net::IpAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use serde::Deserialize;
    use serde_json::{json, Value};
    use tokio::task::JoinHandle;

    use crate::agent_core::conversation::ConversationContext;
    use crate::inference::{Oracle, OracleError, OracleResponse};
    use crate::mcp_client::{McpClient, Session};
    use crate::mcp_server::handler::{HandlerError, Tool};
    use crate::mcp_server::tools::geolocation::{GeoError, GeoLocator, GeoRecord};
    use crate::mcp_server::{ToolHost, ToolRegistry};
    use crate::protocol::codec::{MessageReader, MessageWriter};
    use crate::protocol::types::{error_codes, methods, JsonRpcMessage, JsonRpcResponse};
    use crate::protocol::{FieldKind, FieldSpec, InputSchema, ToolDescriptor};

    const PIPE_CAPACITY: usize = 64 * 1024;

    // ─── Tools ───────────────────────────────────────────────────────────

    #[derive(Deserialize)]
    pub(crate) struct SpyArgs {
        target: String,
    }

    /// Echoes `target` and counts invocations.
    #[derive(Default)]
    pub(crate) struct SpyTool {
        calls: AtomicUsize,
    }

    impl SpyTool {
        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Tool for SpyTool {
        type Args = SpyArgs;

        fn name(&self) -> &str {
            "spy"
        }

        fn description(&self) -> &str {
            "Echo the target back"
        }

        fn input_schema(&self) -> InputSchema {
            InputSchema::new().field(FieldSpec::required("target", FieldKind::String))
        }

        async fn call(&self, args: SpyArgs) -> Result<Value, HandlerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(json!({ "echo": args.target }))
        }
    }

    /// Answers every lookup with a fixed record.
    pub(crate) struct NoNetworkLocator;

    #[async_trait]
    impl GeoLocator for NoNetworkLocator {
        async fn locate(&self, ip: IpAddr) -> Result<GeoRecord, GeoError> {
            if ip.is_unspecified() {
                return Err(GeoError::Unresolvable(ip.to_string()));
            }
            Ok(GeoRecord {
                country: "Netherlands".into(),
                region: "North Holland".into(),
                city: "Amsterdam".into(),
                isp: "Example Hosting".into(),
                organization: "Example Org".into(),
                asn: "AS64500 Example".into(),
            })
        }
    }

    // ─── Hosts ───────────────────────────────────────────────────────────

    /// A real `ToolHost` on one end of a duplex pipe, a connected client on
    /// the other.
    pub(crate) async fn connect_in_memory(registry: ToolRegistry) -> McpClient {
        let (planner_io, host_io) = tokio::io::duplex(PIPE_CAPACITY);
        let host = ToolHost::new(registry);
        tokio::spawn(async move {
            let (read, write) = tokio::io::split(host_io);
            host.serve_connection(read, write, "in-memory").await;
        });

        let (read, write) = tokio::io::split(planner_io);
        let session = Session::connect_io("in-memory", read, write, Duration::from_secs(2))
            .await
            .unwrap();
        McpClient::from_session(session).await.unwrap()
    }

    /// A scripted host that answers `initialize` and replies to
    /// `tools/list` with `tools_list_result` verbatim.
    ///
    /// Keeps serving until `shutdown` or EOF; the handle yields every
    /// request method it saw, in order.
    pub(crate) async fn connect_raw_host(tools_list_result: Value) -> (Session, JoinHandle<Vec<String>>) {
        raw_host(tools_list_result, false).await
    }

    /// Like [`connect_raw_host`], but the host hangs up right after
    /// answering `tools/list`.
    pub(crate) async fn connect_dropping_host(
        tools_list_result: Value,
    ) -> (Session, JoinHandle<Vec<String>>) {
        raw_host(tools_list_result, true).await
    }

    async fn raw_host(
        tools_list_result: Value,
        drop_after_list: bool,
    ) -> (Session, JoinHandle<Vec<String>>) {
        let (planner_io, host_io) = tokio::io::duplex(PIPE_CAPACITY);
        let handle = tokio::spawn(async move {
            let (read, write) = tokio::io::split(host_io);
            let mut reader = MessageReader::new(read);
            let mut writer = MessageWriter::new(write);
            let mut seen = Vec::new();

            while let Ok(Some(message)) = reader.receive().await {
                let JsonRpcMessage::Request(request) = message else {
                    continue;
                };
                let Some(id) = request.id else {
                    if request.method == methods::SHUTDOWN {
                        break;
                    }
                    continue;
                };
                seen.push(request.method.clone());

                let response = match request.method.as_str() {
                    methods::INITIALIZE => JsonRpcResponse::success(
                        id,
                        json!({
                            "protocolVersion": crate::protocol::types::PROTOCOL_VERSION,
                            "serverInfo": {"name": "raw-host"},
                            "capabilities": {}
                        }),
                    ),
                    methods::TOOLS_LIST => JsonRpcResponse::success(id, tools_list_result.clone()),
                    other => JsonRpcResponse::failure(
                        Some(id),
                        error_codes::METHOD_NOT_FOUND,
                        format!("method not found: {other}"),
                    ),
                };
                if writer.send(&response).await.is_err() {
                    break;
                }
                if drop_after_list && request.method == methods::TOOLS_LIST {
                    break;
                }
            }
            let _ = writer.shutdown().await;
            seen
        });

        let (read, write) = tokio::io::split(planner_io);
        let session = Session::connect_io("raw-host", read, write, Duration::from_secs(2))
            .await
            .unwrap();
        (session, handle)
    }

    // ─── Oracles ─────────────────────────────────────────────────────────

    type Script =
        dyn Fn(usize, &ConversationContext) -> Result<OracleResponse, OracleError> + Send + Sync;

    /// Oracle driven by a closure of (turn index, context).
    pub(crate) struct FnOracle {
        script: Box<Script>,
        queries: AtomicUsize,
        delay: Duration,
    }

    impl FnOracle {
        pub(crate) fn new<F>(script: F) -> Self
        where
            F: Fn(usize, &ConversationContext) -> Result<OracleResponse, OracleError>
                + Send
                + Sync
                + 'static,
        {
            Self {
                script: Box::new(script),
                queries: AtomicUsize::new(0),
                delay: Duration::ZERO,
            }
        }

        /// Sleep before answering, ignoring the deadline.
        pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        pub(crate) fn queries(&self) -> usize {
            self.queries.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Oracle for FnOracle {
        async fn query(
            &self,
            context: &ConversationContext,
            _catalog: &[ToolDescriptor],
            _deadline: Duration,
        ) -> Result<OracleResponse, OracleError> {
            let turn = self.queries.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            (self.script)(turn, context)
        }
    }

    #[tokio::test]
    async fn test_raw_host_records_requests_until_shutdown() {
        let (session, host) = connect_raw_host(json!({"tools": []})).await;
        session.close().await;
        let seen = host.await.unwrap();
        assert_eq!(seen, vec![methods::INITIALIZE.to_string()]);
    }
}
