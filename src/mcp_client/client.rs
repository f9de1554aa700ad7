//! MCP client: one session, its catalog, and tool invocation.
//!
//! This is the API the reasoning loop uses. Tool-level failures (unknown
//! tool, invalid arguments, handler faults, timeouts) come back as
//! `ToolResult`s; only protocol faults surface as `McpError`.

use std::time::{Duration, Instant};

use futures::future::join_all;

use super::catalog::Catalog;
use super::discovery;
use super::errors::McpError;
use super::transport::{open_session, Endpoint, Session};
use crate::protocol::types::{methods, CallToolParams, CallToolResult};
use crate::protocol::{ErrorDetail, ErrorKind, ToolCallRequest, ToolResult};

// ─── Constants ───────────────────────────────────────────────────────────────

/// Default timeout for tool call execution (ms).
pub const DEFAULT_CALL_TIMEOUT_MS: u64 = 30_000;

// ─── McpClient ───────────────────────────────────────────────────────────────

/// A connected session plus the catalog discovered on it.
pub struct McpClient {
    session: Session,
    catalog: Catalog,
}

impl McpClient {
    /// Open a session, handshake, and discover the catalog.
    pub async fn connect(endpoint: &Endpoint, connect_timeout: Duration) -> Result<Self, McpError> {
        let session = open_session(endpoint, connect_timeout).await?;
        Self::from_session(session).await
    }

    /// Discover the catalog on an already-open session.
    ///
    /// A corrupted catalog closes the session; nothing else is sent on it.
    pub async fn from_session(session: Session) -> Result<Self, McpError> {
        match discovery::list_tools(&session).await {
            Ok(catalog) => Ok(Self { session, catalog }),
            Err(e) => {
                tracing::error!(endpoint = %session.label(), error = %e, "discovery failed");
                session.close().await;
                Err(e)
            }
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Re-fetch the catalog from the host.
    pub async fn refresh_catalog(&mut self) -> Result<&Catalog, McpError> {
        self.catalog = discovery::list_tools(&self.session).await?;
        Ok(&self.catalog)
    }

    // ─── Tool Execution ──────────────────────────────────────────────────

    /// Invoke one tool.
    ///
    /// Steps:
    /// 1. Reject names absent from the last-fetched catalog (no host call)
    /// 2. Send `tools/call` under `deadline`
    /// 3. Convert the host's result, or a timeout, into a `ToolResult`
    pub async fn call_tool(
        &self,
        request: &ToolCallRequest,
        deadline: Duration,
    ) -> Result<ToolResult, McpError> {
        let start = Instant::now();

        // 1. Validate
        if !self.catalog.contains(&request.tool_name) {
            tracing::warn!(
                call_id = %request.call_id,
                tool = %request.tool_name,
                "tool not in catalog"
            );
            return Ok(ToolResult::error(
                request,
                ErrorDetail::unknown_tool(&request.tool_name),
            ));
        }

        // 2. Send request
        let params = CallToolParams {
            name: request.tool_name.clone(),
            arguments: request.arguments.clone(),
        };
        let params = serde_json::to_value(params)
            .map_err(|e| McpError::transport(self.session.label(), e))?;

        let outcome = self
            .session
            .request_with_deadline(methods::TOOLS_CALL, Some(params), deadline)
            .await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        // 3. Parse response
        let result = match outcome {
            Ok(value) => {
                let wire: CallToolResult = serde_json::from_value(value).map_err(|e| {
                    McpError::transport(
                        self.session.label(),
                        format!("malformed tools/call result: {e}"),
                    )
                })?;
                ToolResult::from_wire(request, wire)
            }
            Err(McpError::Timeout { timeout_ms, .. }) => ToolResult::error(
                request,
                ErrorDetail::new(
                    ErrorKind::Timeout,
                    format!("tool '{}' timed out after {timeout_ms}ms", request.tool_name),
                ),
            ),
            Err(e) => return Err(e),
        };

        tracing::info!(
            call_id = %request.call_id,
            tool = %request.tool_name,
            status = ?result.status,
            error_kind = ?result.error_kind(),
            elapsed_ms,
            "tool call complete"
        );

        Ok(result)
    }

    /// Invoke a batch, returning results in request order.
    ///
    /// With `parallel` all calls are in flight at once; completion order
    /// does not affect the returned order. Any protocol fault fails the
    /// whole batch.
    pub async fn call_batch(
        &self,
        requests: &[ToolCallRequest],
        deadline: Duration,
        parallel: bool,
    ) -> Result<Vec<ToolResult>, McpError> {
        if parallel {
            join_all(requests.iter().map(|r| self.call_tool(r, deadline)))
                .await
                .into_iter()
                .collect()
        } else {
            let mut results = Vec::with_capacity(requests.len());
            for request in requests {
                results.push(self.call_tool(request, deadline).await?);
            }
            Ok(results)
        }
    }

    /// Close the underlying session. Idempotent.
    pub async fn close(&self) {
        self.session.close().await;
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
