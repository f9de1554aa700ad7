//! Task entry point: connect → discover → reason → close.
//!
//! The session is closed on every exit path, including connect and
//! discovery failures and aborted loops.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::conversation::ConversationContext;
use super::errors::AgentError;
use super::prompt::system_prompt;
use super::reasoning_loop::{LoopConfig, LoopOutcome, ReasoningLoop};
use crate::inference::Oracle;
use crate::mcp_client::{Catalog, Endpoint, McpClient};

/// Where and how to run a task.
#[derive(Debug, Clone)]
pub struct TaskOptions {
    pub endpoint: Endpoint,
    pub connect_timeout: Duration,
    pub loop_config: LoopConfig,
}

/// Run one task against the host at `options.endpoint`.
///
/// A session that cannot be opened, or whose catalog is corrupt, yields a
/// `fatal_error` outcome without any oracle query.
pub async fn run_task(
    options: &TaskOptions,
    oracle: &dyn Oracle,
    task: &str,
    cancel: CancellationToken,
) -> LoopOutcome {
    let client = match McpClient::connect(&options.endpoint, options.connect_timeout).await {
        Ok(client) => client,
        Err(err) => {
            let err = AgentError::from(err);
            tracing::error!(endpoint = %options.endpoint, error = %err, "task aborted before start");
            let context = ConversationContext::new(system_prompt(&Catalog::default()), task);
            return LoopOutcome::fatal_before_start(context, &err);
        }
    };

    run_with_client(client, oracle, task, options.loop_config.clone(), cancel).await
}

/// Run one task on an already-connected client, then close it.
pub async fn run_with_client(
    client: McpClient,
    oracle: &dyn Oracle,
    task: &str,
    config: LoopConfig,
    cancel: CancellationToken,
) -> LoopOutcome {
    tracing::info!(
        endpoint = %client.session().label(),
        tools = ?client.catalog().names(),
        "catalog discovered"
    );

    let context = ConversationContext::new(system_prompt(client.catalog()), task);
    let outcome = ReasoningLoop::new(&client, oracle, config)
        .with_cancellation(cancel)
        .run(context)
        .await;

    client.close().await;
    outcome
}

// ─── Tests ───────────────────────────────────────────────────────────────────
