//! Host process lifecycle for `stdio:` endpoints.
//!
//! The planner spawns the tool host as a child process, speaks JSON-RPC
//! over its stdin/stdout, and forwards its stderr into our own logs.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use super::errors::McpError;

/// Timeout for graceful shutdown before force-killing.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// A spawned tool host.
pub struct HostProcess {
    label: String,
    child: Child,
}

impl HostProcess {
    /// Spawn `command args…` with piped stdio.
    ///
    /// Returns the process handle plus the stdin (planner → host) and
    /// stdout (host → planner) halves for the session.
    pub fn spawn(
        command: &str,
        args: &[String],
    ) -> Result<(HostProcess, ChildStdin, ChildStdout), McpError> {
        let label = format!("stdio:{command}");

        let mut cmd = Command::new(command);
        cmd.args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(target_os = "windows")]
        {
            const CREATE_NO_WINDOW: u32 = 0x08000000;
            cmd.creation_flags(CREATE_NO_WINDOW);
        }

        let mut child = cmd.spawn().map_err(|e| McpError::Connection {
            endpoint: label.clone(),
            reason: format!("failed to spawn host: {e}"),
        })?;

        let stdin = child.stdin.take().ok_or_else(|| McpError::Connection {
            endpoint: label.clone(),
            reason: "failed to capture stdin".into(),
        })?;
        let stdout = child.stdout.take().ok_or_else(|| McpError::Connection {
            endpoint: label.clone(),
            reason: "failed to capture stdout".into(),
        })?;

        if let Some(stderr) = child.stderr.take() {
            let host = label.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(host = %host, "{line}");
                }
            });
        }

        tracing::info!(host = %label, pid = ?child.id(), "spawned tool host");
        Ok((HostProcess { label, child }, stdin, stdout))
    }

    /// Wait for the host to exit on its own (its stdin is already closed),
    /// then kill it once the grace period runs out.
    pub async fn shutdown(&mut self) {
        match tokio::time::timeout(SHUTDOWN_TIMEOUT, self.child.wait()).await {
            Ok(Ok(status)) => {
                tracing::info!(host = %self.label, %status, "tool host exited");
            }
            _ => {
                tracing::warn!(host = %self.label, "tool host did not exit, killing");
                let _ = self.child.kill().await;
            }
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
