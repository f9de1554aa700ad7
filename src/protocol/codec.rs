//! Line-delimited JSON-RPC framing.
//!
//! One JSON object per line, `\n` terminated. Used by both the planner's
//! session and the host's connection loop, over any async byte stream.

use serde::Serialize;
use thiserror::Error;
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};

use super::types::JsonRpcMessage;

/// Longest accepted line, excluding the terminator.
pub const MAX_FRAME_BYTES: usize = 8 * 1024 * 1024;

/// Framing-level failure.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// A line that is not a JSON-RPC message.
    #[error("malformed frame: {reason}")]
    Malformed { line: String, reason: String },
}

// ─── Reader ──────────────────────────────────────────────────────────────────

/// Reads framed messages from an async byte stream.
pub struct MessageReader<R> {
    inner: BufReader<R>,
    line: Vec<u8>,
    max_frame: usize,
}

impl<R: AsyncRead + Unpin> MessageReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            inner: BufReader::new(reader),
            line: Vec::new(),
            max_frame: MAX_FRAME_BYTES,
        }
    }

    pub fn with_max_frame(mut self, max_frame: usize) -> Self {
        self.max_frame = max_frame;
        self
    }

    /// Read the next message. `Ok(None)` means the peer closed the stream.
    ///
    /// Blank lines are skipped. A bad line is `Malformed` and the reader
    /// resumes at the next one.
    pub async fn receive(&mut self) -> Result<Option<JsonRpcMessage>, FrameError> {
        loop {
            self.line.clear();
            let limit = self.max_frame as u64 + 1;
            let n = (&mut self.inner)
                .take(limit)
                .read_until(b'\n', &mut self.line)
                .await?;
            if n == 0 {
                return Ok(None);
            }

            if self.line.last() != Some(&b'\n') && self.line.len() > self.max_frame {
                let head = &self.line[..self.line.len().min(200)];
                let head = String::from_utf8_lossy(head).into_owned();
                self.skip_rest_of_line().await?;
                return Err(FrameError::Malformed {
                    line: truncate(&head, 200),
                    reason: format!("frame exceeds {} bytes", self.max_frame),
                });
            }

            let text = match std::str::from_utf8(&self.line) {
                Ok(text) => text,
                Err(e) => {
                    return Err(FrameError::Malformed {
                        line: truncate(&String::from_utf8_lossy(&self.line), 200),
                        reason: format!("invalid UTF-8: {e}"),
                    });
                }
            };

            let trimmed = text.trim();
            if trimmed.is_empty() {
                continue;
            }

            return serde_json::from_str::<JsonRpcMessage>(trimmed)
                .map(Some)
                .map_err(|e| FrameError::Malformed {
                    line: truncate(trimmed, 200),
                    reason: e.to_string(),
                });
        }
    }

    /// Discard input up to and including the next `\n`, or to EOF.
    async fn skip_rest_of_line(&mut self) -> Result<(), FrameError> {
        loop {
            let (used, done) = {
                let available = self.inner.fill_buf().await?;
                if available.is_empty() {
                    return Ok(());
                }
                match available.iter().position(|&b| b == b'\n') {
                    Some(pos) => (pos + 1, true),
                    None => (available.len(), false),
                }
            };
            self.inner.consume(used);
            if done {
                return Ok(());
            }
        }
    }
}

// ─── Writer ──────────────────────────────────────────────────────────────────

/// Writes framed messages to an async byte stream.
pub struct MessageWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> MessageWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { inner: writer }
    }

    /// Serialize `message` as one line and flush it.
    pub async fn send<T: Serialize>(&mut self, message: &T) -> Result<(), FrameError> {
        let mut json = serde_json::to_string(message).map_err(|e| FrameError::Malformed {
            line: String::new(),
            reason: format!("failed to serialize message: {e}"),
        })?;
        json.push('\n');

        self.inner.write_all(json.as_bytes()).await?;
        self.inner.flush().await?;
        Ok(())
    }

    /// Close the write half.
    pub async fn shutdown(&mut self) -> Result<(), FrameError> {
        self.inner.shutdown().await?;
        Ok(())
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}

// ─── Tests ───────────────────────────────────────────────────────────────────
