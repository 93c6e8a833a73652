//! Remote stream producer: captures a run's SSE observation stream to disk.
//!
//! The capture process appends raw frames to `stream.buffer`; readers parse
//! complete lines after their byte offset with
//! [`read_stream_buffer`](crate::journal::read_stream_buffer).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::RunService;
use crate::error::Result;
use crate::journal::{parse_stream_line, StreamLine};

/// Why a capture ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureExit {
    /// The stream delivered its `done` event.
    Done,
    /// The server closed the connection.
    Ended,
    Cancelled,
    Inactivity,
}

pub struct StreamCapture {
    runs: Arc<dyn RunService>,
    run_id: String,
    buffer: PathBuf,
    inactivity_timeout: Duration,
    cancel: CancellationToken,
}

impl StreamCapture {
    pub fn new(
        runs: Arc<dyn RunService>,
        run_id: impl Into<String>,
        buffer: impl Into<PathBuf>,
        inactivity_timeout: Duration,
    ) -> Self {
        Self {
            runs,
            run_id: run_id.into(),
            buffer: buffer.into(),
            inactivity_timeout,
            cancel: CancellationToken::new(),
        }
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Append stream bytes to the buffer until the stream finishes, goes
    /// quiet for the inactivity timeout, or the capture is cancelled.
    pub async fn run(self) -> Result<CaptureExit> {
        if let Some(parent) = self.buffer.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.buffer)
            .await?;

        let mut stream = self.runs.stream_observations(&self.run_id).await?;
        info!(run_id = %self.run_id, "observation stream open");

        let mut pending = String::new();
        loop {
            let next = tokio::select! {
                _ = self.cancel.cancelled() => return Ok(CaptureExit::Cancelled),
                next = tokio::time::timeout(self.inactivity_timeout, stream.next()) => next,
            };
            let chunk = match next {
                Err(_) => {
                    info!(run_id = %self.run_id, "observation stream idle; stopping capture");
                    return Ok(CaptureExit::Inactivity);
                }
                Ok(None) => {
                    info!(run_id = %self.run_id, "observation stream ended");
                    return Ok(CaptureExit::Ended);
                }
                Ok(Some(Err(err))) => {
                    warn!(run_id = %self.run_id, error = %err, "observation stream failed");
                    return Err(err);
                }
                Ok(Some(Ok(chunk))) => chunk,
            };

            file.write_all(&chunk).await?;
            file.flush().await?;
            debug!(bytes = chunk.len(), "captured stream bytes");

            pending.push_str(&String::from_utf8_lossy(&chunk));
            if scan_for_done(&mut pending) {
                info!(run_id = %self.run_id, "observation stream done");
                return Ok(CaptureExit::Done);
            }
        }
    }
}

/// Consume complete lines from `pending`; true once a `done` event appears.
fn scan_for_done(pending: &mut String) -> bool {
    let Some(last_newline) = pending.rfind('\n') else {
        return false;
    };
    let done = pending[..last_newline]
        .lines()
        .any(|line| parse_stream_line(line) == StreamLine::Done);
    pending.drain(..=last_newline);
    done
}
