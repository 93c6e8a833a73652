//! Fixed-interval bounded polling.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::Result;

/// Result of a bounded wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome<T> {
    Ready(T),
    TimedOut,
}

impl<T> WaitOutcome<T> {
    pub fn ready(self) -> Option<T> {
        match self {
            Self::Ready(value) => Some(value),
            Self::TimedOut => None,
        }
    }
}

/// Polls a check every `interval` until it yields a value or `deadline` passes.
#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
    pub interval: Duration,
    pub deadline: Instant,
}

impl PollPolicy {
    pub fn new(interval: Duration, deadline: Instant) -> Self {
        Self { interval, deadline }
    }

    /// Sleep one interval, clipped to the deadline. `false` once the
    /// deadline has passed and the caller should give up.
    pub async fn pause(&self) -> bool {
        let now = Instant::now();
        if now >= self.deadline {
            return false;
        }
        tokio::time::sleep(self.interval.min(self.deadline - now)).await;
        true
    }

    /// Run `check` until it returns `Some`. Transient errors count as "not
    /// yet"; anything else aborts the wait. The check always runs at least once.
    pub async fn until<F, Fut, T>(&self, mut check: F) -> Result<WaitOutcome<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>>>,
    {
        loop {
            match check().await {
                Ok(Some(value)) => return Ok(WaitOutcome::Ready(value)),
                Ok(None) => {}
                Err(err) if err.is_transient() => {
                    tracing::warn!(error = %err, "transient error while waiting; retrying");
                }
                Err(err) => return Err(err),
            }
            if !self.pause().await {
                return Ok(WaitOutcome::TimedOut);
            }
        }
    }
}
