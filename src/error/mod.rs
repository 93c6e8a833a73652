//! Error types for arenalink.

pub mod unified;

pub use unified::{ErrorCategory, ExitCode};

use thiserror::Error;

/// Primary error type for all arenalink operations.
#[derive(Error, Debug)]
pub enum ArenaError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Queue join rejected: {0}")]
    QueueRejected(String),

    #[error("Timed out after {secs}s waiting for a game assignment")]
    AssignmentTimeout { secs: u64 },

    #[error("Timed out after {secs}s waiting for {stage}")]
    InitTimeout { stage: String, secs: u64 },

    #[error("No session '{0}' (run `arenalink join` first)")]
    SessionNotFound(String),

    #[error("Invalid state for session '{session_id}': {message}")]
    CorruptState { session_id: String, message: String },

    #[error("Session '{0}' has no run yet; the game has not started")]
    RunNotStarted(String),

    #[error("Producer error: {0}")]
    Producer(String),

    #[error("Producer for session '{session_id}' exited unexpectedly")]
    ProducerExited { session_id: String, log_tail: Vec<String> },

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl ArenaError {
    /// Create an API error.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    pub fn corrupt(session_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CorruptState {
            session_id: session_id.into(),
            message: message.into(),
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration(_) => ErrorCategory::Configuration,
            Self::Api { status, .. } => match status {
                401 | 403 => ErrorCategory::Configuration,
                408 | 429 | 500..=599 => ErrorCategory::Transient,
                _ => ErrorCategory::Protocol,
            },
            Self::Network(_) | Self::Stream(_) => ErrorCategory::Transient,
            Self::Serialization(_) | Self::QueueRejected(_) => ErrorCategory::Protocol,
            Self::AssignmentTimeout { .. } | Self::InitTimeout { .. } => ErrorCategory::Timeout,
            Self::Io(_)
            | Self::SessionNotFound(_)
            | Self::CorruptState { .. }
            | Self::RunNotStarted(_) => ErrorCategory::LocalState,
            Self::Producer(_) | Self::ProducerExited { .. } => ErrorCategory::Producer,
            Self::InvalidArgument(_) => ErrorCategory::Usage,
        }
    }

    /// Whether a bounded wait loop may swallow this error and poll again.
    pub fn is_transient(&self) -> bool {
        self.category() == ErrorCategory::Transient
    }

    /// Exit code the CLI reports for this error.
    ///
    /// Only a missed init signal maps to [`ExitCode::GameTimeout`]: the run
    /// exists and the caller can come back to observe it later. A missed
    /// assignment is a hard failure.
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::InitTimeout { .. } => ExitCode::GameTimeout,
            _ => ExitCode::Failure,
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, ArenaError>;
