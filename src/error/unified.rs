//! Error classification and process exit codes.

use serde::{Deserialize, Serialize};

/// Broad error category for routing recovery logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Missing or invalid credentials/settings. Never retried.
    Configuration,
    /// A single remote call failed; bounded wait loops keep going.
    Transient,
    /// The remote service answered, but not with what the protocol expects.
    Protocol,
    /// A bounded wait for the game ran out of time.
    Timeout,
    /// Session storage is missing or corrupt.
    LocalState,
    /// The producer process could not be started or died.
    Producer,
    /// Bad operator input.
    Usage,
}

/// Process exit code reported by the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success,
    Failure,
    GameTimeout,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::Failure => 1,
            Self::GameTimeout => 2,
        }
    }
}
