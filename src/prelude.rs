//! Convenience re-exports for common use.

pub use crate::api::{Action, HttpArenaClient, Matchmaking, RunService};
pub use crate::config::ArenaConfig;
pub use crate::dispatch::ActionDispatcher;
pub use crate::error::{ArenaError, Result};
pub use crate::filter::ObservationDigest;
pub use crate::journal::{DrainMode, FileJournal, MemoryJournal, ObservationJournal};
pub use crate::producer::{ProducerKind, ProducerLauncher, StopOutcome};
pub use crate::session::{RunHandle, SessionState, SessionStatus, SessionStore};
pub use crate::supervisor::{JoinOutcome, SessionSupervisor, StatusReport};
