//! arenalink: agent-side relay for multiplayer arena games
//!
//! Joins an agent to a game, keeps a per-session observation pipeline fed by a
//! background daemon, a polling reader or a captured SSE stream, and forwards
//! actions back into the run. Several sessions may run side by side on one
//! host; each lives in its own directory under `<home>/sessions/`.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//! use arenalink::prelude::*;
//!
//! # async fn example() -> arenalink::error::Result<()> {
//! let config = ArenaConfig::from_env().with_producer(ProducerKind::RemotePoll);
//! let supervisor = SessionSupervisor::from_config(config)?;
//! let started = supervisor.join(Duration::from_secs(300)).await?;
//! let digest = supervisor.observe(&started.session_id, false).await?;
//! println!("{} new events", digest.total_events);
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod filter;
pub mod journal;
pub mod prelude;
pub mod producer;
pub mod session;
pub mod supervisor;

#[cfg(feature = "cli")]
pub mod cli;
