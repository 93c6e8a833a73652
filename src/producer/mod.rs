//! Observation producers and the strategy-dispatched reader.
//!
//! A session uses exactly one [`ProducerKind`], chosen at join time and stored
//! in its state so later reads use the matching cursor:
//!
//! - `LocalDaemon`: a detached process relays agent-runtime events into the
//!   session journal; readers drain it.
//! - `RemotePoll`: no process; readers page through the run's observations
//!   with a continuation token.
//! - `RemoteStream`: a detached process captures the run's SSE stream into a
//!   buffer file; readers consume it by byte offset.

pub mod daemon;
pub mod liveness;
pub mod poll;
pub mod stream;

pub use daemon::{ActivityClock, DaemonExit, DaemonTimings, ProducerDaemon};
pub use liveness::{is_process_alive, LivenessFile, StopOutcome};
pub use poll::{poll_page, PollBatch};
pub use stream::{CaptureExit, StreamCapture};

use std::fs::File;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::api::{AgentIdentity, HttpArenaClient, RunService, SseAgentRuntime};
use crate::config::ArenaConfig;
use crate::error::{ArenaError, Result};
use crate::filter::{self, ObservationDigest};
use crate::journal::{self, DrainMode, Envelope, ObservationJournal};
use crate::session::{Cursor, SessionPaths, SessionStatus, SessionStore};

/// Producer strategy of a session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString)]
#[serde(rename_all = "snake_case")]
pub enum ProducerKind {
    #[strum(to_string = "daemon", serialize = "local_daemon")]
    LocalDaemon,
    #[strum(to_string = "poll", serialize = "remote_poll")]
    RemotePoll,
    #[strum(to_string = "stream", serialize = "remote_stream")]
    RemoteStream,
}

impl ProducerKind {
    /// Whether the strategy runs a background process with a liveness record.
    pub fn has_process(self) -> bool {
        !matches!(self, Self::RemotePoll)
    }

    /// Hidden CLI subcommand that runs this producer, if any.
    pub fn subcommand(self) -> Option<&'static str> {
        match self {
            Self::LocalDaemon => Some("__daemon"),
            Self::RemoteStream => Some("__stream"),
            Self::RemotePoll => None,
        }
    }
}

/// Starts producer processes for a session.
pub trait ProducerLauncher: Send + Sync {
    /// Start the producer and return its process id.
    fn launch(&self, kind: ProducerKind, session_id: &str, paths: &SessionPaths) -> Result<u32>;
}

/// Launches producers as detached copies of the current executable.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    exe: PathBuf,
    home_dir: PathBuf,
}

impl ProcessLauncher {
    pub fn new(exe: PathBuf, home_dir: PathBuf) -> Self {
        Self { exe, home_dir }
    }

    pub fn current(home_dir: PathBuf) -> Result<Self> {
        Ok(Self::new(std::env::current_exe()?, home_dir))
    }
}

impl ProducerLauncher for ProcessLauncher {
    fn launch(&self, kind: ProducerKind, session_id: &str, paths: &SessionPaths) -> Result<u32> {
        let subcommand = kind
            .subcommand()
            .ok_or_else(|| ArenaError::Producer(format!("{kind} producer has no process")))?;

        std::fs::create_dir_all(&paths.dir)?;
        let log = File::create(&paths.log)?;
        let log_err = log.try_clone()?;

        let mut command = Command::new(&self.exe);
        command
            .arg(subcommand)
            .arg(session_id)
            .env("ARENALINK_HOME", &self.home_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err));
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            // Own process group: the producer outlives the invoking shell.
            command.process_group(0);
        }

        let mut child = command
            .spawn()
            .map_err(|err| ArenaError::Producer(format!("failed to start {kind} producer: {err}")))?;
        let pid = child.id();
        info!(session_id, pid, producer = %kind, "producer started");

        // Reap the child if it exits while we are still running.
        std::thread::spawn(move || {
            let _ = child.wait();
        });
        Ok(pid)
    }
}

/// Cancel `token` on SIGTERM or Ctrl-C.
pub fn spawn_signal_listener(token: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let Ok(mut term) = signal(SignalKind::terminate()) else {
                return;
            };
            tokio::select! {
                _ = term.recv() => info!("received SIGTERM"),
                _ = tokio::signal::ctrl_c() => info!("received interrupt"),
                _ = token.cancelled() => return,
            }
        }
        #[cfg(not(unix))]
        {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("received interrupt"),
                _ = token.cancelled() => return,
            }
        }
        token.cancel();
    });
}

/// Body of the hidden `__daemon` subcommand.
pub async fn run_daemon(config: &ArenaConfig, session_id: &str) -> Result<DaemonExit> {
    let store = SessionStore::new(config.sessions_dir());
    let state = store.load(session_id)?;
    let journal = store.paths(session_id)?.journal();
    // Observations from an earlier run of this session are stale.
    journal.reset()?;

    let daemon = ProducerDaemon::new(
        SseAgentRuntime::new(config)?,
        Arc::new(journal),
        store,
        session_id,
        AgentIdentity::for_agent(&state.agent_name),
        DaemonTimings::from(config),
    )?;
    spawn_signal_listener(daemon.cancellation());
    Ok(daemon.run().await)
}

/// Body of the hidden `__stream` subcommand.
pub async fn run_stream_capture(config: &ArenaConfig, session_id: &str) -> Result<CaptureExit> {
    let store = SessionStore::new(config.sessions_dir());
    let state = store.load(session_id)?;
    let paths = store.paths(session_id)?;
    let run_id = state
        .run
        .as_ref()
        .map(|run| run.observation_run_id().to_string())
        .ok_or_else(|| ArenaError::RunNotStarted(session_id.to_string()))?;

    let liveness = LivenessFile::new(&paths.pid);
    liveness.write_current()?;
    liveness.mark_ready()?;
    info!(session_id, run_id = %run_id, pid = std::process::id(), "stream capture started");

    let capture = StreamCapture::new(
        Arc::new(HttpArenaClient::new(config)?),
        run_id,
        &paths.stream_buffer,
        config.inactivity_timeout,
    );
    spawn_signal_listener(capture.cancellation());
    let result = capture.run().await;
    liveness.remove();
    result
}

/// Reads new observations for a session using its producer's cursor.
pub struct ObservationReader<'a> {
    store: &'a SessionStore,
    runs: &'a dyn RunService,
}

impl<'a> ObservationReader<'a> {
    pub fn new(store: &'a SessionStore, runs: &'a dyn RunService) -> Self {
        Self { store, runs }
    }

    /// Raw observation records after the cursor. Unless `peek`, the cursor
    /// advances past them: the journal is cleared, or the new offset/token is
    /// saved.
    pub async fn read(&self, session_id: &str, peek: bool) -> Result<Vec<Value>> {
        let state = self.store.load(session_id)?;
        let paths = self.store.paths(session_id)?;

        match state.cursor {
            Cursor::Journal => paths.journal().drain(DrainMode::from_peek(peek)),
            Cursor::Offset { offset } => {
                let batch = journal::read_stream_buffer(&paths.stream_buffer, offset)?;
                let (init, records) = split_init(batch.envelopes);
                if !peek && batch.next_offset != offset {
                    let cursor = Cursor::Offset {
                        offset: batch.next_offset,
                    };
                    self.commit(session_id, cursor, init.as_ref(), &records)?;
                }
                Ok(records)
            }
            Cursor::Token { token } => {
                let run_id = state
                    .run
                    .as_ref()
                    .map(|run| run.observation_run_id().to_string())
                    .ok_or_else(|| ArenaError::RunNotStarted(session_id.to_string()))?;
                let batch = poll_page(self.runs, &run_id, token.as_deref()).await?;
                let (init, records) = split_init(batch.envelopes);
                if !peek && batch.next_token != token {
                    let cursor = Cursor::Token {
                        token: batch.next_token,
                    };
                    self.commit(session_id, cursor, init.as_ref(), &records)?;
                }
                Ok(records)
            }
        }
    }

    /// Read and summarize.
    pub async fn observe(&self, session_id: &str, peek: bool) -> Result<ObservationDigest> {
        let records = self.read(session_id, peek).await?;
        debug!(session_id, count = records.len(), peek, "observations read");
        Ok(filter::digest(&records))
    }

    /// Advance the cursor, folding a first init call into the run handle.
    fn commit(
        &self,
        session_id: &str,
        cursor: Cursor,
        init: Option<&Value>,
        records: &[Value],
    ) -> Result<()> {
        let finished = records.iter().any(is_game_over);
        self.store.update(session_id, |state| {
            state.cursor = cursor;
            if let (Some(init), Some(run)) = (init, state.run.as_mut()) {
                if !run.is_initialized() {
                    run.apply_init(init);
                }
            }
            if finished {
                state.status = SessionStatus::Finished;
            }
        })
    }
}

/// First init-call payload, and the observation payloads.
fn split_init(envelopes: Vec<Envelope>) -> (Option<Value>, Vec<Value>) {
    let init = envelopes
        .iter()
        .find(|envelope| envelope.is_init_call())
        .map(|envelope| envelope.data.clone());
    (init, journal::observations(envelopes))
}

/// Name of the record's event, if any.
pub fn event_name(record: &Value) -> Option<&str> {
    record.get("event").and_then(Value::as_str)
}

/// Terminal game event.
pub fn is_game_over(record: &Value) -> bool {
    matches!(event_name(record), Some("gameover" | "game_over"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn producer_kind_parses_short_and_long_names() {
        assert_eq!("daemon".parse::<ProducerKind>().unwrap(), ProducerKind::LocalDaemon);
        assert_eq!("remote_poll".parse::<ProducerKind>().unwrap(), ProducerKind::RemotePoll);
        assert_eq!("stream".parse::<ProducerKind>().unwrap(), ProducerKind::RemoteStream);
        assert!("carrier-pigeon".parse::<ProducerKind>().is_err());
        assert_eq!(ProducerKind::RemotePoll.to_string(), "poll");
    }

    #[test]
    fn only_process_backed_kinds_have_subcommands() {
        assert_eq!(ProducerKind::LocalDaemon.subcommand(), Some("__daemon"));
        assert_eq!(ProducerKind::RemoteStream.subcommand(), Some("__stream"));
        assert!(ProducerKind::RemotePoll.subcommand().is_none());
        assert!(!ProducerKind::RemotePoll.has_process());
    }

    #[test]
    fn both_game_over_spellings_are_terminal() {
        assert!(is_game_over(&json!({"event": "gameover"})));
        assert!(is_game_over(&json!({"event": "game_over"})));
        assert!(!is_game_over(&json!({"event": "death"})));
        assert!(!is_game_over(&json!({"score": 1})));
    }
}
