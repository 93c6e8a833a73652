//! Session lifecycle: join, status, stop, cleanup, observe and log.
//!
//! [`SessionSupervisor`] owns the session store and the producer launcher. It
//! is the only component that creates or removes sessions; producers and the
//! dispatcher only update existing state documents.

mod wait;

pub use wait::{PollPolicy, WaitOutcome};

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use serde_json::{json, Value};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::api::{AssignedRun, HttpArenaClient, Matchmaking, RunService};
use crate::config::ArenaConfig;
use crate::error::{ArenaError, Result};
use crate::filter::ObservationDigest;
use crate::journal::{self, DrainMode, Envelope, ObservationJournal};
use crate::producer::{
    event_name, is_process_alive, poll_page, LivenessFile, ObservationReader, ProcessLauncher, ProducerKind,
    ProducerLauncher, StopOutcome,
};
use crate::session::{Cursor, RunHandle, SessionPaths, SessionState, SessionStatus, SessionStore};

const READY_POLL_INTERVAL: Duration = Duration::from_millis(250);
const LOG_TAIL_LINES: usize = 10;

/// A session whose game has started.
#[derive(Debug, Clone, Serialize)]
pub struct JoinOutcome {
    pub session_id: String,
    pub producer: ProducerKind,
    pub run: RunHandle,
    pub producer_pid: Option<u32>,
    /// The `initial_state` observation.
    pub initial_state: Value,
}

impl JoinOutcome {
    /// Compact view of the opening game state.
    pub fn summary(&self) -> Value {
        let field = |name: &str| self.initial_state.get(name).cloned().unwrap_or(Value::Null);
        let chat: Vec<Value> = self
            .initial_state
            .get("chat")
            .and_then(Value::as_array)
            .map(|chat| chat.iter().take(10).cloned().collect())
            .unwrap_or_default();
        json!({
            "status": "started",
            "session_id": self.session_id,
            "run_id": self.run.run_id,
            "position": field("position"),
            "health": field("health"),
            "inventory": field("inventory"),
            "blocks": field("blocks"),
            "players": field("players"),
            "score": field("score"),
            "chat": chat,
        })
    }
}

/// One row of the session listing. Unreadable sessions carry `error`.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub status: Option<SessionStatus>,
    pub producer: Option<ProducerKind>,
    pub run_id: Option<String>,
    /// `None` for strategies without a background process.
    pub alive: Option<bool>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionDetail {
    pub state: SessionState,
    pub alive: Option<bool>,
    pub pid: Option<u32>,
    pub recent_log: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum StatusReport {
    Sessions(Vec<SessionSummary>),
    Session(Box<SessionDetail>),
}

pub struct SessionSupervisor {
    config: ArenaConfig,
    store: SessionStore,
    matchmaking: Arc<dyn Matchmaking>,
    runs: Arc<dyn RunService>,
    launcher: Arc<dyn ProducerLauncher>,
}

impl SessionSupervisor {
    pub fn new(
        config: ArenaConfig,
        matchmaking: Arc<dyn Matchmaking>,
        runs: Arc<dyn RunService>,
        launcher: Arc<dyn ProducerLauncher>,
    ) -> Self {
        let store = SessionStore::new(config.sessions_dir());
        Self {
            config,
            store,
            matchmaking,
            runs,
            launcher,
        }
    }

    /// Production wiring: HTTP clients and re-executing the current binary.
    pub fn from_config(config: ArenaConfig) -> Result<Self> {
        let client = Arc::new(HttpArenaClient::new(&config)?);
        let launcher = Arc::new(ProcessLauncher::current(config.home_dir.clone())?);
        Ok(Self::new(config, client.clone(), client, launcher))
    }

    pub fn config(&self) -> &ArenaConfig {
        &self.config
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Create a session, queue for a game and wait until it has started.
    pub async fn join(&self, timeout: Duration) -> Result<JoinOutcome> {
        self.config.validate()?;
        let deadline = Instant::now() + timeout;
        let kind = self.config.producer;

        let mut session_id = SessionStore::generate_id();
        while self.store.exists(&session_id) {
            session_id = SessionStore::generate_id();
        }
        let state = SessionState::new(&session_id, &self.config.agent_name, kind);
        let paths = self.store.create(&state)?;
        info!(session_id = %session_id, producer = %kind, "session created");

        let result = self.join_session(&session_id, &paths, kind, timeout, deadline).await;
        if let Err(err) = &result {
            self.settle_failed_join(&session_id, &paths, err).await;
        }
        result
    }

    async fn join_session(
        &self,
        session_id: &str,
        paths: &SessionPaths,
        kind: ProducerKind,
        timeout: Duration,
        deadline: Instant,
    ) -> Result<JoinOutcome> {
        let agent = self.config.agent_name.as_str();
        let mut producer_pid = None;

        if kind == ProducerKind::LocalDaemon {
            producer_pid = Some(self.start_producer(kind, session_id, paths, deadline).await?);
        }

        let joined = self.matchmaking.join(agent).await?;
        if !joined.success {
            let reason = joined
                .error
                .map(|err| match err {
                    Value::String(text) => text,
                    other => other.to_string(),
                })
                .unwrap_or_else(|| "queue join was not accepted".to_string());
            return Err(ArenaError::QueueRejected(reason));
        }
        let position = joined.queue_entry.and_then(|entry| entry.position);
        info!(session_id, position = ?position, "joined queue");

        let assigned = self.await_assignment(session_id, kind, timeout, deadline).await?;
        self.matchmaking.confirm(agent, &assigned.run_id).await?;
        info!(session_id, run_id = %assigned.run_id, "run assigned");
        let run = self.record_assignment(session_id, &assigned)?;

        if kind == ProducerKind::RemoteStream {
            producer_pid = Some(self.start_producer(kind, session_id, paths, deadline).await?);
        }

        let (run, initial_state) = self
            .await_game_start(session_id, paths, kind, run, timeout, deadline)
            .await?;

        self.store.update(session_id, |state| {
            state.run = Some(run.clone());
            state.status = SessionStatus::Playing;
        })?;
        info!(session_id, run_id = %run.run_id, "game started");

        Ok(JoinOutcome {
            session_id: session_id.to_string(),
            producer: kind,
            run,
            producer_pid,
            initial_state,
        })
    }

    /// Init timeouts leave a playable session behind; every other failure
    /// stops the producer and marks the session failed.
    async fn settle_failed_join(&self, session_id: &str, paths: &SessionPaths, err: &ArenaError) {
        let status = match err {
            ArenaError::InitTimeout { .. } => SessionStatus::Playing,
            _ => {
                LivenessFile::new(&paths.pid)
                    .stop(self.config.stop_grace)
                    .await;
                SessionStatus::Failed
            }
        };
        let saved = self.store.update(session_id, |state| state.status = status);
        if let Err(save_err) = saved {
            warn!(session_id, error = %save_err, "failed to record join outcome");
        }
        warn!(session_id, error = %err, status = %status, "join did not complete");
    }

    async fn start_producer(
        &self,
        kind: ProducerKind,
        session_id: &str,
        paths: &SessionPaths,
        deadline: Instant,
    ) -> Result<u32> {
        let launched = self.launcher.launch(kind, session_id, paths)?;
        let ready_by = deadline.min(Instant::now() + self.config.producer_ready_timeout);
        let liveness = LivenessFile::new(&paths.pid);

        let outcome = PollPolicy::new(READY_POLL_INTERVAL, ready_by)
            .until(|| {
                let ready = liveness.ready_pid();
                let exited = ready.is_none() && !is_process_alive(launched);
                async move {
                    if exited {
                        return Err(self.producer_exited(session_id));
                    }
                    Ok(ready)
                }
            })
            .await?;
        match outcome {
            WaitOutcome::Ready(pid) => {
                info!(session_id, pid, producer = %kind, "producer ready");
                Ok(pid)
            }
            WaitOutcome::TimedOut => Err(ArenaError::Producer(format!(
                "{kind} producer did not report ready; see `arenalink log {session_id}`"
            ))),
        }
    }

    fn producer_exited(&self, session_id: &str) -> ArenaError {
        ArenaError::ProducerExited {
            session_id: session_id.to_string(),
            log_tail: self.store.log_tail(session_id, LOG_TAIL_LINES),
        }
    }

    fn ensure_producer_alive(
        &self,
        session_id: &str,
        paths: &SessionPaths,
        kind: ProducerKind,
    ) -> Result<()> {
        if kind.has_process() && !LivenessFile::new(&paths.pid).is_alive() {
            return Err(self.producer_exited(session_id));
        }
        Ok(())
    }

    async fn await_assignment(
        &self,
        session_id: &str,
        kind: ProducerKind,
        timeout: Duration,
        deadline: Instant,
    ) -> Result<AssignedRun> {
        let agent = self.config.agent_name.as_str();
        let paths = self.store.paths(session_id)?;
        let last_position: Mutex<Option<u64>> = Mutex::new(None);

        let outcome = PollPolicy::new(self.config.queue_poll_interval, deadline)
            .until(|| async {
                if kind == ProducerKind::LocalDaemon {
                    self.ensure_producer_alive(session_id, &paths, kind)?;
                }
                let status = self.matchmaking.status(agent).await?;
                if let Some(run) = status.run {
                    return Ok(Some(run));
                }
                let position = status.position();
                let mut last = last_position.lock().unwrap_or_else(|p| p.into_inner());
                if position.is_some() && *last != position {
                    info!(session_id, position = ?position, "queue position");
                    *last = position;
                }
                Ok(None)
            })
            .await?;

        outcome.ready().ok_or(ArenaError::AssignmentTimeout {
            secs: timeout.as_secs(),
        })
    }

    /// Merge the assigned run ids into the stored handle. A daemon may have
    /// written the init payload already; keep it.
    fn record_assignment(&self, session_id: &str, assigned: &AssignedRun) -> Result<RunHandle> {
        self.store.update(session_id, |state| {
            let run = state.run.get_or_insert_with(|| assigned.to_run_handle());
            if run.run_id.is_empty() {
                run.run_id = assigned.run_id.clone();
            }
            if run.internal_run_id.is_none() {
                run.internal_run_id = assigned.id.clone();
            }
            if run.participant_name.is_none() {
                run.participant_name = assigned.participant_name.clone();
            }
            run.clone()
        })
    }

    /// Wait for the init signal and the `initial_state` observation. Reads
    /// never move the stored cursor.
    async fn await_game_start(
        &self,
        session_id: &str,
        paths: &SessionPaths,
        kind: ProducerKind,
        mut run: RunHandle,
        timeout: Duration,
        deadline: Instant,
    ) -> Result<(RunHandle, Value)> {
        let policy = PollPolicy::new(self.config.observation_poll_interval, deadline);
        let mut scan = JoinScan::from_cursor(&self.store.load(session_id)?.cursor);
        let mut initial_state = None;

        loop {
            self.ensure_producer_alive(session_id, paths, kind)?;

            if kind == ProducerKind::LocalDaemon && !run.is_initialized() {
                if let Some(stored) = self.store.load(session_id)?.run {
                    if stored.is_initialized() {
                        info!(session_id, "init received");
                        run = stored;
                    }
                }
            }

            let envelopes = match scan.next(paths, self.runs.as_ref(), &run).await {
                Ok(envelopes) => envelopes,
                Err(err) if err.is_transient() => {
                    warn!(session_id, error = %err, "observation read failed; retrying");
                    Vec::new()
                }
                Err(err) => return Err(err),
            };
            for envelope in envelopes {
                if envelope.is_init_call() && !run.is_initialized() {
                    run.apply_init(&envelope.data);
                    self.save_run(session_id, &run)?;
                    info!(session_id, "init received");
                } else if envelope.is_observation()
                    && initial_state.is_none()
                    && event_name(&envelope.data) == Some("initial_state")
                {
                    initial_state = Some(envelope.data);
                }
            }

            if run.is_initialized() {
                if let Some(initial_state) = initial_state.take() {
                    return Ok((run, initial_state));
                }
            }

            if !policy.pause().await {
                let stage = if run.is_initialized() {
                    "initial_state"
                } else {
                    "init call"
                };
                return Err(ArenaError::InitTimeout {
                    stage: stage.to_string(),
                    secs: timeout.as_secs(),
                });
            }
        }
    }

    fn save_run(&self, session_id: &str, run: &RunHandle) -> Result<()> {
        self.store.update(session_id, |state| state.run = Some(run.clone()))
    }

    /// Every session, or the full detail of one.
    pub fn status(&self, session_id: Option<&str>) -> Result<StatusReport> {
        match session_id {
            Some(id) => Ok(StatusReport::Session(Box::new(self.detail(id)?))),
            None => Ok(StatusReport::Sessions(self.list()?)),
        }
    }

    pub fn list(&self) -> Result<Vec<SessionSummary>> {
        let mut summaries = Vec::new();
        for session_id in self.store.list()? {
            let summary = match self.store.load(&session_id) {
                Ok(state) => SessionSummary {
                    alive: self.liveness_of(&state),
                    status: Some(state.status),
                    producer: Some(state.producer),
                    run_id: state.run_id().map(str::to_string),
                    error: None,
                    session_id,
                },
                Err(err) => SessionSummary {
                    session_id,
                    status: None,
                    producer: None,
                    run_id: None,
                    alive: None,
                    error: Some(err.to_string()),
                },
            };
            summaries.push(summary);
        }
        Ok(summaries)
    }

    pub fn detail(&self, session_id: &str) -> Result<SessionDetail> {
        let state = self.store.load(session_id)?;
        let pid = if state.producer.has_process() {
            LivenessFile::new(self.store.paths(session_id)?.pid).alive_pid()
        } else {
            None
        };
        Ok(SessionDetail {
            alive: state.producer.has_process().then_some(pid.is_some()),
            pid,
            recent_log: self.store.log_tail(session_id, LOG_TAIL_LINES),
            state,
        })
    }

    fn liveness_of(&self, state: &SessionState) -> Option<bool> {
        if !state.producer.has_process() {
            return None;
        }
        let paths = self.store.paths(&state.session_id).ok()?;
        Some(LivenessFile::new(paths.pid).is_alive())
    }

    /// Stop the session's producer. Safe to repeat.
    pub async fn stop(&self, session_id: &str) -> Result<StopOutcome> {
        let paths = self.store.paths(session_id)?;
        let outcome = LivenessFile::new(&paths.pid)
            .stop(self.config.stop_grace)
            .await;
        match outcome {
            StopOutcome::NotRunning => debug!(session_id, "no producer running"),
            StopOutcome::Stopped { pid } => info!(session_id, pid, "producer stopped"),
            StopOutcome::Killed { pid } => warn!(session_id, pid, "producer killed"),
        }
        Ok(outcome)
    }

    /// Stop every producer, then remove all session storage. Returns the
    /// number of sessions removed.
    pub async fn cleanup(&self) -> Result<usize> {
        let sessions = self.store.list()?;
        for session_id in &sessions {
            if let Err(err) = self.stop(session_id).await {
                warn!(session_id = %session_id, error = %err, "failed to stop producer");
            }
        }
        self.store.remove_all()?;
        info!(count = sessions.len(), "sessions removed");
        Ok(sessions.len())
    }

    /// New observations since the last non-peeking read, summarized.
    pub async fn observe(&self, session_id: &str, peek: bool) -> Result<ObservationDigest> {
        ObservationReader::new(&self.store, self.runs.as_ref())
            .observe(session_id, peek)
            .await
    }

    /// Producer log text; `None` when nothing was logged.
    pub fn log(&self, session_id: &str) -> Result<Option<String>> {
        if !self.store.exists(session_id) {
            return Err(ArenaError::SessionNotFound(session_id.to_string()));
        }
        let paths = self.store.paths(session_id)?;
        match std::fs::read_to_string(&paths.log) {
            Ok(text) => Ok(Some(text)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

/// In-memory read position used while waiting for the game to start.
enum JoinScan {
    Journal,
    Offset(u64),
    Token(Option<String>),
}

impl JoinScan {
    fn from_cursor(cursor: &Cursor) -> Self {
        match cursor {
            Cursor::Journal => Self::Journal,
            Cursor::Offset { offset } => Self::Offset(*offset),
            Cursor::Token { token } => Self::Token(token.clone()),
        }
    }

    /// Envelopes not yet seen by this scan. The journal is re-read whole.
    async fn next(
        &mut self,
        paths: &SessionPaths,
        runs: &dyn RunService,
        run: &RunHandle,
    ) -> Result<Vec<Envelope>> {
        match self {
            Self::Journal => Ok(paths
                .journal()
                .drain(DrainMode::Peek)?
                .into_iter()
                .map(Envelope::from_value)
                .collect()),
            Self::Offset(offset) => {
                let batch = journal::read_stream_buffer(&paths.stream_buffer, *offset)?;
                *offset = batch.next_offset;
                Ok(batch.envelopes)
            }
            Self::Token(token) => {
                let batch = poll_page(runs, run.observation_run_id(), token.as_deref()).await?;
                *token = batch.next_token;
                Ok(batch.envelopes)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{QueueJoin, QueueStatus};
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct NeverAssigned;

    #[async_trait]
    impl Matchmaking for NeverAssigned {
        async fn join(&self, _agent: &str) -> Result<QueueJoin> {
            Ok(QueueJoin {
                success: true,
                ..Default::default()
            })
        }

        async fn status(&self, _agent: &str) -> Result<QueueStatus> {
            Ok(QueueStatus {
                in_queue: true,
                ..Default::default()
            })
        }

        async fn confirm(&self, _agent: &str, _run_id: &str) -> Result<()> {
            unreachable!("no run is ever assigned")
        }
    }

    fn supervisor(dir: &TempDir, producer: ProducerKind) -> SessionSupervisor {
        let config = ArenaConfig::new(dir.path().to_path_buf())
            .with_agent_name("bot")
            .with_api_key("key")
            .with_base_url("http://127.0.0.1:9")
            .with_producer(producer)
            .with_queue_poll_interval(Duration::from_millis(10));
        let client = Arc::new(HttpArenaClient::new(&config).unwrap());
        let launcher = Arc::new(ProcessLauncher::new("/bin/false".into(), dir.path().into()));
        SessionSupervisor::new(config, Arc::new(NeverAssigned), client, launcher)
    }

    #[tokio::test]
    async fn assignment_timeout_fails_the_session() {
        let dir = TempDir::new().unwrap();
        let supervisor = supervisor(&dir, ProducerKind::RemotePoll);

        let err = supervisor.join(Duration::from_millis(50)).await.unwrap_err();
        assert!(matches!(err, ArenaError::AssignmentTimeout { .. }));
        assert_eq!(err.exit_code().as_i32(), 1);

        let sessions = supervisor.list().unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].status, Some(SessionStatus::Failed));
        assert_eq!(sessions[0].alive, None);
    }

    #[tokio::test]
    async fn daemon_that_never_starts_is_reported_with_its_log() {
        let dir = TempDir::new().unwrap();
        let supervisor = supervisor(&dir, ProducerKind::LocalDaemon);

        let err = supervisor.join(Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, ArenaError::ProducerExited { .. }));
        let sessions = supervisor.list().unwrap();
        assert_eq!(sessions[0].status, Some(SessionStatus::Failed));
        assert_eq!(sessions[0].alive, Some(false));
    }

    #[tokio::test]
    async fn missing_credentials_are_rejected_before_any_session_exists() {
        let dir = TempDir::new().unwrap();
        let config = ArenaConfig::new(dir.path().to_path_buf()).with_agent_name("bot");
        let client = Arc::new(HttpArenaClient::new(&config).unwrap());
        let launcher = Arc::new(ProcessLauncher::new("/bin/false".into(), dir.path().into()));
        let supervisor = SessionSupervisor::new(config, Arc::new(NeverAssigned), client, launcher);

        let err = supervisor.join(Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, ArenaError::Configuration(_)));
        assert!(supervisor.list().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unreadable_sessions_do_not_abort_the_listing() {
        let dir = TempDir::new().unwrap();
        let supervisor = supervisor(&dir, ProducerKind::RemotePoll);
        let store = supervisor.store();
        store
            .create(&SessionState::new("good0001", "bot", ProducerKind::RemotePoll))
            .unwrap();
        std::fs::create_dir_all(store.root().join("bad00001")).unwrap();
        std::fs::write(store.root().join("bad00001/state.json"), "{oops").unwrap();

        let sessions = supervisor.list().unwrap();
        assert_eq!(sessions.len(), 2);
        assert!(sessions[0].error.is_some());
        assert_eq!(sessions[1].status, Some(SessionStatus::WaitingForInit));

        let err = supervisor.detail("bad00001").unwrap_err();
        assert!(matches!(err, ArenaError::CorruptState { .. }));
        assert!(matches!(
            supervisor.detail("nope0000").unwrap_err(),
            ArenaError::SessionNotFound(_)
        ));
    }

    #[tokio::test]
    async fn stop_and_cleanup_are_idempotent() {
        let dir = TempDir::new().unwrap();
        let supervisor = supervisor(&dir, ProducerKind::LocalDaemon);
        supervisor
            .store()
            .create(&SessionState::new("aaaa1111", "bot", ProducerKind::LocalDaemon))
            .unwrap();

        assert_eq!(supervisor.stop("aaaa1111").await.unwrap(), StopOutcome::NotRunning);
        assert_eq!(supervisor.stop("aaaa1111").await.unwrap(), StopOutcome::NotRunning);
        assert_eq!(supervisor.cleanup().await.unwrap(), 1);
        assert_eq!(supervisor.cleanup().await.unwrap(), 0);
        assert!(supervisor.list().unwrap().is_empty());
    }

    #[test]
    fn log_of_a_session_without_output_is_none() {
        let dir = TempDir::new().unwrap();
        let supervisor = supervisor(&dir, ProducerKind::RemotePoll);
        supervisor
            .store()
            .create(&SessionState::new("aaaa2222", "bot", ProducerKind::RemotePoll))
            .unwrap();
        assert_eq!(supervisor.log("aaaa2222").unwrap(), None);
        assert!(matches!(
            supervisor.log("zzzz0000").unwrap_err(),
            ArenaError::SessionNotFound(_)
        ));
    }

    #[test]
    fn assignment_keeps_an_init_the_daemon_already_wrote() {
        let dir = TempDir::new().unwrap();
        let supervisor = supervisor(&dir, ProducerKind::LocalDaemon);
        let store = supervisor.store();
        store
            .create(&SessionState::new("aaaa3333", "bot", ProducerKind::LocalDaemon))
            .unwrap();
        store
            .update("aaaa3333", |state| {
                let run = state.run.get_or_insert_with(RunHandle::default);
                run.apply_init(&json!({
                    "task": "build a tower",
                    "runId": "run-1",
                    "participantId": "p-1",
                    "jsFunctions": ["skills.mine"],
                }));
                state.status = SessionStatus::Playing;
            })
            .unwrap();

        let assigned = AssignedRun {
            run_id: "run-1".into(),
            id: Some("run-1-internal".into()),
            participant_name: Some("bot".into()),
        };
        let run = supervisor.record_assignment("aaaa3333", &assigned).unwrap();

        let stored = store.load("aaaa3333").unwrap();
        assert_eq!(stored.run.as_ref(), Some(&run));
        assert_eq!(run.task.as_deref(), Some("build a tower"));
        assert_eq!(run.participant_id.as_deref(), Some("p-1"));
        assert_eq!(run.skills, vec!["skills.mine".to_string()]);
        assert_eq!(run.internal_run_id.as_deref(), Some("run-1-internal"));
        assert_eq!(run.participant_name.as_deref(), Some("bot"));
        assert_eq!(stored.status, SessionStatus::Playing);
    }

    #[test]
    fn join_summary_keeps_the_first_ten_chat_lines() {
        let chat: Vec<Value> = (0..15).map(|i| json!(format!("line {i}"))).collect();
        let outcome = JoinOutcome {
            session_id: "s".into(),
            producer: ProducerKind::RemotePoll,
            run: RunHandle::new("run-1"),
            producer_pid: None,
            initial_state: json!({"event": "initial_state", "score": 0, "chat": chat}),
        };
        let summary = outcome.summary();
        assert_eq!(summary["run_id"], "run-1");
        assert_eq!(summary["chat"].as_array().unwrap().len(), 10);
        assert_eq!(summary["health"], Value::Null);
    }
}
