//! Local daemon producer: relays agent-runtime events into the session journal.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};
use strum::Display;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{event_name, is_game_over, LivenessFile};
use crate::api::{AgentIdentity, AgentReply, AgentRuntime, RuntimeMessage};
use crate::config::ArenaConfig;
use crate::error::Result;
use crate::journal::ObservationJournal;
use crate::session::{RunHandle, SessionStatus, SessionStore};

/// Game events the daemon writes to the journal.
pub const RELAYED_EVENTS: &[&str] = &[
    "initial_state",
    "idle",
    "command_executed",
    "command_progress",
    "chat",
    "message",
    "death",
    "gameover",
    "game_over",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum DaemonPhase {
    Starting,
    Connected,
    Relaying,
    Terminating,
}

/// Why the daemon stopped. The first recorded reason wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DaemonExit {
    Signalled,
    Inactivity,
    GameOver,
    SubscriptionEnded,
    Failed(String),
}

/// Epoch-millisecond timestamp of the last relayed activity.
#[derive(Debug)]
pub struct ActivityClock(AtomicI64);

impl ActivityClock {
    pub fn new() -> Self {
        Self(AtomicI64::new(now_millis()))
    }

    /// Record activity now. Never moves the clock backwards.
    pub fn touch(&self) {
        self.touch_at(now_millis());
    }

    pub fn touch_at(&self, millis: i64) {
        self.0.fetch_max(millis, Ordering::AcqRel);
    }

    pub fn last_millis(&self) -> i64 {
        self.0.load(Ordering::Acquire)
    }

    pub fn idle_for(&self) -> Duration {
        let idle = now_millis().saturating_sub(self.last_millis());
        Duration::from_millis(idle.max(0) as u64)
    }
}

impl Default for ActivityClock {
    fn default() -> Self {
        Self::new()
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Timing knobs of one daemon run.
#[derive(Debug, Clone, Copy)]
pub struct DaemonTimings {
    pub inactivity_timeout: Duration,
    pub watchdog_interval: Duration,
    pub gameover_grace: Duration,
}

impl From<&ArenaConfig> for DaemonTimings {
    fn from(config: &ArenaConfig) -> Self {
        Self {
            inactivity_timeout: config.inactivity_timeout,
            watchdog_interval: config.watchdog_interval,
            gameover_grace: config.gameover_grace,
        }
    }
}

pub struct ProducerDaemon<R: AgentRuntime> {
    runtime: R,
    journal: Arc<dyn ObservationJournal>,
    store: SessionStore,
    session_id: String,
    liveness: LivenessFile,
    identity: AgentIdentity,
    timings: DaemonTimings,
    clock: Arc<ActivityClock>,
    cancel: CancellationToken,
    exit: Arc<OnceLock<DaemonExit>>,
    phase: DaemonPhase,
    game_over: bool,
}

impl<R: AgentRuntime> ProducerDaemon<R> {
    pub fn new(
        runtime: R,
        journal: Arc<dyn ObservationJournal>,
        store: SessionStore,
        session_id: impl Into<String>,
        identity: AgentIdentity,
        timings: DaemonTimings,
    ) -> Result<Self> {
        let session_id = session_id.into();
        let liveness = LivenessFile::new(store.paths(&session_id)?.pid);
        Ok(Self {
            runtime,
            journal,
            store,
            session_id,
            liveness,
            identity,
            timings,
            clock: Arc::new(ActivityClock::new()),
            cancel: CancellationToken::new(),
            exit: Arc::new(OnceLock::new()),
            phase: DaemonPhase::Starting,
            game_over: false,
        })
    }

    /// Token that stops the daemon when cancelled.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn clock(&self) -> Arc<ActivityClock> {
        self.clock.clone()
    }

    /// Register, relay until a terminal transition, then clean up.
    pub async fn run(mut self) -> DaemonExit {
        self.set_phase(DaemonPhase::Starting);
        if let Err(err) = self.liveness.write_current() {
            return self.finish(DaemonExit::Failed(format!("cannot write pid file: {err}")));
        }
        info!(session_id = %self.session_id, pid = std::process::id(), "daemon started");

        if let Err(err) = self.runtime.register(&self.identity).await {
            return self.finish(DaemonExit::Failed(format!("registration failed: {err}")));
        }
        if let Err(err) = self.liveness.mark_ready() {
            return self.finish(DaemonExit::Failed(format!("cannot write ready marker: {err}")));
        }
        self.set_phase(DaemonPhase::Connected);
        self.clock.touch();
        let watchdog = self.spawn_watchdog();

        let cancel = self.cancel.clone();
        loop {
            let message = tokio::select! {
                _ = cancel.cancelled() => break,
                message = self.runtime.next_message() => message,
            };
            match message {
                None => {
                    self.record_exit(DaemonExit::SubscriptionEnded);
                    break;
                }
                Some(Err(err)) if err.is_transient() => {
                    warn!(error = %err, "subscription hiccup");
                }
                Some(Err(err)) => {
                    self.record_exit(DaemonExit::Failed(err.to_string()));
                    break;
                }
                Some(Ok(RuntimeMessage::Init(payload))) => self.handle_init(&payload),
                Some(Ok(RuntimeMessage::Event {
                    request_id,
                    observation,
                })) => self.handle_event(request_id, observation).await,
            }
        }

        self.cancel.cancel();
        watchdog.abort();
        let exit = self.exit.get().cloned().unwrap_or(DaemonExit::Signalled);
        self.finish(exit)
    }

    fn set_phase(&mut self, phase: DaemonPhase) {
        if self.phase != phase {
            debug!(from = %self.phase, to = %phase, "daemon phase");
            self.phase = phase;
        }
    }

    fn record_exit(&self, reason: DaemonExit) {
        let _ = self.exit.set(reason);
    }

    fn spawn_watchdog(&self) -> JoinHandle<()> {
        let clock = self.clock.clone();
        let cancel = self.cancel.clone();
        let exit = self.exit.clone();
        let DaemonTimings {
            inactivity_timeout,
            watchdog_interval,
            ..
        } = self.timings;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(watchdog_interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = ticker.tick() => {}
                }
                let idle = clock.idle_for();
                if idle > inactivity_timeout {
                    info!(idle_secs = idle.as_secs(), "inactivity timeout; stopping daemon");
                    let _ = exit.set(DaemonExit::Inactivity);
                    cancel.cancel();
                    return;
                }
            }
        })
    }

    fn handle_init(&mut self, payload: &Value) {
        self.clock.touch();
        match self.save_run(payload) {
            Ok(run) => info!(run_id = %run.run_id, skills = run.skills.len(), "joined run"),
            Err(err) => warn!(error = %err, "failed to persist run handle"),
        }
    }

    fn save_run(&self, payload: &Value) -> Result<RunHandle> {
        self.store.update(&self.session_id, |state| {
            let run = state.run.get_or_insert_with(RunHandle::default);
            run.apply_init(payload);
            state.status = SessionStatus::Playing;
            run.clone()
        })
    }

    async fn handle_event(&mut self, request_id: Option<String>, observation: Value) {
        self.set_phase(DaemonPhase::Relaying);
        let name = event_name(&observation).map(str::to_string);
        match name.as_deref() {
            Some(name) if RELAYED_EVENTS.contains(&name) => {
                self.clock.touch();
                let record = stamp(observation);
                if let Err(err) = self.journal.append(&record) {
                    warn!(error = %err, "failed to append observation");
                }
                let score = record.get("score").cloned().unwrap_or_default();
                info!(event = name, score = %score, "event");
                if is_game_over(&record) && !self.game_over {
                    self.game_over = true;
                    self.schedule_shutdown();
                }
            }
            other => debug!(event = ?other, "event not relayed"),
        }

        if let Some(request_id) = request_id {
            let cancel = self.cancel.clone();
            let reply = AgentReply::inert();
            tokio::select! {
                _ = cancel.cancelled() => debug!(request_id, "reply abandoned on shutdown"),
                replied = self.runtime.reply(&request_id, &reply) => {
                    if let Err(err) = replied {
                        warn!(error = %err, request_id, "failed to answer event");
                    }
                }
            }
        }
    }

    /// Stop after the grace period so trailing writes land.
    fn schedule_shutdown(&self) {
        info!(grace_ms = self.timings.gameover_grace.as_millis() as u64, "game over");
        let cancel = self.cancel.clone();
        let exit = self.exit.clone();
        let grace = self.timings.gameover_grace;
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(grace) => {
                    let _ = exit.set(DaemonExit::GameOver);
                    cancel.cancel();
                }
            }
        });
    }

    fn finish(&mut self, exit: DaemonExit) -> DaemonExit {
        self.set_phase(DaemonPhase::Terminating);
        if self.game_over {
            if let Err(err) = self.mark_finished() {
                warn!(error = %err, "failed to mark session finished");
            }
        }
        self.liveness.remove();
        info!(session_id = %self.session_id, reason = ?exit, "daemon stopped");
        exit
    }

    fn mark_finished(&self) -> Result<()> {
        self.store.update(&self.session_id, |state| {
            state.status = SessionStatus::Finished;
        })
    }
}

/// Copy of `observation` with a `timestamp` (RFC 3339, UTC) added.
fn stamp(observation: Value) -> Value {
    let mut record = Map::new();
    record.insert(
        "timestamp".into(),
        Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)),
    );
    match observation {
        Value::Object(fields) => record.extend(fields),
        other => {
            record.insert("observation".into(), other);
        }
    }
    Value::Object(record)
}
