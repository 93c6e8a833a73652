//! Shared test helpers: configs pointed at a mock arena and stand-in launchers.

#![allow(dead_code)]

use std::path::Path;
use std::process::{Child, Command};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use arenalink::api::HttpArenaClient;
use arenalink::config::ArenaConfig;
use arenalink::error::{ArenaError, Result};
use arenalink::journal::ObservationJournal;
use arenalink::producer::{LivenessFile, ProducerKind, ProducerLauncher};
use arenalink::session::{RunHandle, SessionPaths, SessionStatus, SessionStore};
use arenalink::supervisor::SessionSupervisor;
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const AGENT: &str = "test-bot";
pub const API_KEY: &str = "test-key";

/// Config rooted at `home`, talking to `server`, with fast timings.
pub fn test_config(home: &Path, server: &MockServer, producer: ProducerKind) -> ArenaConfig {
    ArenaConfig::new(home.to_path_buf())
        .with_agent_name(AGENT)
        .with_api_key(API_KEY)
        .with_base_url(server.uri())
        .with_producer(producer)
        .with_queue_poll_interval(Duration::from_millis(10))
        .with_observation_poll_interval(Duration::from_millis(10))
        .with_stop_grace(Duration::from_millis(200))
}

/// Launcher for strategies that never start a process.
pub struct RefusingLauncher;

impl ProducerLauncher for RefusingLauncher {
    fn launch(&self, kind: ProducerKind, _session_id: &str, _paths: &SessionPaths) -> Result<u32> {
        Err(ArenaError::Producer(format!("unexpected {kind} launch")))
    }
}

/// Stands in for the relay daemon: a sleeping child owns the pid file, and
/// the init and opening state are written the way the daemon writes them.
pub struct FakeDaemonLauncher {
    run_id: String,
    mark_ready: bool,
    children: Mutex<Vec<Child>>,
}

impl FakeDaemonLauncher {
    pub fn new(run_id: &str, mark_ready: bool) -> Self {
        Self {
            run_id: run_id.to_string(),
            mark_ready,
            children: Mutex::new(Vec::new()),
        }
    }

    /// Kill and wait every child still around.
    pub fn reap(&self) {
        for mut child in self.children.lock().unwrap().drain(..) {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

impl ProducerLauncher for FakeDaemonLauncher {
    fn launch(&self, _kind: ProducerKind, session_id: &str, paths: &SessionPaths) -> Result<u32> {
        let child = Command::new("sleep").arg("30").spawn()?;
        let pid = child.id();
        self.children.lock().unwrap().push(child);
        std::fs::write(&paths.pid, pid.to_string())?;
        if !self.mark_ready {
            return Ok(pid);
        }
        LivenessFile::new(&paths.pid).mark_ready()?;

        let store = SessionStore::new(paths.dir.parent().unwrap());
        let init = init_call(&self.run_id)["data"].clone();
        store.update(session_id, |state| {
            state.run.get_or_insert_with(RunHandle::default).apply_init(&init);
            state.status = SessionStatus::Playing;
        })?;
        paths
            .journal()
            .append(&json!({"event": "initial_state", "health": 20, "score": 0}))?;
        Ok(pid)
    }
}

pub fn supervisor(config: ArenaConfig) -> SessionSupervisor {
    supervisor_with(config, Arc::new(RefusingLauncher))
}

pub fn supervisor_with(config: ArenaConfig, launcher: Arc<dyn ProducerLauncher>) -> SessionSupervisor {
    let client = Arc::new(HttpArenaClient::new(&config).unwrap());
    SessionSupervisor::new(config, client.clone(), client, launcher)
}

/// Queue join, an immediate assignment of `run_id` and its confirmation.
pub async fn mount_matchmaking(server: &MockServer, run_id: &str) {
    Mock::given(method("POST"))
        .and(path("/queue/join"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "queueEntry": {"position": 3}
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/queue/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "inQueue": false,
            "run": {"runId": run_id, "id": format!("{run_id}-internal"), "participantName": AGENT}
        })))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/queue/confirm"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(server)
        .await;
}

pub fn init_call(run_id: &str) -> Value {
    json!({
        "level": "init_call",
        "data": {
            "task": "Collect 5 diamonds",
            "runId": run_id,
            "participantId": "participant-1",
            "jsFunctions": {"skills.goToPosition": {}, "skills.mine": {}}
        }
    })
}

pub fn observation(data: Value) -> Value {
    json!({"level": "observation", "data": data})
}
