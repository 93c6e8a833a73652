//! Session metadata and its on-disk layout.
//!
//! Each session owns `<home>/sessions/<id>/` holding `state.json` (run handle,
//! cursor, status, timestamps) and, depending on the producer, the
//! observation journal, a pid file, a log file and the SSE capture buffer.

mod store;

pub use store::{SessionPaths, SessionStore};

use std::collections::BTreeSet;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString};

use crate::producer::ProducerKind;

/// Lifecycle status of a session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SessionStatus {
    WaitingForInit,
    Playing,
    Finished,
    Failed,
}

/// Identifiers and metadata addressing one remote run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunHandle {
    pub run_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internal_run_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participant_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participant_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    #[serde(default)]
    pub skills: Vec<String>,
}

impl RunHandle {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            ..Default::default()
        }
    }

    /// The init call has delivered the task.
    pub fn is_initialized(&self) -> bool {
        self.task.is_some()
    }

    /// Id used when talking to the run service's observation endpoints.
    pub fn observation_run_id(&self) -> &str {
        self.internal_run_id.as_deref().unwrap_or(&self.run_id)
    }

    /// Fill task/participant/skills from an init payload
    /// (`{task, runId, participantId, jsFunctions}`, camel or snake case).
    pub fn apply_init(&mut self, init: &Value) {
        let field = |camel: &str, snake: &str| {
            init.get(camel)
                .or_else(|| init.get(snake))
                .and_then(Value::as_str)
                .map(str::to_string)
        };
        if let Some(task) = field("task", "task") {
            self.task = Some(task);
        }
        if let Some(participant) = field("participantId", "participant_id") {
            self.participant_id = Some(participant);
        }
        if self.run_id.is_empty() {
            if let Some(run_id) = field("runId", "run_id") {
                self.run_id = run_id;
            }
        }
        if let Some(functions) = init.get("jsFunctions").or_else(|| init.get("js_functions")) {
            self.skills = skill_names(functions);
        }
        if self.task.is_none() {
            self.task = Some(String::new());
        }
    }

    pub fn short_run_id(&self) -> &str {
        let end = self
            .run_id
            .char_indices()
            .nth(8)
            .map_or(self.run_id.len(), |(i, _)| i);
        &self.run_id[..end]
    }
}

/// Extract callable skill names from the init call's function catalogue.
///
/// The catalogue arrives as a list of names, a list of `{name}` objects, a
/// map keyed by name, or JSON/JS source text mentioning `skills.*`/`world.*`.
pub fn skill_names(functions: &Value) -> Vec<String> {
    let names: BTreeSet<String> = match functions {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(name) => Some(name.clone()),
                Value::Object(map) => map.get("name").and_then(Value::as_str).map(str::to_string),
                _ => None,
            })
            .collect(),
        Value::Object(map) => map.keys().cloned().collect(),
        Value::String(text) => match serde_json::from_str::<Value>(text) {
            Ok(parsed @ (Value::Array(_) | Value::Object(_))) => return skill_names(&parsed),
            _ => skill_pattern()
                .captures_iter(text)
                .map(|caps| caps[1].to_string())
                .collect(),
        },
        _ => BTreeSet::new(),
    };
    names.into_iter().collect()
}

fn skill_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\b((?:skills|world)\.[A-Za-z_][A-Za-z0-9_]*)").expect("valid skill regex")
    })
}

/// Read position for the session's producer strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Cursor {
    /// Clear-on-read journal; the position is implicit.
    Journal,
    /// Byte offset into the SSE capture buffer.
    Offset { offset: u64 },
    /// Continuation token from the poll endpoint; `None` starts at the beginning.
    Token { token: Option<String> },
}

impl Cursor {
    pub fn initial(kind: ProducerKind) -> Self {
        match kind {
            ProducerKind::LocalDaemon => Self::Journal,
            ProducerKind::RemoteStream => Self::Offset { offset: 0 },
            ProducerKind::RemotePoll => Self::Token { token: None },
        }
    }
}

/// Everything persisted in `state.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: String,
    pub agent_name: String,
    pub status: SessionStatus,
    pub producer: ProducerKind,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run: Option<RunHandle>,
    pub cursor: Cursor,
}

impl SessionState {
    pub fn new(
        session_id: impl Into<String>,
        agent_name: impl Into<String>,
        producer: ProducerKind,
    ) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            agent_name: agent_name.into(),
            status: SessionStatus::WaitingForInit,
            producer,
            created_at: now,
            updated_at: now,
            run: None,
            cursor: Cursor::initial(producer),
        }
    }

    pub fn run_id(&self) -> Option<&str> {
        self.run.as_ref().map(|run| run.run_id.as_str())
    }
}
