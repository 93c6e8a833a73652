//! Remote collaborators: matchmaking, the run service and the agent runtime.
//!
//! Each collaborator sits behind a trait so the supervisor, producers and the
//! dispatcher can be driven by mocks; [`HttpArenaClient`] and
//! [`SseAgentRuntime`] are the production implementations.

mod client;
pub mod http;
mod runtime;

pub use client::HttpArenaClient;
pub use runtime::{AgentIdentity, AgentRuntime, RuntimeMessage, SseAgentRuntime};

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::session::RunHandle;

/// Response to `POST /queue/join`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueJoin {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub queue_entry: Option<QueueEntry>,
    #[serde(default)]
    pub error: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntry {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub position: Option<u64>,
}

/// Response to `GET /queue/status`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatus {
    #[serde(default)]
    pub in_queue: bool,
    #[serde(default)]
    pub queue_entry: Option<QueueEntry>,
    #[serde(default)]
    pub run: Option<AssignedRun>,
}

impl QueueStatus {
    pub fn position(&self) -> Option<u64> {
        self.queue_entry.as_ref().and_then(|entry| entry.position)
    }
}

/// The run the matchmaker assigned to this agent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignedRun {
    pub run_id: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub participant_name: Option<String>,
}

impl AssignedRun {
    pub fn to_run_handle(&self) -> RunHandle {
        RunHandle {
            run_id: self.run_id.clone(),
            internal_run_id: self.id.clone(),
            participant_name: self.participant_name.clone(),
            ..Default::default()
        }
    }
}

/// Opaque action forwarded verbatim to a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub code: String,
    pub message: String,
    pub thoughts: String,
}

impl Action {
    pub fn new(
        code: impl Into<String>,
        message: impl Into<String>,
        thoughts: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            thoughts: thoughts.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty() && self.message.is_empty()
    }
}

/// Reply the agent runtime expects for each relayed event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentReply {
    #[serde(flatten)]
    pub action: Action,
    pub delay: u64,
}

impl AgentReply {
    /// No code, no message, no delay: the daemon never acts on its own.
    pub fn inert() -> Self {
        Self::default()
    }
}

/// One page from `GET /runs/{id}/observations`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservationPage {
    #[serde(default)]
    pub observations: Vec<Value>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// Queue management for an agent identity.
#[async_trait]
pub trait Matchmaking: Send + Sync {
    async fn join(&self, agent: &str) -> Result<QueueJoin>;
    async fn status(&self, agent: &str) -> Result<QueueStatus>;
    async fn confirm(&self, agent: &str, run_id: &str) -> Result<()>;
}

/// Run-scoped endpoints.
#[async_trait]
pub trait RunService: Send + Sync {
    async fn post_action(&self, run: &RunHandle, action: &Action) -> Result<()>;

    async fn list_observations(
        &self,
        run_id: &str,
        page_token: Option<&str>,
    ) -> Result<ObservationPage>;

    /// Raw bytes of the run's SSE observation stream.
    async fn stream_observations(
        &self,
        run_id: &str,
    ) -> Result<BoxStream<'static, Result<Vec<u8>>>>;
}
