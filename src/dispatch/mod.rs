//! Forwards agent actions to a session's run.

use std::sync::Arc;

use tracing::info;

use crate::api::{Action, RunService};
use crate::error::{ArenaError, Result};
use crate::session::{RunHandle, SessionStore};

const CODE_PREVIEW_CHARS: usize = 60;

pub struct ActionDispatcher {
    store: SessionStore,
    runs: Arc<dyn RunService>,
}

impl ActionDispatcher {
    pub fn new(store: SessionStore, runs: Arc<dyn RunService>) -> Self {
        Self { store, runs }
    }

    /// Send `action` to the session's run. Failures are reported, never
    /// retried, and no local state changes either way.
    pub async fn send(&self, session_id: &str, action: &Action) -> Result<RunHandle> {
        if action.is_empty() {
            return Err(ArenaError::InvalidArgument(
                "an action needs code or a message".into(),
            ));
        }
        let state = self.store.load(session_id)?;
        let run = state
            .run
            .filter(|run| !run.run_id.is_empty())
            .ok_or_else(|| ArenaError::RunNotStarted(session_id.to_string()))?;

        info!(
            session_id,
            run_id = run.short_run_id(),
            code = %preview(&action.code),
            message = %action.message,
            "sending action"
        );
        self.runs.post_action(&run, action).await?;
        Ok(run)
    }
}

fn preview(code: &str) -> String {
    let mut chars = code.chars();
    let head: String = chars.by_ref().take(CODE_PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}
