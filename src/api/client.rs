use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde_json::json;
use tracing::debug;

use super::http::{bearer_headers, build_client, ensure_success, REQUEST_TIMEOUT};
use super::{Action, Matchmaking, ObservationPage, QueueJoin, QueueStatus, RunService};
use crate::config::ArenaConfig;
use crate::error::{ArenaError, Result};
use crate::session::RunHandle;

/// reqwest-backed implementation of [`Matchmaking`] and [`RunService`].
#[derive(Debug, Clone)]
pub struct HttpArenaClient {
    client: reqwest::Client,
    stream_client: reqwest::Client,
    arena_url: String,
    run_api_url: String,
    api_key: Option<String>,
}

impl HttpArenaClient {
    pub fn new(config: &ArenaConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(Some(REQUEST_TIMEOUT))?,
            stream_client: build_client(None)?,
            arena_url: config.arena_url.trim_end_matches('/').to_string(),
            run_api_url: config.run_api_url.trim_end_matches('/').to_string(),
            api_key: config.api_key().map(str::to_string),
        })
    }

    fn headers(&self) -> reqwest::header::HeaderMap {
        bearer_headers(self.api_key.as_deref())
    }
}

#[async_trait]
impl Matchmaking for HttpArenaClient {
    async fn join(&self, agent: &str) -> Result<QueueJoin> {
        let url = format!("{}/queue/join", self.arena_url);
        debug!(agent, "queue join");
        let resp = self
            .client
            .post(&url)
            .headers(self.headers())
            .json(&json!({
                "agentId": agent,
                "myPythonServerIsRunning": true,
                "iHaveEnabledTheGatewayAndSetMyselfAsTheAgentBrain": true,
            }))
            .send()
            .await?;
        let resp = ensure_success(resp).await?;
        Ok(resp.json().await?)
    }

    async fn status(&self, agent: &str) -> Result<QueueStatus> {
        let url = format!("{}/queue/status", self.arena_url);
        let resp = self
            .client
            .get(&url)
            .headers(self.headers())
            .query(&[("agentId", agent)])
            .send()
            .await?;
        let resp = ensure_success(resp).await?;
        Ok(resp.json().await?)
    }

    async fn confirm(&self, agent: &str, run_id: &str) -> Result<()> {
        let url = format!("{}/queue/confirm", self.arena_url);
        debug!(agent, run_id, "queue confirm");
        let resp = self
            .client
            .post(&url)
            .headers(self.headers())
            .json(&json!({ "agentId": agent, "runId": run_id }))
            .send()
            .await?;
        ensure_success(resp).await?;
        Ok(())
    }
}

#[async_trait]
impl RunService for HttpArenaClient {
    async fn post_action(&self, run: &RunHandle, action: &Action) -> Result<()> {
        let url = format!("{}/runs/{}/actions", self.run_api_url, run.run_id);
        debug!(run_id = %run.run_id, "post action");
        let resp = self
            .client
            .post(&url)
            .headers(self.headers())
            .json(&json!({
                "participantId": run.participant_id,
                "action": action,
            }))
            .send()
            .await?;
        ensure_success(resp).await?;
        Ok(())
    }

    async fn list_observations(
        &self,
        run_id: &str,
        page_token: Option<&str>,
    ) -> Result<ObservationPage> {
        let url = format!("{}/runs/{}/observations", self.arena_url, run_id);
        let mut request = self.client.get(&url).headers(self.headers());
        if let Some(token) = page_token {
            request = request.query(&[("pageToken", token)]);
        }
        let resp = ensure_success(request.send().await?).await?;
        Ok(resp.json().await?)
    }

    async fn stream_observations(
        &self,
        run_id: &str,
    ) -> Result<BoxStream<'static, Result<Vec<u8>>>> {
        let url = format!("{}/runs/{}/observations/stream", self.arena_url, run_id);
        debug!(run_id, "open observation stream");
        let resp = self
            .stream_client
            .get(&url)
            .headers(self.headers())
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await?;
        let resp = ensure_success(resp).await?;
        let stream = resp
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(ArenaError::Network));
        Ok(stream.boxed())
    }
}
