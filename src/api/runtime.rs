use async_trait::async_trait;
use futures::StreamExt;
use reqwest_eventsource::{Event, EventSource};
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::http::{bearer_headers, build_client, ensure_success, REQUEST_TIMEOUT};
use super::AgentReply;
use crate::config::ArenaConfig;
use crate::error::{ArenaError, Result};

/// Identity the daemon registers with the agent runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentIdentity {
    pub name: String,
    pub display_name: String,
    pub description: String,
}

impl AgentIdentity {
    pub fn for_agent(agent_name: &str) -> Self {
        Self {
            name: format!("arenalink:{agent_name}"),
            display_name: agent_name.to_string(),
            description: "arenalink observer".to_string(),
        }
    }
}

/// Message delivered by the agent runtime subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeMessage {
    /// `{task, runId, participantId, jsFunctions}` once the arena starts.
    Init(Value),
    /// One observation record; `request_id` addresses the reply.
    Event {
        request_id: Option<String>,
        observation: Value,
    },
}

/// Registration plus a persistent event subscription.
#[async_trait]
pub trait AgentRuntime: Send {
    async fn register(&mut self, identity: &AgentIdentity) -> Result<()>;

    /// Next message, or `None` once the subscription has ended.
    async fn next_message(&mut self) -> Option<Result<RuntimeMessage>>;

    async fn reply(&mut self, request_id: &str, reply: &AgentReply) -> Result<()>;
}

/// Agent runtime over HTTP registration and an SSE event subscription.
pub struct SseAgentRuntime {
    client: reqwest::Client,
    /// No request timeout: the subscription stays open for the whole game.
    stream_client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    agent: Option<String>,
    source: Option<EventSource>,
}

impl SseAgentRuntime {
    pub fn new(config: &ArenaConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(Some(REQUEST_TIMEOUT))?,
            stream_client: build_client(None)?,
            base_url: config.run_api_url.trim_end_matches('/').to_string(),
            api_key: config.api_key().map(str::to_string),
            agent: None,
            source: None,
        })
    }
}

#[async_trait]
impl AgentRuntime for SseAgentRuntime {
    async fn register(&mut self, identity: &AgentIdentity) -> Result<()> {
        let headers = bearer_headers(self.api_key.as_deref());
        let resp = self
            .client
            .post(format!("{}/agents/register", self.base_url))
            .headers(headers.clone())
            .json(&json!({
                "name": identity.name,
                "displayName": identity.display_name,
                "description": identity.description,
            }))
            .send()
            .await?;
        ensure_success(resp).await?;

        let request = self
            .stream_client
            .get(format!("{}/agents/{}/events", self.base_url, identity.name))
            .headers(headers);
        let source = EventSource::new(request)
            .map_err(|err| ArenaError::Stream(format!("cannot open subscription: {err}")))?;
        self.agent = Some(identity.name.clone());
        self.source = Some(source);
        Ok(())
    }

    async fn next_message(&mut self) -> Option<Result<RuntimeMessage>> {
        let source = self.source.as_mut()?;
        while let Some(event) = source.next().await {
            match event {
                Ok(Event::Open) => debug!("agent subscription open"),
                Ok(Event::Message(message)) => {
                    if message.event == "done" {
                        source.close();
                        return None;
                    }
                    match parse_runtime_message(&message.data) {
                        Some(parsed) => return Some(Ok(parsed)),
                        None => debug!(event = %message.event, "ignoring runtime message"),
                    }
                }
                Err(reqwest_eventsource::Error::StreamEnded) => return None,
                Err(reqwest_eventsource::Error::InvalidStatusCode(status, _)) => {
                    source.close();
                    return Some(Err(ArenaError::api(
                        status.as_u16(),
                        "agent event subscription rejected",
                    )));
                }
                Err(err) => {
                    warn!(error = %err, "agent subscription error; reconnecting");
                    return Some(Err(ArenaError::Stream(err.to_string())));
                }
            }
        }
        None
    }

    async fn reply(&mut self, request_id: &str, reply: &AgentReply) -> Result<()> {
        let Some(agent) = self.agent.as_deref() else {
            return Err(ArenaError::Producer("reply before registration".into()));
        };
        let resp = self
            .client
            .post(format!(
                "{}/agents/{}/responses/{}",
                self.base_url, agent, request_id
            ))
            .headers(bearer_headers(self.api_key.as_deref()))
            .json(reply)
            .send()
            .await?;
        ensure_success(resp).await?;
        Ok(())
    }
}

/// Decode one subscription payload; unknown message types yield `None`.
pub(crate) fn parse_runtime_message(data: &str) -> Option<RuntimeMessage> {
    let value: Value = serde_json::from_str(data).ok()?;
    match value.get("type").and_then(Value::as_str)? {
        "init" => Some(RuntimeMessage::Init(
            value.get("data").cloned().unwrap_or(value),
        )),
        "event" => {
            let observation = value.get("observation").cloned()?;
            let request_id = value
                .get("requestId")
                .and_then(Value::as_str)
                .map(str::to_string);
            Some(RuntimeMessage::Event {
                request_id,
                observation,
            })
        }
        _ => None,
    }
}
