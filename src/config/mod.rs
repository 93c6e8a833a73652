//! Configuration (layered: code > env > `.env` file > defaults).

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ArenaError, Result};
use crate::producer::ProducerKind;

const DEFAULT_ARENA_URL: &str = "https://kradleverse.com/api/v1";
const DEFAULT_RUN_API_URL: &str = "https://api.kradle.ai/v0";
const PLACEHOLDER_AGENT_NAME: &str = "UnnamedAgent";

/// Explicit configuration threaded into the supervisor, producers and clients.
///
/// Nothing in the crate reads the environment after [`ArenaConfig::from_env`]
/// has run; tests build a config directly and override what they need.
#[derive(Clone)]
pub struct ArenaConfig {
    pub agent_name: String,
    api_key: Option<String>,
    /// Matchmaking and observation endpoints.
    pub arena_url: String,
    /// Run actions and agent runtime endpoints.
    pub run_api_url: String,
    /// Root of all local state; sessions live in `<home>/sessions`.
    pub home_dir: PathBuf,
    pub producer: ProducerKind,
    pub queue_poll_interval: Duration,
    pub observation_poll_interval: Duration,
    pub producer_ready_timeout: Duration,
    pub inactivity_timeout: Duration,
    pub watchdog_interval: Duration,
    pub gameover_grace: Duration,
    pub stop_grace: Duration,
}

impl fmt::Debug for ArenaConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArenaConfig")
            .field("agent_name", &self.agent_name)
            .field("api_key", &self.api_key.as_ref().map(|_| ".."))
            .field("arena_url", &self.arena_url)
            .field("run_api_url", &self.run_api_url)
            .field("home_dir", &self.home_dir)
            .field("producer", &self.producer)
            .finish_non_exhaustive()
    }
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self::new(default_home_dir())
    }
}

impl ArenaConfig {
    /// Config with default endpoints and timings rooted at `home_dir`.
    pub fn new(home_dir: PathBuf) -> Self {
        Self {
            agent_name: PLACEHOLDER_AGENT_NAME.to_string(),
            api_key: None,
            arena_url: DEFAULT_ARENA_URL.to_string(),
            run_api_url: DEFAULT_RUN_API_URL.to_string(),
            home_dir,
            producer: ProducerKind::LocalDaemon,
            queue_poll_interval: Duration::from_secs(5),
            observation_poll_interval: Duration::from_secs(1),
            producer_ready_timeout: Duration::from_secs(60),
            inactivity_timeout: Duration::from_secs(300),
            watchdog_interval: Duration::from_secs(30),
            gameover_grace: Duration::from_secs(2),
            stop_grace: Duration::from_secs(10),
        }
    }

    /// Load from environment variables, after reading `.env` files.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        let home_dir = std::env::var("ARENALINK_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_home_dir());
        let _ = dotenvy::from_path(home_dir.join(".env"));

        let mut config = Self::new(home_dir);
        if let Ok(name) = std::env::var("ARENALINK_AGENT_NAME") {
            config.agent_name = name;
        }
        if let Ok(key) = std::env::var("ARENALINK_API_KEY") {
            config.api_key = Some(key);
        }
        if let Ok(url) = std::env::var("ARENALINK_ARENA_URL") {
            config.arena_url = url;
        }
        if let Ok(url) = std::env::var("ARENALINK_RUN_API_URL") {
            config.run_api_url = url;
        }
        if let Ok(raw) = std::env::var("ARENALINK_PRODUCER") {
            match raw.parse() {
                Ok(kind) => config.producer = kind,
                Err(_) => tracing::warn!(value = %raw, "ignoring unknown ARENALINK_PRODUCER"),
            }
        }
        config
    }

    pub fn with_agent_name(mut self, name: impl Into<String>) -> Self {
        self.agent_name = name.into();
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Point both the arena and run API at one base URL (mock servers).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        let url = url.into();
        self.arena_url = url.clone();
        self.run_api_url = url;
        self
    }

    pub fn with_producer(mut self, producer: ProducerKind) -> Self {
        self.producer = producer;
        self
    }

    pub fn with_queue_poll_interval(mut self, interval: Duration) -> Self {
        self.queue_poll_interval = interval;
        self
    }

    pub fn with_observation_poll_interval(mut self, interval: Duration) -> Self {
        self.observation_poll_interval = interval;
        self
    }

    pub fn with_inactivity(mut self, timeout: Duration, check_every: Duration) -> Self {
        self.inactivity_timeout = timeout;
        self.watchdog_interval = check_every;
        self
    }

    pub fn with_gameover_grace(mut self, grace: Duration) -> Self {
        self.gameover_grace = grace;
        self
    }

    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.home_dir.join("sessions")
    }

    /// Fail fast when credentials are missing.
    pub fn validate(&self) -> Result<()> {
        let name = self.agent_name.trim();
        if name.is_empty() || name == PLACEHOLDER_AGENT_NAME {
            return Err(ArenaError::Configuration(format!(
                "ARENALINK_AGENT_NAME is not set (checked env and {})",
                env_file_hint(&self.home_dir)
            )));
        }
        if self.api_key.as_deref().map_or(true, |k| k.trim().is_empty()) {
            return Err(ArenaError::Configuration(format!(
                "ARENALINK_API_KEY is not set (checked env and {})",
                env_file_hint(&self.home_dir)
            )));
        }
        Ok(())
    }
}

fn env_file_hint(home: &Path) -> String {
    home.join(".env").display().to_string()
}

fn default_home_dir() -> PathBuf {
    directories::UserDirs::new()
        .map(|dirs| dirs.home_dir().join(".arenalink"))
        .unwrap_or_else(|| PathBuf::from(".arenalink"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_agent_name_is_rejected() {
        let config = ArenaConfig::new(PathBuf::from("/tmp/x")).with_api_key("key");
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("ARENALINK_AGENT_NAME"));
    }

    #[test]
    fn missing_api_key_is_rejected() {
        let config = ArenaConfig::new(PathBuf::from("/tmp/x")).with_agent_name("bot");
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ArenaError::Configuration(_)));
        assert!(err.to_string().contains("ARENALINK_API_KEY"));
    }

    #[test]
    fn complete_config_validates() {
        let config = ArenaConfig::new(PathBuf::from("/tmp/x"))
            .with_agent_name("bot")
            .with_api_key("key");
        assert!(config.validate().is_ok());
        assert_eq!(config.sessions_dir(), PathBuf::from("/tmp/x/sessions"));
    }

    #[test]
    fn debug_output_hides_api_key() {
        let config = ArenaConfig::new(PathBuf::from("/tmp/x")).with_api_key("secret-key");
        let debug = format!("{config:?}");
        assert!(!debug.contains("secret-key"));
    }

    #[test]
    fn timing_builders_override_defaults() {
        let config = ArenaConfig::new(PathBuf::from("/tmp/x"))
            .with_inactivity(Duration::from_secs(60), Duration::from_secs(5))
            .with_gameover_grace(Duration::from_millis(500));
        assert_eq!(config.inactivity_timeout, Duration::from_secs(60));
        assert_eq!(config.watchdog_interval, Duration::from_secs(5));
        assert_eq!(config.gameover_grace, Duration::from_millis(500));
    }

    #[test]
    fn base_url_override_applies_to_both_services() {
        let config = ArenaConfig::new(PathBuf::from("/tmp/x")).with_base_url("http://127.0.0.1:9");
        assert_eq!(config.arena_url, "http://127.0.0.1:9");
        assert_eq!(config.run_api_url, "http://127.0.0.1:9");
    }
}
