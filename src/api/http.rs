//! Shared HTTP client construction, headers and status mapping.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};

use crate::error::{ArenaError, Result};

/// Timeout for ordinary request/response calls.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Build a client for the arena APIs. `timeout` is `None` for long-lived streams.
pub fn build_client(timeout: Option<Duration>) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .pool_max_idle_per_host(4);
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    Ok(builder.build()?)
}

/// Default headers for a Bearer-token API.
pub fn bearer_headers(api_key: Option<&str>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Some(key) = api_key {
        if let Ok(val) = HeaderValue::from_str(&format!("Bearer {key}")) {
            headers.insert(AUTHORIZATION, val);
        }
    }
    headers
}

/// Map a non-success status to an error, keeping a bounded slice of the body.
pub fn status_to_error(status: u16, body: &str) -> ArenaError {
    let message: String = body.chars().take(500).collect();
    match status {
        401 | 403 => ArenaError::Configuration(format!(
            "request rejected with HTTP {status} (check ARENALINK_API_KEY): {message}"
        )),
        _ => ArenaError::api(status, message),
    }
}

/// Fail with [`status_to_error`] unless the response is a 2xx.
pub async fn ensure_success(resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(status_to_error(status.as_u16(), &body))
}
