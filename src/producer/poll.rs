//! Remote poll producer: pages through a run's observations by token.

use serde_json::Value;
use tracing::{debug, warn};

use crate::api::RunService;
use crate::error::Result;
use crate::journal::Envelope;

/// One page of envelopes and the token to resume from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PollBatch {
    pub envelopes: Vec<Envelope>,
    pub next_token: Option<String>,
}

/// Fetch the page after `token`.
///
/// Transient failures yield an empty batch that keeps `token`, so the caller
/// simply retries on its next read. A page without a continuation token also
/// keeps the current one.
pub async fn poll_page(
    runs: &dyn RunService,
    run_id: &str,
    token: Option<&str>,
) -> Result<PollBatch> {
    let page = match runs.list_observations(run_id, token).await {
        Ok(page) => page,
        Err(err) if err.is_transient() => {
            warn!(run_id, error = %err, "observation poll failed; keeping token");
            return Ok(PollBatch {
                envelopes: Vec::new(),
                next_token: token.map(str::to_string),
            });
        }
        Err(err) => return Err(err),
    };

    let envelopes: Vec<Envelope> = page
        .observations
        .into_iter()
        .filter(|value| !is_empty_record(value))
        .map(Envelope::from_value)
        .collect();
    debug!(run_id, count = envelopes.len(), "observation page");
    Ok(PollBatch {
        envelopes,
        next_token: page.next_page_token.or_else(|| token.map(str::to_string)),
    })
}

fn is_empty_record(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}
