//! Projection of raw observation records into state snapshots and events.
//!
//! Every observation field is either *state-class* (only the latest value
//! matters: position, health, score, ...) or *event-class* (a discrete
//! occurrence: chat text, command output, death). A batch of records is
//! summarized as the state of the latest record plus one event per record.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Maximum number of characters kept from a record's `output` field.
pub const OUTPUT_LIMIT: usize = 500;

/// Fields whose latest value describes the world as of now.
pub const STATE_FIELDS: &[&str] = &[
    "position",
    "health",
    "players",
    "blocks",
    "entities",
    "inventory",
    "run_status",
    "run_id",
    "xp",
    "score",
    "gamemode",
    "equipped",
    "winner",
    "is_alive",
    "craftable",
    "time_of_day",
    "name",
];

/// Noise fields dropped from every record.
pub const EXCLUDED_FIELDS: &[&str] = &[
    "task",
    "observation_id",
    "time",
    "run_id",
    "idle",
    "biome",
    "weather",
    "on_ground",
    "participant_id",
    "executing",
    "hunger",
    "lives",
];

/// A raw or projected observation record.
pub type Record = Map<String, Value>;

/// Result of summarizing a batch of records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObservationDigest {
    pub current_state: Record,
    pub events: Vec<Record>,
    pub total_events: usize,
}

pub fn is_state_field(field: &str) -> bool {
    STATE_FIELDS.contains(&field)
}

pub fn is_excluded_field(field: &str) -> bool {
    EXCLUDED_FIELDS.contains(&field)
}

/// Drop noise fields and bound the `output` text.
pub fn filter_observation(record: &Record) -> Record {
    let mut projected: Record = record
        .iter()
        .filter(|(key, _)| !is_excluded_field(key))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    if let Some(output) = projected.get_mut("output") {
        *output = truncate_output(output);
    }
    projected
}

fn truncate_output(output: &Value) -> Value {
    match output {
        Value::String(text) if text.is_empty() => Value::Null,
        Value::String(text) => match text.char_indices().nth(OUTPUT_LIMIT) {
            Some((cut, _)) => Value::String(text[..cut].to_string()),
            None => Value::String(text.clone()),
        },
        other => other.clone(),
    }
}

/// Event view of a record: non-state fields with a meaningful value.
pub fn extract_event(record: &Record) -> Record {
    record
        .iter()
        .filter(|(key, _)| !is_state_field(key))
        .filter(|(_, value)| !is_empty_value(value))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// State view of a record: the state-class fields it carries.
pub fn extract_current_state(record: &Record) -> Record {
    record
        .iter()
        .filter(|(key, _)| is_state_field(key))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// Summarize already-projected records.
pub fn summarize(records: &[Record]) -> ObservationDigest {
    let Some(latest) = records.last() else {
        return ObservationDigest::default();
    };
    ObservationDigest {
        current_state: extract_current_state(latest),
        events: records.iter().map(extract_event).collect(),
        total_events: records.len(),
    }
}

/// Project raw JSON values and summarize them. Non-object values are ignored.
pub fn digest(raw: &[Value]) -> ObservationDigest {
    let projected: Vec<Record> = raw
        .iter()
        .filter_map(Value::as_object)
        .map(filter_observation)
        .collect();
    summarize(&projected)
}
