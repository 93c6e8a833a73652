//! Session-scoped observation logs with a movable read cursor.
//!
//! [`ObservationJournal`] is the append/drain abstraction shared by the daemon
//! (writer) and short-lived readers. [`FileJournal`] backs it with an NDJSON
//! file guarded by advisory locks, [`MemoryJournal`] with a mutex. The SSE
//! capture buffer used by the streaming producer is read by byte offset
//! through [`read_stream_buffer`].

mod file;
mod memory;
mod sse_buffer;

pub use file::FileJournal;
pub use memory::MemoryJournal;
pub use sse_buffer::{parse_stream_line, read_stream_buffer, StreamBatch, StreamLine};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// How a drain treats the records it reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainMode {
    /// Exclusive: return everything and remove exactly what was returned.
    Clear,
    /// Shared: return everything, mutate nothing.
    Peek,
}

impl DrainMode {
    pub fn from_peek(peek: bool) -> Self {
        if peek {
            Self::Peek
        } else {
            Self::Clear
        }
    }
}

/// Append-only record log safe for one writer and many readers.
pub trait ObservationJournal: Send + Sync {
    fn append(&self, record: &Value) -> Result<()>;
    fn drain(&self, mode: DrainMode) -> Result<Vec<Value>>;
}

/// Level of a record emitted by the run service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordLevel {
    InitCall,
    Observation,
    #[serde(other)]
    Other,
}

/// `{level, data}` wrapper used by the poll and stream endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub level: RecordLevel,
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    /// Interpret a raw value; bare records without a `level` count as observations.
    pub fn from_value(value: Value) -> Self {
        match value.get("level") {
            Some(_) => serde_json::from_value(value.clone()).unwrap_or(Self {
                level: RecordLevel::Other,
                data: value,
            }),
            None => Self {
                level: RecordLevel::Observation,
                data: value,
            },
        }
    }

    pub fn is_observation(&self) -> bool {
        self.level == RecordLevel::Observation
    }

    pub fn is_init_call(&self) -> bool {
        self.level == RecordLevel::InitCall
    }
}

/// Keep only observation-level payloads.
pub fn observations(envelopes: impl IntoIterator<Item = Envelope>) -> Vec<Value> {
    envelopes
        .into_iter()
        .filter(Envelope::is_observation)
        .map(|envelope| envelope.data)
        .collect()
}
