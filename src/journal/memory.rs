use std::sync::Mutex;

use serde_json::Value;

use super::{DrainMode, ObservationJournal};
use crate::error::Result;

/// In-process journal with the same contract as [`super::FileJournal`].
#[derive(Debug, Default)]
pub struct MemoryJournal {
    records: Mutex<Vec<Value>>,
}

impl MemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ObservationJournal for MemoryJournal {
    fn append(&self, record: &Value) -> Result<()> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(record.clone());
        Ok(())
    }

    fn drain(&self, mode: DrainMode) -> Result<Vec<Value>> {
        let mut records = self
            .records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(match mode {
            DrainMode::Clear => std::mem::take(&mut *records),
            DrainMode::Peek => records.clone(),
        })
    }
}
