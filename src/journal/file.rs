use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use serde_json::Value;

use super::{DrainMode, ObservationJournal};
use crate::error::Result;

/// NDJSON journal guarded by `flock`-style advisory locks.
///
/// Appends and clearing drains hold the exclusive lock; peeks hold the shared
/// lock, so peeks run alongside each other but never alongside a clear.
#[derive(Debug, Clone)]
pub struct FileJournal {
    path: PathBuf,
}

impl FileJournal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Remove the backing file, if any.
    pub fn reset(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn open_for(&self, mode: DrainMode) -> std::io::Result<Option<File>> {
        let mut options = OpenOptions::new();
        options.read(true);
        if mode == DrainMode::Clear {
            options.write(true);
        }
        match options.open(&self.path) {
            Ok(file) => Ok(Some(file)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }
}

impl ObservationJournal for FileJournal {
    fn append(&self, record: &Value) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        FileExt::lock_exclusive(&file)?;
        let written = file.write_all(line.as_bytes()).and_then(|_| file.flush());
        FileExt::unlock(&file)?;
        written?;
        Ok(())
    }

    fn drain(&self, mode: DrainMode) -> Result<Vec<Value>> {
        let Some(mut file) = self.open_for(mode)? else {
            return Ok(Vec::new());
        };

        match mode {
            DrainMode::Clear => FileExt::lock_exclusive(&file)?,
            DrainMode::Peek => FileExt::lock_shared(&file)?,
        }

        let mut contents = Vec::new();
        let read = file.read_to_end(&mut contents).and_then(|_| {
            if mode == DrainMode::Clear {
                file.set_len(0)?;
            }
            Ok(())
        });
        FileExt::unlock(&file)?;
        read?;

        Ok(parse_lines(&contents))
    }
}

/// Parse NDJSON, skipping blank lines and lines that are not UTF-8 JSON.
fn parse_lines(contents: &[u8]) -> Vec<Value> {
    contents
        .split(|b| *b == b'\n')
        .filter_map(|line| std::str::from_utf8(line).ok())
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| serde_json::from_str(line).ok())
        .collect()
}
