use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use chrono::Utc;
use fs2::FileExt;
use regex::Regex;

use super::SessionState;
use crate::error::{ArenaError, Result};
use crate::journal::FileJournal;

/// Paths of every artifact a session may own.
#[derive(Debug, Clone)]
pub struct SessionPaths {
    pub dir: PathBuf,
    pub state: PathBuf,
    /// Serializes read-modify-write cycles on `state`.
    pub lock: PathBuf,
    pub journal: PathBuf,
    pub pid: PathBuf,
    pub log: PathBuf,
    pub stream_buffer: PathBuf,
}

impl SessionPaths {
    fn new(dir: PathBuf) -> Self {
        Self {
            state: dir.join("state.json"),
            lock: dir.join("state.lock"),
            journal: dir.join("observations.jsonl"),
            pid: dir.join("producer.pid"),
            log: dir.join("producer.log"),
            stream_buffer: dir.join("stream.buffer"),
            dir,
        }
    }

    pub fn journal(&self) -> FileJournal {
        FileJournal::new(&self.journal)
    }
}

/// File-backed session storage rooted at `<home>/sessions`.
///
/// State documents are rewritten whole through a temp file and a rename, so
/// readers never see a half-written document. Writers that start from the
/// stored document go through [`SessionStore::update`], which holds the
/// session's lock across the load and the save.
#[derive(Debug, Clone)]
pub struct SessionStore {
    root: PathBuf,
}

impl SessionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Short process-unique session id.
    pub fn generate_id() -> String {
        uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
    }

    pub fn paths(&self, session_id: &str) -> Result<SessionPaths> {
        validate_id(session_id)?;
        Ok(SessionPaths::new(self.root.join(session_id)))
    }

    pub fn exists(&self, session_id: &str) -> bool {
        self.paths(session_id)
            .map(|paths| paths.dir.is_dir())
            .unwrap_or(false)
    }

    /// Create the session directory and write its first state document.
    pub fn create(&self, state: &SessionState) -> Result<SessionPaths> {
        let paths = self.paths(&state.session_id)?;
        fs::create_dir_all(&paths.dir)?;
        self.write_state(&paths, state)?;
        Ok(paths)
    }

    /// Persist `state`, stamping `updated_at`.
    pub fn save(&self, state: &mut SessionState) -> Result<()> {
        let paths = self.paths(&state.session_id)?;
        fs::create_dir_all(&paths.dir)?;
        state.updated_at = Utc::now();
        self.write_state(&paths, state)
    }

    /// Load, modify and save the state under the session's exclusive lock,
    /// so concurrent updates from the supervisor and a producer both land.
    pub fn update<T>(
        &self,
        session_id: &str,
        apply: impl FnOnce(&mut SessionState) -> T,
    ) -> Result<T> {
        let paths = self.paths(session_id)?;
        if !paths.dir.is_dir() {
            return Err(ArenaError::SessionNotFound(session_id.to_string()));
        }
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&paths.lock)?;
        FileExt::lock_exclusive(&lock)?;
        let updated = self.load(session_id).and_then(|mut state| {
            let out = apply(&mut state);
            self.save(&mut state)?;
            Ok(out)
        });
        FileExt::unlock(&lock)?;
        updated
    }

    fn write_state(&self, paths: &SessionPaths, state: &SessionState) -> Result<()> {
        let serialized = serde_json::to_string_pretty(state)?;
        let tmp = paths.dir.join(format!("state.json.{}.tmp", uuid::Uuid::new_v4().simple()));
        fs::write(&tmp, serialized)?;
        fs::rename(&tmp, &paths.state)?;
        Ok(())
    }

    pub fn load(&self, session_id: &str) -> Result<SessionState> {
        let paths = self.paths(session_id)?;
        if !paths.dir.is_dir() {
            return Err(ArenaError::SessionNotFound(session_id.to_string()));
        }
        let raw = match fs::read_to_string(&paths.state) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(ArenaError::corrupt(
                    session_id,
                    format!("no state file at {}", paths.state.display()),
                ))
            }
            Err(err) => return Err(err.into()),
        };
        serde_json::from_str(&raw).map_err(|err| ArenaError::corrupt(session_id, err.to_string()))
    }

    /// Ids of every session directory, sorted.
    pub fn list(&self) -> Result<Vec<String>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if validate_id(name).is_ok() {
                    ids.push(name.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Remove all session storage.
    pub fn remove_all(&self) -> Result<()> {
        match fs::remove_dir_all(&self.root) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// Last `n` lines of the session's producer log.
    pub fn log_tail(&self, session_id: &str, n: usize) -> Vec<String> {
        let Ok(paths) = self.paths(session_id) else {
            return Vec::new();
        };
        let Ok(text) = fs::read_to_string(&paths.log) else {
            return Vec::new();
        };
        let lines: Vec<&str> = text.trim_end().lines().collect();
        lines[lines.len().saturating_sub(n)..]
            .iter()
            .map(|line| line.to_string())
            .collect()
    }
}

fn validate_id(session_id: &str) -> Result<()> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN
        .get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").expect("valid session id regex"));
    if pattern.is_match(session_id) {
        Ok(())
    } else {
        Err(ArenaError::InvalidArgument(format!(
            "invalid session id '{session_id}'"
        )))
    }
}
