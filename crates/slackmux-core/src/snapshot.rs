//! Snapshot persistence boundary for the thread store.
//!
//! The whole table is written on every mutation. `load` distinguishes a
//! missing snapshot (`Ok` with an empty map) from an unreadable one (`Err`),
//! leaving the "start empty anyway" decision to the caller.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;

use crate::types::ThreadRecord;

pub type Records = BTreeMap<String, ThreadRecord>;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt snapshot: {0}")]
    Corrupt(#[from] serde_json::Error),
}

pub trait SnapshotStore: Send + Sync {
    fn load(&self) -> Result<Records, SnapshotError>;
    fn save(&self, records: &Records) -> Result<(), SnapshotError>;
}

// ─── JSON file ────────────────────────────────────────────────────

/// Flat JSON object `{ "<session>:<name>:<pane>": ThreadRecord }` on disk.
pub struct JsonFileSnapshot {
    path: PathBuf,
}

impl JsonFileSnapshot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "thread-map.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl SnapshotStore for JsonFileSnapshot {
    fn load(&self) -> Result<Records, SnapshotError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Records::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&raw)?)
    }

    fn save(&self, records: &Records) -> Result<(), SnapshotError> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }
        let mut body = serde_json::to_string_pretty(records)?;
        body.push('\n');

        // Replace the target atomically.
        let tmp = self.temp_path();
        std::fs::write(&tmp, body)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

// ─── In-memory ────────────────────────────────────────────────────

/// Snapshot held in memory. Used by `--ephemeral` runs and tests.
#[derive(Default)]
pub struct MemorySnapshot {
    records: Mutex<Records>,
}

impl MemorySnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Records) -> Self {
        Self {
            records: Mutex::new(records),
        }
    }

    /// Copy of the last saved table.
    pub fn saved(&self) -> Records {
        self.records
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

impl SnapshotStore for MemorySnapshot {
    fn load(&self) -> Result<Records, SnapshotError> {
        Ok(self.saved())
    }

    fn save(&self, records: &Records) -> Result<(), SnapshotError> {
        let mut guard = self
            .records
            .lock()
            .map_err(|_| SnapshotError::Io(std::io::Error::other("snapshot lock poisoned")))?;
        *guard = records.clone();
        Ok(())
    }
}
