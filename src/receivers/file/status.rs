// SPDX-License-Identifier: Apache-2.0

//! Per-source read progress.
//!
//! Every tracked path has a [`Status`] holding two offsets. `current_offset`
//! follows the records the batch collector has accepted; `last_offset` is the
//! durable resume point and only moves in [`StatusStore::dump`], which runs
//! after the broker confirmed a batch. The whole store is written as one
//! indented JSON snapshot:
//!
//! ```json
//! {
//!   "Statuses": {
//!     "/var/log/app.log": { "Path": "/var/log/app.log", "LastOffset": 120, "CurrentOffset": 120 }
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::receivers::file::error::{Error, Result};

/// Status store shared between the duties of one source watcher.
pub type SharedStatusStore = Arc<Mutex<StatusStore>>;

/// Lock a shared store. A poisoned lock still guards consistent data (every
/// mutation is a single field write), so it is recovered rather than propagated.
pub fn lock_store(store: &SharedStatusStore) -> MutexGuard<'_, StatusStore> {
    store.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Status {
    pub path: String,
    pub last_offset: u64,
    pub current_offset: u64,
}

impl Status {
    pub fn new(path: impl Into<String>, last_offset: u64, current_offset: u64) -> Self {
        Self {
            path: path.into(),
            last_offset,
            current_offset,
        }
    }

    pub fn set_current_offset(&mut self, offset: u64) {
        self.current_offset = offset;
    }

    pub fn set_last_offset_to_current_offset(&mut self) {
        self.last_offset = self.current_offset;
    }
}

// Entries written by hand or by older versions may omit Path/CurrentOffset.
#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StatusEntry {
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    last_offset: u64,
    #[serde(default)]
    current_offset: Option<u64>,
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StatusFile {
    #[serde(default)]
    statuses: BTreeMap<String, StatusEntry>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct StatusStore {
    statuses: BTreeMap<String, Status>,
}

impl StatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let file: StatusFile = serde_json::from_slice(bytes)?;

        let statuses = file
            .statuses
            .into_iter()
            .map(|(key, entry)| {
                let path = entry.path.filter(|p| !p.is_empty()).unwrap_or_else(|| key.clone());
                let current = entry.current_offset.unwrap_or(entry.last_offset);
                // last_offset <= current_offset
                (key, Status::new(path, entry.last_offset, current.max(entry.last_offset)))
            })
            .collect();

        Ok(Self { statuses })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = fs::read(path.as_ref())?;
        Self::from_json(&bytes)
    }

    pub fn add_status(&mut self, status: Status) {
        self.statuses.insert(status.path.clone(), status);
    }

    pub fn get_status(&self, path: &str) -> Option<&Status> {
        self.statuses.get(path)
    }

    pub fn has_status(&self, path: &str) -> bool {
        self.statuses.contains_key(path)
    }

    /// Record that everything up to `offset` in `path` has been accepted for
    /// delivery. Returns false if the path is unknown.
    pub fn set_current_offset(&mut self, path: &str, offset: u64) -> bool {
        match self.statuses.get_mut(path) {
            Some(status) => {
                status.set_current_offset(offset);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.statuses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Status> {
        self.statuses.values()
    }

    /// Checkpoint: advance every `last_offset` to its `current_offset`, then
    /// overwrite the snapshot at `path`. A failed write is logged; the next
    /// successful dump captures the same state.
    pub fn dump(&mut self, path: impl AsRef<Path>) {
        for status in self.statuses.values_mut() {
            status.set_last_offset_to_current_offset();
        }
        self.persist(path);
    }

    /// Overwrite the snapshot at `path` without moving any offset.
    pub fn persist(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        match self.write_snapshot(path) {
            Ok(()) => debug!(path = ?path, entries = self.len(), "Wrote status file"),
            Err(e) => error!(path = ?path, error = %e, "Failed to write status file"),
        }
    }

    fn write_snapshot(&self, path: &Path) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(self)?;
        atomic_write(path, &bytes)
    }
}

/// Prefix of in-progress snapshot files; loaders skip names starting with it.
pub const TEMP_FILE_PREFIX: &str = ".";

/// Write to a hidden temp file next to `path`, then rename over it.
fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::Persistence(format!("invalid status file path: {:?}", path)))?;

    let unique_id = COUNTER.fetch_add(1, Ordering::SeqCst);
    let temp_path = path.with_file_name(format!(
        "{}{}.tmp.{}.{}",
        TEMP_FILE_PREFIX,
        file_name,
        std::process::id(),
        unique_id
    ));

    let file = File::create(&temp_path)
        .map_err(|e| Error::Persistence(format!("failed to create temp file: {}", e)))?;
    let mut writer = BufWriter::new(file);
    writer
        .write_all(bytes)
        .and_then(|_| writer.flush())
        .map_err(|e| Error::Persistence(format!("failed to write status file: {}", e)))?;
    drop(writer);

    fs::rename(&temp_path, path).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        Error::Persistence(format!("failed to rename status file: {}", e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tracing_test::traced_test;

    #[test]
    fn test_add_get_has() {
        let mut store = StatusStore::new();
        assert!(store.is_empty());

        store.add_status(Status::new("/var/log/a.log", 10, 20));

        assert!(store.has_status("/var/log/a.log"));
        assert!(!store.has_status("/var/log/b.log"));
        assert_eq!(store.get_status("/var/log/a.log").unwrap().current_offset, 20);
        assert_eq!(store.len(), 1);

        assert!(store.set_current_offset("/var/log/a.log", 42));
        assert!(!store.set_current_offset("/var/log/b.log", 42));
        assert_eq!(store.get_status("/var/log/a.log").unwrap().current_offset, 42);
    }

    #[test]
    fn test_dump_advances_last_offset_and_writes_snapshot() {
        let dir = TempDir::new().unwrap();
        let status_path = dir.path().join("app.json");

        let mut store = StatusStore::new();
        store.add_status(Status::new("/logs/a.log", 0, 0));
        store.add_status(Status::new("/logs/b.log", 5, 5));
        store.set_current_offset("/logs/a.log", 6);
        store.set_current_offset("/logs/b.log", 99);

        store.dump(&status_path);

        for status in store.iter() {
            assert_eq!(status.last_offset, status.current_offset);
        }

        let written: serde_json::Value =
            serde_json::from_slice(&fs::read(&status_path).unwrap()).unwrap();
        assert_eq!(written["Statuses"]["/logs/a.log"]["Path"], "/logs/a.log");
        assert_eq!(written["Statuses"]["/logs/a.log"]["LastOffset"], 6);
        assert_eq!(written["Statuses"]["/logs/b.log"]["CurrentOffset"], 99);

        // indented output
        let text = fs::read_to_string(&status_path).unwrap();
        assert!(text.contains("\n  "));

        // no temp files left behind
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(TEMP_FILE_PREFIX))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_persist_keeps_last_offset() {
        let dir = TempDir::new().unwrap();
        let status_path = dir.path().join("app.json");

        let mut store = StatusStore::new();
        store.add_status(Status::new("/logs/a.log", 3, 3));
        store.set_current_offset("/logs/a.log", 30);
        store.persist(&status_path);

        let reloaded = StatusStore::load(&status_path).unwrap();
        let status = reloaded.get_status("/logs/a.log").unwrap();
        assert_eq!(status.last_offset, 3);
        assert_eq!(status.current_offset, 30);
    }

    #[test]
    fn test_dump_then_load() {
        let dir = TempDir::new().unwrap();
        let status_path = dir.path().join("app.json");

        let mut store = StatusStore::new();
        store.add_status(Status::new("/logs/a.log", 0, 0));
        store.set_current_offset("/logs/a.log", 1234);
        store.dump(&status_path);

        let reloaded = StatusStore::load(&status_path).unwrap();
        assert_eq!(reloaded, store);
    }

    #[test]
    fn test_load_partial_entries() {
        let json = br#"{"Statuses": {"a.log": {"LastOffset": 120}}}"#;
        let store = StatusStore::from_json(json).unwrap();

        let status = store.get_status("a.log").unwrap();
        assert_eq!(status.path, "a.log");
        assert_eq!(status.last_offset, 120);
        assert_eq!(status.current_offset, 120);
    }

    #[test]
    fn test_load_empty_object() {
        let store = StatusStore::from_json(b"{}").unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_load_malformed() {
        assert!(StatusStore::from_json(b"{not json").is_err());
    }

    #[test]
    #[traced_test]
    fn test_dump_write_failure_is_logged() {
        let dir = TempDir::new().unwrap();
        let status_path = dir.path().join("missing-dir").join("app.json");

        let mut store = StatusStore::new();
        store.add_status(Status::new("/logs/a.log", 0, 0));
        store.set_current_offset("/logs/a.log", 8);
        store.dump(&status_path);

        // offsets still advanced in memory
        assert_eq!(store.get_status("/logs/a.log").unwrap().last_offset, 8);
        assert!(!status_path.exists());
        assert!(logs_contain("Failed to write status file"));
    }
}
