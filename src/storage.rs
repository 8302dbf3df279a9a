//! Local key-value storage.
//!
//! Every piece of persisted state (task list, notification ledger, last
//! catch-up check) lives under its own key in one JSON object file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{Error, Result};

pub const TASKS_KEY: &str = "tasks";
pub const LEDGER_KEY: &str = "notification-ledger";
pub const LAST_CHECK_KEY: &str = "last-manual-check";

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    /// Store a value. An `Err` means the value was kept in memory only.
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// In-memory store, used in tests and when the data directory is unusable.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        let values = self.values.lock().unwrap_or_else(|p| p.into_inner());
        values.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self.values.lock().unwrap_or_else(|p| p.into_inner());
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[derive(Debug, Default)]
struct FileState {
    cache: BTreeMap<String, String>,
    /// Set after the first failed write; from then on values live in memory only.
    degraded: bool,
}

/// JSON-object file store. Reads go through to disk so separate processes
/// (the CLI and the daemon) observe each other's writes.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    state: Mutex<FileState>,
}

impl FileStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let cache = read_map(&path).unwrap_or_else(|e| {
            log::error!("Failed to load storage {}: {}", path.display(), e);
            BTreeMap::new()
        });
        Self {
            path,
            state: Mutex::new(FileState {
                cache,
                degraded: false,
            }),
        }
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        if !state.degraded {
            match read_map(&self.path) {
                Ok(map) => state.cache = map,
                Err(e) => log::debug!("Using cached storage, reload failed: {}", e),
            }
        }
        state.cache.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        if !state.degraded {
            // Pick up writes from other processes before overwriting the file.
            if let Ok(map) = read_map(&self.path) {
                state.cache = map;
            }
        }
        state.cache.insert(key.to_string(), value.to_string());

        if state.degraded {
            log::debug!("Storage degraded, keeping '{}' in memory", key);
            return Err(Error::Storage {
                key: key.to_string(),
                reason: "storage unavailable for this session".to_string(),
            });
        }

        if let Err(e) = write_map(&self.path, &state.cache) {
            log::warn!(
                "Failed to write {}, continuing in memory: {}",
                self.path.display(),
                e
            );
            state.degraded = true;
            return Err(Error::Storage {
                key: key.to_string(),
                reason: e.to_string(),
            });
        }
        Ok(())
    }
}

fn read_map(path: &Path) -> Result<BTreeMap<String, String>> {
    match std::fs::read_to_string(path) {
        Ok(content) if content.trim().is_empty() => Ok(BTreeMap::new()),
        Ok(content) => Ok(serde_json::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
        Err(e) => Err(e.into()),
    }
}

fn write_map(path: &Path, map: &BTreeMap<String, String>) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(map)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}
