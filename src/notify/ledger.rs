//! Notification de-duplication ledger.
//!
//! Remembers, per bucket, the fingerprint of the task set that last
//! produced a notification so an unchanged set is never announced twice.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::core::task::Task;
use crate::core::temporal::Bucket;
use crate::storage::{KeyValueStore, LEDGER_KEY};

pub const FINGERPRINT_VERSION: u32 = 1;
const LEDGER_VERSION: u32 = 1;

/// Fields of a task that take part in the fingerprint. Adding fields to
/// `Task` does not change fingerprints unless this record changes too.
#[derive(Serialize)]
struct FingerprintRecord<'a> {
    title: &'a str,
    due_date: String,
}

/// Order-sensitive digest of a task set: `v1:<sha256 hex>`.
pub fn fingerprint(tasks: &[Task]) -> String {
    let records: Vec<FingerprintRecord<'_>> = tasks
        .iter()
        .map(|t| FingerprintRecord {
            title: &t.title,
            due_date: t.due_date_string(),
        })
        .collect();
    // Serializing borrowed strings into a Vec cannot fail.
    let canonical = serde_json::to_vec(&records).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(&canonical);
    format!("v{}:{:x}", FINGERPRINT_VERSION, hasher.finalize())
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerSnapshot {
    version: u32,
    #[serde(default)]
    entries: BTreeMap<String, String>,
}

pub struct NotificationLedger {
    storage: Arc<dyn KeyValueStore>,
    entries: Mutex<BTreeMap<String, String>>,
}

impl NotificationLedger {
    pub fn load(storage: Arc<dyn KeyValueStore>) -> Self {
        let entries = read_entries(storage.as_ref()).unwrap_or_default();
        Self {
            storage,
            entries: Mutex::new(entries),
        }
    }

    pub fn already_notified(&self, bucket: Bucket, tasks: &[Task]) -> bool {
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        self.refresh_locked(&mut entries);
        entries
            .get(bucket.key())
            .is_some_and(|stored| *stored == fingerprint(tasks))
    }

    /// Remember `tasks` as announced for `bucket` and persist the ledger.
    /// A failed write only costs persistence across restarts.
    pub fn record_notified(&self, bucket: Bucket, tasks: &[Task]) {
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        self.refresh_locked(&mut entries);
        entries.insert(bucket.key().to_string(), fingerprint(tasks));

        let snapshot = LedgerSnapshot {
            version: LEDGER_VERSION,
            entries: entries.clone(),
        };
        match serde_json::to_string(&snapshot) {
            Ok(json) => {
                if let Err(e) = self.storage.set(LEDGER_KEY, &json) {
                    log::error!("Failed to save notification ledger: {}", e);
                }
            }
            Err(e) => log::error!("Failed to serialize notification ledger: {}", e),
        }
    }

    /// Stored fingerprint for a bucket, for diagnostics.
    pub fn stored(&self, bucket: Bucket) -> Option<String> {
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        self.refresh_locked(&mut entries);
        entries.get(bucket.key()).cloned()
    }

    /// Merge entries written by another process. Stored entries win; buckets
    /// only known in memory (after a failed write) are kept.
    fn refresh_locked(&self, entries: &mut BTreeMap<String, String>) {
        if let Some(stored) = read_entries(self.storage.as_ref()) {
            entries.extend(stored);
        }
    }
}

fn read_entries(storage: &dyn KeyValueStore) -> Option<BTreeMap<String, String>> {
    let json = storage.get(LEDGER_KEY)?;
    match serde_json::from_str::<LedgerSnapshot>(&json) {
        Ok(snapshot) if snapshot.version == LEDGER_VERSION => Some(snapshot.entries),
        Ok(snapshot) => {
            log::warn!("Ignoring notification ledger version {}", snapshot.version);
            None
        }
        Err(e) => {
            log::error!("Failed to parse notification ledger: {}", e);
            None
        }
    }
}
