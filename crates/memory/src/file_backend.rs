//! File-based thread backend: one JSON document per thread.
//!
//! Each record lives at `<dir>/<thread-id>.json` and holds the version, the
//! wall-clock expiry and the serialized thread. Writes go to a temporary file
//! that is renamed into place, so a crash never leaves a half-written record.
//!
//! Storage location: `~/.continuum/threads/`
//!
//! Compare-and-swap is serialized by an in-process lock; the directory is not
//! meant to be shared between processes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use continuum_core::error::StoreError;
use continuum_core::store::{StoredThread, ThreadBackend, WriteOutcome};
use continuum_core::thread::{Thread, ThreadId};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

#[derive(Serialize, Deserialize)]
struct RecordFile {
    version: u64,
    expires_at: DateTime<Utc>,
    thread: Thread,
}

impl RecordFile {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// A directory of JSON thread records.
pub struct FileBackend {
    dir: PathBuf,
    lock: Mutex<()>,
}

fn expiry(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Thread IDs become file names, so only plain identifier characters pass.
fn is_safe_id(id: &ThreadId) -> bool {
    let id = id.as_str();
    !id.is_empty()
        && id.len() <= 128
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

impl FileBackend {
    /// Create a backend rooted at `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        debug!(dir = %dir.display(), "File thread backend ready");
        Self {
            dir,
            lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, id: &ThreadId) -> PathBuf {
        self.dir.join(format!("{}.json", id.as_str()))
    }

    fn read_record(&self, id: &ThreadId) -> Result<Option<RecordFile>, StoreError> {
        if !is_safe_id(id) {
            return Ok(None);
        }
        let content = match std::fs::read_to_string(self.record_path(id)) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(StoreError::Backend(format!(
                    "Failed to read thread {id}: {e}"
                )));
            }
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| StoreError::Corrupted {
                thread_id: id.to_string(),
                reason: e.to_string(),
            })
    }

    fn write_record(&self, record: &RecordFile) -> Result<(), StoreError> {
        let id = &record.thread.id;
        if !is_safe_id(id) {
            return Err(StoreError::Backend(format!(
                "Refusing to store thread with unsafe id '{id}'"
            )));
        }

        std::fs::create_dir_all(&self.dir).map_err(|e| {
            StoreError::Backend(format!("Failed to create thread directory: {e}"))
        })?;

        let body = serde_json::to_string_pretty(record)
            .map_err(|e| StoreError::Backend(format!("Failed to serialize thread: {e}")))?;

        let path = self.record_path(id);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, body)
            .map_err(|e| StoreError::Backend(format!("Failed to write thread file: {e}")))?;
        std::fs::rename(&tmp, &path)
            .map_err(|e| StoreError::Backend(format!("Failed to replace thread file: {e}")))?;
        Ok(())
    }

    fn remove_record(&self, id: &ThreadId) -> Result<bool, StoreError> {
        if !is_safe_id(id) {
            return Ok(false);
        }
        match std::fs::remove_file(self.record_path(id)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::Backend(format!(
                "Failed to delete thread {id}: {e}"
            ))),
        }
    }

    /// IDs of every record file in the directory, live or not.
    fn record_ids(&self) -> Result<Vec<ThreadId>, StoreError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(StoreError::Backend(format!(
                    "Failed to list thread directory: {e}"
                )));
            }
        };

        Ok(entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name().into_string().ok()?;
                name.strip_suffix(".json").map(ThreadId::from)
            })
            .collect())
    }
}

#[async_trait]
impl ThreadBackend for FileBackend {
    fn name(&self) -> &str {
        "file"
    }

    async fn load(&self, id: &ThreadId) -> Result<Option<StoredThread>, StoreError> {
        let _guard = self.lock.lock().await;
        let now = Utc::now();
        Ok(self
            .read_record(id)?
            .filter(|r| r.is_live(now))
            .map(|r| StoredThread {
                thread: r.thread,
                version: r.version,
            }))
    }

    async fn store(
        &self,
        thread: &Thread,
        expected: Option<u64>,
        ttl: Duration,
    ) -> Result<WriteOutcome, StoreError> {
        let _guard = self.lock.lock().await;
        let now = Utc::now();
        let live_version = self
            .read_record(&thread.id)?
            .filter(|r| r.is_live(now))
            .map(|r| r.version);

        let version = match (expected, live_version) {
            (None, None) => 1,
            (None, Some(current)) => return Ok(WriteOutcome::Conflict { current }),
            (Some(_), None) => return Ok(WriteOutcome::Missing),
            (Some(exp), Some(current)) if exp != current => {
                return Ok(WriteOutcome::Conflict { current });
            }
            (Some(_), Some(current)) => current + 1,
        };

        self.write_record(&RecordFile {
            version,
            expires_at: expiry(now, ttl),
            thread: thread.clone(),
        })?;
        Ok(WriteOutcome::Written { version })
    }

    async fn touch(&self, id: &ThreadId, ttl: Duration) -> Result<bool, StoreError> {
        let _guard = self.lock.lock().await;
        let now = Utc::now();
        let Some(mut record) = self.read_record(id)?.filter(|r| r.is_live(now)) else {
            return Ok(false);
        };
        record.expires_at = expiry(now, ttl);
        record.thread.last_active_at = now;
        self.write_record(&record)?;
        Ok(true)
    }

    async fn delete(&self, id: &ThreadId) -> Result<bool, StoreError> {
        let _guard = self.lock.lock().await;
        self.remove_record(id)
    }

    async fn purge_expired(&self) -> Result<usize, StoreError> {
        let _guard = self.lock.lock().await;
        let now = Utc::now();
        let mut reclaimed = 0;
        for id in self.record_ids()? {
            let expired = match self.read_record(&id) {
                Ok(Some(record)) => !record.is_live(now),
                Ok(None) => false,
                Err(StoreError::Corrupted { reason, .. }) => {
                    warn!(thread_id = %id, reason = %reason, "Removing corrupted thread record");
                    true
                }
                Err(e) => return Err(e),
            };
            if expired && self.remove_record(&id)? {
                reclaimed += 1;
            }
        }
        Ok(reclaimed)
    }

    async fn count(&self) -> Result<usize, StoreError> {
        let _guard = self.lock.lock().await;
        let now = Utc::now();
        let mut live = 0;
        for id in self.record_ids()? {
            if let Ok(Some(record)) = self.read_record(&id) {
                if record.is_live(now) {
                    live += 1;
                }
            }
        }
        Ok(live)
    }
}
