//! In-memory backend: useful for testing and single-process deployments.
//!
//! Expiry uses `tokio::time::Instant`, so tests can drive TTLs with paused
//! time. The map lock is only held for the compare-and-swap itself.

use async_trait::async_trait;
use chrono::Utc;
use continuum_core::error::StoreError;
use continuum_core::store::{StoredThread, ThreadBackend, WriteOutcome};
use continuum_core::thread::{Thread, ThreadId};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

struct Record {
    thread: Thread,
    version: u64,
    expires_at: Instant,
}

impl Record {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// A versioned, TTL-bounded map of threads.
pub struct InMemoryBackend {
    records: RwLock<HashMap<ThreadId, Record>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Periodically purge expired records.
    ///
    /// The task holds only a weak reference and stops once the backend is
    /// dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(backend) = weak.upgrade() else {
                    break;
                };
                let reclaimed = backend.purge().await;
                if reclaimed > 0 {
                    debug!(reclaimed, "Swept expired threads");
                }
            }
        })
    }

    async fn purge(&self) -> usize {
        let now = Instant::now();
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, r| r.is_live(now));
        before - records.len()
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ThreadBackend for InMemoryBackend {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn load(&self, id: &ThreadId) -> Result<Option<StoredThread>, StoreError> {
        let now = Instant::now();
        let records = self.records.read().await;
        Ok(records
            .get(id)
            .filter(|r| r.is_live(now))
            .map(|r| StoredThread {
                thread: r.thread.clone(),
                version: r.version,
            }))
    }

    async fn store(
        &self,
        thread: &Thread,
        expected: Option<u64>,
        ttl: Duration,
    ) -> Result<WriteOutcome, StoreError> {
        let now = Instant::now();
        let mut records = self.records.write().await;
        let live_version = records
            .get(&thread.id)
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

        records.insert(
            thread.id.clone(),
            Record {
                thread: thread.clone(),
                version,
                expires_at: now + ttl,
            },
        );
        Ok(WriteOutcome::Written { version })
    }

    async fn touch(&self, id: &ThreadId, ttl: Duration) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut records = self.records.write().await;
        match records.get_mut(id).filter(|r| r.is_live(now)) {
            Some(record) => {
                record.expires_at = now + ttl;
                record.thread.last_active_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, id: &ThreadId) -> Result<bool, StoreError> {
        Ok(self.records.write().await.remove(id).is_some())
    }

    async fn purge_expired(&self) -> Result<usize, StoreError> {
        Ok(self.purge().await)
    }

    async fn count(&self) -> Result<usize, StoreError> {
        let now = Instant::now();
        Ok(self
            .records
            .read()
            .await
            .values()
            .filter(|r| r.is_live(now))
            .count())
    }
}
