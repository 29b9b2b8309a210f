//! `ThreadStore`: serialized, TTL-sliding access to persisted threads.
//!
//! Appends are serialized per thread by optimistic versioning against the
//! backend: load the record, apply the turn, write it back only if the
//! version is unchanged, and retry on conflict. Unrelated threads never
//! contend.

use chrono::Utc;
use continuum_core::error::{ContextError, Error, Result, StoreError};
use continuum_core::store::{ThreadBackend, WriteOutcome};
use continuum_core::thread::{ModelPin, Thread, ThreadId, Turn, DEFAULT_MAX_TURNS};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Limits applied to every thread the store manages.
#[derive(Debug, Clone)]
pub struct StoreSettings {
    /// Sliding expiry; reset on every read and write.
    pub ttl: Duration,
    /// Turn ceiling given to new threads.
    pub max_turns: usize,
    /// Fingerprint set capacity per thread.
    pub max_fingerprints: usize,
    /// Optimistic append attempts before giving up.
    pub append_retries: usize,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(3 * 3600),
            max_turns: DEFAULT_MAX_TURNS,
            max_fingerprints: 256,
            append_retries: 8,
        }
    }
}

/// Result of [`ThreadStore::append_if_unchanged`].
#[derive(Debug)]
pub enum AppendOutcome {
    Appended(Thread),
    /// The thread gained turns since the caller's snapshot; nothing was
    /// written. Carries the current thread.
    Stale(Thread),
}

/// Thread store over a pluggable backend.
#[derive(Clone)]
pub struct ThreadStore {
    backend: Arc<dyn ThreadBackend>,
    settings: StoreSettings,
}

fn not_found(id: &ThreadId) -> Error {
    ContextError::ThreadNotFound {
        thread_id: id.to_string(),
    }
    .into()
}

impl ThreadStore {
    pub fn new(backend: Arc<dyn ThreadBackend>, settings: StoreSettings) -> Self {
        Self { backend, settings }
    }

    pub fn settings(&self) -> &StoreSettings {
        &self.settings
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// A new, unpersisted thread with this store's limits.
    pub fn draft(&self, mode: &str) -> Thread {
        Thread::new(mode, self.settings.max_turns)
    }

    /// Create and persist an empty thread.
    pub async fn create(&self, mode: &str) -> Result<Thread> {
        let thread = self.draft(mode);
        self.insert(&thread).await?;
        info!(thread_id = %thread.id, mode, "Thread created");
        Ok(thread)
    }

    /// Persist a drafted thread together with its first turn.
    ///
    /// The pin, if any, is applied before the turn.
    pub async fn create_with_turn(
        &self,
        mut thread: Thread,
        turn: Turn,
        pin: Option<&ModelPin>,
    ) -> Result<Thread> {
        if let Some(pin) = pin {
            thread.pin_if_first(pin);
        }
        thread.push_turn(turn, self.settings.max_fingerprints);
        thread.last_active_at = Utc::now();
        self.insert(&thread).await?;
        info!(
            thread_id = %thread.id,
            mode = %thread.mode,
            pinned = thread.pinned_model.as_deref().unwrap_or("-"),
            "Thread created"
        );
        Ok(thread)
    }

    async fn insert(&self, thread: &Thread) -> Result<()> {
        match self.backend.store(thread, None, self.settings.ttl).await? {
            WriteOutcome::Written { .. } => Ok(()),
            WriteOutcome::Conflict { .. } | WriteOutcome::Missing => {
                Err(StoreError::Conflict {
                    thread_id: thread.id.to_string(),
                    attempts: 1,
                }
                .into())
            }
        }
    }

    /// Load a live thread and slide its expiry.
    pub async fn get(&self, id: &ThreadId) -> Result<Thread> {
        let Some(stored) = self.backend.load(id).await? else {
            return Err(not_found(id));
        };
        if !self.backend.touch(id, self.settings.ttl).await? {
            return Err(not_found(id));
        }
        let mut thread = stored.thread;
        thread.last_active_at = Utc::now();
        Ok(thread)
    }

    /// Reset a thread's expiry without reading it.
    pub async fn touch_expiry(&self, id: &ThreadId) -> Result<()> {
        if self.backend.touch(id, self.settings.ttl).await? {
            Ok(())
        } else {
            Err(not_found(id))
        }
    }

    /// Append a turn.
    pub async fn append(&self, id: &ThreadId, turn: Turn) -> Result<Thread> {
        self.append_pinned(id, turn, None).await
    }

    /// Append a turn, pinning the model if this is the thread's first turn.
    ///
    /// Fails with `ThreadExhausted` once the ceiling is reached and with
    /// `ThreadNotFound` if the thread is gone or expired; neither leaves any
    /// partial write behind.
    pub async fn append_pinned(
        &self,
        id: &ThreadId,
        turn: Turn,
        pin: Option<&ModelPin>,
    ) -> Result<Thread> {
        match self.append_checked(id, None, turn, pin).await? {
            AppendOutcome::Appended(thread) | AppendOutcome::Stale(thread) => Ok(thread),
        }
    }

    /// Append only while the thread still has `seen_turns` turns.
    ///
    /// A turn planned against an older snapshot may repeat content the
    /// thread has since recorded, so a grown thread is handed back as
    /// `Stale` for the caller to plan again.
    pub async fn append_if_unchanged(
        &self,
        id: &ThreadId,
        seen_turns: usize,
        turn: Turn,
        pin: Option<&ModelPin>,
    ) -> Result<AppendOutcome> {
        self.append_checked(id, Some(seen_turns), turn, pin).await
    }

    async fn append_checked(
        &self,
        id: &ThreadId,
        seen_turns: Option<usize>,
        turn: Turn,
        pin: Option<&ModelPin>,
    ) -> Result<AppendOutcome> {
        let attempts = self.settings.append_retries.max(1);

        for attempt in 1..=attempts {
            let Some(stored) = self.backend.load(id).await? else {
                return Err(not_found(id));
            };

            let mut thread = stored.thread;
            if thread.is_exhausted() {
                return Err(ContextError::ThreadExhausted {
                    thread_id: id.to_string(),
                    max_turns: thread.max_turns,
                }
                .into());
            }
            if seen_turns.is_some_and(|seen| seen != thread.turn_count()) {
                return Ok(AppendOutcome::Stale(thread));
            }

            if let Some(pin) = pin {
                thread.pin_if_first(pin);
            }
            thread.push_turn(turn.clone(), self.settings.max_fingerprints);
            thread.last_active_at = Utc::now();

            match self
                .backend
                .store(&thread, Some(stored.version), self.settings.ttl)
                .await?
            {
                WriteOutcome::Written { version } => {
                    debug!(
                        thread_id = %id,
                        version,
                        turns = thread.turn_count(),
                        "Turn appended"
                    );
                    return Ok(AppendOutcome::Appended(thread));
                }
                WriteOutcome::Missing => return Err(not_found(id)),
                WriteOutcome::Conflict { current } => {
                    debug!(
                        thread_id = %id,
                        attempt,
                        expected = stored.version,
                        current,
                        "Append conflict, retrying"
                    );
                    tokio::task::yield_now().await;
                }
            }
        }

        Err(StoreError::Conflict {
            thread_id: id.to_string(),
            attempts,
        }
        .into())
    }

    pub async fn delete(&self, id: &ThreadId) -> Result<bool> {
        Ok(self.backend.delete(id).await?)
    }

    /// Reclaim expired threads.
    pub async fn purge_expired(&self) -> Result<usize> {
        let reclaimed = self.backend.purge_expired().await?;
        if reclaimed > 0 {
            info!(reclaimed, backend = self.backend.name(), "Expired threads purged");
        }
        Ok(reclaimed)
    }

    pub async fn count(&self) -> Result<usize> {
        Ok(self.backend.count().await?)
    }
}
