//! Thread persistence trait: versioned records with sliding TTL.
//!
//! Backends only need get / set-if-version / delete / touch semantics with
//! a TTL. Per-thread serialization is built on top of this contract by
//! optimistic versioning, so no distributed lock service is required.
//!
//! Expiry must be checked atomically with every operation: an expired
//! record behaves exactly like a missing one.

use crate::error::StoreError;
use crate::thread::{Thread, ThreadId};
use async_trait::async_trait;
use std::time::Duration;

/// A thread together with its record version.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredThread {
    pub thread: Thread,
    pub version: u64,
}

/// Outcome of a conditional write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The record now has this version.
    Written { version: u64 },
    /// The record exists with a different version (or exists at all, for inserts).
    Conflict { current: u64 },
    /// The record is gone or expired.
    Missing,
}

/// The core ThreadBackend trait.
///
/// Implementations: in-memory (with sweep task), JSON directory, SQLite.
#[async_trait]
pub trait ThreadBackend: Send + Sync {
    /// The backend name (e.g., "in_memory", "file", "sqlite").
    fn name(&self) -> &str;

    /// Load a live record. Expired records are reported as `None`.
    async fn load(&self, id: &ThreadId) -> std::result::Result<Option<StoredThread>, StoreError>;

    /// Conditionally write a thread and reset its TTL.
    ///
    /// `expected = None` inserts a new record and conflicts with any live one.
    /// `expected = Some(v)` replaces the record only if it is live at version `v`.
    async fn store(
        &self,
        thread: &Thread,
        expected: Option<u64>,
        ttl: Duration,
    ) -> std::result::Result<WriteOutcome, StoreError>;

    /// Reset the TTL of a live record and mark it active now.
    ///
    /// Does not change the record version. Returns `false` if the record is
    /// missing or expired.
    async fn touch(&self, id: &ThreadId, ttl: Duration) -> std::result::Result<bool, StoreError>;

    /// Delete a record.
    async fn delete(&self, id: &ThreadId) -> std::result::Result<bool, StoreError>;

    /// Remove every expired record, returning how many were reclaimed.
    async fn purge_expired(&self) -> std::result::Result<usize, StoreError>;

    /// Number of live records.
    async fn count(&self) -> std::result::Result<usize, StoreError>;
}
