//! File fingerprints and the per-thread fingerprint set.
//!
//! A fingerprint is a `(path, content-hash)` pair. The set keeps exactly one
//! hash per path (the latest one embedded), so an edited file supersedes its
//! stale hash instead of growing the set. The set is also capped: once it
//! holds more than the configured number of paths, the least recently
//! referenced entries are evicted.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Identity of one specific version of a file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fingerprint {
    /// Absolute path of the file.
    pub path: String,
    /// Hex-encoded content hash.
    pub hash: String,
}

impl Fingerprint {
    pub fn new(path: impl Into<String>, hash: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            hash: hash.into(),
        }
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let short: String = self.hash.chars().take(12).collect();
        write!(f, "{}@{}", self.path, short)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct FingerprintEntry {
    hash: String,
    /// Logical clock value of the last embed or reference.
    last_referenced: u64,
}

/// Fingerprints of files already embedded in full within a thread.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintSet {
    entries: BTreeMap<String, FingerprintEntry>,
    #[serde(default)]
    clock: u64,
}

impl FingerprintSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// True iff this exact version of the file was embedded before.
    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.entries
            .get(&fingerprint.path)
            .is_some_and(|e| e.hash == fingerprint.hash)
    }

    /// Latest embedded hash for a path.
    pub fn hash_for(&self, path: &str) -> Option<&str> {
        self.entries.get(path).map(|e| e.hash.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate fingerprints in path order.
    pub fn iter(&self) -> impl Iterator<Item = Fingerprint> + '_ {
        self.entries
            .iter()
            .map(|(path, e)| Fingerprint::new(path.clone(), e.hash.clone()))
    }

    /// Record a file embedded in full.
    ///
    /// Returns the superseded hash when the path was known with different
    /// content.
    pub fn record_embedded(&mut self, fingerprint: &Fingerprint) -> Option<String> {
        self.clock += 1;
        let entry = FingerprintEntry {
            hash: fingerprint.hash.clone(),
            last_referenced: self.clock,
        };
        self.entries
            .insert(fingerprint.path.clone(), entry)
            .map(|old| old.hash)
            .filter(|old| *old != fingerprint.hash)
    }

    /// Refresh recency for a file that was referenced (not re-embedded).
    ///
    /// Does nothing unless the stored hash matches.
    pub fn touch(&mut self, fingerprint: &Fingerprint) -> bool {
        match self.entries.get_mut(&fingerprint.path) {
            Some(entry) if entry.hash == fingerprint.hash => {
                self.clock += 1;
                entry.last_referenced = self.clock;
                true
            }
            _ => false,
        }
    }

    /// Evict least-recently-referenced entries until at most `cap` remain.
    ///
    /// Ties are broken by path so eviction is deterministic.
    pub fn evict_to(&mut self, cap: usize) -> Vec<Fingerprint> {
        if self.entries.len() <= cap {
            return Vec::new();
        }

        let mut by_age: Vec<(u64, String)> = self
            .entries
            .iter()
            .map(|(path, e)| (e.last_referenced, path.clone()))
            .collect();
        by_age.sort();

        let excess = self.entries.len() - cap;
        by_age
            .into_iter()
            .take(excess)
            .filter_map(|(_, path)| {
                self.entries
                    .remove(&path)
                    .map(|e| Fingerprint::new(path, e.hash))
            })
            .collect()
    }
}
