//! Thread and Turn domain types.
//!
//! A `Thread` is the persisted state of one conversation; a `Turn` is one
//! exchange recorded in it. Turns are only ever appended, never edited.

use crate::fingerprint::{Fingerprint, FingerprintSet};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque identifier for a thread (the continuation ID).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreadId(pub String);

impl ThreadId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ThreadId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for ThreadId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ThreadId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for ThreadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

/// How a file was represented in a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefTag {
    /// Full content was sent in this turn.
    Embedded,
    /// Only an identifier or summary was sent.
    ReferenceOnly,
}

/// A file referenced by a turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnFileRef {
    pub fingerprint: Fingerprint,
    pub tag: RefTag,
}

/// One recorded exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,

    /// Specialization used (chat, analyze, review, ...). Opaque here.
    pub mode: String,

    /// The text actually sent or received.
    pub content: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub file_refs: Vec<TurnFileRef>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,

    pub timestamp: DateTime<Utc>,
}

impl Turn {
    /// Create a user turn.
    pub fn user(mode: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            mode: mode.into(),
            content: content.into(),
            file_refs: Vec::new(),
            model: None,
            provider: None,
            timestamp: Utc::now(),
        }
    }

    /// Create an assistant turn.
    pub fn assistant(mode: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            ..Self::user(mode, content)
        }
    }

    pub fn with_file_refs(mut self, refs: Vec<TurnFileRef>) -> Self {
        self.file_refs = refs;
        self
    }

    pub fn with_model(mut self, provider: impl Into<String>, model: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self.model = Some(model.into());
        self
    }

    /// Fingerprints this turn embedded in full.
    pub fn embedded(&self) -> impl Iterator<Item = &Fingerprint> {
        self.file_refs
            .iter()
            .filter(|r| r.tag == RefTag::Embedded)
            .map(|r| &r.fingerprint)
    }
}

/// A (provider, model) pair fixed on a thread's first turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelPin {
    pub provider: String,
    pub model: String,
}

/// Default turn ceiling per thread.
pub const DEFAULT_MAX_TURNS: usize = 20;

/// A conversation session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    pub id: ThreadId,

    /// Mode of the invocation that opened the thread.
    pub mode: String,

    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,

    #[serde(default)]
    pub turns: Vec<Turn>,

    #[serde(default)]
    pub file_fingerprints: FingerprintSet,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pinned_model: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pinned_provider: Option<String>,

    pub max_turns: usize,
}

impl Thread {
    /// Create an empty thread with a fresh ID.
    pub fn new(mode: impl Into<String>, max_turns: usize) -> Self {
        let now = Utc::now();
        Self {
            id: ThreadId::new(),
            mode: mode.into(),
            created_at: now,
            last_active_at: now,
            turns: Vec::new(),
            file_fingerprints: FingerprintSet::new(),
            pinned_model: None,
            pinned_provider: None,
            max_turns,
        }
    }

    pub fn turn_count(&self) -> usize {
        self.turns.len()
    }

    /// No further turns may be appended.
    pub fn is_exhausted(&self) -> bool {
        self.turns.len() >= self.max_turns
    }

    /// The pinned (provider, model), if both are set.
    pub fn pinned(&self) -> Option<(&str, &str)> {
        match (&self.pinned_provider, &self.pinned_model) {
            (Some(p), Some(m)) => Some((p.as_str(), m.as_str())),
            _ => None,
        }
    }

    /// Pin a model, only if this is still the first turn and nothing is pinned.
    pub fn pin_if_first(&mut self, pin: &ModelPin) -> bool {
        if !self.turns.is_empty() || self.pinned().is_some() {
            return false;
        }
        self.pinned_provider = Some(pin.provider.clone());
        self.pinned_model = Some(pin.model.clone());
        true
    }

    /// Apply a turn: append it and fold its file refs into the fingerprint set.
    ///
    /// Callers must check `is_exhausted` first; the thread store is the only
    /// caller and does so atomically with its write.
    pub fn push_turn(&mut self, turn: Turn, max_fingerprints: usize) {
        for file_ref in &turn.file_refs {
            match file_ref.tag {
                RefTag::Embedded => {
                    if let Some(old) = self.file_fingerprints.record_embedded(&file_ref.fingerprint) {
                        tracing::debug!(
                            thread_id = %self.id,
                            path = %file_ref.fingerprint.path,
                            superseded = %old,
                            "Fingerprint superseded"
                        );
                    }
                }
                RefTag::ReferenceOnly => {
                    self.file_fingerprints.touch(&file_ref.fingerprint);
                }
            }
        }

        let evicted = self.file_fingerprints.evict_to(max_fingerprints);
        if !evicted.is_empty() {
            tracing::debug!(
                thread_id = %self.id,
                evicted = evicted.len(),
                "Fingerprint set over capacity, evicted least recently referenced"
            );
        }

        self.last_active_at = turn.timestamp.max(self.last_active_at);
        self.turns.push(turn);
    }
}
