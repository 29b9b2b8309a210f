//! Reference store: resolves reference IDs back to file content.
//!
//! Files sent in reference mode carry only an ID. The content is kept here
//! so the caller can fetch it later. Capacity is bounded; the oldest
//! registrations are dropped first.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Content registered under a reference ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferencedFile {
    pub path: String,
    pub content_hash: String,
    pub content: String,
}

#[derive(Default)]
struct Inner {
    files: HashMap<String, ReferencedFile>,
    order: VecDeque<String>,
}

/// Shared, bounded map of reference ID → file content.
#[derive(Clone)]
pub struct ReferenceStore {
    inner: Arc<RwLock<Inner>>,
    capacity: usize,
}

pub const DEFAULT_REFERENCE_CAPACITY: usize = 1024;

impl ReferenceStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner::default())),
            capacity: capacity.max(1),
        }
    }

    /// Register content under `id`. Re-registering an ID replaces its content.
    pub async fn register(&self, id: &str, file: ReferencedFile) {
        let mut inner = self.inner.write().await;
        if inner.files.insert(id.to_string(), file).is_none() {
            inner.order.push_back(id.to_string());
        }
        while inner.files.len() > self.capacity {
            let Some(oldest) = inner.order.pop_front() else {
                break;
            };
            inner.files.remove(&oldest);
        }
    }

    pub async fn resolve(&self, id: &str) -> Option<ReferencedFile> {
        self.inner.read().await.files.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.files.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for ReferenceStore {
    fn default() -> Self {
        Self::new(DEFAULT_REFERENCE_CAPACITY)
    }
}
