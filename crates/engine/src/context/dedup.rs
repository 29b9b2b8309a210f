//! File deduplication against a thread's embedded fingerprints.

use continuum_core::file::FileReference;
use continuum_core::fingerprint::FingerprintSet;

/// Requested files split by whether their exact content was sent before.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Partition {
    /// New or changed files, in caller order.
    pub to_embed: Vec<FileReference>,
    /// Files whose (path, hash) was already embedded, in caller order.
    pub to_reference: Vec<FileReference>,
}

impl Partition {
    /// Whether `path` landed on the reference side.
    pub fn is_referenced(&self, path: &str) -> bool {
        self.to_reference.iter().any(|f| f.path == path)
    }
}

/// Partition `requested` against `existing`.
///
/// Equality is by content hash, so an edited file goes to `to_embed` even
/// though its path is known.
pub fn partition(existing: &FingerprintSet, requested: &[FileReference]) -> Partition {
    let (to_reference, to_embed): (Vec<_>, Vec<_>) = requested
        .iter()
        .cloned()
        .partition(|file| existing.contains(&file.fingerprint()));
    Partition {
        to_embed,
        to_reference,
    }
}
