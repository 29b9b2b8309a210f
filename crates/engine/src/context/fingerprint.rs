//! Content fingerprints: stable identity for one version of a file.

use continuum_core::file::{FileHandlingMode, FileReference};
use continuum_core::fingerprint::Fingerprint;
use sha2::{Digest, Sha256};

/// Hashes file content into fingerprints and reference IDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentFingerprinter;

impl ContentFingerprinter {
    pub fn new() -> Self {
        Self
    }

    /// Hex SHA-256 of the content.
    pub fn hash(&self, content: &[u8]) -> String {
        hex::encode(Sha256::digest(content))
    }

    pub fn fingerprint(&self, path: &str, content: &[u8]) -> Fingerprint {
        Fingerprint::new(path, self.hash(content))
    }

    /// Describe a freshly read file.
    pub fn reference(&self, path: &str, content: &[u8], mode: FileHandlingMode) -> FileReference {
        FileReference {
            path: path.to_string(),
            content_hash: self.hash(content),
            size_bytes: content.len() as u64,
            mode,
        }
    }
}

/// Deterministic reference ID for a file version: `ref_` + 12 hex chars.
pub fn reference_id(path: &str, content_hash: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.as_bytes());
    hasher.update(b"|");
    hasher.update(content_hash.as_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("ref_{}", &digest[..12])
}
