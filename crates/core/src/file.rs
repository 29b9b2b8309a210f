//! File references and the file source capability.

use crate::error::FileError;
use crate::fingerprint::Fingerprint;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Strategy for representing a file in the assembled context.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileHandlingMode {
    /// Full content.
    #[default]
    Embedded,
    /// A bounded-length summary.
    Summary,
    /// An identifier line only.
    Reference,
}

impl std::fmt::Display for FileHandlingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Embedded => write!(f, "embedded"),
            Self::Summary => write!(f, "summary"),
            Self::Reference => write!(f, "reference"),
        }
    }
}

impl std::str::FromStr for FileHandlingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "embedded" => Ok(Self::Embedded),
            "summary" => Ok(Self::Summary),
            "reference" => Ok(Self::Reference),
            other => Err(format!(
                "unknown file handling mode '{other}' (expected embedded, summary or reference)"
            )),
        }
    }
}

/// A file requested for one assembly call. Only its fingerprint outlives the call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileReference {
    pub path: String,
    pub content_hash: String,
    pub size_bytes: u64,
    pub mode: FileHandlingMode,
}

impl FileReference {
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::new(self.path.clone(), self.content_hash.clone())
    }
}

/// Where file bytes come from.
///
/// Path validation and sandboxing are the implementation's concern.
#[async_trait]
pub trait FileSource: Send + Sync {
    /// Expand requested paths (directories included) into an ordered list of files.
    async fn expand(&self, paths: &[String]) -> Result<Vec<String>, FileError>;

    /// Read a file's bytes.
    async fn read(&self, path: &str) -> Result<Vec<u8>, FileError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_parses_case_insensitively() {
        assert_eq!("Summary".parse::<FileHandlingMode>(), Ok(FileHandlingMode::Summary));
        assert_eq!(" reference ".parse::<FileHandlingMode>(), Ok(FileHandlingMode::Reference));
        assert!("inline".parse::<FileHandlingMode>().is_err());
    }

    #[test]
    fn mode_defaults_to_embedded() {
        assert_eq!(FileHandlingMode::default(), FileHandlingMode::Embedded);
        assert_eq!(FileHandlingMode::Embedded.to_string(), "embedded");
    }

    #[test]
    fn reference_fingerprint_uses_path_and_hash() {
        let file = FileReference {
            path: "/repo/main.rs".into(),
            content_hash: "abc".into(),
            size_bytes: 10,
            mode: FileHandlingMode::Embedded,
        };
        assert_eq!(file.fingerprint(), Fingerprint::new("/repo/main.rs", "abc"));
    }
}
