//! Filesystem-backed `FileSource` with directory expansion and size limits.

use async_trait::async_trait;
use continuum_config::FilesConfig;
use continuum_core::error::FileError;
use continuum_core::file::FileSource;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Reads files from the local filesystem.
pub struct FsFileSource {
    max_file_size: u64,
    allowed_extensions: HashSet<String>,
    excluded_dirs: HashSet<String>,
}

impl FsFileSource {
    pub fn new(config: &FilesConfig) -> Self {
        Self {
            max_file_size: config.max_file_size,
            allowed_extensions: config
                .allowed_extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_lowercase())
                .collect(),
            excluded_dirs: config.excluded_dirs.iter().cloned().collect(),
        }
    }

    fn is_allowed(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| self.allowed_extensions.contains(&e.to_lowercase()))
    }

    fn is_excluded(&self, dir: &Path) -> bool {
        dir.file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| self.excluded_dirs.contains(n))
    }

    /// All allowed files under `root`, sorted.
    async fn walk(&self, root: &Path) -> Result<Vec<String>, FileError> {
        let mut found = Vec::new();
        let mut pending = vec![root.to_path_buf()];

        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir)
                .await
                .map_err(|e| unreadable(&dir, e))?;
            while let Some(entry) = entries.next_entry().await.map_err(|e| unreadable(&dir, e))? {
                let path = entry.path();
                let file_type = entry.file_type().await.map_err(|e| unreadable(&path, e))?;
                if file_type.is_dir() {
                    if self.is_excluded(&path) {
                        debug!(path = %path.display(), "Skipping excluded directory");
                    } else {
                        pending.push(path);
                    }
                } else if file_type.is_file() && self.is_allowed(&path) {
                    found.push(path.to_string_lossy().into_owned());
                }
            }
        }

        found.sort();
        Ok(found)
    }
}

fn unreadable(path: &Path, err: std::io::Error) -> FileError {
    FileError::Unreadable {
        path: path.display().to_string(),
        reason: err.to_string(),
    }
}

fn checked_path(raw: &str) -> Result<PathBuf, FileError> {
    let path = PathBuf::from(raw);
    if !path.is_absolute() {
        return Err(FileError::NotAbsolute {
            path: raw.to_string(),
        });
    }
    Ok(path)
}

#[async_trait]
impl FileSource for FsFileSource {
    async fn expand(&self, paths: &[String]) -> Result<Vec<String>, FileError> {
        let mut seen = HashSet::new();
        let mut expanded = Vec::new();

        for raw in paths {
            let path = checked_path(raw)?;
            let metadata = tokio::fs::metadata(&path).await.map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => FileError::NotFound { path: raw.clone() },
                _ => unreadable(&path, e),
            })?;

            let files = if metadata.is_dir() {
                self.walk(&path).await?
            } else {
                // Named files are taken as-is, whatever their extension.
                vec![raw.clone()]
            };
            for file in files {
                if seen.insert(file.clone()) {
                    expanded.push(file);
                }
            }
        }

        debug!(requested = paths.len(), expanded = expanded.len(), "Expanded file list");
        Ok(expanded)
    }

    async fn read(&self, raw: &str) -> Result<Vec<u8>, FileError> {
        let path = checked_path(raw)?;
        let metadata = tokio::fs::metadata(&path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => FileError::NotFound {
                path: raw.to_string(),
            },
            _ => unreadable(&path, e),
        })?;
        if metadata.len() > self.max_file_size {
            return Err(FileError::TooLarge {
                path: raw.to_string(),
                size: metadata.len(),
                limit: self.max_file_size,
            });
        }
        tokio::fs::read(&path).await.map_err(|e| unreadable(&path, e))
    }
}
