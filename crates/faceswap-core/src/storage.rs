//! Shared storage location.
//!
//! One flat directory holds staged uploads and command outputs. Every file
//! gets a fresh `<prefix>-<uuid>` name; nothing is indexed or deduplicated.
//! The same directory is served to clients under `public_prefix`.

use crate::types::ImageRole;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("failed to create storage directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// A file name allocated in the shared storage location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub name: String,
    pub path: PathBuf,
}

/// Outcome of a retention sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub removed: usize,
    pub failed: usize,
}

#[derive(Debug, Clone)]
pub struct SharedStorage {
    root: PathBuf,
    public_prefix: String,
}

impl SharedStorage {
    pub fn new(root: impl Into<PathBuf>, public_prefix: impl Into<String>) -> Self {
        let public_prefix = public_prefix.into().trim_end_matches('/').to_string();
        Self {
            root: root.into(),
            public_prefix,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn public_prefix(&self) -> &str {
        &self.public_prefix
    }

    /// Create the storage directory if it does not exist yet.
    pub fn ensure_root(&self) -> Result<(), StorageError> {
        std::fs::create_dir_all(&self.root).map_err(|source| StorageError::CreateDir {
            path: self.root.clone(),
            source,
        })
    }

    /// Fresh on-disk name for an upload, keeping the original extension.
    pub fn upload_name(role: ImageRole, original_file_name: &str) -> String {
        let id = Uuid::new_v4();
        match safe_extension(original_file_name) {
            Some(ext) => format!("{}-{id}.{ext}", role.file_prefix()),
            None => format!("{}-{id}", role.file_prefix()),
        }
    }

    /// Fresh on-disk name for a command output.
    pub fn output_name(extension: &str) -> String {
        format!("output-{}.{extension}", Uuid::new_v4())
    }

    /// Write an uploaded image under a newly generated name.
    pub async fn persist(
        &self,
        role: ImageRole,
        original_file_name: &str,
        bytes: &[u8],
    ) -> Result<StoredFile, StorageError> {
        let name = Self::upload_name(role, original_file_name);
        let path = self.root.join(&name);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|source| StorageError::Write {
                path: path.clone(),
                source,
            })?;
        tracing::debug!(role = ?role, name = %name, bytes = bytes.len(), "upload persisted");
        Ok(StoredFile { name, path })
    }

    /// Reserve an output name. Nothing is written; the external command
    /// creates the file.
    pub fn allocate_output(&self, extension: &str) -> StoredFile {
        let name = Self::output_name(extension);
        let path = self.root.join(&name);
        StoredFile { name, path }
    }

    /// Client-facing reference for a stored file.
    pub fn public_path(&self, name: &str) -> String {
        format!("{}/{name}", self.public_prefix)
    }

    /// Delete regular files whose modification time is older than `max_age`.
    pub fn sweep(&self, max_age: Duration) -> Result<SweepReport, StorageError> {
        let entries = std::fs::read_dir(&self.root).map_err(|source| StorageError::Read {
            path: self.root.clone(),
            source,
        })?;

        let now = SystemTime::now();
        let mut report = SweepReport::default();

        for entry in entries.flatten() {
            let path = entry.path();
            let Ok(meta) = entry.metadata() else {
                continue;
            };
            if !meta.is_file() {
                continue;
            }
            let age = meta
                .modified()
                .ok()
                .and_then(|m| now.duration_since(m).ok())
                .unwrap_or_default();
            if age < max_age {
                continue;
            }
            match std::fs::remove_file(&path) {
                Ok(()) => report.removed += 1,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "sweep: remove failed");
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }
}

/// Extension of `file_name` if it is non-empty ASCII alphanumeric.
fn safe_extension(file_name: &str) -> Option<&str> {
    let ext = Path::new(file_name).extension()?.to_str()?;
    is_safe_extension(ext).then_some(ext)
}

/// Whether `ext` can be appended to a generated name without leaving the
/// storage root: non-empty ASCII alphanumeric only.
pub fn is_safe_extension(ext: &str) -> bool {
    !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_upload_name_keeps_extension() {
        let name = SharedStorage::upload_name(ImageRole::Source, "me.png");
        assert!(name.starts_with("source-"));
        assert!(name.ends_with(".png"));
    }

    #[test]
    fn test_upload_name_without_extension() {
        let name = SharedStorage::upload_name(ImageRole::Target, "blob");
        assert!(name.starts_with("target-"));
        assert!(!name.contains('.'));
    }

    #[test]
    fn test_upload_name_rejects_odd_extension() {
        let name = SharedStorage::upload_name(ImageRole::Source, "x.p/n g");
        assert!(!name.contains('/'));
        assert!(!name.contains(' '));
    }

    #[test]
    fn test_is_safe_extension() {
        assert!(is_safe_extension("jpg"));
        assert!(is_safe_extension("webp"));
        assert!(!is_safe_extension(""));
        assert!(!is_safe_extension("../x"));
        assert!(!is_safe_extension("tar.gz"));
    }

    #[test]
    fn test_names_are_distinct() {
        let mut seen = HashSet::new();
        for _ in 0..200 {
            assert!(seen.insert(SharedStorage::upload_name(ImageRole::Source, "a.jpg")));
            assert!(seen.insert(SharedStorage::upload_name(ImageRole::Target, "a.jpg")));
            assert!(seen.insert(SharedStorage::output_name("jpg")));
        }
    }

    #[test]
    fn test_public_path_strips_trailing_slash() {
        let storage = SharedStorage::new("/tmp/x", "/uploads/");
        assert_eq!(storage.public_path("output-1.jpg"), "/uploads/output-1.jpg");
    }

    #[tokio::test]
    async fn test_persist_writes_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let storage = SharedStorage::new(dir.path(), "/uploads");
        let stored = storage
            .persist(ImageRole::Source, "face.jpeg", b"abc")
            .await
            .unwrap();
        assert_eq!(stored.path, dir.path().join(&stored.name));
        assert_eq!(std::fs::read(&stored.path).unwrap(), b"abc");
    }

    #[test]
    fn test_allocate_output_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let storage = SharedStorage::new(dir.path(), "/uploads");
        let out = storage.allocate_output("jpg");
        assert!(out.name.starts_with("output-"));
        assert!(out.name.ends_with(".jpg"));
        assert!(!out.path.exists());
    }

    #[test]
    fn test_sweep_removes_old_files_only() {
        let dir = tempfile::tempdir().unwrap();
        let storage = SharedStorage::new(dir.path(), "/uploads");
        std::fs::write(dir.path().join("a.jpg"), b"1").unwrap();
        std::fs::create_dir(dir.path().join("keep")).unwrap();

        let report = storage.sweep(Duration::from_secs(3600)).unwrap();
        assert_eq!(report, SweepReport::default());
        assert!(dir.path().join("a.jpg").exists());

        let report = storage.sweep(Duration::ZERO).unwrap();
        assert_eq!(report.removed, 1);
        assert!(!dir.path().join("a.jpg").exists());
        assert!(dir.path().join("keep").is_dir());
    }
}
