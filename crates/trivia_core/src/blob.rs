//! Blob storage for uploaded import files.
//!
//! # Invariants
//! - Blob paths are relative, `/`-separated and never escape the root.
//! - `upload` returns the normalized path reference that was written.

use log::debug;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

pub type BlobResult<T> = Result<T, BlobError>;

#[derive(Debug)]
pub enum BlobError {
    InvalidPath(String),
    Io {
        path: String,
        source: std::io::Error,
    },
}

impl Display for BlobError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidPath(path) => write!(f, "invalid blob path `{path}`"),
            Self::Io { path, source } => write!(f, "blob io failed for `{path}`: {source}"),
        }
    }
}

impl Error for BlobError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidPath(_) => None,
            Self::Io { source, .. } => Some(source),
        }
    }
}

/// File storage addressed by slash-separated paths.
pub trait BlobStore: Send + Sync {
    fn upload(&self, path: &str, bytes: &[u8]) -> BlobResult<String>;
    fn delete(&self, path: &str) -> BlobResult<()>;
}

/// Blob store rooted at a local directory.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolves a blob path to its location on disk.
    pub fn resolve(&self, path: &str) -> BlobResult<PathBuf> {
        let segments = split_blob_path(path)?;
        Ok(segments
            .iter()
            .fold(self.root.clone(), |acc, segment| acc.join(segment)))
    }
}

impl BlobStore for FsBlobStore {
    fn upload(&self, path: &str, bytes: &[u8]) -> BlobResult<String> {
        let target = self.resolve(path)?;
        let io_err = |source| BlobError::Io {
            path: path.to_string(),
            source,
        };

        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        std::fs::write(&target, bytes).map_err(io_err)?;
        debug!(
            "event=blob_upload module=blob status=ok bytes={}",
            bytes.len()
        );
        Ok(split_blob_path(path)?.join("/"))
    }

    fn delete(&self, path: &str) -> BlobResult<()> {
        let target = self.resolve(path)?;
        match std::fs::remove_file(&target) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(BlobError::Io {
                path: path.to_string(),
                source,
            }),
        }
    }
}

fn split_blob_path(path: &str) -> BlobResult<Vec<&str>> {
    let invalid = || BlobError::InvalidPath(path.to_string());
    if path.starts_with('/') || path.contains('\\') || path.contains('\0') {
        return Err(invalid());
    }

    let segments: Vec<&str> = path.split('/').collect();
    if segments
        .iter()
        .any(|segment| segment.is_empty() || *segment == "." || *segment == "..")
    {
        return Err(invalid());
    }
    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::{BlobError, BlobStore, FsBlobStore};

    #[test]
    fn upload_writes_nested_file_and_returns_reference() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());

        let reference = store
            .upload("bulk_upload/u1/b1-geo.csv", b"q,a\n")
            .unwrap();
        assert_eq!(reference, "bulk_upload/u1/b1-geo.csv");

        let on_disk = std::fs::read(dir.path().join("bulk_upload/u1/b1-geo.csv")).unwrap();
        assert_eq!(on_disk, b"q,a\n");
    }

    #[test]
    fn paths_escaping_root_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());

        for bad in ["../x", "/etc/passwd", "a//b", "a/./b", "", "a\\b"] {
            let err = store.upload(bad, b"x").unwrap_err();
            assert!(matches!(err, BlobError::InvalidPath(_)), "accepted {bad}");
        }
    }

    #[test]
    fn delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        store.upload("a/b.txt", b"x").unwrap();

        store.delete("a/b.txt").unwrap();
        store.delete("a/b.txt").unwrap();
        assert!(!dir.path().join("a/b.txt").exists());
    }
}
