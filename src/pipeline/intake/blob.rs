use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Datelike, Utc};
use thiserror::Error;
use uuid::Uuid;

use super::format::file_extension;

#[derive(Error, Debug)]
pub enum BlobError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Blob not found: {0}")]
    NotFound(String),

    #[error("Invalid blob path: {0}")]
    InvalidPath(String),

    #[error("Blob store lock poisoned")]
    LockPoisoned,
}

/// Storage for raw file bytes, addressed by a generated relative path.
pub trait BlobStore: Send + Sync {
    fn put(&self, path: &str, bytes: &[u8]) -> Result<(), BlobError>;
    fn get(&self, path: &str) -> Result<Vec<u8>, BlobError>;
    fn delete(&self, path: &str) -> Result<(), BlobError>;
}

/// Storage path for a new upload: `documents/<yyyy>/<mm>/<uuid>.<ext>`.
pub fn blob_path_for(id: &Uuid, file_name: &str, now: DateTime<Utc>) -> String {
    format!(
        "documents/{:04}/{:02}/{}.{}",
        now.year(),
        now.month(),
        id,
        file_extension(file_name)
    )
}

/// Blob store rooted at a directory on disk.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, BlobError> {
        let relative = Path::new(path);
        let safe = !path.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(BlobError::InvalidPath(path.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

impl BlobStore for FsBlobStore {
    fn put(&self, path: &str, bytes: &[u8]) -> Result<(), BlobError> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&target, bytes)?;
        tracing::debug!(path = %path, size = bytes.len(), "Blob stored");
        Ok(())
    }

    fn get(&self, path: &str) -> Result<Vec<u8>, BlobError> {
        let target = self.resolve(path)?;
        if !target.exists() {
            return Err(BlobError::NotFound(path.to_string()));
        }
        Ok(std::fs::read(target)?)
    }

    fn delete(&self, path: &str) -> Result<(), BlobError> {
        let target = self.resolve(path)?;
        match std::fs::remove_file(&target) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(BlobError::NotFound(path.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory blob store for tests and ephemeral sessions.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.blobs
            .lock()
            .map(|blobs| blobs.contains_key(path))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.blobs.lock().map(|blobs| blobs.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BlobStore for MemoryBlobStore {
    fn put(&self, path: &str, bytes: &[u8]) -> Result<(), BlobError> {
        let mut blobs = self.blobs.lock().map_err(|_| BlobError::LockPoisoned)?;
        blobs.insert(path.to_string(), bytes.to_vec());
        Ok(())
    }

    fn get(&self, path: &str) -> Result<Vec<u8>, BlobError> {
        let blobs = self.blobs.lock().map_err(|_| BlobError::LockPoisoned)?;
        blobs
            .get(path)
            .cloned()
            .ok_or_else(|| BlobError::NotFound(path.to_string()))
    }

    fn delete(&self, path: &str) -> Result<(), BlobError> {
        let mut blobs = self.blobs.lock().map_err(|_| BlobError::LockPoisoned)?;
        blobs
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| BlobError::NotFound(path.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn path_layout_is_dated_and_keyed_by_id() {
        let id = Uuid::new_v4();
        let now = Utc.with_ymd_and_hms(2024, 3, 7, 12, 0, 0).unwrap();
        assert_eq!(
            blob_path_for(&id, "LOT_100_FILE_COSTING.XLSX", now),
            format!("documents/2024/03/{id}.xlsx")
        );
    }

    #[test]
    fn fs_store_put_get_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());

        store.put("documents/2024/03/a.pdf", b"%PDF-1.7").unwrap();
        assert!(dir.path().join("documents/2024/03/a.pdf").exists());
        assert_eq!(store.get("documents/2024/03/a.pdf").unwrap(), b"%PDF-1.7");

        store.delete("documents/2024/03/a.pdf").unwrap();
        assert!(matches!(
            store.get("documents/2024/03/a.pdf"),
            Err(BlobError::NotFound(_))
        ));
        assert!(matches!(
            store.delete("documents/2024/03/a.pdf"),
            Err(BlobError::NotFound(_))
        ));
    }

    #[test]
    fn fs_store_rejects_escaping_paths() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        assert!(matches!(
            store.put("../outside.pdf", b"x"),
            Err(BlobError::InvalidPath(_))
        ));
        assert!(matches!(
            store.put("/etc/passwd", b"x"),
            Err(BlobError::InvalidPath(_))
        ));
    }

    #[test]
    fn memory_store_tracks_contents() {
        let store = MemoryBlobStore::new();
        assert!(store.is_empty());
        store.put("a", b"1").unwrap();
        assert!(store.contains("a"));
        store.delete("a").unwrap();
        assert!(store.is_empty());
    }
}
