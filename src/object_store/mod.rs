mod archive;
mod gcs;
mod local;

pub use gcs::GcsStore;
pub use local::LocalStore;

use std::path::{Component, Path};

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::io::AsyncWrite;

use crate::OwnerId;

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Object not found: {0}")]
    NotFound(String),
    #[error("Invalid path: {0}")]
    InvalidPath(String),
    #[error("Target already exists: {0}")]
    AlreadyExists(String),
    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
    #[error("Backend error: {0}")]
    Backend(String),
}

/// Byte storage keyed by `(owner, relative path)`.
///
/// Every owner gets an isolated root; paths are slash-separated and relative to
/// it. Implementations know nothing about file or folder records.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write `data` at `path`, creating intermediate directories. The object
    /// only becomes visible at `path` once fully written.
    async fn save(&self, owner: OwnerId, path: &str, data: Bytes) -> Result<(), ObjectStoreError>;
    async fn read(&self, owner: OwnerId, path: &str) -> Result<Bytes, ObjectStoreError>;
    /// Deleting a missing object is not an error.
    async fn delete(&self, owner: OwnerId, path: &str) -> Result<(), ObjectStoreError>;
    async fn exists(&self, owner: OwnerId, path: &str) -> Result<bool, ObjectStoreError>;
    async fn create_dir(&self, owner: OwnerId, path: &str) -> Result<(), ObjectStoreError>;
    /// Remove a directory and everything below it.
    async fn delete_dir(&self, owner: OwnerId, path: &str) -> Result<(), ObjectStoreError>;
    async fn move_file(&self, owner: OwnerId, from: &str, to: &str)
        -> Result<(), ObjectStoreError>;
    /// Move a directory with all of its contents.
    async fn move_dir(&self, owner: OwnerId, from: &str, to: &str) -> Result<(), ObjectStoreError>;
    /// Write a zip archive of every file under `path` to `out`. Entry names
    /// start with the directory's own name.
    async fn zip_dir(
        &self,
        owner: OwnerId,
        path: &str,
        out: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<(), ObjectStoreError>;
}

/// Collapse a relative path into its normalized slash-separated form.
///
/// Absolute paths and `..` components are rejected so no key can escape the
/// owner's root.
pub(crate) fn clean_path(path: &str) -> Result<String, ObjectStoreError> {
    let mut segments = Vec::new();
    for component in Path::new(path).components() {
        match component {
            Component::CurDir => {}
            Component::Normal(segment) => {
                let segment = segment
                    .to_str()
                    .ok_or_else(|| ObjectStoreError::InvalidPath(path.to_string()))?;
                segments.push(segment);
            }
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(ObjectStoreError::InvalidPath(path.to_string()));
            }
        }
    }
    Ok(segments.join("/"))
}

/// Like [`clean_path`] but refuses the owner root itself, for operations that
/// must target a named file or directory.
pub(crate) fn clean_entry_path(path: &str) -> Result<String, ObjectStoreError> {
    let cleaned = clean_path(path)?;
    if cleaned.is_empty() {
        return Err(ObjectStoreError::InvalidPath(path.to_string()));
    }
    Ok(cleaned)
}
