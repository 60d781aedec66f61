use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use walkdir::WalkDir;

use super::archive::{entry_name, ArchiveBuilder};
use super::{clean_entry_path, clean_path, ObjectStore, ObjectStoreError};
use crate::OwnerId;

/// Directory under the base path holding in-flight uploads. Owner roots are
/// numeric, so it can never collide with one.
const STAGING_DIR: &str = ".staging";

/// Local filesystem store. Each owner's objects live under `<base>/<owner>/`.
pub struct LocalStore {
    base_path: PathBuf,
}

impl LocalStore {
    pub fn new<P: AsRef<Path>>(base_path: P) -> Result<Self, std::io::Error> {
        let base_path = base_path.as_ref().to_path_buf();
        std::fs::create_dir_all(base_path.join(STAGING_DIR))?;
        Ok(Self { base_path })
    }

    fn owner_root(&self, owner: OwnerId) -> PathBuf {
        self.base_path.join(owner.to_string())
    }

    fn full_path(&self, owner: OwnerId, path: &str) -> Result<PathBuf, ObjectStoreError> {
        let cleaned = clean_path(path)?;
        let mut full = self.owner_root(owner);
        if !cleaned.is_empty() {
            full.push(cleaned);
        }
        Ok(full)
    }

    fn entry_path(&self, owner: OwnerId, path: &str) -> Result<PathBuf, ObjectStoreError> {
        Ok(self.owner_root(owner).join(clean_entry_path(path)?))
    }
}

async fn ensure_parent(path: &Path) -> Result<(), ObjectStoreError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    Ok(())
}

/// Fail when something already occupies `target`; moves never merge or replace.
async fn ensure_vacant(target: &Path, to: &str) -> Result<(), ObjectStoreError> {
    if tokio::fs::try_exists(target).await? {
        return Err(ObjectStoreError::AlreadyExists(to.to_string()));
    }
    Ok(())
}

/// `rename` reports EXDEV when source and target sit on different filesystems.
fn crosses_devices(e: &std::io::Error) -> bool {
    e.kind() == std::io::ErrorKind::CrossesDevices
}

/// Recursively copy `from` to `to`. The target must not exist yet.
fn copy_tree(from: &Path, to: &Path) -> Result<(), ObjectStoreError> {
    for entry in WalkDir::new(from) {
        let entry = entry.map_err(std::io::Error::from)?;
        let relative = entry
            .path()
            .strip_prefix(from)
            .map_err(|e| ObjectStoreError::Backend(e.to_string()))?;
        let dest = to.join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&dest)?;
        } else {
            std::fs::copy(entry.path(), &dest)?;
        }
    }
    Ok(())
}

fn build_archive(root: &Path, dir: &str) -> Result<std::fs::File, ObjectStoreError> {
    let mut archive = ArchiveBuilder::new()?;
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(root)
            .map_err(|e| ObjectStoreError::Backend(e.to_string()))?;
        let relative = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let mut source = std::fs::File::open(entry.path())?;
        archive.add(&entry_name(dir, &relative), &mut source)?;
    }
    archive.finish()
}

async fn blocking<T, F>(task: F) -> Result<T, ObjectStoreError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ObjectStoreError> + Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| ObjectStoreError::Backend(format!("storage task failed: {e}")))?
}

#[async_trait]
impl ObjectStore for LocalStore {
    async fn save(&self, owner: OwnerId, path: &str, data: Bytes) -> Result<(), ObjectStoreError> {
        let target = self.entry_path(owner, path)?;
        ensure_parent(&target).await?;

        // Stage the upload next to the store and rename it into place so a
        // partial write is never visible at the final path.
        let staged = self
            .base_path
            .join(STAGING_DIR)
            .join(uuid::Uuid::new_v4().to_string());
        tokio::fs::write(&staged, &data).await?;
        if let Err(e) = tokio::fs::rename(&staged, &target).await {
            let _ = tokio::fs::remove_file(&staged).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn read(&self, owner: OwnerId, path: &str) -> Result<Bytes, ObjectStoreError> {
        let full = self.entry_path(owner, path)?;
        match tokio::fs::read(&full).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ObjectStoreError::NotFound(path.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, owner: OwnerId, path: &str) -> Result<(), ObjectStoreError> {
        let full = self.entry_path(owner, path)?;
        match tokio::fs::remove_file(&full).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, owner: OwnerId, path: &str) -> Result<bool, ObjectStoreError> {
        let full = self.full_path(owner, path)?;
        Ok(tokio::fs::try_exists(&full).await?)
    }

    async fn create_dir(&self, owner: OwnerId, path: &str) -> Result<(), ObjectStoreError> {
        let full = self.entry_path(owner, path)?;
        tokio::fs::create_dir_all(&full).await?;
        Ok(())
    }

    async fn delete_dir(&self, owner: OwnerId, path: &str) -> Result<(), ObjectStoreError> {
        let full = self.entry_path(owner, path)?;
        match tokio::fs::remove_dir_all(&full).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn move_file(
        &self,
        owner: OwnerId,
        from: &str,
        to: &str,
    ) -> Result<(), ObjectStoreError> {
        let source = self.entry_path(owner, from)?;
        let target = self.entry_path(owner, to)?;
        if !tokio::fs::try_exists(&source).await? {
            return Err(ObjectStoreError::NotFound(from.to_string()));
        }
        ensure_vacant(&target, to).await?;
        ensure_parent(&target).await?;

        match tokio::fs::rename(&source, &target).await {
            Ok(()) => Ok(()),
            Err(e) if crosses_devices(&e) => {
                tokio::fs::copy(&source, &target).await?;
                tokio::fs::remove_file(&source).await?;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn move_dir(&self, owner: OwnerId, from: &str, to: &str) -> Result<(), ObjectStoreError> {
        let source = self.entry_path(owner, from)?;
        let target = self.entry_path(owner, to)?;
        if !tokio::fs::try_exists(&source).await? {
            return Err(ObjectStoreError::NotFound(from.to_string()));
        }
        if target.starts_with(&source) {
            return Err(ObjectStoreError::InvalidPath(format!(
                "cannot move '{from}' into itself"
            )));
        }
        ensure_vacant(&target, to).await?;
        ensure_parent(&target).await?;

        match tokio::fs::rename(&source, &target).await {
            Ok(()) => Ok(()),
            Err(e) if crosses_devices(&e) => {
                blocking(move || {
                    copy_tree(&source, &target)?;
                    std::fs::remove_dir_all(&source)?;
                    Ok(())
                })
                .await
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn zip_dir(
        &self,
        owner: OwnerId,
        path: &str,
        out: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<(), ObjectStoreError> {
        let dir = clean_entry_path(path)?;
        let root = self.owner_root(owner).join(&dir);
        match tokio::fs::metadata(&root).await {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                return Err(ObjectStoreError::InvalidPath(format!(
                    "'{path}' is not a directory"
                )))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ObjectStoreError::NotFound(path.to_string()))
            }
            Err(e) => return Err(e.into()),
        }

        let spool = blocking(move || build_archive(&root, &dir)).await?;
        let mut spool = tokio::fs::File::from_std(spool);
        tokio::io::copy(&mut spool, &mut *out).await?;
        out.flush().await?;
        Ok(())
    }
}
