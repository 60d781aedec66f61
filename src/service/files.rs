use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;

use super::{
    compensate, join_path, parent_dir, validate_id, validate_name, FolderPathResolver,
    ServiceError,
};
use crate::object_store::ObjectStore;
use crate::storage::models::FileRecord;
use crate::storage::MetadataStore;
use crate::OwnerId;

/// An upload waiting to be stored.
#[derive(Debug, Clone)]
pub struct NewFile {
    pub folder_id: Option<String>,
    pub owner: OwnerId,
    pub name: String,
    pub mime_type: Option<String>,
    pub content: Bytes,
}

/// File operations over the metadata store and the storage backend.
#[derive(Clone)]
pub struct FileService {
    db: Arc<dyn MetadataStore>,
    store: Arc<dyn ObjectStore>,
    resolver: FolderPathResolver,
}

impl FileService {
    pub fn new(db: Arc<dyn MetadataStore>, store: Arc<dyn ObjectStore>) -> Self {
        let resolver = FolderPathResolver::new(Arc::clone(&db));
        Self {
            db,
            store,
            resolver,
        }
    }

    /// Store a new file, replacing any file of the same name in the folder.
    pub async fn upload(&self, upload: NewFile) -> Result<FileRecord, ServiceError> {
        validate_name("file", &upload.name)?;
        let owner = upload.owner;
        let folder_path = self.folder_path(upload.folder_id.as_deref(), owner)?;
        let path = join_path(&folder_path, &upload.name);

        // Same-named uploads overwrite: drop the old row and its bytes first.
        if let Some(existing) =
            self.db
                .get_file_by_name(owner, upload.folder_id.as_deref(), &upload.name)?
        {
            self.db.delete_file(&existing.id, owner)?;
            if let Err(e) = self.store.delete(owner, &existing.path).await {
                tracing::warn!(
                    file_id = %existing.id,
                    path = %existing.path,
                    error = %e,
                    "Failed to delete overwritten file from storage"
                );
            }
        }

        let now = Utc::now();
        let file = FileRecord {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: owner,
            folder_id: upload.folder_id,
            name: upload.name,
            path,
            byte_size: upload.content.len() as u64,
            mime_type: upload.mime_type.filter(|m| !m.is_empty()),
            created_at: now,
            updated_at: now,
        };
        self.db.insert_file(&file)?;

        if let Err(e) = self.store.save(owner, &file.path, upload.content).await {
            return Err(compensate(e.into(), || {
                self.db.delete_file(&file.id, owner)?;
                Ok(())
            }));
        }

        tracing::debug!(file_id = %file.id, owner, path = %file.path, "Stored file");
        Ok(file)
    }

    /// Metadata of a file the owner may access.
    pub fn get(&self, file_id: &str, owner: OwnerId) -> Result<FileRecord, ServiceError> {
        validate_id("file", file_id)?;
        let file = self
            .db
            .get_file(file_id)?
            .ok_or_else(|| ServiceError::NotFound(format!("file {file_id}")))?;
        if file.owner_id != owner {
            tracing::warn!(file_id, owner, "Rejected access to another owner's file");
            return Err(ServiceError::Unauthorized(format!("file {file_id}")));
        }
        Ok(file)
    }

    pub async fn download(
        &self,
        file_id: &str,
        owner: OwnerId,
    ) -> Result<(FileRecord, Bytes), ServiceError> {
        let file = self.get(file_id, owner)?;
        let content = self.store.read(owner, &file.path).await?;
        Ok((file, content))
    }

    /// Remove a file. Metadata goes first and is never restored; a leftover
    /// object is reported as [`ServiceError::OrphanedStorageObject`].
    pub async fn delete(&self, file_id: &str, owner: OwnerId) -> Result<(), ServiceError> {
        let file = self.get(file_id, owner)?;

        if self.db.delete_file(&file.id, owner)? == 0 {
            return Err(ServiceError::NotFound(format!("file {file_id}")));
        }

        if let Err(source) = self.store.delete(owner, &file.path).await {
            tracing::warn!(file_id, path = %file.path, error = %source, "Orphaned storage object");
            return Err(ServiceError::OrphanedStorageObject {
                path: file.path,
                source,
            });
        }

        tracing::debug!(file_id, owner, "Deleted file");
        Ok(())
    }

    pub async fn rename(
        &self,
        file_id: &str,
        new_name: &str,
        owner: OwnerId,
    ) -> Result<FileRecord, ServiceError> {
        validate_name("file", new_name)?;
        let file = self.get(file_id, owner)?;
        if file.name == new_name {
            return Ok(file);
        }

        let new_path = join_path(parent_dir(&file.path), new_name);
        self.relocate(file, file_id, None, new_name, new_path, owner)
            .await
    }

    /// Move a file into `destination` (the root when `None`).
    pub async fn move_to(
        &self,
        file_id: &str,
        destination: Option<&str>,
        owner: OwnerId,
    ) -> Result<FileRecord, ServiceError> {
        let file = self.get(file_id, owner)?;
        let dest_path = self.folder_path(destination, owner)?;
        let new_path = join_path(&dest_path, &file.name);
        if file.folder_id.as_deref() == destination && file.path == new_path {
            return Ok(file);
        }

        let name = file.name.clone();
        self.relocate(file, file_id, Some(destination), &name, new_path, owner)
            .await
    }

    /// Fail the way [`FileService::move_to`] would if `destination` cannot take
    /// the owner's files, without changing anything.
    pub fn check_destination(
        &self,
        destination: Option<&str>,
        owner: OwnerId,
    ) -> Result<(), ServiceError> {
        self.folder_path(destination, owner).map(|_| ())
    }

    /// Metadata first, then the physical move, reverting the metadata if the
    /// move fails. `folder` is `None` when the file stays in its folder.
    async fn relocate(
        &self,
        file: FileRecord,
        file_id: &str,
        folder: Option<Option<&str>>,
        name: &str,
        new_path: String,
        owner: OwnerId,
    ) -> Result<FileRecord, ServiceError> {
        let folder_id = folder.unwrap_or(file.folder_id.as_deref());
        if self
            .db
            .update_file_location(&file.id, owner, folder_id, name, &new_path)?
            == 0
        {
            return Err(ServiceError::NotFound(format!("file {file_id}")));
        }

        if let Err(e) = self.store.move_file(owner, &file.path, &new_path).await {
            return Err(compensate(e.into(), || {
                self.db.update_file_location(
                    &file.id,
                    owner,
                    file.folder_id.as_deref(),
                    &file.name,
                    &file.path,
                )?;
                Ok(())
            }));
        }

        tracing::debug!(file_id, from = %file.path, to = %new_path, "Relocated file");
        self.get(file_id, owner)
    }

    /// Files directly inside `folder_id` (the root when `None`).
    pub fn list_in_folder(
        &self,
        folder_id: Option<&str>,
        owner: OwnerId,
    ) -> Result<Vec<FileRecord>, ServiceError> {
        if let Some(id) = folder_id {
            validate_id("folder", id)?;
        }
        Ok(self.db.list_files_in_folder(owner, folder_id)?)
    }

    /// Every file in the subtree below `folder_id`.
    pub fn list_recursive(
        &self,
        folder_id: &str,
        owner: OwnerId,
    ) -> Result<Vec<FileRecord>, ServiceError> {
        validate_id("folder", folder_id)?;
        Ok(self.db.list_files_recursive(owner, folder_id)?)
    }

    /// Rewrite the stored path of every file below `folder_id` after the folder
    /// moved from `old_prefix` to `new_prefix`. Returns how many were updated.
    pub fn rebase_paths(
        &self,
        folder_id: &str,
        owner: OwnerId,
        old_prefix: &str,
        new_prefix: &str,
    ) -> Result<usize, ServiceError> {
        let files = self.list_recursive(folder_id, owner)?;
        for file in &files {
            let new_path = match file
                .path
                .strip_prefix(old_prefix)
                .and_then(|rest| rest.strip_prefix('/'))
            {
                Some(relative) => join_path(new_prefix, relative),
                None => {
                    tracing::warn!(
                        file_id = %file.id,
                        path = %file.path,
                        old_prefix,
                        "Stored path outside its folder, recomputing"
                    );
                    let dir = self.resolver.resolve_opt(file.folder_id.as_deref())?;
                    join_path(&dir, &file.name)
                }
            };

            if self.db.update_file_path(&file.id, owner, &new_path)? == 0 {
                return Err(ServiceError::NotFound(format!("file {}", file.id)));
            }
        }
        Ok(files.len())
    }

    /// Resolve a destination folder the owner is allowed to write into.
    fn folder_path(&self, folder_id: Option<&str>, owner: OwnerId) -> Result<String, ServiceError> {
        let Some(id) = folder_id else {
            return Ok(String::new());
        };
        validate_id("folder", id)?;
        let folder = self
            .db
            .get_folder(id)?
            .ok_or_else(|| ServiceError::NotFound(format!("folder {id}")))?;
        if folder.owner_id != owner {
            return Err(ServiceError::Unauthorized(format!("folder {id}")));
        }
        self.resolver.resolve(id)
    }
}
