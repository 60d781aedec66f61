use std::sync::Arc;

use chrono::Utc;
use tokio::io::AsyncWrite;

use super::{
    compensate, validate_id, validate_name, FileService, FolderPathResolver, ServiceError,
    MAX_FOLDER_DEPTH,
};
use crate::object_store::ObjectStore;
use crate::storage::models::FolderRecord;
use crate::storage::MetadataStore;
use crate::OwnerId;

/// The structural change applied by [`FolderService::relocate`].
#[derive(Clone, Copy)]
enum Relocation<'a> {
    Rename(&'a str),
    Move(Option<&'a str>),
}

/// Folder tree operations. Keeps the directory layout in storage and the
/// stored paths of descendant files in step with the folder records.
#[derive(Clone)]
pub struct FolderService {
    db: Arc<dyn MetadataStore>,
    store: Arc<dyn ObjectStore>,
    resolver: FolderPathResolver,
    files: FileService,
}

impl FolderService {
    pub fn new(db: Arc<dyn MetadataStore>, store: Arc<dyn ObjectStore>, files: FileService) -> Self {
        let resolver = FolderPathResolver::new(Arc::clone(&db));
        Self {
            db,
            store,
            resolver,
            files,
        }
    }

    pub fn resolver(&self) -> &FolderPathResolver {
        &self.resolver
    }

    pub async fn create(
        &self,
        owner: OwnerId,
        name: &str,
        parent_id: Option<&str>,
    ) -> Result<FolderRecord, ServiceError> {
        validate_name("folder", name)?;
        if let Some(parent) = parent_id {
            self.get(parent, owner)?;
        }

        let now = Utc::now();
        let folder = FolderRecord {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: owner,
            parent_id: parent_id.map(str::to_string),
            name: name.to_string(),
            created_at: now,
            updated_at: now,
        };
        self.db.insert_folder(&folder)?;

        let created = match self.resolver.resolve(&folder.id) {
            Ok(path) => self.store.create_dir(owner, &path).await.map_err(ServiceError::from),
            Err(e) => Err(e),
        };
        if let Err(e) = created {
            return Err(compensate(e, || {
                self.db.delete_folder(&folder.id, owner)?;
                Ok(())
            }));
        }

        tracing::debug!(folder_id = %folder.id, owner, name, "Created folder");
        Ok(folder)
    }

    pub fn get(&self, folder_id: &str, owner: OwnerId) -> Result<FolderRecord, ServiceError> {
        validate_id("folder", folder_id)?;
        let folder = self
            .db
            .get_folder(folder_id)?
            .ok_or_else(|| ServiceError::NotFound(format!("folder {folder_id}")))?;
        if folder.owner_id != owner {
            tracing::warn!(folder_id, owner, "Rejected access to another owner's folder");
            return Err(ServiceError::Unauthorized(format!("folder {folder_id}")));
        }
        Ok(folder)
    }

    /// Direct children of `parent_id` (the root when `None`).
    pub fn list(
        &self,
        owner: OwnerId,
        parent_id: Option<&str>,
    ) -> Result<Vec<FolderRecord>, ServiceError> {
        if let Some(id) = parent_id {
            validate_id("folder", id)?;
        }
        Ok(self.db.list_folders_by_parent(owner, parent_id)?)
    }

    /// Delete a folder with its whole subtree of records, then its directory.
    pub async fn delete(&self, folder_id: &str, owner: OwnerId) -> Result<(), ServiceError> {
        self.get(folder_id, owner)?;
        // The path has to be captured while the row still exists.
        let path = self.resolver.resolve(folder_id)?;

        let removed = self.db.delete_folder(folder_id, owner)?;
        if removed == 0 {
            return Err(ServiceError::NotFound(format!("folder {folder_id}")));
        }

        if let Err(source) = self.store.delete_dir(owner, &path).await {
            tracing::warn!(folder_id, path = %path, error = %source, "Orphaned storage directory");
            return Err(ServiceError::OrphanedStorageObject { path, source });
        }

        tracing::debug!(folder_id, owner, removed, "Deleted folder");
        Ok(())
    }

    pub async fn rename(
        &self,
        folder_id: &str,
        new_name: &str,
        owner: OwnerId,
    ) -> Result<FolderRecord, ServiceError> {
        validate_name("folder", new_name)?;
        let folder = self.get(folder_id, owner)?;
        if folder.name == new_name {
            return Ok(folder);
        }
        self.relocate(folder, Relocation::Rename(new_name), owner)
            .await
    }

    /// Re-parent a folder (`None` moves it to the root).
    pub async fn move_to(
        &self,
        folder_id: &str,
        new_parent: Option<&str>,
        owner: OwnerId,
    ) -> Result<FolderRecord, ServiceError> {
        let folder = self.get(folder_id, owner)?;
        self.check_destination(&folder, new_parent, owner)?;
        if folder.parent_id.as_deref() == new_parent {
            return Ok(folder);
        }
        self.relocate(folder, Relocation::Move(new_parent), owner)
            .await
    }

    /// Run the checks of [`FolderService::move_to`] without moving anything.
    pub fn check_move(
        &self,
        folder_id: &str,
        new_parent: Option<&str>,
        owner: OwnerId,
    ) -> Result<(), ServiceError> {
        let folder = self.get(folder_id, owner)?;
        self.check_destination(&folder, new_parent, owner)
    }

    /// Reject a destination that is missing, foreign, inside the folder, or
    /// that would push the deepest subfolder past [`MAX_FOLDER_DEPTH`].
    fn check_destination(
        &self,
        folder: &FolderRecord,
        new_parent: Option<&str>,
        owner: OwnerId,
    ) -> Result<(), ServiceError> {
        let Some(parent) = new_parent else {
            return Ok(());
        };
        self.get(parent, owner)?;
        if self.resolver.is_within(parent, &folder.id)? {
            return Err(ServiceError::InvalidInput(
                "cannot move a folder into itself or one of its descendants".to_string(),
            ));
        }
        if folder.parent_id.as_deref() == Some(parent) {
            return Ok(());
        }

        let depth = self.resolver.ancestry(parent)?.len()
            + 1
            + self.resolver.subtree_height(&folder.id, owner)?;
        if depth > MAX_FOLDER_DEPTH {
            return Err(ServiceError::InvalidInput(format!(
                "move would nest folders {depth} levels deep (limit {MAX_FOLDER_DEPTH})"
            )));
        }
        Ok(())
    }

    /// Record change, then the directory move (reverted on failure), then the
    /// stored paths of every file below the folder.
    async fn relocate(
        &self,
        folder: FolderRecord,
        change: Relocation<'_>,
        owner: OwnerId,
    ) -> Result<FolderRecord, ServiceError> {
        let id = folder.id.as_str();
        let old_path = self.resolver.resolve(id)?;

        let updated = match change {
            Relocation::Rename(name) => self.db.rename_folder(id, owner, name)?,
            Relocation::Move(parent) => self.db.set_folder_parent(id, owner, parent)?,
        };
        if updated == 0 {
            return Err(ServiceError::NotFound(format!("folder {id}")));
        }

        let revert = || -> Result<(), ServiceError> {
            match change {
                Relocation::Rename(_) => self.db.rename_folder(id, owner, &folder.name)?,
                Relocation::Move(_) => {
                    self.db
                        .set_folder_parent(id, owner, folder.parent_id.as_deref())?
                }
            };
            Ok(())
        };

        let new_path = match self.resolver.resolve(id) {
            Ok(path) => path,
            Err(e) => return Err(compensate(e, revert)),
        };
        if new_path != old_path {
            if let Err(e) = self.store.move_dir(owner, &old_path, &new_path).await {
                return Err(compensate(e.into(), revert));
            }
        }

        let rebased = self.files.rebase_paths(id, owner, &old_path, &new_path)?;
        tracing::debug!(
            folder_id = id,
            from = %old_path,
            to = %new_path,
            rebased,
            "Relocated folder"
        );
        self.get(id, owner)
    }

    /// Write a zip archive of the folder's contents to `out`.
    pub async fn export_zip(
        &self,
        folder_id: &str,
        owner: OwnerId,
        out: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<FolderRecord, ServiceError> {
        let folder = self.get(folder_id, owner)?;
        let path = self.resolver.resolve(folder_id)?;
        self.store.zip_dir(owner, &path, out).await?;
        Ok(folder)
    }
}
