//! Shared fixtures for integration tests: services over a temp directory with
//! switchable failures in front of both stores.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncWrite;

use folder_store::config::{Config, ServerConfig, StorageConfig};
use folder_store::object_store::{LocalStore, ObjectStore, ObjectStoreError};
use folder_store::service::{FileService, FolderService, NewFile};
use folder_store::storage::models::{FileRecord, FolderRecord};
use folder_store::storage::{Database, DatabaseError, MetadataStore};
use folder_store::{AppState, OwnerId};

// ============================================================================
// Fault-injecting object store
// ============================================================================

#[derive(Default)]
pub struct Faults {
    pub save: AtomicBool,
    pub delete: AtomicBool,
    pub moves: AtomicBool,
}

impl Faults {
    fn check(flag: &AtomicBool, op: &str) -> Result<(), ObjectStoreError> {
        if flag.load(Ordering::SeqCst) {
            return Err(ObjectStoreError::Backend(format!("injected {op} failure")));
        }
        Ok(())
    }
}

pub struct FlakyStore {
    inner: LocalStore,
    pub faults: Faults,
}

#[async_trait]
impl ObjectStore for FlakyStore {
    async fn save(&self, owner: OwnerId, path: &str, data: Bytes) -> Result<(), ObjectStoreError> {
        Faults::check(&self.faults.save, "save")?;
        self.inner.save(owner, path, data).await
    }

    async fn read(&self, owner: OwnerId, path: &str) -> Result<Bytes, ObjectStoreError> {
        self.inner.read(owner, path).await
    }

    async fn delete(&self, owner: OwnerId, path: &str) -> Result<(), ObjectStoreError> {
        Faults::check(&self.faults.delete, "delete")?;
        self.inner.delete(owner, path).await
    }

    async fn exists(&self, owner: OwnerId, path: &str) -> Result<bool, ObjectStoreError> {
        self.inner.exists(owner, path).await
    }

    async fn create_dir(&self, owner: OwnerId, path: &str) -> Result<(), ObjectStoreError> {
        Faults::check(&self.faults.save, "create_dir")?;
        self.inner.create_dir(owner, path).await
    }

    async fn delete_dir(&self, owner: OwnerId, path: &str) -> Result<(), ObjectStoreError> {
        Faults::check(&self.faults.delete, "delete_dir")?;
        self.inner.delete_dir(owner, path).await
    }

    async fn move_file(
        &self,
        owner: OwnerId,
        from: &str,
        to: &str,
    ) -> Result<(), ObjectStoreError> {
        Faults::check(&self.faults.moves, "move_file")?;
        self.inner.move_file(owner, from, to).await
    }

    async fn move_dir(&self, owner: OwnerId, from: &str, to: &str) -> Result<(), ObjectStoreError> {
        Faults::check(&self.faults.moves, "move_dir")?;
        self.inner.move_dir(owner, from, to).await
    }

    async fn zip_dir(
        &self,
        owner: OwnerId,
        path: &str,
        out: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<(), ObjectStoreError> {
        self.inner.zip_dir(owner, path, out).await
    }
}

// ============================================================================
// Fault-injecting metadata store
// ============================================================================

/// Wraps the redb store; when `fail_writes` is set every update and delete
/// fails, which makes compensating writes fail too.
pub struct FlakyMetadata {
    inner: Database,
    pub fail_writes: AtomicBool,
}

impl FlakyMetadata {
    fn check(&self) -> Result<(), DatabaseError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(DatabaseError::Io(std::io::Error::other(
                "injected metadata failure",
            )));
        }
        Ok(())
    }
}

impl MetadataStore for FlakyMetadata {
    fn insert_file(&self, file: &FileRecord) -> Result<(), DatabaseError> {
        self.inner.insert_file(file)
    }

    fn get_file(&self, id: &str) -> Result<Option<FileRecord>, DatabaseError> {
        self.inner.get_file(id)
    }

    fn get_file_by_name(
        &self,
        owner: OwnerId,
        folder_id: Option<&str>,
        name: &str,
    ) -> Result<Option<FileRecord>, DatabaseError> {
        self.inner.get_file_by_name(owner, folder_id, name)
    }

    fn list_files_in_folder(
        &self,
        owner: OwnerId,
        folder_id: Option<&str>,
    ) -> Result<Vec<FileRecord>, DatabaseError> {
        self.inner.list_files_in_folder(owner, folder_id)
    }

    fn list_files_recursive(
        &self,
        owner: OwnerId,
        folder_id: &str,
    ) -> Result<Vec<FileRecord>, DatabaseError> {
        self.inner.list_files_recursive(owner, folder_id)
    }

    fn update_file_location(
        &self,
        id: &str,
        owner: OwnerId,
        folder_id: Option<&str>,
        name: &str,
        path: &str,
    ) -> Result<u64, DatabaseError> {
        self.check()?;
        self.inner
            .update_file_location(id, owner, folder_id, name, path)
    }

    fn update_file_path(&self, id: &str, owner: OwnerId, path: &str) -> Result<u64, DatabaseError> {
        self.check()?;
        self.inner.update_file_path(id, owner, path)
    }

    fn delete_file(&self, id: &str, owner: OwnerId) -> Result<u64, DatabaseError> {
        self.check()?;
        self.inner.delete_file(id, owner)
    }

    fn insert_folder(&self, folder: &FolderRecord) -> Result<(), DatabaseError> {
        self.inner.insert_folder(folder)
    }

    fn get_folder(&self, id: &str) -> Result<Option<FolderRecord>, DatabaseError> {
        self.inner.get_folder(id)
    }

    fn list_folders_by_parent(
        &self,
        owner: OwnerId,
        parent_id: Option<&str>,
    ) -> Result<Vec<FolderRecord>, DatabaseError> {
        self.inner.list_folders_by_parent(owner, parent_id)
    }

    fn rename_folder(&self, id: &str, owner: OwnerId, name: &str) -> Result<u64, DatabaseError> {
        self.check()?;
        self.inner.rename_folder(id, owner, name)
    }

    fn set_folder_parent(
        &self,
        id: &str,
        owner: OwnerId,
        parent_id: Option<&str>,
    ) -> Result<u64, DatabaseError> {
        self.check()?;
        self.inner.set_folder_parent(id, owner, parent_id)
    }

    fn delete_folder(&self, id: &str, owner: OwnerId) -> Result<u64, DatabaseError> {
        self.check()?;
        self.inner.delete_folder(id, owner)
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub dir: tempfile::TempDir,
    pub db: Database,
    pub store: Arc<FlakyStore>,
    pub metadata: Arc<FlakyMetadata>,
    pub files: FileService,
    pub folders: FolderService,
}

pub fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(dir.path().join("data")).unwrap();
    let store = Arc::new(FlakyStore {
        inner: LocalStore::new(dir.path().join("files")).unwrap(),
        faults: Faults::default(),
    });
    let metadata = Arc::new(FlakyMetadata {
        inner: db.clone(),
        fail_writes: AtomicBool::new(false),
    });

    let files = FileService::new(metadata.clone(), store.clone());
    let folders = FolderService::new(metadata.clone(), store.clone(), files.clone());

    Harness {
        dir,
        db,
        store,
        metadata,
        files,
        folders,
    }
}

impl Harness {
    pub fn app_state(&self) -> Arc<AppState> {
        let config = Config {
            server: ServerConfig {
                bind_address: "127.0.0.1:0".to_string(),
                data_dir: self.dir.path().join("data").to_string_lossy().to_string(),
            },
            storage: StorageConfig {
                local_storage_path: self.dir.path().join("files").to_string_lossy().to_string(),
                ..StorageConfig::default()
            },
            max_upload_size: 1024 * 1024,
        };

        Arc::new(AppState {
            config,
            db: self.db.clone(),
            files: self.files.clone(),
            folders: self.folders.clone(),
        })
    }

    pub async fn upload(
        &self,
        owner: OwnerId,
        folder: Option<&FolderRecord>,
        name: &str,
        content: &str,
    ) -> FileRecord {
        self.files
            .upload(NewFile {
                folder_id: folder.map(|f| f.id.clone()),
                owner,
                name: name.to_string(),
                mime_type: None,
                content: Bytes::from(content.to_string()),
            })
            .await
            .unwrap()
    }

    /// Bytes on disk for `owner` at `path`, if any.
    pub fn on_disk(&self, owner: OwnerId, path: &str) -> Option<String> {
        let full = self.dir.path().join("files").join(owner.to_string()).join(path);
        std::fs::read_to_string(full).ok()
    }

    pub fn fail_saves(&self, on: bool) {
        self.store.faults.save.store(on, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, on: bool) {
        self.store.faults.delete.store(on, Ordering::SeqCst);
    }

    pub fn fail_moves(&self, on: bool) {
        self.store.faults.moves.store(on, Ordering::SeqCst);
    }

    pub fn fail_metadata_writes(&self, on: bool) {
        self.metadata.fail_writes.store(on, Ordering::SeqCst);
    }
}
