//! Shared helpers for in-crate tests.

use std::sync::Arc;

use chrono::Utc;

use crate::config::{Config, ServerConfig, StorageConfig};
use crate::object_store::{LocalStore, ObjectStore};
use crate::service::{FileService, FolderService};
use crate::storage::models::FolderRecord;
use crate::storage::{Database, MetadataStore};
use crate::{AppState, OwnerId};

/// Create a test AppState with a temporary database and local object store.
pub fn test_state(temp_dir: &tempfile::TempDir) -> Arc<AppState> {
    let data_dir = temp_dir.path().join("data");
    let files_dir = temp_dir.path().join("files");

    let config = Config {
        server: ServerConfig {
            bind_address: "127.0.0.1:0".to_string(),
            data_dir: data_dir.to_string_lossy().to_string(),
        },
        storage: StorageConfig {
            local_storage_path: files_dir.to_string_lossy().to_string(),
            ..StorageConfig::default()
        },
        max_upload_size: 10 * 1024 * 1024, // 10MB for tests
    };

    let db = Database::open(&data_dir).expect("Failed to open test database");
    let store: Arc<dyn ObjectStore> =
        Arc::new(LocalStore::new(&files_dir).expect("Failed to create test object store"));
    let metadata: Arc<dyn MetadataStore> = Arc::new(db.clone());

    let files = FileService::new(Arc::clone(&metadata), Arc::clone(&store));
    let folders = FolderService::new(metadata, store, files.clone());

    Arc::new(AppState {
        config,
        db,
        files,
        folders,
    })
}

/// A folder record with a fresh id, ready to insert.
pub fn folder(owner: OwnerId, parent: Option<&str>, name: &str) -> FolderRecord {
    let now = Utc::now();
    FolderRecord {
        id: uuid::Uuid::new_v4().to_string(),
        owner_id: owner,
        parent_id: parent.map(str::to_string),
        name: name.to_string(),
        created_at: now,
        updated_at: now,
    }
}
