//! Orchestration of the metadata store and the storage backend.

mod files;
mod folders;
mod path;

pub use files::{FileService, NewFile};
pub use folders::FolderService;
pub use path::{FolderPathResolver, MAX_FOLDER_DEPTH};

use thiserror::Error;

use crate::object_store::ObjectStoreError;
use crate::storage::DatabaseError;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("Unauthorized access to {0}")]
    Unauthorized(String),
    #[error("Name already in use: {0}")]
    Conflict(String),
    #[error("Folder tree is corrupt: {0}")]
    CorruptTree(String),
    #[error("Metadata error: {0}")]
    Metadata(DatabaseError),
    #[error("Storage failure: {0}")]
    Storage(#[from] ObjectStoreError),
    /// The record is gone but its bytes could not be removed.
    #[error("metadata removed but storage object '{path}' could not be deleted: {source}")]
    OrphanedStorageObject {
        path: String,
        #[source]
        source: ObjectStoreError,
    },
    /// A compensating metadata write failed after the original operation failed.
    #[error("{original}; metadata rollback also failed: {rollback}")]
    MetadataRollbackFailure {
        original: Box<ServiceError>,
        rollback: Box<ServiceError>,
    },
}

impl From<DatabaseError> for ServiceError {
    fn from(e: DatabaseError) -> Self {
        match e {
            DatabaseError::Conflict(name) => ServiceError::Conflict(name),
            e => ServiceError::Metadata(e),
        }
    }
}

/// Run the single compensating step for a failed operation. A failing
/// compensation is reported together with the original error.
pub(crate) fn compensate<F>(original: ServiceError, rollback: F) -> ServiceError
where
    F: FnOnce() -> Result<(), ServiceError>,
{
    match rollback() {
        Ok(()) => original,
        Err(rollback) => {
            tracing::error!(error = %original, rollback_error = %rollback, "Metadata rollback failed");
            ServiceError::MetadataRollbackFailure {
                original: Box::new(original),
                rollback: Box::new(rollback),
            }
        }
    }
}

/// Reject names that are blank or would break out of their parent directory.
pub(crate) fn validate_name(kind: &str, name: &str) -> Result<(), ServiceError> {
    if name.trim().is_empty() {
        return Err(ServiceError::InvalidInput(format!("{kind} name is required")));
    }
    if name == "." || name == ".." || name.contains(['/', '\\', '\0']) {
        return Err(ServiceError::InvalidInput(format!(
            "{kind} name '{name}' is not allowed"
        )));
    }
    Ok(())
}

/// Reject identifiers that are not UUIDs.
pub(crate) fn validate_id(kind: &str, id: &str) -> Result<(), ServiceError> {
    uuid::Uuid::parse_str(id)
        .map(|_| ())
        .map_err(|_| ServiceError::InvalidInput(format!("malformed {kind} id '{id}'")))
}

pub(crate) fn join_path(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{dir}/{name}")
    }
}

pub(crate) fn parent_dir(path: &str) -> &str {
    path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}
