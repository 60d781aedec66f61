//! folder-store - multi-tenant file hosting with folder trees
//!
//! This crate keeps two independent halves of every file and folder in step:
//! - Metadata records (name, parent, derived path) in an embedded redb database
//! - Bytes in a swappable object storage backend (local filesystem, GCS)
//!
//! There is no shared transaction between the two. Every mutation writes
//! metadata first, touches storage second, and performs at most one
//! compensating step when the second half fails.

pub mod api;
pub mod config;
pub mod object_store;
pub mod service;
pub mod storage;
#[cfg(test)]
pub mod testutil;

use config::Config;
use service::{FileService, FolderService};
use storage::Database;

/// Opaque owner identity supplied by the authentication layer.
pub type OwnerId = i32;

/// Shared application state
pub struct AppState {
    pub config: Config,
    pub db: Database,
    pub files: FileService,
    pub folders: FolderService,
}
