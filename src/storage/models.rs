use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::OwnerId;

/// A file record stored in redb.
///
/// `path` is derived (`<folder path>/<name>`) and stored redundantly so reads
/// never have to walk the folder tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: String,
    pub owner_id: OwnerId,
    #[serde(default)]
    pub folder_id: Option<String>,
    pub name: String,
    pub path: String,
    pub byte_size: u64,
    #[serde(default)]
    pub mime_type: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A folder record stored in redb. Its path is never stored; it is resolved
/// from the parent chain on demand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FolderRecord {
    pub id: String,
    pub owner_id: OwnerId,
    #[serde(default)]
    pub parent_id: Option<String>,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
