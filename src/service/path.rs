use std::sync::Arc;

use super::ServiceError;
use crate::storage::models::FolderRecord;
use crate::storage::MetadataStore;
use crate::OwnerId;

/// Deepest folder chain the resolver will walk before declaring the tree corrupt.
pub const MAX_FOLDER_DEPTH: usize = 64;

/// Derives logical folder paths from the parent chain in the metadata store.
///
/// Nothing is cached: every call re-reads the ancestors, so a concurrent
/// rename higher up the tree is always observed.
#[derive(Clone)]
pub struct FolderPathResolver {
    db: Arc<dyn MetadataStore>,
}

impl FolderPathResolver {
    pub fn new(db: Arc<dyn MetadataStore>) -> Self {
        Self { db }
    }

    /// Slash-joined ancestor names from the root down to `folder_id`.
    pub fn resolve(&self, folder_id: &str) -> Result<String, ServiceError> {
        let chain = self.ancestry(folder_id)?;
        let names: Vec<&str> = chain.iter().rev().map(|f| f.name.as_str()).collect();
        Ok(names.join("/"))
    }

    /// Path of an optional folder; the root resolves to the empty string.
    pub fn resolve_opt(&self, folder_id: Option<&str>) -> Result<String, ServiceError> {
        match folder_id {
            Some(id) => self.resolve(id),
            None => Ok(String::new()),
        }
    }

    /// The folder followed by each of its ancestors, root last.
    pub fn ancestry(&self, folder_id: &str) -> Result<Vec<FolderRecord>, ServiceError> {
        let mut chain: Vec<FolderRecord> = Vec::new();
        let mut next = Some(folder_id.to_string());

        while let Some(id) = next {
            if chain.len() >= MAX_FOLDER_DEPTH {
                return Err(ServiceError::CorruptTree(format!(
                    "folder {folder_id} is nested deeper than {MAX_FOLDER_DEPTH} levels"
                )));
            }
            if chain.iter().any(|f| f.id == id) {
                return Err(ServiceError::CorruptTree(format!(
                    "folder {id} is its own ancestor"
                )));
            }

            let folder = self
                .db
                .get_folder(&id)?
                .ok_or_else(|| ServiceError::NotFound(format!("folder {id}")))?;
            next = folder.parent_id.clone();
            chain.push(folder);
        }

        Ok(chain)
    }

    /// Number of folder levels below `folder_id` (0 for a folder with no
    /// subfolders).
    pub fn subtree_height(&self, folder_id: &str, owner: OwnerId) -> Result<usize, ServiceError> {
        let mut level = vec![folder_id.to_string()];
        let mut height = 0;
        loop {
            let mut below = Vec::new();
            for id in &level {
                let children = self.db.list_folders_by_parent(owner, Some(id))?;
                below.extend(children.into_iter().map(|f| f.id));
            }
            if below.is_empty() {
                return Ok(height);
            }
            height += 1;
            if height >= MAX_FOLDER_DEPTH {
                return Err(ServiceError::CorruptTree(format!(
                    "folder {folder_id} has subfolders deeper than {MAX_FOLDER_DEPTH} levels"
                )));
            }
            level = below;
        }
    }

    /// Whether `candidate` is `folder_id` itself or lies somewhere below it.
    pub fn is_within(&self, candidate: &str, folder_id: &str) -> Result<bool, ServiceError> {
        Ok(self.ancestry(candidate)?.iter().any(|f| f.id == folder_id))
    }
}
