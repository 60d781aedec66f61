use std::collections::VecDeque;

use redb::ReadableTable;

use super::db::{index_children, name_taken, Database, DatabaseError};
use super::models::{FileRecord, FolderRecord};
use super::tables::*;
use crate::OwnerId;

impl Database {
    // ========================================================================
    // Folder operations
    // ========================================================================

    /// Insert a new folder record, rejecting a name already taken under its parent.
    ///
    /// The parent is not checked for existence here; callers attach new folders
    /// only under parents they have already loaded.
    pub fn insert_folder(&self, folder: &FolderRecord) -> Result<(), DatabaseError> {
        debug_assert!(!folder.id.is_empty(), "folder id must not be empty");

        let key = name_key(folder.owner_id, folder.parent_id.as_deref(), &folder.name);
        let write_txn = self.begin_write()?;
        {
            if name_taken(&write_txn, &key)? {
                return Err(DatabaseError::Conflict(folder.name.clone()));
            }
            let mut names = write_txn.open_table(FOLDER_NAMES)?;
            names.insert(key.as_str(), folder.id.as_str())?;

            let mut table = write_txn.open_table(FOLDERS)?;
            let data = rmp_serde::to_vec_named(folder)?;
            table.insert(folder.id.as_str(), data.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Get a folder by its UUID
    pub fn get_folder(&self, id: &str) -> Result<Option<FolderRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(FOLDERS)?;

        match table.get(id)? {
            Some(data) => Ok(Some(rmp_serde::from_slice(data.value())?)),
            None => Ok(None),
        }
    }

    /// List the owner's folders directly under `parent_id`, in name order
    pub fn list_folders_by_parent(
        &self,
        owner: OwnerId,
        parent_id: Option<&str>,
    ) -> Result<Vec<FolderRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let names = read_txn.open_table(FOLDER_NAMES)?;
        let table = read_txn.open_table(FOLDERS)?;

        let mut folders = Vec::new();
        for id in index_children(&names, owner, parent_id)? {
            if let Some(data) = table.get(id.as_str())? {
                folders.push(rmp_serde::from_slice(data.value())?);
            }
        }
        Ok(folders)
    }

    /// Rename a folder. Returns the number of rows updated.
    pub fn rename_folder(
        &self,
        id: &str,
        owner: OwnerId,
        name: &str,
    ) -> Result<u64, DatabaseError> {
        self.relink_folder(id, owner, |folder| folder.name = name.to_string())
    }

    /// Re-parent a folder (`None` moves it to the root). Returns the number of rows updated.
    pub fn set_folder_parent(
        &self,
        id: &str,
        owner: OwnerId,
        parent_id: Option<&str>,
    ) -> Result<u64, DatabaseError> {
        self.relink_folder(id, owner, |folder| {
            folder.parent_id = parent_id.map(|s| s.to_string())
        })
    }

    /// Apply a name/parent change while keeping the name index unique.
    fn relink_folder<F>(&self, id: &str, owner: OwnerId, change: F) -> Result<u64, DatabaseError>
    where
        F: FnOnce(&mut FolderRecord),
    {
        let write_txn = self.begin_write()?;
        {
            let mut table = write_txn.open_table(FOLDERS)?;
            let existing: Option<FolderRecord> = table
                .get(id)?
                .map(|data| rmp_serde::from_slice(data.value()))
                .transpose()?;

            let mut folder = match existing {
                Some(folder) if folder.owner_id == owner => folder,
                _ => return Ok(0),
            };

            let old_key = name_key(owner, folder.parent_id.as_deref(), &folder.name);
            change(&mut folder);
            let new_key = name_key(owner, folder.parent_id.as_deref(), &folder.name);

            if old_key != new_key {
                if name_taken(&write_txn, &new_key)? {
                    return Err(DatabaseError::Conflict(folder.name.clone()));
                }
                let mut names = write_txn.open_table(FOLDER_NAMES)?;
                names.remove(old_key.as_str())?;
                names.insert(new_key.as_str(), id)?;
            }

            folder.updated_at = chrono::Utc::now();
            let data = rmp_serde::to_vec_named(&folder)?;
            table.insert(id, data.as_slice())?;
        }
        write_txn.commit()?;
        Ok(1)
    }

    /// Delete a folder together with every descendant folder and file row.
    /// Returns the total number of rows removed (0 when missing or not owned).
    pub fn delete_folder(&self, id: &str, owner: OwnerId) -> Result<u64, DatabaseError> {
        let write_txn = self.begin_write()?;
        let mut removed = 0;
        {
            let mut folders = write_txn.open_table(FOLDERS)?;
            let mut folder_names = write_txn.open_table(FOLDER_NAMES)?;
            let mut files = write_txn.open_table(FILES)?;
            let mut file_names = write_txn.open_table(FILE_NAMES)?;

            let root: Option<FolderRecord> = folders
                .get(id)?
                .map(|data| rmp_serde::from_slice(data.value()))
                .transpose()?;
            match root {
                Some(ref folder) if folder.owner_id == owner => {}
                _ => return Ok(0),
            }

            // Collect the whole subtree before mutating any index.
            let mut subtree = Vec::new();
            let mut file_ids = Vec::new();
            let mut pending = VecDeque::from([id.to_string()]);
            while let Some(current) = pending.pop_front() {
                file_ids.extend(index_children(&file_names, owner, Some(current.as_str()))?);
                pending.extend(index_children(&folder_names, owner, Some(current.as_str()))?);
                subtree.push(current);
            }

            for file_id in &file_ids {
                let file: Option<FileRecord> = files
                    .get(file_id.as_str())?
                    .map(|data| rmp_serde::from_slice(data.value()))
                    .transpose()?;
                if let Some(file) = file {
                    file_names
                        .remove(name_key(owner, file.folder_id.as_deref(), &file.name).as_str())?;
                    files.remove(file_id.as_str())?;
                    removed += 1;
                }
            }

            for folder_id in &subtree {
                let folder: Option<FolderRecord> = folders
                    .get(folder_id.as_str())?
                    .map(|data| rmp_serde::from_slice(data.value()))
                    .transpose()?;
                if let Some(folder) = folder {
                    folder_names.remove(
                        name_key(owner, folder.parent_id.as_deref(), &folder.name).as_str(),
                    )?;
                    folders.remove(folder_id.as_str())?;
                    removed += 1;
                }
            }
        }
        write_txn.commit()?;
        Ok(removed)
    }
}
