use std::collections::VecDeque;

use redb::ReadableTable;

use super::db::{index_children, name_taken, Database, DatabaseError};
use super::models::FileRecord;
use super::tables::*;
use crate::OwnerId;

impl Database {
    // ========================================================================
    // File operations
    // ========================================================================

    /// Insert a new file record, rejecting a name already taken in its folder.
    pub fn insert_file(&self, file: &FileRecord) -> Result<(), DatabaseError> {
        debug_assert!(!file.id.is_empty(), "file id must not be empty");

        let key = name_key(file.owner_id, file.folder_id.as_deref(), &file.name);
        let write_txn = self.begin_write()?;
        {
            if name_taken(&write_txn, &key)? {
                return Err(DatabaseError::Conflict(file.path.clone()));
            }
            let mut names = write_txn.open_table(FILE_NAMES)?;
            names.insert(key.as_str(), file.id.as_str())?;

            let mut table = write_txn.open_table(FILES)?;
            let data = rmp_serde::to_vec_named(file)?;
            table.insert(file.id.as_str(), data.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Get a file by its UUID
    pub fn get_file(&self, id: &str) -> Result<Option<FileRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(FILES)?;

        match table.get(id)? {
            Some(data) => {
                let file: FileRecord = rmp_serde::from_slice(data.value())?;
                Ok(Some(file))
            }
            None => Ok(None),
        }
    }

    /// Get the owner's file named `name` directly inside `folder_id` (root when `None`)
    pub fn get_file_by_name(
        &self,
        owner: OwnerId,
        folder_id: Option<&str>,
        name: &str,
    ) -> Result<Option<FileRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let names = read_txn.open_table(FILE_NAMES)?;

        let id = match names.get(name_key(owner, folder_id, name).as_str())? {
            Some(data) => data.value().to_string(),
            None => return Ok(None),
        };

        let table = read_txn.open_table(FILES)?;
        match table.get(id.as_str())? {
            Some(data) => Ok(Some(rmp_serde::from_slice(data.value())?)),
            None => Ok(None),
        }
    }

    /// List the owner's files directly inside `folder_id`, in name order
    pub fn list_files_in_folder(
        &self,
        owner: OwnerId,
        folder_id: Option<&str>,
    ) -> Result<Vec<FileRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let names = read_txn.open_table(FILE_NAMES)?;
        let table = read_txn.open_table(FILES)?;

        let mut files = Vec::new();
        for id in index_children(&names, owner, folder_id)? {
            if let Some(data) = table.get(id.as_str())? {
                files.push(rmp_serde::from_slice(data.value())?);
            }
        }
        Ok(files)
    }

    /// List every file in the subtree rooted at `folder_id`
    pub fn list_files_recursive(
        &self,
        owner: OwnerId,
        folder_id: &str,
    ) -> Result<Vec<FileRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let folder_names = read_txn.open_table(FOLDER_NAMES)?;
        let file_names = read_txn.open_table(FILE_NAMES)?;
        let table = read_txn.open_table(FILES)?;

        let mut files = Vec::new();
        let mut pending = VecDeque::from([folder_id.to_string()]);
        while let Some(current) = pending.pop_front() {
            for id in index_children(&file_names, owner, Some(current.as_str()))? {
                if let Some(data) = table.get(id.as_str())? {
                    files.push(rmp_serde::from_slice(data.value())?);
                }
            }
            pending.extend(index_children(&folder_names, owner, Some(current.as_str()))?);
        }
        Ok(files)
    }

    /// Set a file's folder, name and stored path in one transaction.
    /// Returns the number of rows updated (0 when missing or owned by someone else).
    pub fn update_file_location(
        &self,
        id: &str,
        owner: OwnerId,
        folder_id: Option<&str>,
        name: &str,
        path: &str,
    ) -> Result<u64, DatabaseError> {
        let write_txn = self.begin_write()?;
        {
            let mut table = write_txn.open_table(FILES)?;
            let existing: Option<FileRecord> = table
                .get(id)?
                .map(|data| rmp_serde::from_slice(data.value()))
                .transpose()?;

            let mut file = match existing {
                Some(file) if file.owner_id == owner => file,
                _ => return Ok(0),
            };

            let old_key = name_key(owner, file.folder_id.as_deref(), &file.name);
            let new_key = name_key(owner, folder_id, name);
            if old_key != new_key {
                if name_taken(&write_txn, &new_key)? {
                    return Err(DatabaseError::Conflict(path.to_string()));
                }
                let mut names = write_txn.open_table(FILE_NAMES)?;
                names.remove(old_key.as_str())?;
                names.insert(new_key.as_str(), id)?;
            }

            file.folder_id = folder_id.map(|s| s.to_string());
            file.name = name.to_string();
            file.path = path.to_string();
            file.updated_at = chrono::Utc::now();

            let data = rmp_serde::to_vec_named(&file)?;
            table.insert(id, data.as_slice())?;
        }
        write_txn.commit()?;
        Ok(1)
    }

    /// Rewrite only the stored path of a file
    pub fn update_file_path(
        &self,
        id: &str,
        owner: OwnerId,
        path: &str,
    ) -> Result<u64, DatabaseError> {
        let write_txn = self.begin_write()?;
        {
            let mut table = write_txn.open_table(FILES)?;
            let existing: Option<FileRecord> = table
                .get(id)?
                .map(|data| rmp_serde::from_slice(data.value()))
                .transpose()?;

            let mut file = match existing {
                Some(file) if file.owner_id == owner => file,
                _ => return Ok(0),
            };
            file.path = path.to_string();
            file.updated_at = chrono::Utc::now();

            let data = rmp_serde::to_vec_named(&file)?;
            table.insert(id, data.as_slice())?;
        }
        write_txn.commit()?;
        Ok(1)
    }

    /// Delete a file owned by `owner` and its name index entry
    pub fn delete_file(&self, id: &str, owner: OwnerId) -> Result<u64, DatabaseError> {
        let write_txn = self.begin_write()?;
        {
            let mut table = write_txn.open_table(FILES)?;
            let existing: Option<FileRecord> = table
                .get(id)?
                .map(|data| rmp_serde::from_slice(data.value()))
                .transpose()?;

            let file = match existing {
                Some(file) if file.owner_id == owner => file,
                _ => return Ok(0),
            };
            table.remove(id)?;

            let mut names = write_txn.open_table(FILE_NAMES)?;
            names.remove(name_key(owner, file.folder_id.as_deref(), &file.name).as_str())?;
        }
        write_txn.commit()?;
        Ok(1)
    }
}
