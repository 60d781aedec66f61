pub mod db;
mod files;
mod folders;
pub mod models;
mod tables;

pub use db::{Database, DatabaseError};
pub use tables::*;

use models::{FileRecord, FolderRecord};

use crate::OwnerId;

/// Record CRUD the services depend on.
///
/// Updates and deletes report the number of affected rows so callers can tell
/// "no such row" apart from a successful write. Deleting a folder removes its
/// whole subtree of folder and file rows.
pub trait MetadataStore: Send + Sync {
    fn insert_file(&self, file: &FileRecord) -> Result<(), DatabaseError>;
    fn get_file(&self, id: &str) -> Result<Option<FileRecord>, DatabaseError>;
    fn get_file_by_name(
        &self,
        owner: OwnerId,
        folder_id: Option<&str>,
        name: &str,
    ) -> Result<Option<FileRecord>, DatabaseError>;
    fn list_files_in_folder(
        &self,
        owner: OwnerId,
        folder_id: Option<&str>,
    ) -> Result<Vec<FileRecord>, DatabaseError>;
    fn list_files_recursive(
        &self,
        owner: OwnerId,
        folder_id: &str,
    ) -> Result<Vec<FileRecord>, DatabaseError>;
    fn update_file_location(
        &self,
        id: &str,
        owner: OwnerId,
        folder_id: Option<&str>,
        name: &str,
        path: &str,
    ) -> Result<u64, DatabaseError>;
    fn update_file_path(&self, id: &str, owner: OwnerId, path: &str) -> Result<u64, DatabaseError>;
    fn delete_file(&self, id: &str, owner: OwnerId) -> Result<u64, DatabaseError>;

    fn insert_folder(&self, folder: &FolderRecord) -> Result<(), DatabaseError>;
    fn get_folder(&self, id: &str) -> Result<Option<FolderRecord>, DatabaseError>;
    fn list_folders_by_parent(
        &self,
        owner: OwnerId,
        parent_id: Option<&str>,
    ) -> Result<Vec<FolderRecord>, DatabaseError>;
    fn rename_folder(&self, id: &str, owner: OwnerId, name: &str) -> Result<u64, DatabaseError>;
    fn set_folder_parent(
        &self,
        id: &str,
        owner: OwnerId,
        parent_id: Option<&str>,
    ) -> Result<u64, DatabaseError>;
    fn delete_folder(&self, id: &str, owner: OwnerId) -> Result<u64, DatabaseError>;
}

impl MetadataStore for Database {
    fn insert_file(&self, file: &FileRecord) -> Result<(), DatabaseError> {
        Database::insert_file(self, file)
    }

    fn get_file(&self, id: &str) -> Result<Option<FileRecord>, DatabaseError> {
        Database::get_file(self, id)
    }

    fn get_file_by_name(
        &self,
        owner: OwnerId,
        folder_id: Option<&str>,
        name: &str,
    ) -> Result<Option<FileRecord>, DatabaseError> {
        Database::get_file_by_name(self, owner, folder_id, name)
    }

    fn list_files_in_folder(
        &self,
        owner: OwnerId,
        folder_id: Option<&str>,
    ) -> Result<Vec<FileRecord>, DatabaseError> {
        Database::list_files_in_folder(self, owner, folder_id)
    }

    fn list_files_recursive(
        &self,
        owner: OwnerId,
        folder_id: &str,
    ) -> Result<Vec<FileRecord>, DatabaseError> {
        Database::list_files_recursive(self, owner, folder_id)
    }

    fn update_file_location(
        &self,
        id: &str,
        owner: OwnerId,
        folder_id: Option<&str>,
        name: &str,
        path: &str,
    ) -> Result<u64, DatabaseError> {
        Database::update_file_location(self, id, owner, folder_id, name, path)
    }

    fn update_file_path(&self, id: &str, owner: OwnerId, path: &str) -> Result<u64, DatabaseError> {
        Database::update_file_path(self, id, owner, path)
    }

    fn delete_file(&self, id: &str, owner: OwnerId) -> Result<u64, DatabaseError> {
        Database::delete_file(self, id, owner)
    }

    fn insert_folder(&self, folder: &FolderRecord) -> Result<(), DatabaseError> {
        Database::insert_folder(self, folder)
    }

    fn get_folder(&self, id: &str) -> Result<Option<FolderRecord>, DatabaseError> {
        Database::get_folder(self, id)
    }

    fn list_folders_by_parent(
        &self,
        owner: OwnerId,
        parent_id: Option<&str>,
    ) -> Result<Vec<FolderRecord>, DatabaseError> {
        Database::list_folders_by_parent(self, owner, parent_id)
    }

    fn rename_folder(&self, id: &str, owner: OwnerId, name: &str) -> Result<u64, DatabaseError> {
        Database::rename_folder(self, id, owner, name)
    }

    fn set_folder_parent(
        &self,
        id: &str,
        owner: OwnerId,
        parent_id: Option<&str>,
    ) -> Result<u64, DatabaseError> {
        Database::set_folder_parent(self, id, owner, parent_id)
    }

    fn delete_folder(&self, id: &str, owner: OwnerId) -> Result<u64, DatabaseError> {
        Database::delete_folder(self, id, owner)
    }
}
