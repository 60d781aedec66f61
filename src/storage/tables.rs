use redb::TableDefinition;

use crate::OwnerId;

/// File records: uuid -> FileRecord (msgpack)
pub const FILES: TableDefinition<&str, &[u8]> = TableDefinition::new("files");

/// Folder records: uuid -> FolderRecord (msgpack)
pub const FOLDERS: TableDefinition<&str, &[u8]> = TableDefinition::new("folders");

/// File name index: "owner:parent:name" -> file uuid (root parent is the empty string)
pub const FILE_NAMES: TableDefinition<&str, &str> = TableDefinition::new("file_names");

/// Folder name index: "owner:parent:name" -> folder uuid
pub const FOLDER_NAMES: TableDefinition<&str, &str> = TableDefinition::new("folder_names");

/// Key in a name index. Owner and parent never contain ':', so the name is
/// always the unambiguous tail.
pub fn name_key(owner: OwnerId, parent: Option<&str>, name: &str) -> String {
    format!("{owner}:{}:{name}", parent.unwrap_or(""))
}

/// Half-open key range covering every child of `parent` in a name index.
pub fn children_range(owner: OwnerId, parent: Option<&str>) -> (String, String) {
    let parent = parent.unwrap_or("");
    (format!("{owner}:{parent}:"), format!("{owner}:{parent};"))
}
