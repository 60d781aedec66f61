use redb::{Database as RedbDatabase, ReadTransaction, ReadableTable, WriteTransaction};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use super::tables::*;
use crate::OwnerId;

#[derive(Debug, Error)]
pub enum DatabaseError {
    /// A `(owner, parent, name)` uniqueness violation.
    #[error("Name already in use: {0}")]
    Conflict(String),
    #[error("Corrupt record: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
    #[error("Record encoding failed: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Any failure raised by redb itself, kept boxed to keep the enum small.
    #[error("redb: {0}")]
    Redb(Box<redb::Error>),
}

macro_rules! redb_error {
    ($($source:ty),+ $(,)?) => {
        $(
            impl From<$source> for DatabaseError {
                fn from(e: $source) -> Self {
                    DatabaseError::Redb(Box::new(e.into()))
                }
            }
        )+
    };
}

redb_error!(
    redb::Error,
    redb::CommitError,
    redb::DatabaseError,
    redb::StorageError,
    redb::TableError,
    redb::TransactionError,
);

/// redb-backed metadata store for file and folder records.
#[derive(Clone)]
pub struct Database {
    db: Arc<RedbDatabase>,
}

impl Database {
    /// Opens (or creates) `folder-store.redb` under `data_dir` and makes sure
    /// every table exists.
    pub fn open<P: AsRef<Path>>(data_dir: P) -> Result<Self, DatabaseError> {
        std::fs::create_dir_all(data_dir.as_ref())?;
        let db_path = data_dir.as_ref().join("folder-store.redb");
        let db = Arc::new(RedbDatabase::create(db_path)?);

        let txn = db.begin_write()?;
        txn.open_table(FILES)?;
        txn.open_table(FOLDERS)?;
        txn.open_table(FILE_NAMES)?;
        txn.open_table(FOLDER_NAMES)?;
        txn.commit()?;

        Ok(Self { db })
    }

    pub fn begin_read(&self) -> Result<ReadTransaction, DatabaseError> {
        Ok(self.db.begin_read()?)
    }

    pub fn begin_write(&self) -> Result<WriteTransaction, DatabaseError> {
        Ok(self.db.begin_write()?)
    }
}

/// Whether a file or a folder already holds `key`. Both kinds share one
/// namespace per parent since they map onto the same storage path.
///
/// Opens both name indexes, so call it before holding either one.
pub(super) fn name_taken(txn: &WriteTransaction, key: &str) -> Result<bool, DatabaseError> {
    let files = txn.open_table(FILE_NAMES)?;
    if files.get(key)?.is_some() {
        return Ok(true);
    }
    let folders = txn.open_table(FOLDER_NAMES)?;
    let taken = folders.get(key)?.is_some();
    Ok(taken)
}

/// Collect the ids stored under every child key of `parent` in a name index.
pub(super) fn index_children<T>(
    index: &T,
    owner: OwnerId,
    parent: Option<&str>,
) -> Result<Vec<String>, DatabaseError>
where
    T: ReadableTable<&'static str, &'static str>,
{
    let (start, end) = children_range(owner, parent);
    let mut ids = Vec::new();
    for entry in index.range(start.as_str()..end.as_str())? {
        let (_, id) = entry?;
        ids.push(id.value().to_string());
    }
    Ok(ids)
}
