//! Read-write database connection for chain data

use std::path::{Path, PathBuf};

use rusqlite::{Connection, OpenFlags};
use thiserror::Error;

use crate::schema;

/// Store errors. Only store-level unavailability is a hard failure for
/// callers; everything scan-related is handled per session upstream.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Schema migration failed: {0}")]
    Migration(String),
}

/// Default database path
pub fn default_db_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
    PathBuf::from(home).join(".chainview").join("chains.db")
}

/// Connection wrapper owning the session index and edge tables
pub struct ChainStore {
    pub(crate) conn: Connection,
    path: PathBuf,
}

impl ChainStore {
    /// Open or create the database at the default path
    pub fn open_or_create_default() -> Result<Self, StoreError> {
        Self::open_or_create(&default_db_path())
    }

    /// Open or create the database at a specific path
    pub fn open_or_create(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = OFF;",
        )?;

        let mut store = Self {
            conn,
            path: path.to_path_buf(),
        };

        schema::init_schema(&mut store.conn)?;

        Ok(store)
    }

    /// Open an in-memory store, schema initialized. Used by tests and the
    /// CLI's throwaway mode.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let mut conn = Connection::open_in_memory()?;
        schema::init_schema(&mut conn)?;
        Ok(Self {
            conn,
            path: PathBuf::from(":memory:"),
        })
    }

    /// Get the database path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get a reference to the underlying connection
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Execute a closure within a transaction
    pub fn transaction<F, T>(&mut self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError>,
    {
        let tx = self.conn.transaction()?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_path() {
        let path = default_db_path();
        assert!(path.to_string_lossy().contains(".chainview"));
        assert!(path.to_string_lossy().ends_with("chains.db"));
    }

    #[test]
    fn test_open_or_create_creates_parent_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        let db_path = tmp.path().join("nested").join("chains.db");
        let store = ChainStore::open_or_create(&db_path).unwrap();
        assert!(db_path.exists());
        assert_eq!(store.path(), db_path);
    }
}
