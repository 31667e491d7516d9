//! Database schema creation and migration

use rusqlite::Connection;

use crate::connection::StoreError;

/// Current database schema version
pub const DB_VERSION: i32 = 1;

/// Initialize the database schema (create tables + run migrations)
pub fn init_schema(conn: &mut Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS metadata (
            key TEXT PRIMARY KEY,
            value TEXT
        )",
    )?;

    // Session index: one row per known transcript file
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS sessions (
            session_id TEXT PRIMARY KEY,
            file_path TEXT NOT NULL UNIQUE,
            mtime_ms INTEGER NOT NULL DEFAULT 0,
            file_size INTEGER NOT NULL DEFAULT 0,
            message_count INTEGER NOT NULL DEFAULT 0,
            first_timestamp TEXT,
            last_timestamp TEXT,
            indexed_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_sessions_file_path ON sessions(file_path);",
    )?;

    // Edge list: at most one row per child session
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS continuation_edges (
            child_id TEXT PRIMARY KEY,
            parent_id TEXT NOT NULL,
            ord INTEGER NOT NULL DEFAULT 0,
            split_reason TEXT,
            split_timestamp TEXT,
            child_started_at TEXT,
            has_child_marker INTEGER NOT NULL DEFAULT 1,
            has_parent_marker INTEGER NOT NULL DEFAULT 0,
            is_orphaned INTEGER NOT NULL DEFAULT 0,
            is_active INTEGER NOT NULL DEFAULT 0
        );
        CREATE INDEX IF NOT EXISTS idx_edges_parent ON continuation_edges(parent_id);
        CREATE INDEX IF NOT EXISTS idx_edges_orphaned ON continuation_edges(is_orphaned);",
    )?;

    migrate_schema(conn)?;

    conn.execute(
        "INSERT OR REPLACE INTO metadata (key, value) VALUES ('version', ?1)",
        [&DB_VERSION.to_string()],
    )?;

    Ok(())
}

/// Migrate schema from older versions to current
pub fn migrate_schema(conn: &Connection) -> Result<(), StoreError> {
    let current_version: i32 = match conn.query_row(
        "SELECT CAST(value AS INTEGER) FROM metadata WHERE key = 'version'",
        [],
        |row| row.get(0),
    ) {
        Ok(v) => v,
        Err(_) => {
            // No version row yet - schema is fresh
            return Ok(());
        }
    };

    if current_version > DB_VERSION {
        return Err(StoreError::Migration(format!(
            "database version {} is newer than supported {}",
            current_version, DB_VERSION
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_fresh_schema_creates_all_tables() {
        let mut conn = Connection::open_in_memory().unwrap();
        init_schema(&mut conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();

        assert!(tables.contains(&"metadata".to_string()));
        assert!(tables.contains(&"sessions".to_string()));
        assert!(tables.contains(&"continuation_edges".to_string()));

        let version: i32 = conn
            .query_row(
                "SELECT CAST(value AS INTEGER) FROM metadata WHERE key = 'version'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(version, DB_VERSION);
    }

    #[test]
    fn test_schema_is_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        init_schema(&mut conn).unwrap();
        init_schema(&mut conn).unwrap();

        let version: i32 = conn
            .query_row(
                "SELECT CAST(value AS INTEGER) FROM metadata WHERE key = 'version'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(version, DB_VERSION);
    }

    #[test]
    fn test_newer_version_is_rejected() {
        let mut conn = Connection::open_in_memory().unwrap();
        init_schema(&mut conn).unwrap();
        conn.execute(
            "UPDATE metadata SET value = ?1 WHERE key = 'version'",
            [&(DB_VERSION + 1).to_string()],
        )
        .unwrap();

        let err = migrate_schema(&conn);
        assert!(matches!(err, Err(StoreError::Migration(_))));
    }
}
