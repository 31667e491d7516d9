//! Session index reads and writes

use chainview_core::SessionMeta;

use crate::connection::{ChainStore, StoreError};

impl ChainStore {
    /// Insert or replace a session index row
    pub fn upsert_session(&self, meta: &SessionMeta) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO sessions
             (session_id, file_path, mtime_ms, file_size, message_count,
              first_timestamp, last_timestamp, indexed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            rusqlite::params![
                meta.session_id,
                meta.file_path,
                meta.mtime_ms,
                meta.file_size,
                meta.message_count,
                meta.first_timestamp,
                meta.last_timestamp,
                meta.indexed_at,
            ],
        )?;
        Ok(())
    }

    /// Point-in-time existence check against the session index
    pub fn session_exists(&self, session_id: &str) -> Result<bool, StoreError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sessions WHERE session_id = ?1",
            [session_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Get a session by id
    pub fn get_session(&self, session_id: &str) -> Result<Option<SessionMeta>, StoreError> {
        let result = self.conn.query_row(
            "SELECT session_id, file_path, mtime_ms, file_size, message_count,
                    first_timestamp, last_timestamp, indexed_at
             FROM sessions WHERE session_id = ?1",
            [session_id],
            row_to_session,
        );
        match result {
            Ok(meta) => Ok(Some(meta)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Get a session by transcript file path
    pub fn session_by_path(&self, file_path: &str) -> Result<Option<SessionMeta>, StoreError> {
        let result = self.conn.query_row(
            "SELECT session_id, file_path, mtime_ms, file_size, message_count,
                    first_timestamp, last_timestamp, indexed_at
             FROM sessions WHERE file_path = ?1",
            [file_path],
            row_to_session,
        );
        match result {
            Ok(meta) => Ok(Some(meta)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// All sessions, most recently active first
    pub fn all_sessions(&self) -> Result<Vec<SessionMeta>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT session_id, file_path, mtime_ms, file_size, message_count,
                    first_timestamp, last_timestamp, indexed_at
             FROM sessions ORDER BY last_timestamp DESC",
        )?;
        let rows = stmt.query_map([], row_to_session)?;

        let mut sessions = Vec::new();
        for row in rows {
            sessions.push(row?);
        }
        Ok(sessions)
    }

    /// Remove a session whose transcript file disappeared
    pub fn remove_session(&self, session_id: &str) -> Result<(), StoreError> {
        self.conn.execute(
            "DELETE FROM sessions WHERE session_id = ?1",
            [session_id],
        )?;
        Ok(())
    }
}

fn row_to_session(row: &rusqlite::Row) -> Result<SessionMeta, rusqlite::Error> {
    Ok(SessionMeta {
        session_id: row.get(0)?,
        file_path: row.get(1)?,
        mtime_ms: row.get(2)?,
        file_size: row.get(3)?,
        message_count: row.get(4)?,
        first_timestamp: row.get(5).ok(),
        last_timestamp: row.get(6).ok(),
        indexed_at: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(id: &str) -> SessionMeta {
        SessionMeta {
            session_id: id.to_string(),
            file_path: format!("/tmp/{}.jsonl", id),
            mtime_ms: 1_700_000_000_000,
            file_size: 128,
            message_count: 4,
            first_timestamp: Some("2024-05-01T10:00:00Z".to_string()),
            last_timestamp: Some("2024-05-01T11:00:00Z".to_string()),
            indexed_at: "2024-05-01T12:00:00Z".to_string(),
        }
    }

    #[test]
    fn test_upsert_and_lookup() {
        let store = ChainStore::open_in_memory().unwrap();
        store.upsert_session(&meta("s1")).unwrap();

        assert!(store.session_exists("s1").unwrap());
        assert!(!store.session_exists("s2").unwrap());

        let loaded = store.get_session("s1").unwrap().unwrap();
        assert_eq!(loaded, meta("s1"));

        let by_path = store.session_by_path("/tmp/s1.jsonl").unwrap().unwrap();
        assert_eq!(by_path.session_id, "s1");
    }

    #[test]
    fn test_upsert_replaces() {
        let store = ChainStore::open_in_memory().unwrap();
        store.upsert_session(&meta("s1")).unwrap();

        let mut updated = meta("s1");
        updated.message_count = 9;
        store.upsert_session(&updated).unwrap();

        let loaded = store.get_session("s1").unwrap().unwrap();
        assert_eq!(loaded.message_count, 9);
        assert_eq!(store.all_sessions().unwrap().len(), 1);
    }

    #[test]
    fn test_remove_session() {
        let store = ChainStore::open_in_memory().unwrap();
        store.upsert_session(&meta("s1")).unwrap();
        store.remove_session("s1").unwrap();
        assert!(!store.session_exists("s1").unwrap());
    }
}
