//! Continuation edge reads and writes

use std::collections::HashMap;

use chainview_core::{ChainSnapshot, ContinuationEdge};
use rusqlite::Connection;

use crate::connection::{ChainStore, StoreError};

const EDGE_COLUMNS: &str = "child_id, parent_id, ord, split_reason, split_timestamp,
     child_started_at, has_child_marker, has_parent_marker, is_orphaned, is_active";

impl ChainStore {
    /// Replace the whole edge list in one transaction (full scan result)
    pub fn replace_edges(&mut self, edges: &[ContinuationEdge]) -> Result<(), StoreError> {
        self.transaction(|conn| {
            conn.execute("DELETE FROM continuation_edges", [])?;
            for edge in edges {
                insert_edge(conn, edge)?;
            }
            Ok(())
        })
    }

    /// Insert or replace the edge for one child session
    pub fn upsert_child_edge(&self, edge: &ContinuationEdge) -> Result<(), StoreError> {
        insert_edge(&self.conn, edge)
    }

    /// Drop the edge for one child session, if any
    pub fn delete_child_edge(&self, child_id: &str) -> Result<(), StoreError> {
        self.conn.execute(
            "DELETE FROM continuation_edges WHERE child_id = ?1",
            [child_id],
        )?;
        Ok(())
    }

    /// The edge whose child is `child_id`, if any
    pub fn edge_for_child(&self, child_id: &str) -> Result<Option<ContinuationEdge>, StoreError> {
        let result = self.conn.query_row(
            &format!("SELECT {EDGE_COLUMNS} FROM continuation_edges WHERE child_id = ?1"),
            [child_id],
            row_to_edge,
        );
        match result {
            Ok(edge) => Ok(Some(edge)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// All edges of one sibling group, in sibling order
    pub fn edges_for_parent(&self, parent_id: &str) -> Result<Vec<ContinuationEdge>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {EDGE_COLUMNS} FROM continuation_edges
             WHERE parent_id = ?1 ORDER BY ord ASC"
        ))?;
        let rows = stmt.query_map([parent_id], row_to_edge)?;
        collect_edges(rows)
    }

    /// The full edge list, grouped by parent and ordered within each group
    pub fn all_edges(&self) -> Result<Vec<ContinuationEdge>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {EDGE_COLUMNS} FROM continuation_edges ORDER BY parent_id ASC, ord ASC"
        ))?;
        let rows = stmt.query_map([], row_to_edge)?;
        collect_edges(rows)
    }

    /// Edges whose parent currently fails the existence check
    pub fn orphaned_edges(&self) -> Result<Vec<ContinuationEdge>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {EDGE_COLUMNS} FROM continuation_edges
             WHERE is_orphaned = 1 ORDER BY parent_id ASC, ord ASC"
        ))?;
        let rows = stmt.query_map([], row_to_edge)?;
        collect_edges(rows)
    }

    /// Consistent read of the session index and edge list for resolution
    pub fn snapshot(&mut self) -> Result<ChainSnapshot, StoreError> {
        self.transaction(|conn| {
            let mut sessions = HashMap::new();
            let mut stmt = conn.prepare(
                "SELECT session_id, file_path, mtime_ms, file_size, message_count,
                        first_timestamp, last_timestamp, indexed_at
                 FROM sessions",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok(chainview_core::SessionMeta {
                    session_id: row.get(0)?,
                    file_path: row.get(1)?,
                    mtime_ms: row.get(2)?,
                    file_size: row.get(3)?,
                    message_count: row.get(4)?,
                    first_timestamp: row.get(5).ok(),
                    last_timestamp: row.get(6).ok(),
                    indexed_at: row.get(7)?,
                })
            })?;
            for row in rows {
                let meta = row?;
                sessions.insert(meta.session_id.clone(), meta);
            }

            let mut stmt = conn.prepare(&format!(
                "SELECT {EDGE_COLUMNS} FROM continuation_edges ORDER BY parent_id ASC, ord ASC"
            ))?;
            let edges = collect_edges(stmt.query_map([], row_to_edge)?)?;

            Ok(ChainSnapshot { sessions, edges })
        })
    }
}

fn insert_edge(conn: &Connection, edge: &ContinuationEdge) -> Result<(), StoreError> {
    conn.execute(
        "INSERT OR REPLACE INTO continuation_edges
         (child_id, parent_id, ord, split_reason, split_timestamp,
          child_started_at, has_child_marker, has_parent_marker, is_orphaned, is_active)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        rusqlite::params![
            edge.child_id,
            edge.parent_id,
            edge.order,
            edge.split_reason,
            edge.split_timestamp,
            edge.child_started_at,
            edge.has_child_marker,
            edge.has_parent_marker,
            edge.is_orphaned,
            edge.is_active_continuation,
        ],
    )?;
    Ok(())
}

fn row_to_edge(row: &rusqlite::Row) -> Result<ContinuationEdge, rusqlite::Error> {
    Ok(ContinuationEdge {
        child_id: row.get(0)?,
        parent_id: row.get(1)?,
        order: row.get(2)?,
        split_reason: row.get(3).ok(),
        split_timestamp: row.get(4).ok(),
        child_started_at: row.get(5).ok(),
        has_child_marker: row.get(6)?,
        has_parent_marker: row.get(7)?,
        is_orphaned: row.get(8)?,
        is_active_continuation: row.get(9)?,
    })
}

fn collect_edges(
    rows: impl Iterator<Item = Result<ContinuationEdge, rusqlite::Error>>,
) -> Result<Vec<ContinuationEdge>, StoreError> {
    let mut edges = Vec::new();
    for row in rows {
        edges.push(row?);
    }
    Ok(edges)
}
