//! Core type definitions for continuation chain data

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Canonical session identifier (opaque, usually a UUID)
pub type SessionId = String;

/// Session metadata from the session index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMeta {
    pub session_id: SessionId,
    pub file_path: String,
    /// File modification time in milliseconds since the epoch
    pub mtime_ms: i64,
    pub file_size: i64,
    pub message_count: i64,
    pub first_timestamp: Option<String>,
    pub last_timestamp: Option<String>,
    pub indexed_at: String,
}

/// One directed continuation relationship: `child -> parent`.
///
/// At most one edge exists per distinct child (a session has at most one
/// parent); a parent may have many edges (branching).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContinuationEdge {
    pub child_id: SessionId,
    pub parent_id: SessionId,
    /// Position among siblings, chronological by `child_started_at`
    pub order: i64,
    pub split_reason: Option<String>,
    /// Timestamp of the parent's boundary record, when corroborated
    pub split_timestamp: Option<String>,
    pub child_started_at: Option<String>,
    pub has_child_marker: bool,
    /// True when the parent's boundary record names this child
    pub has_parent_marker: bool,
    /// True iff the parent does not resolve to a known session
    pub is_orphaned: bool,
    /// True iff this is the chronologically last edge among siblings
    /// and the group is not orphaned
    pub is_active_continuation: bool,
}

/// A resolved tree node wrapping a session plus its resolved children
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChainNode {
    pub session: SessionMeta,
    /// Chronologically ordered continuations of this session
    pub children: Vec<ChainNode>,
    pub is_branch_point: bool,
    /// True on a root whose own parent reference fails the existence check
    pub is_orphan_root: bool,
    /// Distance from the resolution root
    pub depth: usize,
}

impl ChainNode {
    pub fn session_id(&self) -> &str {
        &self.session.session_id
    }
}

/// Summary statistics accumulated during a single resolution pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ChainStats {
    /// Total sessions in the resolved tree
    pub total_count: usize,
    /// Number of branch points (nodes with more than one child)
    pub branch_count: usize,
    /// Orphaned edges within the tree (broken parent links)
    pub orphan_count: usize,
    /// Longest root-to-leaf distance
    pub max_depth: usize,
}

/// Consistent point-in-time view of the edge list and session index,
/// the sole input to chain resolution.
#[derive(Debug, Clone, Default)]
pub struct ChainSnapshot {
    pub sessions: HashMap<SessionId, SessionMeta>,
    pub edges: Vec<ContinuationEdge>,
}

impl ChainSnapshot {
    /// Look up the edge whose child is `session_id`, if any
    pub fn edge_for_child(&self, session_id: &str) -> Option<&ContinuationEdge> {
        self.edges.iter().find(|e| e.child_id == session_id)
    }

    pub fn contains_session(&self, session_id: &str) -> bool {
        self.sessions.contains_key(session_id)
    }
}

/// Role of a candidate session relative to a selected one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HighlightRole {
    Clicked,
    Ancestor,
    Descendant,
    Sibling,
    None,
}

impl std::fmt::Display for HighlightRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HighlightRole::Clicked => write!(f, "clicked"),
            HighlightRole::Ancestor => write!(f, "ancestor"),
            HighlightRole::Descendant => write!(f, "descendant"),
            HighlightRole::Sibling => write!(f, "sibling"),
            HighlightRole::None => write!(f, "none"),
        }
    }
}
