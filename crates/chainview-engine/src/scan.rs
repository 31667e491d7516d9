//! Full and partial transcript scans
//!
//! The scan pipeline runs the marker scanner over transcript files, maintains
//! the session index, and rebuilds the continuation edge list: grouping child
//! markers by parent, ordering siblings chronologically, corroborating edges
//! against parent-side boundaries, and computing orphan state against the
//! session index. A full scan replaces the whole edge table; a rescan touches
//! only the named sessions and their affected sibling groups.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use tracing::{info, warn};

use chainview_core::scanner::{scan_transcript, ScanOutcome};
use chainview_core::{ContinuationEdge, SessionId, SessionMeta};
use chainview_store::{ChainStore, StoreError};

use crate::discovery::{find_transcript_files, locate_transcript, session_id_for_path};
use crate::events::{EngineEvent, EventBus};

/// Progress is reported once per this many transcripts
pub const PROGRESS_BATCH: usize = 25;

/// One transcript that could not be scanned
#[derive(Debug, Clone)]
pub struct SessionScanFailure {
    pub path: PathBuf,
    pub message: String,
}

/// Aggregate counts for one scan pass
#[derive(Debug, Default)]
pub struct ScanReport {
    pub processed: usize,
    pub errored: usize,
    /// Edges written (full scan) or touched (rescan)
    pub edge_count: usize,
    pub orphan_count: usize,
    pub failures: Vec<SessionScanFailure>,
}

#[derive(Debug, Clone)]
struct ChildMarker {
    child_id: SessionId,
    parent_id: SessionId,
    child_started_at: Option<String>,
    split_reason: Option<String>,
}

#[derive(Debug, Clone, Default)]
struct Boundary {
    next_session_id: Option<SessionId>,
    split_timestamp: Option<String>,
}

enum ScanOneError {
    Store(StoreError),
    Session { path: PathBuf, message: String },
}

/// Scan every transcript under `dir` and rebuild the edge list wholesale.
///
/// A transcript that cannot be read is recorded in the report and skipped;
/// only store-level failures abort the batch.
pub fn full_scan(
    store: &mut ChainStore,
    dir: &Path,
    events: &EventBus,
) -> Result<ScanReport, StoreError> {
    let files = find_transcript_files(Some(dir));
    let total = files.len();
    let mut report = ScanReport::default();
    let mut known: HashSet<SessionId> = HashSet::new();
    let mut markers: Vec<ChildMarker> = Vec::new();
    let mut boundaries: HashMap<SessionId, Boundary> = HashMap::new();

    for (i, file) in files.iter().enumerate() {
        match scan_one(store, file) {
            Ok((session_id, outcome)) => {
                known.insert(session_id.clone());
                if outcome.is_child {
                    if let Some(parent_id) = outcome.parent_id.clone() {
                        markers.push(ChildMarker {
                            child_id: session_id.clone(),
                            parent_id,
                            child_started_at: outcome.child_started_at.clone(),
                            split_reason: outcome.split_reason.clone(),
                        });
                    }
                }
                if outcome.is_parent {
                    boundaries.insert(
                        session_id,
                        Boundary {
                            next_session_id: outcome.next_session_id,
                            split_timestamp: outcome.split_timestamp,
                        },
                    );
                }
                report.processed += 1;
            }
            Err(ScanOneError::Store(e)) => return Err(e),
            Err(ScanOneError::Session { path, message }) => {
                warn!(path = %path.display(), %message, "transcript scan failed");
                report.errored += 1;
                report.failures.push(SessionScanFailure { path, message });
            }
        }
        emit_progress(events, i + 1, total);
    }

    let edges = assemble_edges(markers, &boundaries, |id| known.contains(id));
    report.edge_count = edges.len();
    report.orphan_count = edges.iter().filter(|e| e.is_orphaned).count();
    store.replace_edges(&edges)?;

    info!(
        processed = report.processed,
        errored = report.errored,
        edges = report.edge_count,
        orphaned = report.orphan_count,
        "full scan complete"
    );
    Ok(report)
}

/// Rescan the named sessions and patch their sibling groups in place.
///
/// Orphan healing happens here: each rescanned session is treated as a
/// potentially new parent, so edges pointing at it get their existence check
/// re-evaluated.
pub fn rescan(
    store: &mut ChainStore,
    dir: &Path,
    session_ids: &[SessionId],
    events: &EventBus,
) -> Result<ScanReport, StoreError> {
    let total = session_ids.len();
    let mut report = ScanReport::default();
    let mut affected_parents: HashSet<SessionId> = HashSet::new();

    for (i, sid) in session_ids.iter().enumerate() {
        affected_parents.insert(sid.clone());
        if let Some(old) = store.edge_for_child(sid)? {
            affected_parents.insert(old.parent_id);
        }

        let path = match store.get_session(sid)? {
            Some(meta) => {
                let known_path = PathBuf::from(&meta.file_path);
                if known_path.exists() {
                    Some(known_path)
                } else {
                    locate_transcript(dir, sid)
                }
            }
            None => locate_transcript(dir, sid),
        };

        let Some(path) = path else {
            // Transcript is gone: retire the session and its child edge
            store.remove_session(sid)?;
            store.delete_child_edge(sid)?;
            emit_progress(events, i + 1, total);
            continue;
        };

        match scan_one(store, &path) {
            Ok((scanned_id, outcome)) => {
                report.processed += 1;

                if outcome.is_child {
                    if let Some(parent_id) = outcome.parent_id.clone() {
                        affected_parents.insert(parent_id.clone());
                        let carried = store
                            .edge_for_child(&scanned_id)?
                            .filter(|e| e.parent_id == parent_id);
                        store.upsert_child_edge(&ContinuationEdge {
                            child_id: scanned_id.clone(),
                            parent_id,
                            // Order, orphan and active state are group
                            // properties, recomputed below
                            order: carried.as_ref().map(|e| e.order).unwrap_or(0),
                            split_reason: outcome.split_reason.clone(),
                            split_timestamp: carried
                                .as_ref()
                                .and_then(|e| e.split_timestamp.clone()),
                            child_started_at: outcome.child_started_at.clone(),
                            has_child_marker: true,
                            has_parent_marker: carried
                                .map(|e| e.has_parent_marker)
                                .unwrap_or(false),
                            is_orphaned: false,
                            is_active_continuation: false,
                        })?;
                    }
                } else {
                    store.delete_child_edge(&scanned_id)?;
                }

                if outcome.is_parent {
                    // Corroborate the successor's edge from this side
                    if let Some(next_id) = outcome.next_session_id.as_deref() {
                        if let Some(mut edge) = store.edge_for_child(next_id)? {
                            if edge.parent_id == scanned_id {
                                edge.has_parent_marker = true;
                                edge.split_timestamp = outcome.split_timestamp.clone();
                                store.upsert_child_edge(&edge)?;
                            }
                        }
                    }
                }
            }
            Err(ScanOneError::Store(e)) => return Err(e),
            Err(ScanOneError::Session { path, message }) => {
                warn!(path = %path.display(), %message, "transcript rescan failed");
                report.errored += 1;
                report.failures.push(SessionScanFailure { path, message });
            }
        }
        emit_progress(events, i + 1, total);
    }

    for parent_id in &affected_parents {
        let mut group = store.edges_for_parent(parent_id)?;
        if group.is_empty() {
            continue;
        }
        group.sort_by(|a, b| {
            a.child_started_at
                .cmp(&b.child_started_at)
                .then_with(|| a.child_id.cmp(&b.child_id))
        });
        let exists = store.session_exists(parent_id)?;
        let last = group.len() - 1;
        for (i, edge) in group.iter_mut().enumerate() {
            edge.order = i as i64;
            edge.is_orphaned = !exists;
            edge.is_active_continuation = exists && i == last;
            store.upsert_child_edge(edge)?;
        }
        report.edge_count += group.len();
        report.orphan_count += group.iter().filter(|e| e.is_orphaned).count();
    }

    Ok(report)
}

fn emit_progress(events: &EventBus, current: usize, total: usize) {
    if total == 0 {
        return;
    }
    if current % PROGRESS_BATCH == 0 || current == total {
        events.emit(EngineEvent::ScanProgress {
            current,
            total,
            batch: current.div_ceil(PROGRESS_BATCH),
            total_batches: total.div_ceil(PROGRESS_BATCH),
        });
    }
}

fn scan_one(store: &ChainStore, path: &Path) -> Result<(SessionId, ScanOutcome), ScanOneError> {
    let outcome = scan_transcript(path).map_err(|e| ScanOneError::Session {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let session_id = outcome
        .session_id
        .clone()
        .or_else(|| session_id_for_path(path))
        .ok_or_else(|| ScanOneError::Session {
            path: path.to_path_buf(),
            message: "transcript has no session id".to_string(),
        })?;

    let meta = build_meta(path, &session_id, &outcome).map_err(|e| ScanOneError::Session {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    store.upsert_session(&meta).map_err(ScanOneError::Store)?;

    Ok((session_id, outcome))
}

fn build_meta(
    path: &Path,
    session_id: &str,
    outcome: &ScanOutcome,
) -> std::io::Result<SessionMeta> {
    let md = std::fs::metadata(path)?;
    let mtime_ms = md
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0);

    Ok(SessionMeta {
        session_id: session_id.to_string(),
        file_path: path.to_string_lossy().to_string(),
        mtime_ms,
        file_size: md.len() as i64,
        message_count: outcome.message_count,
        first_timestamp: outcome.first_timestamp.clone(),
        last_timestamp: outcome.last_timestamp.clone(),
        indexed_at: chrono::Utc::now().to_rfc3339(),
    })
}

fn assemble_edges<F>(
    markers: Vec<ChildMarker>,
    boundaries: &HashMap<SessionId, Boundary>,
    parent_exists: F,
) -> Vec<ContinuationEdge>
where
    F: Fn(&str) -> bool,
{
    let mut groups: BTreeMap<SessionId, Vec<ChildMarker>> = BTreeMap::new();
    for marker in markers {
        groups
            .entry(marker.parent_id.clone())
            .or_default()
            .push(marker);
    }

    let mut edges = Vec::new();
    for (parent_id, mut group) in groups {
        group.sort_by(|a, b| {
            a.child_started_at
                .cmp(&b.child_started_at)
                .then_with(|| a.child_id.cmp(&b.child_id))
        });
        let exists = parent_exists(&parent_id);
        let boundary = boundaries.get(&parent_id);
        let last = group.len() - 1;

        for (i, marker) in group.into_iter().enumerate() {
            let corroborated =
                boundary.and_then(|b| b.next_session_id.as_deref()) == Some(marker.child_id.as_str());
            edges.push(ContinuationEdge {
                child_id: marker.child_id,
                parent_id: parent_id.clone(),
                order: i as i64,
                split_reason: marker.split_reason,
                split_timestamp: if corroborated {
                    boundary.and_then(|b| b.split_timestamp.clone())
                } else {
                    None
                },
                child_started_at: marker.child_started_at,
                has_child_marker: true,
                has_parent_marker: corroborated,
                is_orphaned: !exists,
                is_active_continuation: exists && i == last,
            });
        }
    }
    edges
}
