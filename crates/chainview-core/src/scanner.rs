//! Split-marker detection over raw transcript files
//!
//! A transcript is an append-only JSONL file. The scanner streams it once and
//! extracts at most one child marker (this session continues a parent) and at
//! most one parent marker (this session was split and announces a successor),
//! plus the session metadata gathered in the same pass.

use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::types::SessionId;

/// Record type carrying the child marker
pub const CHILD_MARKER_TYPE: &str = "file-history-snapshot";
/// Record subtype carrying the parent marker
pub const PARENT_MARKER_SUBTYPE: &str = "compact_boundary";
/// Token preceding the successor id inside a boundary payload
const CONTINUATION_TOKEN: &str = "continuation:";

/// Errors reading a transcript file. Scan errors are always per-session;
/// callers record them and move on to the next transcript.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("failed to read transcript {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// One event record, reduced to the fields the scanner cares about.
///
/// Producers disagree on the session id field name (`sessionId` vs
/// `session_id`); both are accepted here and normalized so the alias never
/// leaks past this boundary.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawRecord {
    #[serde(default)]
    pub r#type: Option<String>,
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(rename = "sessionId", alias = "session_id", default)]
    pub session_id: Option<String>,
    #[serde(rename = "parentSessionId", alias = "parent_session_id", default)]
    pub parent_session_id: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

/// Result of scanning a single transcript
#[derive(Debug, Clone, Default)]
pub struct ScanOutcome {
    /// Canonical session id, taken from the first record that carries one
    pub session_id: Option<SessionId>,
    pub is_child: bool,
    pub parent_id: Option<SessionId>,
    pub child_started_at: Option<String>,
    pub split_reason: Option<String>,
    pub is_parent: bool,
    /// Successor id embedded in the boundary payload, when present
    pub next_session_id: Option<SessionId>,
    pub split_timestamp: Option<String>,
    pub message_count: i64,
    pub first_timestamp: Option<String>,
    pub last_timestamp: Option<String>,
}

/// Parse a single JSONL line into a [`RawRecord`], or `None` when malformed
pub fn parse_record(raw: &str) -> Option<RawRecord> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    serde_json::from_str(trimmed).ok()
}

/// Extract the successor session id from a boundary payload.
///
/// Fixed-format: the id follows a `continuation:` token and runs until the
/// first character that cannot appear in an id.
pub fn extract_continuation_id(content: &str) -> Option<SessionId> {
    let pos = content.find(CONTINUATION_TOKEN)?;
    let rest = content[pos + CONTINUATION_TOKEN.len()..].trim_start();
    let id: String = rest
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect();
    if id.is_empty() {
        None
    } else {
        Some(id)
    }
}

/// Scan a transcript file for split markers.
///
/// Individual malformed lines are skipped; scanning stops at the first parent
/// marker since only one boundary per session is meaningful. Both markers are
/// detected independently: a transcript may be a child of its own parent and
/// a parent of a future continuation at once.
pub fn scan_transcript(path: &Path) -> Result<ScanOutcome, ScanError> {
    let file = std::fs::File::open(path).map_err(|source| ScanError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let reader = BufReader::new(file);
    let mut outcome = ScanOutcome::default();
    let mut line_number = 0usize;

    for line_result in reader.lines() {
        line_number += 1;
        let raw = match line_result {
            Ok(l) => l,
            Err(source) => {
                // A torn read mid-file is a per-session condition, not a batch failure
                return Err(ScanError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        let record = match parse_record(&raw) {
            Some(r) => r,
            None => {
                if !raw.trim().is_empty() {
                    debug!(line = line_number, path = %path.display(), "skipping malformed record");
                }
                continue;
            }
        };

        outcome.message_count += 1;

        if outcome.session_id.is_none() {
            if let Some(sid) = record.session_id.as_deref() {
                if !sid.is_empty() {
                    outcome.session_id = Some(sid.to_string());
                }
            }
        }

        if let Some(ts) = record.timestamp.as_deref() {
            if !ts.is_empty() {
                if outcome.first_timestamp.is_none() {
                    outcome.first_timestamp = Some(ts.to_string());
                }
                outcome.last_timestamp = Some(ts.to_string());
            }
        }

        if !outcome.is_child && record.r#type.as_deref() == Some(CHILD_MARKER_TYPE) {
            if let Some(parent) = record.parent_session_id.as_deref() {
                if !parent.is_empty() {
                    outcome.is_child = true;
                    outcome.parent_id = Some(parent.to_string());
                    outcome.child_started_at = record.timestamp.clone();
                    outcome.split_reason = record
                        .reason
                        .clone()
                        .or_else(|| Some("context-window".to_string()));
                }
            }
        }

        if record.r#type.as_deref() == Some("system")
            && record.subtype.as_deref() == Some(PARENT_MARKER_SUBTYPE)
        {
            outcome.is_parent = true;
            outcome.split_timestamp = record.timestamp.clone();
            outcome.next_session_id = record
                .content
                .as_deref()
                .and_then(extract_continuation_id);
            // Only the first boundary is meaningful
            break;
        }
    }

    Ok(outcome)
}
