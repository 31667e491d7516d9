//! File-watching change notifier driving cache invalidation
//!
//! Uses the `notify` crate with debouncing, plus a short stabilization delay
//! so a transcript still being written is not rescanned mid-append. Each
//! settled change maps to its session, triggers a partial rescan, and
//! invalidates the affected root; when the root cannot be determined (a
//! brand-new session whose parent is not yet scanned) the whole cache is
//! invalidated instead.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use notify_debouncer_mini::new_debouncer;
use thiserror::Error;
use tracing::{debug, info, warn};

use chainview_core::SessionId;
use chainview_store::{ChainStore, StoreError};

use crate::cache::ContinuationCache;
use crate::discovery::session_id_for_path;
use crate::events::EventBus;
use crate::scan::rescan;

/// Watcher setup failures
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("failed to watch {path}: {message}")]
    Watch { path: PathBuf, message: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Debounce and stabilization tuning
#[derive(Debug, Clone, Copy)]
pub struct WatcherConfig {
    /// Window for coalescing bursts of events on the same files
    pub debounce: Duration,
    /// Extra delay before acting; files whose size changes across it are
    /// still being written and are skipped until their next event
    pub stabilization: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(200),
            stabilization: Duration::from_millis(150),
        }
    }
}

/// Scoped watcher subscription; dropping it stops the watcher thread
pub struct WatchHandle {
    stop_tx: mpsc::Sender<()>,
    thread: Option<JoinHandle<()>>,
}

impl WatchHandle {
    /// Stop the watcher and wait for its thread to exit
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let _ = self.stop_tx.send(());
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Watch `dir` for transcript changes and keep the store and cache current
pub fn watch(
    dir: &Path,
    store: Arc<Mutex<ChainStore>>,
    cache: ContinuationCache,
    events: EventBus,
    config: WatcherConfig,
) -> Result<WatchHandle, WatchError> {
    let (event_tx, event_rx) = mpsc::channel();
    let (stop_tx, stop_rx) = mpsc::channel();

    let mut debouncer =
        new_debouncer(config.debounce, event_tx).map_err(|e| WatchError::Watch {
            path: dir.to_path_buf(),
            message: e.to_string(),
        })?;
    debouncer
        .watcher()
        .watch(dir, notify::RecursiveMode::Recursive)
        .map_err(|e| WatchError::Watch {
            path: dir.to_path_buf(),
            message: e.to_string(),
        })?;

    info!(dir = %dir.display(), "watching for transcript changes");

    let dir = dir.to_path_buf();
    let thread = std::thread::spawn(move || {
        // The debouncer must live as long as the loop
        let _debouncer = debouncer;

        loop {
            match stop_rx.try_recv() {
                Ok(()) | Err(mpsc::TryRecvError::Disconnected) => break,
                Err(mpsc::TryRecvError::Empty) => {}
            }

            match event_rx.recv_timeout(Duration::from_millis(250)) {
                Ok(Ok(batch)) => {
                    let paths: HashSet<PathBuf> = batch
                        .into_iter()
                        .map(|e| e.path)
                        .filter(|p| is_transcript(p))
                        .collect();
                    if paths.is_empty() {
                        continue;
                    }
                    let settled = settle(paths, config.stabilization);
                    if settled.is_empty() {
                        continue;
                    }
                    handle_changes(&dir, &store, &cache, &events, settled);
                }
                Ok(Err(errors)) => {
                    warn!(?errors, "watch error");
                }
                Err(mpsc::RecvTimeoutError::Timeout) => continue,
                Err(mpsc::RecvTimeoutError::Disconnected) => break,
            }
        }
        debug!("watcher thread shutting down");
    });

    Ok(WatchHandle {
        stop_tx,
        thread: Some(thread),
    })
}

fn is_transcript(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.ends_with(".jsonl"))
        .unwrap_or(false)
}

/// Keep only paths whose size held still across the stabilization delay;
/// a file that grew during the delay is still being written and will fire
/// another event. Deleted files pass through so their sessions get retired.
fn settle(paths: HashSet<PathBuf>, delay: Duration) -> Vec<PathBuf> {
    let sized: Vec<(PathBuf, Option<u64>)> = paths
        .into_iter()
        .map(|p| {
            let size = std::fs::metadata(&p).ok().map(|m| m.len());
            (p, size)
        })
        .collect();

    std::thread::sleep(delay);

    sized
        .into_iter()
        .filter(|(path, size)| match size {
            None => true,
            Some(size) => std::fs::metadata(path)
                .ok()
                .map(|m| m.len() == *size)
                .unwrap_or(true),
        })
        .map(|(path, _)| path)
        .collect()
}

fn handle_changes(
    dir: &Path,
    store: &Arc<Mutex<ChainStore>>,
    cache: &ContinuationCache,
    events: &EventBus,
    paths: Vec<PathBuf>,
) {
    let session_ids: Vec<SessionId> = paths
        .iter()
        .filter_map(|p| session_id_for_path(p))
        .collect();
    if session_ids.is_empty() {
        return;
    }

    {
        let mut store = store
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match rescan(&mut store, dir, &session_ids, events) {
            Ok(report) => {
                debug!(
                    sessions = session_ids.len(),
                    processed = report.processed,
                    errored = report.errored,
                    "rescanned changed transcripts"
                );
            }
            Err(e) => {
                warn!(error = %e, "rescan after change failed");
                return;
            }
        }
    }

    for session_id in &session_ids {
        match cache.root_of(session_id) {
            Some(root) => cache.invalidate(&root),
            None => {
                // Unknown to the cache (e.g. a brand-new continuation whose
                // parent has never been resolved); be conservative
                debug!(session_id = %session_id, "affected root unknown, invalidating all");
                cache.invalidate_all();
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_transcript() {
        assert!(is_transcript(Path::new("/a/b/sess.jsonl")));
        assert!(!is_transcript(Path::new("/a/b/notes.txt")));
        assert!(!is_transcript(Path::new("/a/b")));
    }

    #[test]
    fn test_settle_keeps_stable_and_deleted() {
        let tmp = tempfile::tempdir().unwrap();
        let stable = tmp.path().join("stable.jsonl");
        std::fs::write(&stable, "{}\n").unwrap();
        let deleted = tmp.path().join("deleted.jsonl");

        let mut paths = HashSet::new();
        paths.insert(stable.clone());
        paths.insert(deleted.clone());

        let settled = settle(paths, Duration::from_millis(1));
        assert_eq!(settled.len(), 2);
        assert!(settled.contains(&stable));
        assert!(settled.contains(&deleted));
    }

    #[test]
    fn test_settle_drops_still_growing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let growing = tmp.path().join("growing.jsonl");
        std::fs::write(&growing, "{}\n").unwrap();

        let mut paths = HashSet::new();
        paths.insert(growing.clone());

        let writer = {
            let growing = growing.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                let mut f = std::fs::OpenOptions::new().append(true).open(growing).unwrap();
                std::io::Write::write_all(&mut f, b"{\"type\":\"user\"}\n").unwrap();
            })
        };

        let settled = settle(paths, Duration::from_millis(200));
        writer.join().unwrap();
        assert!(settled.is_empty());
    }
}
