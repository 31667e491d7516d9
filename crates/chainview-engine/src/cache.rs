//! Root-keyed continuation cache with lazy recomputation
//!
//! The cache is an explicit object constructed once and handed to consumers;
//! there is no ambient global. Each entry follows
//! `Empty -> Loading -> Ready -> Stale -> Loading -> ...`, with failures kept
//! retryable and the last good tree served (flagged stale) until the next
//! successful swap. Entries are replaced wholesale together with their slice
//! of the `session -> root` reverse index, so readers never observe a node
//! mapped to a tree that does not contain it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, warn};

use chainview_core::{ChainNode, ChainStats, SessionId};
use chainview_store::{ChainStore, StoreError};

use crate::events::{EngineEvent, EventBus};
use crate::resolver::{find_root, resolve_chain, ResolvedChain};

/// Source of resolution inputs. The store is the production implementation;
/// tests substitute an in-memory one.
pub trait ChainSource: Send + Sync {
    fn snapshot(&self) -> Result<chainview_core::ChainSnapshot, StoreError>;
}

/// [`ChainSource`] backed by the SQLite store
pub struct StoreSource {
    store: Arc<Mutex<ChainStore>>,
}

impl StoreSource {
    pub fn new(store: Arc<Mutex<ChainStore>>) -> Self {
        Self { store }
    }
}

impl ChainSource for StoreSource {
    fn snapshot(&self) -> Result<chainview_core::ChainSnapshot, StoreError> {
        let mut store = self
            .store
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        store.snapshot()
    }
}

/// Read view of one cache entry
#[derive(Debug, Clone)]
pub struct CachedChain {
    pub root_id: SessionId,
    pub generation: u64,
    pub chain: Option<Arc<ResolvedChain>>,
    pub is_loading: bool,
    pub is_stale: bool,
    pub last_error: Option<String>,
}

impl CachedChain {
    pub fn tree(&self) -> Option<&ChainNode> {
        self.chain.as_deref().map(|c| &c.tree)
    }

    pub fn stats(&self) -> Option<ChainStats> {
        self.chain.as_deref().map(|c| c.stats)
    }

    /// True when the root resolved to a known session with no data at all
    pub fn is_missing(&self) -> bool {
        !self.is_loading && self.chain.is_none() && self.last_error.is_none()
    }
}

/// Cache-wide counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    /// Cached root groups
    pub group_count: usize,
    /// Sessions covered by the reverse index
    pub total_cached: usize,
    pub stale_count: usize,
    pub loading_count: usize,
}

#[derive(Debug, Clone, Default)]
enum EntryState {
    #[default]
    Loading,
    Ready(Arc<ResolvedChain>),
    Stale(Arc<ResolvedChain>),
    /// Root is not a known session
    Missing,
    /// Last resolution failed with no earlier data to serve
    Failed,
}

#[derive(Debug, Default)]
struct CacheEntry {
    state: EntryState,
    generation: u64,
    in_flight: bool,
    /// Invalidated while a resolution was running; the result publishes as
    /// stale so the staleness is never hidden
    dirty: bool,
    last_error: Option<String>,
}

#[derive(Default)]
struct CacheInner {
    entries: HashMap<SessionId, CacheEntry>,
    /// session id -> root id, for every node of every cached tree
    reverse: HashMap<SessionId, SessionId>,
}

/// Read-through cache over [`resolve_chain`]
#[derive(Clone)]
pub struct ContinuationCache {
    source: Arc<dyn ChainSource>,
    inner: Arc<Mutex<CacheInner>>,
    events: EventBus,
}

impl ContinuationCache {
    pub fn new(source: Arc<dyn ChainSource>, events: EventBus) -> Self {
        Self {
            source,
            inner: Arc::new(Mutex::new(CacheInner::default())),
            events,
        }
    }

    /// Resolve the chain containing `session_id`, read-through.
    ///
    /// Never blocks on I/O: a cold or invalidated entry is returned as
    /// loading/stale immediately and recomputed on a worker thread, with one
    /// in-flight resolution per root at most.
    pub fn get_or_resolve(&self, session_id: &str) -> CachedChain {
        let mut spawn_for: Option<SessionId> = None;
        let result = {
            let mut inner = self.lock_inner();
            let key = inner
                .reverse
                .get(session_id)
                .cloned()
                .unwrap_or_else(|| session_id.to_string());

            let entry = inner.entries.entry(key.clone()).or_default();
            if matches!(entry.state, EntryState::Failed) {
                // Failed resolutions retry on the next read
                entry.state = EntryState::Loading;
            }
            let settled = matches!(entry.state, EntryState::Ready(_) | EntryState::Missing);
            if !settled && !entry.in_flight {
                entry.in_flight = true;
                spawn_for = Some(key.clone());
            }
            snapshot_entry(&key, entry)
        };

        if let Some(key) = spawn_for {
            self.spawn_resolution(key);
        }
        result
    }

    /// Same transitions as [`Self::get_or_resolve`], but resolves on the
    /// calling thread and returns the settled entry.
    pub fn resolve_blocking(&self, session_id: &str) -> CachedChain {
        {
            let mut inner = self.lock_inner();
            let key = inner
                .reverse
                .get(session_id)
                .cloned()
                .unwrap_or_else(|| session_id.to_string());
            let entry = inner.entries.entry(key).or_default();
            if matches!(entry.state, EntryState::Failed) {
                entry.state = EntryState::Loading;
            }
            entry.in_flight = true;
        }
        Self::resolve_once(&self.source, &self.inner, &self.events, session_id);
        self.peek(session_id)
    }

    /// Current entry for the chain containing `session_id`, without
    /// triggering any work
    pub fn peek(&self, session_id: &str) -> CachedChain {
        let inner = self.lock_inner();
        let key = inner
            .reverse
            .get(session_id)
            .cloned()
            .unwrap_or_else(|| session_id.to_string());
        match inner.entries.get(&key) {
            Some(entry) => snapshot_entry(&key, entry),
            None => CachedChain {
                root_id: key,
                generation: 0,
                chain: None,
                is_loading: false,
                is_stale: false,
                last_error: None,
            },
        }
    }

    /// Root currently associated with a session, if cached
    pub fn root_of(&self, session_id: &str) -> Option<SessionId> {
        self.lock_inner().reverse.get(session_id).cloned()
    }

    /// Stats for the chain containing `session_id`, if resolved
    pub fn stats_for(&self, session_id: &str) -> Option<ChainStats> {
        self.peek(session_id).stats()
    }

    /// Mark the chain containing `id` for recomputation. The previous tree
    /// keeps serving, flagged stale, until the next successful resolution.
    pub fn invalidate(&self, id: &str) {
        let mut inner = self.lock_inner();
        let key = inner.reverse.get(id).cloned().unwrap_or_else(|| id.to_string());
        invalidate_entry(&mut inner, &key);
    }

    /// Invalidate every cached root
    pub fn invalidate_all(&self) {
        let mut inner = self.lock_inner();
        let keys: Vec<SessionId> = inner.entries.keys().cloned().collect();
        for key in keys {
            invalidate_entry(&mut inner, &key);
        }
    }

    /// Drop all cached state (explicit lifecycle call, e.g. a clear-cache
    /// command)
    pub fn clear(&self) {
        let mut inner = self.lock_inner();
        inner.entries.clear();
        inner.reverse.clear();
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.lock_inner();
        let mut stats = CacheStats {
            group_count: inner.entries.len(),
            total_cached: inner.reverse.len(),
            ..CacheStats::default()
        };
        for entry in inner.entries.values() {
            match entry.state {
                EntryState::Stale(_) => stats.stale_count += 1,
                EntryState::Loading => stats.loading_count += 1,
                _ => {}
            }
        }
        stats
    }

    fn spawn_resolution(&self, session_id: SessionId) {
        let source = Arc::clone(&self.source);
        let inner = Arc::clone(&self.inner);
        let events = self.events.clone();
        std::thread::spawn(move || {
            Self::resolve_once(&source, &inner, &events, &session_id);
        });
    }

    /// One resolution pass: snapshot, resolve, publish atomically.
    ///
    /// A pass that was invalidated mid-flight still publishes (the work is
    /// not wasted) but lands as stale, so the staleness flag is never lost.
    fn resolve_once(
        source: &Arc<dyn ChainSource>,
        inner: &Arc<Mutex<CacheInner>>,
        events: &EventBus,
        requested_id: &str,
    ) {
        let snapshot = match source.snapshot() {
            Ok(s) => s,
            Err(e) => {
                let message = e.to_string();
                warn!(session_id = requested_id, error = %message, "resolution failed");
                let mut guard = lock(inner);
                let key = guard
                    .reverse
                    .get(requested_id)
                    .cloned()
                    .unwrap_or_else(|| requested_id.to_string());
                let entry = guard.entries.entry(key.clone()).or_default();
                entry.in_flight = false;
                entry.dirty = false;
                entry.last_error = Some(message.clone());
                // Keep serving earlier data when there is some; otherwise the
                // entry is failed-but-retryable
                entry.state = match std::mem::take(&mut entry.state) {
                    EntryState::Ready(chain) | EntryState::Stale(chain) => {
                        EntryState::Stale(chain)
                    }
                    _ => EntryState::Failed,
                };
                drop(guard);
                events.emit(EngineEvent::ResolutionError {
                    root_id: key,
                    error: message,
                });
                return;
            }
        };

        let root_id = find_root(requested_id, &snapshot);
        let resolved = resolve_chain(&root_id, &snapshot);

        let generation;
        {
            let mut guard = lock(inner);

            if requested_id != root_id {
                // The requested session turned out to be an interior node;
                // its tentative entry is superseded by the real root's
                guard.entries.remove(requested_id);
                guard
                    .reverse
                    .insert(requested_id.to_string(), root_id.clone());
            }

            match resolved {
                Some(chain) => {
                    let chain = Arc::new(chain);
                    let node_ids = collect_ids(&chain.tree);

                    // Swap the tree and its reverse-index slice together
                    guard.reverse.retain(|_, root| *root != root_id);
                    for id in &node_ids {
                        guard.reverse.insert(id.clone(), root_id.clone());
                        if id != &root_id {
                            // A session that used to be its own root was
                            // reattached under this one (healing)
                            guard.entries.remove(id);
                        }
                    }

                    let entry = guard.entries.entry(root_id.clone()).or_default();
                    entry.generation += 1;
                    generation = entry.generation;
                    entry.in_flight = false;
                    entry.last_error = None;
                    entry.state = if entry.dirty {
                        EntryState::Stale(chain)
                    } else {
                        EntryState::Ready(chain)
                    };
                    entry.dirty = false;
                }
                None => {
                    debug!(root_id = %root_id, "no continuation data for root");
                    let entry = guard.entries.entry(root_id.clone()).or_default();
                    entry.generation += 1;
                    generation = entry.generation;
                    entry.in_flight = false;
                    entry.last_error = None;
                    entry.state = EntryState::Missing;
                    entry.dirty = false;
                }
            }
        }

        events.emit(EngineEvent::ResolutionComplete {
            root_id,
            generation,
        });
    }

    fn lock_inner(&self) -> MutexGuard<'_, CacheInner> {
        lock(&self.inner)
    }
}

fn lock(inner: &Mutex<CacheInner>) -> MutexGuard<'_, CacheInner> {
    inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn invalidate_entry(inner: &mut CacheInner, key: &str) {
    let remove = {
        let Some(entry) = inner.entries.get_mut(key) else {
            return;
        };
        match std::mem::take(&mut entry.state) {
            EntryState::Ready(chain) | EntryState::Stale(chain) => {
                entry.state = EntryState::Stale(chain);
                entry.dirty = entry.in_flight;
                false
            }
            EntryState::Loading => {
                entry.state = EntryState::Loading;
                entry.dirty = entry.in_flight;
                false
            }
            EntryState::Missing | EntryState::Failed => {
                // Nothing worth keeping; the next read resolves from scratch
                if entry.in_flight {
                    entry.state = EntryState::Loading;
                    entry.dirty = true;
                    false
                } else {
                    true
                }
            }
        }
    };
    if remove {
        inner.entries.remove(key);
    }
}

fn snapshot_entry(key: &str, entry: &CacheEntry) -> CachedChain {
    let (chain, is_loading, is_stale) = match &entry.state {
        EntryState::Ready(chain) => (Some(Arc::clone(chain)), false, false),
        EntryState::Stale(chain) => (Some(Arc::clone(chain)), false, true),
        EntryState::Loading => (None, true, false),
        EntryState::Missing | EntryState::Failed => (None, false, false),
    };
    CachedChain {
        root_id: key.to_string(),
        generation: entry.generation,
        chain,
        is_loading,
        is_stale,
        last_error: entry.last_error.clone(),
    }
}

fn collect_ids(tree: &ChainNode) -> Vec<SessionId> {
    let mut ids = Vec::new();
    let mut stack: Vec<&ChainNode> = vec![tree];
    while let Some(node) = stack.pop() {
        ids.push(node.session.session_id.clone());
        stack.extend(node.children.iter());
    }
    ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::{Duration, Instant};

    use chainview_core::{ChainSnapshot, ContinuationEdge, SessionMeta};

    struct MemorySource {
        snapshot: Mutex<ChainSnapshot>,
        fail_next: AtomicBool,
    }

    impl MemorySource {
        fn new(snapshot: ChainSnapshot) -> Arc<Self> {
            Arc::new(Self {
                snapshot: Mutex::new(snapshot),
                fail_next: AtomicBool::new(false),
            })
        }

        fn set_snapshot(&self, snapshot: ChainSnapshot) {
            *self.snapshot.lock().unwrap() = snapshot;
        }

        fn fail_next(&self) {
            self.fail_next.store(true, Ordering::SeqCst);
        }
    }

    impl ChainSource for MemorySource {
        fn snapshot(&self) -> Result<ChainSnapshot, StoreError> {
            if self.fail_next.swap(false, Ordering::SeqCst) {
                return Err(StoreError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "session index unavailable",
                )));
            }
            Ok(self.snapshot.lock().unwrap().clone())
        }
    }

    fn meta(id: &str) -> SessionMeta {
        SessionMeta {
            session_id: id.to_string(),
            file_path: format!("/tmp/{}.jsonl", id),
            mtime_ms: 0,
            file_size: 0,
            message_count: 1,
            first_timestamp: None,
            last_timestamp: None,
            indexed_at: "2024-05-01T00:00:00Z".to_string(),
        }
    }

    fn edge(child: &str, parent: &str, order: i64, orphaned: bool) -> ContinuationEdge {
        ContinuationEdge {
            child_id: child.to_string(),
            parent_id: parent.to_string(),
            order,
            split_reason: None,
            split_timestamp: None,
            child_started_at: Some(format!("2024-05-01T10:{:02}:00Z", order)),
            has_child_marker: true,
            has_parent_marker: false,
            is_orphaned: orphaned,
            is_active_continuation: false,
        }
    }

    fn snapshot(ids: &[&str], edges: Vec<ContinuationEdge>) -> ChainSnapshot {
        ChainSnapshot {
            sessions: ids.iter().map(|id| (id.to_string(), meta(id))).collect(),
            edges,
        }
    }

    fn wait_until_settled(cache: &ContinuationCache, id: &str) -> CachedChain {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let chain = cache.peek(id);
            if !chain.is_loading {
                return chain;
            }
            assert!(Instant::now() < deadline, "resolution never settled");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_first_read_is_loading_then_ready() {
        let source = MemorySource::new(snapshot(&["a", "b"], vec![edge("b", "a", 0, false)]));
        let cache = ContinuationCache::new(source, EventBus::new());

        let first = cache.get_or_resolve("a");
        assert!(first.is_loading);
        assert!(first.chain.is_none());

        let settled = wait_until_settled(&cache, "a");
        assert!(!settled.is_stale);
        let stats = settled.stats().unwrap();
        assert_eq!(stats.total_count, 2);
        assert_eq!(stats.max_depth, 1);
    }

    #[test]
    fn test_blocking_resolution_maps_descendants_to_root() {
        let source = MemorySource::new(snapshot(
            &["a", "b", "c"],
            vec![edge("b", "a", 0, false), edge("c", "b", 0, false)],
        ));
        let cache = ContinuationCache::new(source, EventBus::new());

        let resolved = cache.resolve_blocking("c");
        assert_eq!(resolved.root_id, "a");
        assert_eq!(cache.root_of("b").as_deref(), Some("a"));
        assert_eq!(cache.root_of("c").as_deref(), Some("a"));

        // A read through any interior id serves the same root entry
        let via_child = cache.get_or_resolve("b");
        assert_eq!(via_child.root_id, "a");
        assert_eq!(via_child.generation, resolved.generation);
        assert_eq!(cache.stats_for("b").unwrap().total_count, 3);
    }

    #[test]
    fn test_invalidate_serves_stale_until_recomputed() {
        let source = MemorySource::new(snapshot(&["a", "b"], vec![edge("b", "a", 0, false)]));
        let cache = ContinuationCache::new(Arc::clone(&source) as Arc<dyn ChainSource>, EventBus::new());

        let ready = cache.resolve_blocking("a");
        assert!(!ready.is_stale);

        cache.invalidate("a");
        let stale = cache.peek("a");
        assert!(stale.is_stale);
        assert_eq!(stale.stats().unwrap().total_count, 2);
        assert_eq!(stale.generation, ready.generation);

        // Underlying data grew; recomputation picks it up
        source.set_snapshot(snapshot(
            &["a", "b", "c"],
            vec![edge("b", "a", 0, false), edge("c", "a", 1, false)],
        ));
        let fresh = cache.resolve_blocking("a");
        assert!(!fresh.is_stale);
        assert_eq!(fresh.generation, ready.generation + 1);
        assert_eq!(fresh.stats().unwrap().total_count, 3);
        assert!(fresh.tree().unwrap().is_branch_point);
    }

    #[test]
    fn test_noop_invalidation_yields_equal_tree() {
        let source = MemorySource::new(snapshot(&["a", "b"], vec![edge("b", "a", 0, false)]));
        let cache = ContinuationCache::new(source, EventBus::new());

        let first = cache.resolve_blocking("a");
        cache.invalidate("a");
        let second = cache.resolve_blocking("a");

        assert_eq!(
            first.chain.as_deref().unwrap().tree,
            second.chain.as_deref().unwrap().tree
        );
        assert_eq!(first.stats(), second.stats());
    }

    #[test]
    fn test_healing_reattaches_without_touching_other_roots() {
        // x is an orphan root (parent p missing); z is an unrelated root
        let source = MemorySource::new(snapshot(
            &["x", "y", "z"],
            vec![edge("x", "p", 0, true), edge("y", "x", 0, false)],
        ));
        let cache = ContinuationCache::new(Arc::clone(&source) as Arc<dyn ChainSource>, EventBus::new());

        let orphan = cache.resolve_blocking("x");
        assert!(orphan.tree().unwrap().is_orphan_root);
        let other = cache.resolve_blocking("z");
        let other_generation = other.generation;

        // p appears and the edge heals
        source.set_snapshot(snapshot(
            &["p", "x", "y", "z"],
            vec![edge("x", "p", 0, false), edge("y", "x", 0, false)],
        ));
        cache.invalidate("x");
        let healed = cache.resolve_blocking("x");

        assert_eq!(healed.root_id, "p");
        assert!(!healed.tree().unwrap().is_orphan_root);
        assert_eq!(healed.stats().unwrap().total_count, 3);
        assert_eq!(cache.root_of("x").as_deref(), Some("p"));
        assert_eq!(cache.root_of("y").as_deref(), Some("p"));

        // The unrelated root was not rebuilt
        assert_eq!(cache.peek("z").generation, other_generation);
        assert_eq!(cache.root_of("z").as_deref(), Some("z"));
    }

    #[test]
    fn test_reverse_index_survives_sibling_invalidation() {
        let source = MemorySource::new(snapshot(
            &["a", "b", "r", "s"],
            vec![edge("b", "a", 0, false), edge("s", "r", 0, false)],
        ));
        let cache = ContinuationCache::new(source, EventBus::new());

        cache.resolve_blocking("a");
        cache.resolve_blocking("r");

        cache.invalidate("a");
        // The sibling root's mappings are untouched during the recompute window
        assert_eq!(cache.root_of("s").as_deref(), Some("r"));
        assert_eq!(cache.root_of("b").as_deref(), Some("a"));
        assert!(!cache.peek("r").is_stale);
    }

    #[test]
    fn test_failure_keeps_entry_retryable() {
        let source = MemorySource::new(snapshot(&["a"], vec![]));
        let cache = ContinuationCache::new(Arc::clone(&source) as Arc<dyn ChainSource>, EventBus::new());

        source.fail_next();
        let failed = cache.resolve_blocking("a");
        assert!(failed.chain.is_none());
        assert!(failed.last_error.is_some());

        // Next read retries and succeeds
        let retried = cache.resolve_blocking("a");
        assert!(retried.last_error.is_none());
        assert!(retried.chain.is_some());
    }

    #[test]
    fn test_failure_after_data_serves_stale_with_error() {
        let source = MemorySource::new(snapshot(&["a", "b"], vec![edge("b", "a", 0, false)]));
        let cache = ContinuationCache::new(Arc::clone(&source) as Arc<dyn ChainSource>, EventBus::new());

        cache.resolve_blocking("a");
        cache.invalidate("a");
        source.fail_next();
        let after_failure = cache.resolve_blocking("a");

        assert!(after_failure.is_stale);
        assert!(after_failure.last_error.is_some());
        assert_eq!(after_failure.stats().unwrap().total_count, 2);
    }

    #[test]
    fn test_unknown_session_is_missing_not_error() {
        let source = MemorySource::new(snapshot(&["a"], vec![]));
        let cache = ContinuationCache::new(source, EventBus::new());

        let missing = cache.resolve_blocking("nope");
        assert!(missing.is_missing());
        assert!(missing.last_error.is_none());
    }

    #[test]
    fn test_resolution_events_emitted() {
        let bus = EventBus::new();
        let sub = bus.subscribe();
        let source = MemorySource::new(snapshot(&["a", "b"], vec![edge("b", "a", 0, false)]));
        let cache = ContinuationCache::new(Arc::clone(&source) as Arc<dyn ChainSource>, bus);

        cache.resolve_blocking("b");
        source.fail_next();
        cache.invalidate("a");
        cache.resolve_blocking("a");

        let events = sub.drain();
        assert!(events.iter().any(|e| matches!(
            e,
            EngineEvent::ResolutionComplete { root_id, .. } if root_id == "a"
        )));
        assert!(events.iter().any(|e| matches!(
            e,
            EngineEvent::ResolutionError { root_id, .. } if root_id == "a"
        )));
    }

    #[test]
    fn test_cache_stats() {
        let source = MemorySource::new(snapshot(
            &["a", "b", "r"],
            vec![edge("b", "a", 0, false)],
        ));
        let cache = ContinuationCache::new(source, EventBus::new());

        cache.resolve_blocking("a");
        cache.resolve_blocking("r");
        cache.invalidate("a");

        let stats = cache.stats();
        assert_eq!(stats.group_count, 2);
        assert_eq!(stats.total_cached, 3);
        assert_eq!(stats.stale_count, 1);
        assert_eq!(stats.loading_count, 0);

        cache.clear();
        assert_eq!(cache.stats(), CacheStats::default());
    }
}
