//! chainview-engine - Continuation chain resolution engine
//!
//! This crate owns all **write** operations to the chain store and the
//! resolution pipeline on top of it: transcript discovery, the full/partial
//! scan that maintains the edge list, the pure chain resolver, the root-keyed
//! continuation cache, and the file-watching change notifier that drives
//! cache invalidation.

pub mod cache;
pub mod discovery;
pub mod events;
pub mod notifier;
pub mod resolver;
pub mod scan;

pub use cache::{CacheStats, CachedChain, ChainSource, ContinuationCache, StoreSource};
pub use discovery::{
    default_transcripts_dir, find_transcript_files, locate_transcript, session_id_for_path,
};
pub use events::{EngineEvent, EventBus, Subscription};
pub use notifier::{watch, WatchError, WatchHandle, WatcherConfig};
pub use resolver::{find_root, resolve_chain, ResolveWarning, ResolvedChain};
pub use scan::{full_scan, rescan, ScanReport, SessionScanFailure, PROGRESS_BATCH};
