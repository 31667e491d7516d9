//! Command implementations

pub mod list;
pub mod path;
pub mod scan;
pub mod stats;
pub mod tree;
pub mod watch;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Result;

use chainview_engine::{
    default_transcripts_dir, ContinuationCache, EventBus, StoreSource,
};
use chainview_store::ChainStore;

use crate::cli::Cli;

pub(crate) fn open_store(cli: &Cli) -> Result<ChainStore> {
    let store = match &cli.db_path {
        Some(path) => ChainStore::open_or_create(path)?,
        None => ChainStore::open_or_create_default()?,
    };
    Ok(store)
}

pub(crate) fn transcripts_dir(cli: &Cli) -> PathBuf {
    cli.dir.clone().unwrap_or_else(default_transcripts_dir)
}

pub(crate) fn build_cache(store: Arc<Mutex<ChainStore>>, events: &EventBus) -> ContinuationCache {
    ContinuationCache::new(Arc::new(StoreSource::new(store)), events.clone())
}
