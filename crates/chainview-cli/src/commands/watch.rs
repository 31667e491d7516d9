//! Watch command - keep the index and cache current as transcripts change

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;

use chainview_engine::{full_scan, watch, EngineEvent, EventBus, WatcherConfig};

use crate::cli::Cli;
use crate::output::colors;

pub fn run(cli: &Cli) -> Result<()> {
    let store = Arc::new(Mutex::new(super::open_store(cli)?));
    let dir = super::transcripts_dir(cli);
    let bus = EventBus::new();
    let sub = bus.subscribe();

    {
        let mut guard = store
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let report = full_scan(&mut guard, &dir, &bus)?;
        println!(
            "{}",
            colors::success(&format!(
                "initial scan: {} transcripts, {} edges, {} orphaned",
                report.processed, report.edge_count, report.orphan_count
            ))
        );
        // Drop initial progress noise before streaming live events
        sub.drain();
    }

    let cache = super::build_cache(Arc::clone(&store), &bus);
    let _handle = watch(
        &dir,
        Arc::clone(&store),
        cache,
        bus.clone(),
        WatcherConfig::default(),
    )?;
    println!("Watching {} (Ctrl+C to stop)", dir.display());

    loop {
        match sub.recv_timeout(Duration::from_millis(500)) {
            Some(EngineEvent::ResolutionComplete {
                root_id,
                generation,
            }) => {
                println!(
                    "  resolved chain {} (generation {})",
                    colors::session(&root_id),
                    generation
                );
            }
            Some(EngineEvent::ResolutionError { root_id, error }) => {
                println!(
                    "{}",
                    colors::error(&format!("chain {} failed: {}", root_id, error))
                );
            }
            Some(EngineEvent::ScanProgress { current, total, .. }) => {
                println!("  rescanned {}/{} transcripts", current, total);
            }
            None => {}
        }
    }
}
