//! Stats command - chain statistics for a session

use std::sync::{Arc, Mutex};

use anyhow::Result;

use chainview_engine::EventBus;

use crate::cli::{Cli, OutputFormat};
use crate::output::{colors, human, json};

pub fn run(cli: &Cli, session: &str) -> Result<()> {
    let store = Arc::new(Mutex::new(super::open_store(cli)?));
    let cache = super::build_cache(store, &EventBus::new());
    let chain = cache.resolve_blocking(session);

    match cli.format {
        OutputFormat::Human => {
            if let Some(error) = &chain.last_error {
                println!("{}", colors::error(&format!("Resolution failed: {}", error)));
                return Ok(());
            }
            let Some(stats) = chain.stats() else {
                println!("No continuation data available for {}", session);
                return Ok(());
            };

            println!(
                "{}",
                colors::header(&format!("Chain {}", colors::session(&chain.root_id)))
            );
            println!();
            println!("{}", human::format_stats(&stats));
            if chain
                .tree()
                .map(|tree| tree.is_orphan_root)
                .unwrap_or(false)
            {
                println!();
                println!("{}", colors::warning("root has a broken parent link"));
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&json::chain_to_json(&chain))?);
        }
    }

    Ok(())
}
