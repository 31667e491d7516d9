//! Tree command - render the resolved chain for a session

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
                println!("  (retried on next read)");
                return Ok(());
            }
            let Some(tree) = chain.tree() else {
                println!("No continuation data available for {}", session);
                return Ok(());
            };

            let mut title = format!("Chain {}", colors::session(&chain.root_id));
            if chain.is_stale {
                title.push_str(&format!(" {}", colors::stale_marker()));
            }
            println!("{}", colors::header(&title));
            println!();
            print!("{}", human::render_tree(tree));

            if let Some(stats) = chain.stats() {
                println!();
                println!("{}", human::format_stats(&stats));
            }
            if let Some(resolved) = chain.chain.as_deref() {
                if !resolved.warnings.is_empty() {
                    println!();
                    println!(
                        "{}",
                        colors::warning(&format!(
                            "{} integrity warnings (edges dropped)",
                            resolved.warnings.len()
                        ))
                    );
                }
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&json::chain_to_json(&chain))?);
        }
    }

    Ok(())
}
