//! List command - show chain roots with statistics

use anyhow::Result;

use chainview_engine::resolver::{find_root, resolve_chain, ResolvedChain};

use crate::cli::{Cli, OutputFormat};
use crate::output::{colors, human, json};

pub fn run(cli: &Cli, limit: usize, orphans_only: bool) -> Result<()> {
    let mut store = super::open_store(cli)?;
    let snapshot = store.snapshot()?;

    let mut root_ids: Vec<&str> = snapshot
        .sessions
        .keys()
        .map(|id| id.as_str())
        .filter(|id| find_root(id, &snapshot) == *id)
        .collect();
    root_ids.sort_unstable();

    let mut chains: Vec<ResolvedChain> = root_ids
        .iter()
        .filter_map(|id| resolve_chain(id, &snapshot))
        .filter(|chain| !orphans_only || chain.tree.is_orphan_root)
        .collect();

    // Most recently active chains first
    chains.sort_by(|a, b| {
        b.tree
            .session
            .last_timestamp
            .cmp(&a.tree.session.last_timestamp)
    });
    chains.truncate(limit);

    match cli.format {
        OutputFormat::Human => {
            if chains.is_empty() {
                println!("No chains found (run: chainview scan)");
            } else {
                println!("{}", colors::header(&format!("Chains ({})", chains.len())));
                println!();
                for chain in &chains {
                    println!(
                        "{}",
                        human::format_root(
                            &chain.tree.session,
                            &chain.stats,
                            chain.tree.is_orphan_root
                        )
                    );
                }
            }
        }
        OutputFormat::Json => {
            let items: Vec<serde_json::Value> = chains
                .iter()
                .map(|chain| {
                    json::root_to_json(&chain.tree.session, &chain.stats, chain.tree.is_orphan_root)
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&items)?);
        }
    }

    Ok(())
}
