//! Path command - breadcrumb from root to a session

use std::sync::{Arc, Mutex};

use anyhow::Result;

use chainview_core::projection::{collapse_path, linear_path};
use chainview_engine::EventBus;

use crate::cli::{Cli, OutputFormat};
use crate::output::{colors, human, json};

pub fn run(cli: &Cli, target: &str, budget: usize) -> Result<()> {
    let store = Arc::new(Mutex::new(super::open_store(cli)?));
    let cache = super::build_cache(store, &EventBus::new());
    let chain = cache.resolve_blocking(target);

    let Some(tree) = chain.tree() else {
        match cli.format {
            OutputFormat::Human => {
                println!("No continuation data available for {}", target)
            }
            OutputFormat::Json => println!("null"),
        }
        return Ok(());
    };

    let Some(path) = linear_path(tree, target) else {
        match cli.format {
            OutputFormat::Human => println!(
                "{}",
                colors::error(&format!("{} is not part of chain {}", target, chain.root_id))
            ),
            OutputFormat::Json => println!("null"),
        }
        return Ok(());
    };

    let segments = collapse_path(&path, budget);

    match cli.format {
        OutputFormat::Human => {
            println!("{}", human::format_breadcrumb(&segments));
            if !path.branch_points.is_empty() {
                println!(
                    "  {} {}",
                    colors::label("branch points crossed:"),
                    path.branch_points.join(", ")
                );
            }
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "root_id": chain.root_id,
                "target": target,
                "length": path.steps.len(),
                "branch_points": path.branch_points,
                "segments": json::segments_to_json(&segments),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}
