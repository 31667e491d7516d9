//! Scan command - rebuild the continuation index

use std::time::Duration;

use anyhow::{anyhow, Result};

use chainview_engine::{full_scan, EngineEvent, EventBus};

use crate::cli::{Cli, OutputFormat};
use crate::output::colors;

pub fn run(cli: &Cli) -> Result<()> {
    let mut store = super::open_store(cli)?;
    let dir = super::transcripts_dir(cli);
    let bus = EventBus::new();
    let sub = bus.subscribe();

    let scan_bus = bus.clone();
    let scan_dir = dir.clone();
    let human = matches!(cli.format, OutputFormat::Human);
    let handle = std::thread::spawn(move || full_scan(&mut store, &scan_dir, &scan_bus));

    loop {
        if let Some(EngineEvent::ScanProgress {
            current,
            total,
            batch,
            total_batches,
        }) = sub.recv_timeout(Duration::from_millis(100))
        {
            if human {
                eprintln!(
                    "  scanned {}/{} transcripts (batch {}/{})",
                    current, total, batch, total_batches
                );
            }
        }
        if handle.is_finished() {
            break;
        }
    }

    let report = handle
        .join()
        .map_err(|_| anyhow!("scan thread panicked"))??;

    match cli.format {
        OutputFormat::Human => {
            println!("{}", colors::header("Scan complete"));
            println!();
            println!("  {}: {}", colors::label("Directory"), dir.display());
            println!("  {}: {}", colors::label("Transcripts"), report.processed);
            println!("  {}: {}", colors::label("Edges"), report.edge_count);
            println!("  {}: {}", colors::label("Orphaned"), report.orphan_count);
            if report.errored > 0 {
                println!();
                println!(
                    "{}",
                    colors::warning(&format!("{} transcripts could not be read:", report.errored))
                );
                for failure in &report.failures {
                    println!("  {}: {}", failure.path.display(), failure.message);
                }
            } else {
                println!();
                println!("{}", colors::success("All transcripts scanned"));
            }
        }
        OutputFormat::Json => {
            let failures: Vec<serde_json::Value> = report
                .failures
                .iter()
                .map(|f| {
                    serde_json::json!({
                        "path": f.path.to_string_lossy(),
                        "message": f.message,
                    })
                })
                .collect();
            let output = serde_json::json!({
                "directory": dir.to_string_lossy(),
                "processed": report.processed,
                "errored": report.errored,
                "edge_count": report.edge_count,
                "orphan_count": report.orphan_count,
                "failures": failures,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}
