//! chainview - CLI for browsing continuation chains

mod cli;
mod commands;
mod output;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Command::Scan => commands::scan::run(&cli),
        Command::List { limit, orphans } => commands::list::run(&cli, *limit, *orphans),
        Command::Tree { session } => commands::tree::run(&cli, session),
        Command::Path { target, budget } => commands::path::run(&cli, target, *budget),
        Command::Stats { session } => commands::stats::run(&cli, session),
        Command::Watch => commands::watch::run(&cli),
    }
}
