//! CLI argument definitions

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// CLI for browsing continuation chains across session transcripts
#[derive(Parser, Debug)]
#[command(name = "chainview")]
#[command(version)]
#[command(about = "Browse continuation chains across session transcripts")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Custom database path
    #[arg(long, global = true, env = "CHAINVIEW_DB_PATH")]
    pub db_path: Option<PathBuf>,

    /// Transcript directory to scan and watch
    #[arg(long, short = 'd', global = true, env = "CHAINVIEW_TRANSCRIPTS_DIR")]
    pub dir: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "human")]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Command,
}

/// Output format for commands
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    /// Human-readable output with colors
    #[default]
    Human,
    /// JSON output
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Scan all transcripts and rebuild the continuation index
    Scan,

    /// List chain roots with their statistics
    List {
        /// Number of roots to show
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,

        /// Only roots with a broken parent link
        #[arg(long)]
        orphans: bool,
    },

    /// Show the resolved chain containing a session
    Tree {
        /// Session id (any node of the chain)
        session: String,
    },

    /// Show the root-to-session path as a breadcrumb
    Path {
        /// Target session id
        target: String,

        /// Visible segment budget before the middle collapses
        #[arg(long, default_value = "5")]
        budget: usize,
    },

    /// Show statistics for the chain containing a session
    Stats {
        /// Session id (any node of the chain)
        session: String,
    },

    /// Watch for transcript changes and keep the index current
    Watch,
}
