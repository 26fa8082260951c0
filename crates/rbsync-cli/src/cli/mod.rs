//! CLI command definitions and handlers.

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

pub mod commands;

/// Keep review requests in step with the changelists a build picks up
#[derive(Parser, Debug)]
#[command(name = "rbsync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Print JSON instead of concise text
    #[arg(long, global = true)]
    pub json: bool,

    /// Settings file (default: <root>/.rbsync/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Workspace root holding the .rbsync directory (default: current directory)
    #[arg(long, global = true, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Raise log verbosity (-v debug, -vv trace); RUST_LOG takes precedence
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create or update review requests for a build's changelist
    Reconcile {
        /// JSON file of changelist entries ("-" reads stdin)
        #[arg(long, value_name = "FILE")]
        changes: PathBuf,

        /// Build number to record under (default: next after the latest)
        #[arg(long)]
        build: Option<u64>,

        /// Decide and report without running post-review or recording
        #[arg(long)]
        dry_run: bool,
    },

    /// List recorded review outcomes, newest build first
    History {
        /// Only outcomes for this correlation key
        #[arg(long)]
        key: Option<String>,

        /// Show at most this many outcomes
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Find the review request an update would target for a key
    Find {
        /// Correlation key
        key: String,
    },

    /// Search review system users
    Users {
        /// Name fragment
        query: String,
    },

    /// Search review system groups
    Groups {
        /// Name fragment
        query: String,
    },

    /// Check settings, the post-review tool, the ledger, and default reviewers
    Doctor,

    /// Discard all but the newest build records
    Prune {
        /// Number of builds to keep
        #[arg(long)]
        keep: usize,
    },
}
