//! rbsync - keep review requests in step with the changelists a build picks up

use std::env;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;

mod cli;
mod logging;
mod output;

use cli::commands::helpers::load_settings;
use cli::commands::{
    run_doctor, run_find, run_groups, run_history, run_prune, run_reconcile, run_users,
};
use cli::{Cli, Commands};
use output::OutputFormat;

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init_tracing(cli.log_json, cli.verbose);

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(err) => {
            tracing::error!(error = %err, "rbsync failed");
            eprintln!("Error: {err:#}");
            ExitCode::from(2)
        }
    }
}

fn run(cli: Cli) -> Result<bool> {
    let root = match cli.root {
        Some(root) => root,
        None => env::current_dir()?,
    };
    let config = cli.config.as_deref();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    match cli.command {
        Commands::Reconcile {
            changes,
            build,
            dry_run,
        } => {
            let settings = load_settings(&root, config)?;
            run_reconcile(&root, &settings, &changes, build, dry_run, format)
        }
        Commands::History { key, limit } => run_history(&root, key.as_deref(), limit, format),
        Commands::Find { key } => {
            let settings = load_settings(&root, config)?;
            run_find(&root, &settings, &key, format)
        }
        Commands::Users { query } => {
            let settings = load_settings(&root, config)?;
            run_users(&settings, &query, format)
        }
        Commands::Groups { query } => {
            let settings = load_settings(&root, config)?;
            run_groups(&settings, &query, format)
        }
        Commands::Doctor => run_doctor(&root, config, format),
        Commands::Prune { keep } => run_prune(&root, keep, format),
    }
}
