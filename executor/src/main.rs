//! CLI entry point for the weightbridge executor.
//!
//! Exit codes are a load-bearing contract with the scheduler:
//! `0` = intentional completion (pre-submit stop or live submission),
//! `2` = fail-safe halt (expected stop, never retried automatically),
//! `1` = fatal input error or unexpected failure.

use std::path::PathBuf;
use std::process;

use clap::Parser;

use weightbridge_executor::config::Config;
use weightbridge_executor::orchestrator::{self, RunOptions};
use weightbridge_adapter::paper::PaperAdapter;

#[derive(Parser)]
#[command(name = "executor")]
#[command(about = "Dry-run order executor: target weights → order intents → pre-submit stop")]
#[command(version)]
struct Cli {
    /// Path to executor.toml
    #[arg(long, default_value = "executor.toml")]
    config: PathBuf,

    /// Skip confirmation prompt before live submission (for automation/cron)
    #[arg(long)]
    force: bool,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let cli = Cli::parse();

    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading config: {e}");
            process::exit(1);
        }
    };

    let mut adapter = PaperAdapter::new();
    let opts = RunOptions { force: cli.force };

    match orchestrator::run(&config, &mut adapter, &opts) {
        Ok(outcome) => process::exit(outcome.exit_code()),
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}
