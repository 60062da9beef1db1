//! Severity CLI
//!
//! Batch scoring and single-record prediction on top of `severity-core`.
//!
//! # Commands
//!
//! - `score`: train on a CSV, score every row, write the score column back
//! - `predict`: train on a CSV and score one record given on the command line
//! - `summary`: train on a CSV and print each model's severity mapping
//!
//! # Usage
//!
//! ```bash
//! # Score a table in place
//! severity-cli score --input patients.csv
//!
//! # Score into a new file with a custom config
//! severity-cli --config severity.toml score --input patients.csv --output scored.csv
//!
//! # One record
//! severity-cli predict --train patients.csv --value q1=3 --value q2=4 ...
//!
//! # Debug logging
//! RUST_LOG=debug severity-cli summary --train patients.csv
//! ```
//!
//! Configuration comes from `--config <toml>` when given, otherwise from the
//! layered `config/default`, `config/{SEVERITY_ENV}` and `SEVERITY__*` sources.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::{fmt, EnvFilter};

use severity_core::config::LoggingConfig;
use severity_core::SeverityConfig;

mod commands;
mod dataset;

/// Severity CLI - ensemble clustering severity scale
#[derive(Parser)]
#[command(name = "severity-cli")]
#[command(version)]
#[command(about = "Score patient feature tables on an ensemble clustering severity scale")]
#[command(propagate_version = true)]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train on a CSV and write a score column for every row
    Score(commands::score::ScoreArgs),
    /// Train on a CSV and score one record
    Predict(commands::predict::PredictArgs),
    /// Train on a CSV and print the per-model severity mappings
    Summary(commands::summary::SummaryArgs),
}

fn load_config(path: Option<&PathBuf>) -> Result<SeverityConfig> {
    let config = match path {
        Some(path) => SeverityConfig::from_file(path)?,
        None => SeverityConfig::load()?,
    };
    Ok(config)
}

/// `-v` counts win, then `RUST_LOG`, then the configured level.
fn init_logging(verbose: u8, logging: &LoggingConfig) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level)),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    let builder = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr);

    if logging.format == "compact" {
        builder.compact().init();
    } else {
        builder.init();
    }
}

fn main() {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_ref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    };

    init_logging(cli.verbose, &config.logging);

    let result = match cli.command {
        Commands::Score(args) => commands::score::handle_score(args, &config),
        Commands::Predict(args) => commands::predict::handle_predict(args, &config),
        Commands::Summary(args) => commands::summary::handle_summary(args, &config),
    };

    if let Err(e) = result {
        error!("Command failed: {:#}", e);
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
