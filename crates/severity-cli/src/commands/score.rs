//! Batch scoring command
//!
//! Trains on the input table, scores every row and writes the table back
//! with the score column. Rows that fail scoring get an empty cell.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use tracing::info;

use severity_core::SeverityConfig;

use super::train_from_csv;

/// Arguments for the score command.
#[derive(Args)]
pub struct ScoreArgs {
    /// CSV table to train on and score
    #[arg(short, long)]
    pub input: PathBuf,

    /// Where to write the scored table (default: overwrite the input)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Handle the score command.
pub fn handle_score(args: ScoreArgs, config: &SeverityConfig) -> Result<()> {
    let mut trained = train_from_csv(&args.input, config)?;
    let precision = config.output.precision;

    let results = trained.ensemble.score(&trained.records);
    let scored = results.iter().filter(|r| r.is_ok()).count();
    let cells: Vec<String> = results
        .into_iter()
        .map(|r| match r {
            Ok(score) => format!("{:.*}", precision, score),
            Err(_) => String::new(),
        })
        .collect();

    trained.dataset.set_column(&config.output.score_column, cells)?;

    let output = args.output.as_ref().unwrap_or(&args.input);
    trained.dataset.write(output)?;

    info!(
        "Scored {} of {} rows into column '{}' of {}",
        scored,
        trained.records.len(),
        config.output.score_column,
        output.display()
    );
    println!(
        "Scored {}/{} rows -> {}",
        scored,
        trained.records.len(),
        output.display()
    );
    Ok(())
}
