//! Mapping summary command

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use severity_core::{SeverityConfig, TrainingSummary};

use super::train_from_csv;

/// Arguments for the summary command.
#[derive(Args)]
pub struct SummaryArgs {
    /// CSV table to train on
    #[arg(short, long)]
    pub train: PathBuf,

    /// Output as JSON instead of human-readable
    #[arg(long)]
    pub json: bool,
}

/// Handle the summary command.
pub fn handle_summary(args: SummaryArgs, config: &SeverityConfig) -> Result<()> {
    let trained = train_from_csv(&args.train, config)?;
    let summary = trained.ensemble.summary();

    if args.json {
        println!("{}", summary.to_json()?);
    } else {
        print_summary(&summary);
    }
    Ok(())
}

fn print_summary(summary: &TrainingSummary) {
    println!("Ensemble {} trained {}", summary.id, summary.trained_at.to_rfc3339());
    println!(
        "  {} samples, K={}, seed={}, indicators: {}",
        summary.n_samples,
        summary.n_groups,
        summary.seed,
        summary.severity_indicators.join(", ")
    );

    for model in &summary.models {
        println!();
        println!(
            "{} ({} groups, {})",
            model.model,
            model.observed_groups,
            if model.native_predict { "native predict" } else { "nearest-centroid fallback" }
        );
        for group in &model.groups {
            println!(
                "  rank {:>2}  label {:>3}  size {:>5}  severity {:>8.3}",
                group.rank, group.label, group.size, group.severity_index
            );
        }
    }

    for excluded in &summary.excluded {
        println!();
        println!("{} excluded: {}", excluded.model, excluded.reason);
    }
}
