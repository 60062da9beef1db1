//! Single-record prediction command

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::Args;

use severity_core::{FeatureRecord, SeverityConfig};

use super::train_from_csv;

/// Arguments for the predict command.
#[derive(Args)]
pub struct PredictArgs {
    /// CSV table to train on
    #[arg(short, long)]
    pub train: PathBuf,

    /// Feature value as name=value; repeat for every feature
    #[arg(long = "value", value_name = "NAME=VALUE", required = true)]
    pub values: Vec<String>,

    /// Also print each model's label and rank
    #[arg(long)]
    pub explain: bool,

    /// Output as JSON instead of human-readable
    #[arg(long)]
    pub json: bool,
}

/// Parse `name=value` pairs into a record.
pub fn parse_values(pairs: &[String]) -> Result<FeatureRecord> {
    let mut record = FeatureRecord::new("query");
    for pair in pairs {
        let (name, value) = pair
            .split_once('=')
            .ok_or_else(|| anyhow!("expected NAME=VALUE, got '{}'", pair))?;
        let value: f64 = value
            .trim()
            .parse()
            .with_context(|| format!("value for '{}' is not a number", name.trim()))?;
        if record.values.insert(name.trim().to_string(), value).is_some() {
            return Err(anyhow!("feature '{}' given more than once", name.trim()));
        }
    }
    Ok(record)
}

/// Handle the predict command.
pub fn handle_predict(args: PredictArgs, config: &SeverityConfig) -> Result<()> {
    let record = parse_values(&args.values)?;
    let trained = train_from_csv(&args.train, config)?;
    let breakdown = trained.ensemble.explain(&record)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&breakdown)?);
        return Ok(());
    }

    if args.explain {
        for vote in &breakdown.votes {
            println!(
                "  {:<13} label {:>3} -> rank {:>2}{}",
                vote.model.name(),
                vote.label,
                vote.rank,
                if vote.native_predict { "" } else { " (nearest centroid)" }
            );
        }
    }
    println!("{}", trained.ensemble.display(breakdown.score));
    Ok(())
}
