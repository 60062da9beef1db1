//! CLI command handlers
//!
//! # Modules
//!
//! - `score`: batch scoring of a CSV table
//! - `predict`: single-record prediction
//! - `summary`: per-model severity mappings

use std::path::Path;

use anyhow::{bail, Context, Result};
use tracing::{info, warn};

use severity_core::{FeatureRecord, SeverityConfig, TrainedEnsemble};

use crate::dataset::Dataset;

pub mod predict;
pub mod score;
pub mod summary;

/// A CSV table, its records and the ensemble trained on them.
pub struct Trained {
    pub dataset: Dataset,
    pub records: Vec<FeatureRecord>,
    pub ensemble: TrainedEnsemble,
}

/// Read `path` and train on every row that matches the schema.
///
/// Rows that do not match are left out of training with a warning; they are
/// still part of `records` and fail on their own when scored.
pub fn train_from_csv(path: &Path, config: &SeverityConfig) -> Result<Trained> {
    let dataset = Dataset::read(path)?;
    if dataset.is_empty() {
        bail!("{} has no data rows", path.display());
    }
    let records = dataset.records(&config.schema)?;

    let corpus: Vec<FeatureRecord> = records
        .iter()
        .filter(|r| match config.schema.project(r) {
            Ok(_) => true,
            Err(e) => {
                warn!("Leaving record out of training: {}", e);
                false
            }
        })
        .cloned()
        .collect();
    info!(
        "Training on {} of {} rows from {}",
        corpus.len(),
        records.len(),
        path.display()
    );

    let ensemble = TrainedEnsemble::train(config, &corpus)
        .with_context(|| format!("Training on {} failed", path.display()))?;

    Ok(Trained {
        dataset,
        records,
        ensemble,
    })
}
