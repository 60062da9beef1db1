//! Per-dimension standardization.
//!
//! `fit` computes the mean and population standard deviation of every schema
//! dimension over the training corpus; `transform` applies `(x - mean) / std`.
//! The fitted state is immutable and shared by training and every inference
//! call.

use serde::{Deserialize, Serialize};

use crate::error::{ScaleError, ScaleResult};
use crate::schema::{FeatureRecord, FeatureSchema};

/// Relative spread below which a dimension counts as constant.
const ZERO_VARIANCE_EPS: f64 = 1e-12;

/// Fitted standardization parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizerState {
    schema: FeatureSchema,
    mean: Vec<f64>,
    std: Vec<f64>,
    n_samples: usize,
}

impl NormalizerState {
    /// Fit on a corpus of records.
    ///
    /// # Errors
    ///
    /// - `Schema` for the first record that does not match `schema`
    /// - `Data` if the corpus is empty or a dimension has zero variance
    pub fn fit(schema: &FeatureSchema, corpus: &[FeatureRecord]) -> ScaleResult<Self> {
        let rows = corpus
            .iter()
            .map(|r| schema.project(r))
            .collect::<ScaleResult<Vec<_>>>()?;
        Self::fit_rows(schema, &rows)
    }

    /// Fit on rows already in schema order.
    ///
    /// # Errors
    ///
    /// `Data` if `rows` is empty, ragged, or a dimension has zero variance.
    pub fn fit_rows(schema: &FeatureSchema, rows: &[Vec<f64>]) -> ScaleResult<Self> {
        if rows.is_empty() {
            return Err(ScaleError::data("training corpus is empty"));
        }
        let dim = schema.len();
        if let Some(i) = rows.iter().position(|r| r.len() != dim) {
            return Err(ScaleError::data(format!(
                "training row {} has {} values, schema has {}",
                i,
                rows[i].len(),
                dim
            )));
        }

        let n = rows.len() as f64;
        let mut mean = vec![0.0; dim];
        for row in rows {
            for (m, v) in mean.iter_mut().zip(row.iter()) {
                *m += v;
            }
        }
        for m in &mut mean {
            *m /= n;
        }

        let mut var = vec![0.0; dim];
        for row in rows {
            for ((s, v), m) in var.iter_mut().zip(row.iter()).zip(mean.iter()) {
                *s += (v - m) * (v - m);
            }
        }
        let std: Vec<f64> = var.iter().map(|s| (s / n).sqrt()).collect();

        let constant: Vec<&str> = schema
            .features()
            .iter()
            .zip(std.iter().zip(mean.iter()))
            .filter(|(_, (s, m))| !(**s > ZERO_VARIANCE_EPS * m.abs().max(1.0)))
            .map(|(f, _)| f.as_str())
            .collect();
        if !constant.is_empty() {
            return Err(ScaleError::data(format!(
                "zero variance in dimensions [{}]",
                constant.join(", ")
            )));
        }

        tracing::debug!("Normalizer fitted on {} rows, {} dimensions", rows.len(), dim);

        Ok(Self {
            schema: schema.clone(),
            mean,
            std,
            n_samples: rows.len(),
        })
    }

    /// Standardize every record; fails on the first schema mismatch.
    ///
    /// # Errors
    ///
    /// `Schema` naming the offending record.
    pub fn transform(&self, records: &[FeatureRecord]) -> ScaleResult<Vec<Vec<f64>>> {
        records.iter().map(|r| self.transform_one(r)).collect()
    }

    /// Standardize one record.
    ///
    /// # Errors
    ///
    /// `Schema` if the record does not match the fitted schema.
    pub fn transform_one(&self, record: &FeatureRecord) -> ScaleResult<Vec<f64>> {
        let values = self.schema.project(record)?;
        Ok(self.apply(&values))
    }

    /// Standardize a raw vector in schema order.
    ///
    /// # Errors
    ///
    /// `Schema` if the length differs from the schema or a value is not finite.
    pub fn transform_values(&self, record: &str, values: &[f64]) -> ScaleResult<Vec<f64>> {
        self.schema.check_values(record, values)?;
        Ok(self.apply(values))
    }

    fn apply(&self, values: &[f64]) -> Vec<f64> {
        values
            .iter()
            .zip(self.mean.iter().zip(self.std.iter()))
            .map(|(x, (m, s))| (x - m) / s)
            .collect()
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    /// Population standard deviation per dimension.
    pub fn std(&self) -> &[f64] {
        &self.std
    }

    pub fn n_samples(&self) -> usize {
        self.n_samples
    }
}
