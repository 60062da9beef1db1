//! The trained ensemble and its scoring surface.
//!
//! [`TrainedEnsemble::train`] runs the whole training phase once: normalizer
//! fit, model bank, one scale mapping per model. The result is immutable and
//! can be shared across threads; every scoring call only reads it.
//!
//! A record's score is the unweighted mean of the ranks its standardized
//! vector receives from every model in the bank. A label missing from a
//! model's mapping aborts that record with `ScaleError::Mapping`; the rest of
//! a batch is scored normally.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::bank::{ExcludedModel, FittedModel, ModelBank};
use crate::clustering::ModelKind;
use crate::config::SeverityConfig;
use crate::error::{ScaleError, ScaleResult};
use crate::normalizer::NormalizerState;
use crate::scale::{GroupRank, ScaleMapping};
use crate::schema::FeatureRecord;

/// Record identity used when scoring a bare value vector.
const RAW_VALUES_ID: &str = "<values>";

/// Render a score for display, e.g. `7.33/10`.
pub fn format_score(score: f64, precision: usize, k: usize) -> String {
    format!("{:.*}/{}", precision, score, k)
}

/// One model's contribution to a record's score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelVote {
    pub model: ModelKind,
    pub label: usize,
    pub rank: usize,
    /// Whether the label came from native prediction or the centroid fallback.
    pub native_predict: bool,
}

/// Per-model labels and ranks behind one score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub record: String,
    pub votes: Vec<ModelVote>,
    pub score: f64,
}

/// One model's mapping as reported by [`TrainedEnsemble::summary`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSummary {
    pub model: ModelKind,
    pub native_predict: bool,
    pub observed_groups: usize,
    /// Groups in ascending rank order.
    pub groups: Vec<GroupRank>,
}

/// Serializable description of a trained ensemble.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSummary {
    pub id: Uuid,
    pub trained_at: DateTime<Utc>,
    pub n_samples: usize,
    pub n_groups: usize,
    pub seed: u64,
    pub features: Vec<String>,
    pub severity_indicators: Vec<String>,
    pub models: Vec<ModelSummary>,
    pub excluded: Vec<ExcludedModel>,
}

impl TrainingSummary {
    /// Pretty JSON.
    pub fn to_json(&self) -> ScaleResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Normalizer, model bank and mappings from one training run.
#[derive(Debug)]
pub struct TrainedEnsemble {
    id: Uuid,
    trained_at: DateTime<Utc>,
    config: SeverityConfig,
    normalizer: NormalizerState,
    bank: ModelBank,
    mappings: Vec<ScaleMapping>,
}

impl TrainedEnsemble {
    /// Train on `corpus`.
    ///
    /// # Errors
    ///
    /// - `Config` if `config` is invalid
    /// - `Schema` if a training record does not match the schema
    /// - `Data` if the corpus is empty or has a constant dimension
    /// - `EmptyBank` if every model failed
    pub fn train(config: &SeverityConfig, corpus: &[FeatureRecord]) -> ScaleResult<Self> {
        config.validate()?;
        let started = std::time::Instant::now();

        tracing::info!(
            "Training severity ensemble: {} records, K={}, seed={}, models={:?}",
            corpus.len(),
            config.training.n_groups,
            config.training.seed,
            config.training.models.iter().map(|m| m.name()).collect::<Vec<_>>()
        );

        let normalizer = NormalizerState::fit(&config.schema, corpus)?;
        let data = normalizer.transform(corpus)?;

        let bank = ModelBank::train_all(&data, &config.training, &config.models)?;

        let indices = config.schema.severity_indices();
        let mappings = bank
            .iter()
            .map(|m| ScaleMapping::build_mapping(m.model(), &data, &indices))
            .collect::<ScaleResult<Vec<_>>>()?;

        tracing::info!(
            "Ensemble trained in {:?}: {} of {} models in bank",
            started.elapsed(),
            bank.len(),
            config.training.models.len()
        );

        Ok(Self {
            id: Uuid::new_v4(),
            trained_at: Utc::now(),
            config: config.clone(),
            normalizer,
            bank,
            mappings,
        })
    }

    /// Score a batch; each record succeeds or fails on its own.
    pub fn score(&self, records: &[FeatureRecord]) -> Vec<ScaleResult<f64>> {
        records
            .iter()
            .map(|r| {
                let result = self.score_one(r);
                if let Err(e) = &result {
                    tracing::warn!("Scoring failed for record '{}': {}", r.id, e);
                }
                result
            })
            .collect()
    }

    /// Score one record.
    ///
    /// # Errors
    ///
    /// `Schema` if the record does not match the schema, `Mapping` if a model
    /// yields a label without a rank.
    pub fn score_one(&self, record: &FeatureRecord) -> ScaleResult<f64> {
        Ok(self.explain(record)?.score)
    }

    /// Score a raw vector in schema order.
    ///
    /// # Errors
    ///
    /// As [`TrainedEnsemble::score_one`].
    pub fn score_values(&self, values: &[f64]) -> ScaleResult<f64> {
        let z = self.normalizer.transform_values(RAW_VALUES_ID, values)?;
        Ok(self.breakdown(RAW_VALUES_ID, z)?.score)
    }

    /// Score one record and report every model's label and rank.
    ///
    /// # Errors
    ///
    /// As [`TrainedEnsemble::score_one`].
    pub fn explain(&self, record: &FeatureRecord) -> ScaleResult<ScoreBreakdown> {
        let z = self.normalizer.transform_one(record)?;
        self.breakdown(&record.id, z)
    }

    fn breakdown(&self, record: &str, z: Vec<f64>) -> ScaleResult<ScoreBreakdown> {
        let point = [z];
        let mut votes = Vec::with_capacity(self.mappings.len());

        for (model, mapping) in self.bank.iter().zip(self.mappings.iter()) {
            let label = Self::label_for(model, &point, record)?;
            let rank = mapping.rank(label).ok_or_else(|| ScaleError::Mapping {
                record: record.to_string(),
                model: model.name().to_string(),
                label,
            })?;
            votes.push(ModelVote {
                model: model.kind(),
                label,
                rank,
                native_predict: model.native_predict(),
            });
        }

        let score = votes.iter().map(|v| v.rank as f64).sum::<f64>() / votes.len() as f64;
        Ok(ScoreBreakdown {
            record: record.to_string(),
            votes,
            score,
        })
    }

    fn label_for(model: &FittedModel, point: &[Vec<f64>], record: &str) -> ScaleResult<usize> {
        let labels = model.assign_new(point).map_err(|e| {
            ScaleError::schema(record, format!("model '{}' cannot assign: {}", model.name(), e))
        })?;
        labels.first().copied().ok_or_else(|| ScaleError::Mapping {
            record: record.to_string(),
            model: model.name().to_string(),
            label: usize::MAX,
        })
    }

    /// Scale mappings in bank order.
    pub fn mappings(&self) -> &[ScaleMapping] {
        &self.mappings
    }

    /// Names of the models in the bank, in bank order.
    pub fn model_names(&self) -> Vec<&'static str> {
        self.bank.iter().map(|m| m.name()).collect()
    }

    pub fn bank(&self) -> &ModelBank {
        &self.bank
    }

    pub fn normalizer(&self) -> &NormalizerState {
        &self.normalizer
    }

    pub fn config(&self) -> &SeverityConfig {
        &self.config
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn trained_at(&self) -> DateTime<Utc> {
        self.trained_at
    }

    /// Target group count K.
    pub fn n_groups(&self) -> usize {
        self.config.training.n_groups
    }

    /// Display form of `score` using the configured precision.
    pub fn display(&self, score: f64) -> String {
        format_score(score, self.config.output.precision, self.n_groups())
    }

    /// Per-model groups, severity indices and ranks.
    pub fn summary(&self) -> TrainingSummary {
        let models = self
            .bank
            .iter()
            .zip(self.mappings.iter())
            .map(|(model, mapping)| ModelSummary {
                model: model.kind(),
                native_predict: model.native_predict(),
                observed_groups: mapping.len(),
                groups: mapping.groups().to_vec(),
            })
            .collect();

        TrainingSummary {
            id: self.id,
            trained_at: self.trained_at,
            n_samples: self.normalizer.n_samples(),
            n_groups: self.n_groups(),
            seed: self.config.training.seed,
            features: self.config.schema.features.clone(),
            severity_indicators: self.config.schema.severity_indicators.clone(),
            models,
            excluded: self.bank.excluded().to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FeatureSchema;

    fn small_config() -> SeverityConfig {
        let mut config = SeverityConfig::default();
        config.schema = FeatureSchema::new(["q1", "q2", "w1"], ["q1", "q2"]).unwrap();
        config.training.n_groups = 3;
        config
    }

    fn corpus() -> Vec<FeatureRecord> {
        let mut records = Vec::new();
        for c in 0..3 {
            for i in 0..6 {
                let base = c as f64 * 4.0;
                let o = (i as f64 - 2.5) * 0.1;
                records.push(
                    FeatureRecord::new(format!("r{}-{}", c, i))
                        .with_value("q1", base + o)
                        .with_value("q2", base - o)
                        .with_value("w1", c as f64 + (i % 3) as f64 * 0.02),
                );
            }
        }
        records
    }

    #[test]
    fn test_format_score() {
        assert_eq!(format_score(7.3333, 2, 10), "7.33/10");
        assert_eq!(format_score(10.0, 0, 10), "10/10");
    }

    #[test]
    fn test_most_severe_group_scores_top() {
        let ensemble = TrainedEnsemble::train(&small_config(), &corpus()).unwrap();
        assert_eq!(ensemble.model_names().len(), 6);

        let severe = FeatureRecord::new("q")
            .with_value("q1", 8.0)
            .with_value("q2", 8.0)
            .with_value("w1", 2.02);
        let mild = FeatureRecord::new("m")
            .with_value("q1", 0.0)
            .with_value("q2", 0.0)
            .with_value("w1", 0.02);

        let top = ensemble.score_one(&severe).unwrap();
        let bottom = ensemble.score_one(&mild).unwrap();
        assert!((top - 3.0).abs() < 1e-9, "top={}", top);
        assert!((bottom - 1.0).abs() < 1e-9, "bottom={}", bottom);
        assert_eq!(ensemble.score_values(&[8.0, 8.0, 2.02]).unwrap(), top);

        println!(
            "[PASS] test_most_severe_group_scores_top - severe={}, mild={}",
            ensemble.display(top),
            ensemble.display(bottom)
        );
    }

    #[test]
    fn test_explain_lists_every_model() {
        let ensemble = TrainedEnsemble::train(&small_config(), &corpus()).unwrap();
        let records = corpus();
        let record = &records[7];
        let breakdown = ensemble.explain(record).unwrap();
        assert_eq!(breakdown.votes.len(), ensemble.bank().len());
        let mean = breakdown.votes.iter().map(|v| v.rank as f64).sum::<f64>()
            / breakdown.votes.len() as f64;
        assert_eq!(breakdown.score, mean);
        assert_eq!(breakdown.record, record.id);
    }

    #[test]
    fn test_unmapped_label_aborts_only_that_record() {
        let mut ensemble = TrainedEnsemble::train(&small_config(), &corpus()).unwrap();
        let records = corpus();

        let victim = &records[0];
        let votes = ensemble.explain(victim).unwrap().votes;
        let kmeans_label = votes
            .iter()
            .find(|v| v.model == ModelKind::KMeans)
            .map(|v| v.label)
            .unwrap();
        ensemble.mappings[0].forget_label(kmeans_label);

        let results = ensemble.score(&records);
        match &results[0] {
            Err(ScaleError::Mapping { record, model, label }) => {
                assert_eq!(record, &victim.id);
                assert_eq!(model, "kmeans");
                assert_eq!(*label, kmeans_label);
            }
            other => panic!("expected Mapping error, got {:?}", other),
        }
        assert!(results[..6].iter().all(|r| r.is_err()));
        assert!(results[6..].iter().all(|r| r.is_ok()));
    }

    #[test]
    fn test_schema_error_isolated_per_record() {
        let ensemble = TrainedEnsemble::train(&small_config(), &corpus()).unwrap();
        let mut records = corpus();
        records[1].values.remove("w1");

        let results = ensemble.score(&records);
        assert_eq!(results[1].as_ref().unwrap_err().record(), Some("r0-1"));
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), records.len() - 1);
    }

    #[test]
    fn test_summary_serializes() {
        let ensemble = TrainedEnsemble::train(&small_config(), &corpus()).unwrap();
        let summary = ensemble.summary();
        assert_eq!(summary.n_samples, 18);
        assert_eq!(summary.models.len(), 6);
        assert_eq!(summary.id, ensemble.id());

        let json = summary.to_json().unwrap();
        let back: TrainingSummary = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, summary.id);
        assert_eq!(back.models.len(), 6);
        for (a, b) in back.models.iter().zip(summary.models.iter()) {
            assert_eq!(a.model, b.model);
            let ranks = |m: &ModelSummary| m.groups.iter().map(|g| (g.label, g.rank)).collect::<Vec<_>>();
            assert_eq!(ranks(a), ranks(b));
        }
    }

    #[test]
    fn test_invalid_config_rejected_before_training() {
        let mut config = small_config();
        config.training.n_groups = 1;
        assert!(matches!(
            TrainedEnsemble::train(&config, &corpus()),
            Err(ScaleError::Config(_))
        ));
    }
}
