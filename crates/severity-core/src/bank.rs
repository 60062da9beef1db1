//! Cluster model bank.
//!
//! Fits every model of the configured roster on the standardized corpus. A
//! model that fails is logged at WARN and left out; the bank only fails when
//! nothing trained. Bank order is roster order, with or without rayon.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::assigner::assign_to_centroids;
use crate::clustering::{
    Agglomerative, Birch, ClusterError, ClusterModel, ClusterResult, GaussianMixture,
    GroupCentroids, KMeans, MiniBatchKMeans, ModelKind, Spectral,
};
use crate::config::{ModelsConfig, TrainingConfig};
use crate::error::{ScaleError, ScaleResult};

/// A trained model with its training-group centroids.
#[derive(Debug)]
pub struct FittedModel {
    model: Box<dyn ClusterModel>,
    centroids: GroupCentroids,
}

impl FittedModel {
    /// Wrap a fitted model, checking its labels against the corpus.
    ///
    /// # Errors
    ///
    /// `NumericalFailure` if the model labelled a different number of points
    /// than `data` holds.
    pub fn new(model: Box<dyn ClusterModel>, data: &[Vec<f64>]) -> ClusterResult<Self> {
        if model.training_labels().len() != data.len() {
            return Err(ClusterError::numerical(format!(
                "{} labelled {} of {} training points",
                model.kind(),
                model.training_labels().len(),
                data.len()
            )));
        }
        let centroids = GroupCentroids::compute(data, model.training_labels())?;
        if centroids
            .iter()
            .any(|g| g.centroid.iter().any(|v| !v.is_finite()))
        {
            return Err(ClusterError::numerical(format!(
                "{} produced a non-finite group centroid",
                model.kind()
            )));
        }
        Ok(Self { model, centroids })
    }

    pub fn kind(&self) -> ModelKind {
        self.model.kind()
    }

    pub fn name(&self) -> &'static str {
        self.model.kind().name()
    }

    /// Labels of the training points.
    pub fn assign_existing(&self) -> &[usize] {
        self.model.training_labels()
    }

    /// Labels for new standardized points: native prediction when the model
    /// has it, nearest training centroid otherwise.
    ///
    /// # Errors
    ///
    /// `DimensionMismatch` if a point has the wrong dimension.
    pub fn assign_new(&self, points: &[Vec<f64>]) -> ClusterResult<Vec<usize>> {
        if self.model.supports_predict() {
            self.model.predict(points)
        } else {
            assign_to_centroids(&self.centroids, points)
        }
    }

    /// Whether `assign_new` uses the model's own predict.
    pub fn native_predict(&self) -> bool {
        self.model.supports_predict()
    }

    pub fn centroids(&self) -> &GroupCentroids {
        &self.centroids
    }

    pub fn model(&self) -> &dyn ClusterModel {
        self.model.as_ref()
    }
}

/// A roster model that failed to train.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExcludedModel {
    pub model: ModelKind,
    pub reason: String,
}

/// The trained models, in roster order.
#[derive(Debug)]
pub struct ModelBank {
    models: Vec<FittedModel>,
    excluded: Vec<ExcludedModel>,
}

fn fit_model(
    kind: ModelKind,
    data: &[Vec<f64>],
    training: &TrainingConfig,
    params: &ModelsConfig,
) -> ClusterResult<FittedModel> {
    let k = training.n_groups;
    let seed = training.seed;
    let model: Box<dyn ClusterModel> = match kind {
        ModelKind::KMeans => Box::new(KMeans::fit(data, k, &params.kmeans, seed)?),
        ModelKind::Hierarchical => Box::new(Agglomerative::fit(data, k, &params.hierarchical)?),
        ModelKind::Gmm => Box::new(GaussianMixture::fit(data, k, &params.gmm, seed)?),
        ModelKind::Spectral => Box::new(Spectral::fit(data, k, &params.spectral, seed)?),
        ModelKind::Birch => Box::new(Birch::fit(data, k, &params.birch)?),
        ModelKind::MiniBatch => Box::new(MiniBatchKMeans::fit(data, k, &params.minibatch, seed)?),
    };
    FittedModel::new(model, data)
}

impl ModelBank {
    /// Train every roster model on the standardized corpus.
    ///
    /// # Errors
    ///
    /// `EmptyBank` if no model trained.
    pub fn train_all(
        data: &[Vec<f64>],
        training: &TrainingConfig,
        params: &ModelsConfig,
    ) -> ScaleResult<Self> {
        let fit = |kind: &ModelKind| (*kind, fit_model(*kind, data, training, params));

        let results: Vec<(ModelKind, ClusterResult<FittedModel>)> = if training.parallel {
            training.models.par_iter().map(fit).collect()
        } else {
            training.models.iter().map(fit).collect()
        };

        let mut models = Vec::with_capacity(results.len());
        let mut excluded = Vec::new();
        for (kind, result) in results {
            match result {
                Ok(model) => {
                    tracing::debug!(
                        "Model {} trained: {} groups (native predict: {})",
                        kind,
                        model.centroids().len(),
                        model.native_predict()
                    );
                    models.push(model);
                }
                Err(reason) => {
                    let err = ScaleError::model_fit(kind.name(), reason);
                    tracing::warn!("Excluding model from bank: {}", err);
                    excluded.push(ExcludedModel {
                        model: kind,
                        reason: err.to_string(),
                    });
                }
            }
        }

        if models.is_empty() {
            return Err(ScaleError::EmptyBank);
        }

        Ok(Self { models, excluded })
    }

    /// Trained models in roster order.
    pub fn iter(&self) -> impl Iterator<Item = &FittedModel> {
        self.models.iter()
    }

    pub fn get(&self, kind: ModelKind) -> Option<&FittedModel> {
        self.models.iter().find(|m| m.kind() == kind)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Roster models that failed, with the reason.
    pub fn excluded(&self) -> &[ExcludedModel] {
        &self.excluded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> Vec<Vec<f64>> {
        let mut data = Vec::new();
        for c in 0..3 {
            for i in 0..6 {
                let o = i as f64 * 0.1;
                data.push(vec![c as f64 * 5.0 + o, c as f64 * 5.0 - o]);
            }
        }
        data
    }

    fn training(models: Vec<ModelKind>) -> TrainingConfig {
        TrainingConfig {
            n_groups: 3,
            seed: 42,
            parallel: false,
            models,
        }
    }

    #[test]
    fn test_train_all_keeps_roster_order() {
        let data = corpus();
        let bank = ModelBank::train_all(
            &data,
            &training(ModelKind::ALL.to_vec()),
            &ModelsConfig::default(),
        )
        .unwrap();

        let names: Vec<&str> = bank.iter().map(|m| m.name()).collect();
        assert_eq!(
            names,
            vec!["kmeans", "hierarchical", "gmm", "spectral", "birch", "minibatch"]
        );
        assert!(bank.excluded().is_empty());
        for model in bank.iter() {
            assert_eq!(model.assign_existing().len(), data.len());
        }
        println!("[PASS] test_train_all_keeps_roster_order - {:?}", names);
    }

    #[test]
    fn test_failing_model_is_excluded() {
        let data = corpus();
        let mut params = ModelsConfig::default();
        params.gmm.reg_covar = -1.0;
        let bank = ModelBank::train_all(
            &data,
            &training(vec![ModelKind::KMeans, ModelKind::Gmm]),
            &params,
        )
        .unwrap();

        assert_eq!(bank.len(), 1);
        assert_eq!(bank.excluded().len(), 1);
        assert_eq!(bank.excluded()[0].model, ModelKind::Gmm);
        assert!(bank.excluded()[0].reason.contains("gmm"));
        assert!(bank.get(ModelKind::Gmm).is_none());
    }

    #[test]
    fn test_all_models_failing_is_empty_bank() {
        let data = vec![vec![0.0, 0.0], vec![1.0, 1.0]];
        let err = ModelBank::train_all(
            &data,
            &training(vec![ModelKind::KMeans, ModelKind::Hierarchical]),
            &ModelsConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ScaleError::EmptyBank));
    }

    #[test]
    fn test_assign_new_uses_fallback_for_labels_only() {
        let data = corpus();
        let bank = ModelBank::train_all(
            &data,
            &training(vec![ModelKind::Hierarchical]),
            &ModelsConfig::default(),
        )
        .unwrap();
        let model = bank.get(ModelKind::Hierarchical).unwrap();
        assert!(!model.native_predict());
        assert_eq!(model.assign_new(&data).unwrap(), model.assign_existing());
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let data = corpus();
        let mut cfg = training(ModelKind::ALL.to_vec());
        let seq = ModelBank::train_all(&data, &cfg, &ModelsConfig::default()).unwrap();
        cfg.parallel = true;
        let par = ModelBank::train_all(&data, &cfg, &ModelsConfig::default()).unwrap();

        for (a, b) in seq.iter().zip(par.iter()) {
            assert_eq!(a.kind(), b.kind());
            assert_eq!(a.assign_existing(), b.assign_existing());
        }
    }
}
