//! The cluster model capability set.
//!
//! Every fitted model exposes the labels it gave the training points. Only
//! some variants can label new points themselves; the rest rely on the
//! nearest-centroid fallback in [`crate::assigner`].

use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::{ClusterError, ClusterResult};

/// The six clustering variants of the model bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    /// Lloyd k-means with k-means++ seeding.
    KMeans,
    /// Agglomerative clustering with Ward linkage.
    Hierarchical,
    /// Full-covariance Gaussian mixture fitted by EM.
    Gmm,
    /// Spectral clustering over an RBF affinity graph.
    Spectral,
    /// BIRCH CF-tree with a Ward global step.
    Birch,
    /// Mini-batch k-means.
    MiniBatch,
}

impl ModelKind {
    /// All variants in bank order.
    pub const ALL: [ModelKind; 6] = [
        ModelKind::KMeans,
        ModelKind::Hierarchical,
        ModelKind::Gmm,
        ModelKind::Spectral,
        ModelKind::Birch,
        ModelKind::MiniBatch,
    ];

    /// Iterate all variants in bank order.
    pub fn all() -> impl Iterator<Item = ModelKind> {
        Self::ALL.into_iter()
    }

    /// Stable lowercase name used in logs, reports and configuration.
    pub fn name(self) -> &'static str {
        match self {
            ModelKind::KMeans => "kmeans",
            ModelKind::Hierarchical => "hierarchical",
            ModelKind::Gmm => "gmm",
            ModelKind::Spectral => "spectral",
            ModelKind::Birch => "birch",
            ModelKind::MiniBatch => "minibatch",
        }
    }

    /// Whether the variant can label previously unseen points itself.
    pub fn has_native_predict(self) -> bool {
        !matches!(self, ModelKind::Hierarchical | ModelKind::Spectral)
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A clustering model fitted once on the standardized training corpus.
///
/// Implementations are immutable after fitting and safe to share across
/// threads.
pub trait ClusterModel: fmt::Debug + Send + Sync {
    /// Which variant this is.
    fn kind(&self) -> ModelKind;

    /// Group label of every training point, in training order.
    fn training_labels(&self) -> &[usize];

    /// Label new standardized points natively.
    ///
    /// The default reports `Unsupported`; variants listed by
    /// [`ModelKind::has_native_predict`] override it.
    fn predict(&self, points: &[Vec<f64>]) -> ClusterResult<Vec<usize>> {
        let _ = points;
        Err(ClusterError::Unsupported {
            model: self.kind().name(),
            operation: "predict",
        })
    }

    /// Whether [`ClusterModel::predict`] is implemented.
    fn supports_predict(&self) -> bool {
        self.kind().has_native_predict()
    }

    /// Number of distinct labels among the training points.
    fn observed_groups(&self) -> usize {
        let mut labels = self.training_labels().to_vec();
        labels.sort_unstable();
        labels.dedup();
        labels.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Frozen(Vec<usize>);

    impl ClusterModel for Frozen {
        fn kind(&self) -> ModelKind {
            ModelKind::Hierarchical
        }
        fn training_labels(&self) -> &[usize] {
            &self.0
        }
    }

    #[test]
    fn test_model_kind_names_roundtrip_serde() {
        for kind in ModelKind::all() {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.name()));
            let back: ModelKind = serde_json::from_str(&json).unwrap();
            assert_eq!(back, kind);
        }
    }

    #[test]
    fn test_labels_only_model_reports_unsupported() {
        let model = Frozen(vec![2, 0, 2, 5]);
        assert!(!model.supports_predict());
        assert_eq!(model.observed_groups(), 3);
        let err = model.predict(&[vec![0.0]]).unwrap_err();
        assert!(err.to_string().contains("hierarchical"));
    }

    #[test]
    fn test_native_predict_roster() {
        let native: Vec<&str> = ModelKind::all()
            .filter(|k| k.has_native_predict())
            .map(|k| k.name())
            .collect();
        assert_eq!(native, vec!["kmeans", "gmm", "birch", "minibatch"]);
    }
}
