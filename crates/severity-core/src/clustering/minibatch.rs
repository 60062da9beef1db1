//! Mini-batch k-means.
//!
//! Centres start from k-means++ and are refined on random mini-batches with a
//! per-centre learning rate of `1 / points_seen`. A centre that never wins a
//! point stays where it was seeded, so the final labelling can use fewer than
//! `n_clusters` groups.

use rand::seq::index::sample;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use super::centroid::{nearest_index, squared_euclidean};
use super::error::{validate_matrix, ClusterError, ClusterResult};
use super::kmeans::{assign_all, kmeans_plus_plus, mean_variance, predict_nearest};
use super::model::{ClusterModel, ModelKind};

/// Parameters for [`MiniBatchKMeans`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MiniBatchParams {
    /// Points per mini-batch (capped at the corpus size).
    pub batch_size: usize,
    /// Number of passes over the data.
    pub max_iter: usize,
    /// Number of restarts; the lowest-inertia run is kept.
    pub n_init: usize,
    /// Early stop when the squared centre shift of a batch, relative to the
    /// mean feature variance, falls to this value. 0 disables early stopping.
    pub tol: f64,
}

impl Default for MiniBatchParams {
    fn default() -> Self {
        Self {
            batch_size: 1024,
            max_iter: 100,
            n_init: 3,
            tol: 0.0,
        }
    }
}

impl MiniBatchParams {
    /// Set batch size.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Validate parameters.
    ///
    /// # Errors
    ///
    /// Returns `ClusterError::InvalidParameter` if any count is 0 or tol is
    /// negative.
    pub fn validate(&self) -> ClusterResult<()> {
        if self.batch_size == 0 {
            return Err(ClusterError::invalid_parameter("minibatch.batch_size must be >= 1"));
        }
        if self.max_iter == 0 || self.n_init == 0 {
            return Err(ClusterError::invalid_parameter(
                "minibatch.max_iter and minibatch.n_init must be >= 1",
            ));
        }
        if !(self.tol >= 0.0 && self.tol.is_finite()) {
            return Err(ClusterError::invalid_parameter(format!(
                "minibatch.tol must be finite and >= 0, got {}",
                self.tol
            )));
        }
        Ok(())
    }
}

/// Fitted mini-batch k-means model.
#[derive(Debug, Clone)]
pub struct MiniBatchKMeans {
    centroids: Vec<Vec<f64>>,
    labels: Vec<usize>,
    inertia: f64,
}

impl MiniBatchKMeans {
    /// Fit `n_clusters` centres with mini-batch updates.
    ///
    /// # Errors
    ///
    /// - `InvalidParameter` for bad params or `n_clusters == 0`
    /// - `InsufficientData` if there are fewer points than clusters
    pub fn fit(
        data: &[Vec<f64>],
        n_clusters: usize,
        params: &MiniBatchParams,
        seed: u64,
    ) -> ClusterResult<Self> {
        params.validate()?;
        if n_clusters == 0 {
            return Err(ClusterError::invalid_parameter("n_clusters must be >= 1"));
        }
        let dim = validate_matrix(data, n_clusters)?;

        let n = data.len();
        let batch = params.batch_size.min(n);
        let steps_per_pass = n.div_ceil(batch);
        let tol = params.tol * mean_variance(data);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);

        let mut best: Option<(Vec<Vec<f64>>, f64)> = None;

        for _ in 0..params.n_init {
            let mut centroids = kmeans_plus_plus(data, n_clusters, &mut rng);
            let mut counts = vec![0usize; n_clusters];

            'passes: for _ in 0..params.max_iter {
                for _ in 0..steps_per_pass {
                    let indices = sample(&mut rng, n, batch);

                    let mut sums = vec![vec![0.0; dim]; n_clusters];
                    let mut hits = vec![0usize; n_clusters];
                    for i in indices.iter() {
                        let (c, _) = nearest_index(&data[i], &centroids).unwrap_or((0, 0.0));
                        hits[c] += 1;
                        for (s, v) in sums[c].iter_mut().zip(data[i].iter()) {
                            *s += v;
                        }
                    }

                    let mut shift = 0.0;
                    for c in 0..n_clusters {
                        if hits[c] == 0 {
                            continue;
                        }
                        let seen = counts[c] + hits[c];
                        let updated: Vec<f64> = centroids[c]
                            .iter()
                            .zip(sums[c].iter())
                            .map(|(old, s)| (old * counts[c] as f64 + s) / seen as f64)
                            .collect();
                        shift += squared_euclidean(&updated, &centroids[c]);
                        centroids[c] = updated;
                        counts[c] = seen;
                    }

                    if tol > 0.0 && shift <= tol {
                        break 'passes;
                    }
                }
            }

            let (_, inertia) = assign_all(data, &centroids);
            match &best {
                Some((_, b)) if inertia >= *b => {}
                _ => best = Some((centroids, inertia)),
            }
        }

        let (centroids, inertia) =
            best.ok_or_else(|| ClusterError::numerical("mini-batch k-means produced no run"))?;
        let (labels, _) = assign_all(data, &centroids);

        Ok(Self {
            centroids,
            labels,
            inertia,
        })
    }

    /// Cluster centres, indexed by label.
    pub fn centroids(&self) -> &[Vec<f64>] {
        &self.centroids
    }

    /// Sum of squared distances to the assigned centres.
    pub fn inertia(&self) -> f64 {
        self.inertia
    }
}

impl ClusterModel for MiniBatchKMeans {
    fn kind(&self) -> ModelKind {
        ModelKind::MiniBatch
    }

    fn training_labels(&self) -> &[usize] {
        &self.labels
    }

    fn predict(&self, points: &[Vec<f64>]) -> ClusterResult<Vec<usize>> {
        predict_nearest(&self.centroids, points)
    }
}
