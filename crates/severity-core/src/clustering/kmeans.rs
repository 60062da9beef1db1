//! K-means clustering (Lloyd iterations, k-means++ seeding).
//!
//! The seeding and assignment helpers here are reused by the mini-batch,
//! GMM and spectral models.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use super::centroid::{nearest_index, squared_euclidean};
use super::error::{validate_matrix, ClusterError, ClusterResult};
use super::model::{ClusterModel, ModelKind};

/// Parameters for [`KMeans`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KMeansParams {
    /// Number of k-means++ restarts; the lowest-inertia run is kept.
    pub n_init: usize,
    /// Maximum Lloyd iterations per restart.
    pub max_iter: usize,
    /// Convergence tolerance on total squared centre shift, relative to the
    /// mean per-feature variance of the data.
    pub tol: f64,
}

impl Default for KMeansParams {
    fn default() -> Self {
        Self {
            n_init: 10,
            max_iter: 300,
            tol: 1e-4,
        }
    }
}

impl KMeansParams {
    /// Set number of restarts.
    #[must_use]
    pub fn with_n_init(mut self, n_init: usize) -> Self {
        self.n_init = n_init;
        self
    }

    /// Set iteration cap.
    #[must_use]
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Validate parameters.
    ///
    /// # Errors
    ///
    /// Returns `ClusterError::InvalidParameter` if n_init or max_iter is 0,
    /// or tol is negative or not finite.
    pub fn validate(&self) -> ClusterResult<()> {
        if self.n_init == 0 {
            return Err(ClusterError::invalid_parameter("kmeans.n_init must be >= 1"));
        }
        if self.max_iter == 0 {
            return Err(ClusterError::invalid_parameter("kmeans.max_iter must be >= 1"));
        }
        if !(self.tol >= 0.0 && self.tol.is_finite()) {
            return Err(ClusterError::invalid_parameter(format!(
                "kmeans.tol must be finite and >= 0, got {}",
                self.tol
            )));
        }
        Ok(())
    }
}

/// Result of a single Lloyd run.
#[derive(Debug, Clone)]
pub(crate) struct LloydRun {
    pub centroids: Vec<Vec<f64>>,
    pub labels: Vec<usize>,
    pub inertia: f64,
    pub n_iter: usize,
    /// Whether the centre shift fell within tolerance before `max_iter`.
    pub converged: bool,
}

/// Mean per-feature variance, used to scale tolerances.
pub(crate) fn mean_variance(data: &[Vec<f64>]) -> f64 {
    let n = data.len() as f64;
    let dim = data[0].len();
    let mut total = 0.0;
    for j in 0..dim {
        let mean = data.iter().map(|p| p[j]).sum::<f64>() / n;
        total += data.iter().map(|p| (p[j] - mean) * (p[j] - mean)).sum::<f64>() / n;
    }
    total / dim as f64
}

/// k-means++ seeding: first centre uniform, the rest drawn proportional to
/// squared distance from the nearest chosen centre.
pub(crate) fn kmeans_plus_plus(data: &[Vec<f64>], k: usize, rng: &mut ChaCha8Rng) -> Vec<Vec<f64>> {
    let n = data.len();
    let mut centroids = Vec::with_capacity(k);
    centroids.push(data[rng.gen_range(0..n)].clone());

    let mut closest: Vec<f64> = data
        .iter()
        .map(|p| squared_euclidean(p, &centroids[0]))
        .collect();

    while centroids.len() < k {
        let total: f64 = closest.iter().sum();
        let chosen = if total > 0.0 {
            let mut target = rng.gen::<f64>() * total;
            let mut idx = n - 1;
            for (i, &d) in closest.iter().enumerate() {
                if target < d {
                    idx = i;
                    break;
                }
                target -= d;
            }
            idx
        } else {
            // Every point coincides with a chosen centre.
            rng.gen_range(0..n)
        };

        let centre = data[chosen].clone();
        for (c, p) in closest.iter_mut().zip(data.iter()) {
            let d = squared_euclidean(p, &centre);
            if d < *c {
                *c = d;
            }
        }
        centroids.push(centre);
    }

    centroids
}

/// Assign every point to its nearest centroid. Returns labels and inertia.
pub(crate) fn assign_all(data: &[Vec<f64>], centroids: &[Vec<f64>]) -> (Vec<usize>, f64) {
    let mut inertia = 0.0;
    let labels = data
        .iter()
        .map(|p| {
            let (idx, d) = nearest_index(p, centroids).unwrap_or((0, 0.0));
            inertia += d;
            idx
        })
        .collect();
    (labels, inertia)
}

/// Lloyd iterations from the given initial centroids.
///
/// Empty clusters are re-seeded with the point farthest from its centroid,
/// taken only from clusters that keep at least one other point.
pub(crate) fn lloyd(
    data: &[Vec<f64>],
    mut centroids: Vec<Vec<f64>>,
    max_iter: usize,
    tol: f64,
) -> LloydRun {
    let k = centroids.len();
    let dim = data[0].len();
    let mut n_iter = 0;
    let mut converged = false;

    for iter in 0..max_iter {
        n_iter = iter + 1;
        let (mut labels, _) = assign_all(data, &centroids);

        let mut sums = vec![vec![0.0; dim]; k];
        let mut counts = vec![0usize; k];
        for (p, &l) in data.iter().zip(labels.iter()) {
            counts[l] += 1;
            for (s, v) in sums[l].iter_mut().zip(p.iter()) {
                *s += v;
            }
        }

        for c in 0..k {
            if counts[c] > 0 {
                continue;
            }
            // Points already moved into an empty cluster are singletons and
            // never donate again.
            let far = data
                .iter()
                .enumerate()
                .filter(|&(i, _)| counts[labels[i]] > 1)
                .map(|(i, p)| (i, squared_euclidean(p, &centroids[labels[i]])))
                .fold(None, |best: Option<(usize, f64)>, cur| match best {
                    Some(b) if b.1 >= cur.1 => Some(b),
                    _ => Some(cur),
                });
            let Some((i, _)) = far else {
                break;
            };
            let donor = labels[i];
            counts[donor] -= 1;
            for (s, v) in sums[donor].iter_mut().zip(data[i].iter()) {
                *s -= v;
            }
            labels[i] = c;
            counts[c] = 1;
            sums[c] = data[i].clone();
        }

        let mut shift = 0.0;
        for c in 0..k {
            if counts[c] == 0 {
                continue;
            }
            let updated: Vec<f64> = sums[c].iter().map(|s| s / counts[c] as f64).collect();
            shift += squared_euclidean(&updated, &centroids[c]);
            centroids[c] = updated;
        }

        if shift <= tol {
            converged = true;
            break;
        }
    }

    let (labels, inertia) = assign_all(data, &centroids);

    LloydRun {
        centroids,
        labels,
        inertia,
        n_iter,
        converged,
    }
}

/// Best-of-`n_init` k-means on `data`.
pub(crate) fn best_of_runs(
    data: &[Vec<f64>],
    k: usize,
    params: &KMeansParams,
    rng: &mut ChaCha8Rng,
) -> LloydRun {
    let tol = params.tol * mean_variance(data);
    let mut best: Option<LloydRun> = None;
    for _ in 0..params.n_init {
        let init = kmeans_plus_plus(data, k, rng);
        let run = lloyd(data, init, params.max_iter, tol);
        match &best {
            Some(b) if run.inertia >= b.inertia => {}
            _ => best = Some(run),
        }
    }
    // n_init >= 1 is validated, so at least one run exists.
    best.unwrap_or_else(|| lloyd(data, data[..k].to_vec(), params.max_iter, tol))
}

/// Fitted k-means model.
///
/// # Example
///
/// ```
/// use severity_core::clustering::{ClusterModel, KMeans, KMeansParams};
///
/// let data = vec![vec![0.0, 0.0], vec![0.1, 0.0], vec![9.0, 9.0], vec![9.1, 9.0]];
/// let model = KMeans::fit(&data, 2, &KMeansParams::default(), 42).unwrap();
/// let labels = model.training_labels();
/// assert_eq!(labels[0], labels[1]);
/// assert_ne!(labels[0], labels[2]);
/// ```
#[derive(Debug, Clone)]
pub struct KMeans {
    centroids: Vec<Vec<f64>>,
    labels: Vec<usize>,
    inertia: f64,
    n_iter: usize,
}

impl KMeans {
    /// Fit `n_clusters` centres to `data`.
    ///
    /// # Errors
    ///
    /// - `InvalidParameter` for bad params or `n_clusters == 0`
    /// - `InsufficientData` if there are fewer points than clusters
    /// - `NumericalFailure` if the best restart hits `max_iter` before the
    ///   centres settle
    pub fn fit(
        data: &[Vec<f64>],
        n_clusters: usize,
        params: &KMeansParams,
        seed: u64,
    ) -> ClusterResult<Self> {
        params.validate()?;
        if n_clusters == 0 {
            return Err(ClusterError::invalid_parameter("n_clusters must be >= 1"));
        }
        validate_matrix(data, n_clusters)?;

        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let run = best_of_runs(data, n_clusters, params, &mut rng);
        if !run.converged {
            return Err(ClusterError::numerical(format!(
                "Lloyd iterations did not converge in {} iterations; raise kmeans.max_iter",
                run.n_iter
            )));
        }

        Ok(Self {
            centroids: run.centroids,
            labels: run.labels,
            inertia: run.inertia,
            n_iter: run.n_iter,
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

    /// Iterations used by the winning restart.
    pub fn n_iter(&self) -> usize {
        self.n_iter
    }
}

impl ClusterModel for KMeans {
    fn kind(&self) -> ModelKind {
        ModelKind::KMeans
    }

    fn training_labels(&self) -> &[usize] {
        &self.labels
    }

    fn predict(&self, points: &[Vec<f64>]) -> ClusterResult<Vec<usize>> {
        predict_nearest(&self.centroids, points)
    }
}

/// Label points by nearest centre, checking dimensions.
pub(crate) fn predict_nearest(centroids: &[Vec<f64>], points: &[Vec<f64>]) -> ClusterResult<Vec<usize>> {
    let dim = centroids.first().map(|c| c.len()).unwrap_or(0);
    points
        .iter()
        .map(|p| {
            if p.len() != dim {
                return Err(ClusterError::dimension_mismatch(dim, p.len()));
            }
            nearest_index(p, centroids)
                .map(|(i, _)| i)
                .ok_or_else(|| ClusterError::numerical("model has no centroids"))
        })
        .collect()
}
