//! Spectral clustering over an RBF affinity graph.
//!
//! 1. Affinity `A_ij = exp(-gamma * ||x_i - x_j||^2)` with a zero diagonal.
//! 2. Normalized affinity `M = D^-1/2 A D^-1/2`; its top eigenvectors are the
//!    smallest eigenvectors of the normalized Laplacian.
//! 3. Each eigenvector is rescaled by `D^-1/2` and sign-fixed so the entry of
//!    largest magnitude is positive.
//! 4. k-means on the rows of the embedding gives the labels.
//!
//! The model only labels its training points.

use nalgebra::DMatrix;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use super::centroid::squared_euclidean;
use super::error::{validate_matrix, ClusterError, ClusterResult};
use super::kmeans::{best_of_runs, KMeansParams};
use super::linalg::top_eigenpairs;
use super::model::{ClusterModel, ModelKind};

/// Parameters for [`Spectral`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectralParams {
    /// RBF kernel coefficient.
    pub gamma: f64,
    /// k-means restarts on the embedding.
    pub n_init: usize,
    /// Largest corpus accepted; the affinity matrix holds `max_points²` floats
    /// and its eigen-decomposition is cubic in the corpus size.
    pub max_points: usize,
}

impl Default for SpectralParams {
    fn default() -> Self {
        Self {
            gamma: 1.0,
            n_init: 10,
            max_points: 3_000,
        }
    }
}

impl SpectralParams {
    /// Set the RBF coefficient.
    #[must_use]
    pub fn with_gamma(mut self, gamma: f64) -> Self {
        self.gamma = gamma;
        self
    }

    #[must_use]
    pub fn with_max_points(mut self, max_points: usize) -> Self {
        self.max_points = max_points;
        self
    }

    /// Validate parameters.
    ///
    /// # Errors
    ///
    /// Returns `ClusterError::InvalidParameter` if gamma is not a positive
    /// finite number, n_init is 0 or max_points is below 2.
    pub fn validate(&self) -> ClusterResult<()> {
        if !(self.gamma > 0.0 && self.gamma.is_finite()) {
            return Err(ClusterError::invalid_parameter(format!(
                "spectral.gamma must be finite and > 0, got {}",
                self.gamma
            )));
        }
        if self.n_init == 0 {
            return Err(ClusterError::invalid_parameter("spectral.n_init must be >= 1"));
        }
        if self.max_points < 2 {
            return Err(ClusterError::invalid_parameter(format!(
                "spectral.max_points must be >= 2, got {}",
                self.max_points
            )));
        }
        Ok(())
    }
}

/// Fitted spectral clustering.
#[derive(Debug, Clone)]
pub struct Spectral {
    labels: Vec<usize>,
    eigenvalues: Vec<f64>,
}

/// Rows of the `k`-dimensional spectral embedding, plus the eigenvalues used.
fn embed(data: &[Vec<f64>], k: usize, gamma: f64) -> ClusterResult<(Vec<Vec<f64>>, Vec<f64>)> {
    let n = data.len();

    let mut affinity = DMatrix::<f64>::zeros(n, n);
    for i in 0..n {
        for j in (i + 1)..n {
            let w = (-gamma * squared_euclidean(&data[i], &data[j])).exp();
            affinity[(i, j)] = w;
            affinity[(j, i)] = w;
        }
    }

    let degree: Vec<f64> = affinity.column_iter().map(|c| c.sum()).collect();
    if let Some(i) = degree.iter().position(|&d| !(d > 0.0) || !d.is_finite()) {
        return Err(ClusterError::numerical(format!(
            "point {} is disconnected from the affinity graph; lower spectral.gamma",
            i
        )));
    }
    let inv_sqrt: Vec<f64> = degree.iter().map(|d| 1.0 / d.sqrt()).collect();

    for j in 0..n {
        for i in 0..n {
            affinity[(i, j)] *= inv_sqrt[i] * inv_sqrt[j];
        }
    }

    let (eigenvalues, vectors) = top_eigenpairs(affinity, k)?;

    let mut columns: Vec<Vec<f64>> = Vec::with_capacity(k);
    for vector in vectors {
        let mut col: Vec<f64> = vector
            .iter()
            .zip(inv_sqrt.iter())
            .map(|(v, s)| v * s)
            .collect();
        let pivot = col
            .iter()
            .cloned()
            .fold(0.0_f64, |acc, x| if x.abs() > acc.abs() { x } else { acc });
        if pivot < 0.0 {
            for x in &mut col {
                *x = -*x;
            }
        }
        columns.push(col);
    }

    let rows: Vec<Vec<f64>> = (0..n).map(|i| columns.iter().map(|c| c[i]).collect()).collect();
    if rows.iter().flatten().any(|x| !x.is_finite()) {
        return Err(ClusterError::numerical("spectral embedding is not finite"));
    }

    Ok((rows, eigenvalues))
}

impl Spectral {
    /// Cluster `data` into `n_clusters` groups.
    ///
    /// # Errors
    ///
    /// - `InvalidParameter` for bad params, `n_clusters == 0` or a corpus
    ///   above `params.max_points`
    /// - `InsufficientData` if there are fewer points than clusters
    /// - `NumericalFailure` if the affinity graph has an isolated point, or
    ///   the eigen-decomposition or the k-means step does not converge
    pub fn fit(
        data: &[Vec<f64>],
        n_clusters: usize,
        params: &SpectralParams,
        seed: u64,
    ) -> ClusterResult<Self> {
        params.validate()?;
        if n_clusters == 0 {
            return Err(ClusterError::invalid_parameter("n_clusters must be >= 1"));
        }
        validate_matrix(data, n_clusters.max(2))?;
        if data.len() > params.max_points {
            return Err(ClusterError::invalid_parameter(format!(
                "{} points exceed spectral.max_points = {}",
                data.len(),
                params.max_points
            )));
        }

        let (embedding, eigenvalues) = embed(data, n_clusters, params.gamma)?;

        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let run = best_of_runs(
            &embedding,
            n_clusters,
            &KMeansParams::default().with_n_init(params.n_init),
            &mut rng,
        );
        if !run.converged {
            return Err(ClusterError::numerical(format!(
                "k-means on the spectral embedding did not converge in {} iterations",
                run.n_iter
            )));
        }

        Ok(Self {
            labels: run.labels,
            eigenvalues,
        })
    }

    /// Eigenvalues of the normalized affinity behind the embedding, descending.
    pub fn eigenvalues(&self) -> &[f64] {
        &self.eigenvalues
    }
}

impl ClusterModel for Spectral {
    fn kind(&self) -> ModelKind {
        ModelKind::Spectral
    }

    fn training_labels(&self) -> &[usize] {
        &self.labels
    }
}
