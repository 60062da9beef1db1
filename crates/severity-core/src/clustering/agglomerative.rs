//! Agglomerative clustering with Ward linkage.
//!
//! The dendrogram is built with the nearest-neighbour chain algorithm and
//! Lance-Williams updates on squared Euclidean distances. Ward is a reducible
//! linkage, so the merges can be sorted by height afterwards and replayed with
//! a union-find to cut the tree at any number of groups.
//!
//! Memory is quadratic in the number of points. The model has no native
//! `predict`; new points go through the nearest-centroid fallback.

use serde::{Deserialize, Serialize};

use super::centroid::squared_euclidean;
use super::error::{validate_matrix, ClusterError, ClusterResult};
use super::model::{ClusterModel, ModelKind};

/// Parameters for [`Agglomerative`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HierarchicalParams {
    /// Largest corpus accepted; the distance matrix holds `max_points²` floats.
    pub max_points: usize,
}

impl Default for HierarchicalParams {
    fn default() -> Self {
        Self { max_points: 20_000 }
    }
}

impl HierarchicalParams {
    #[must_use]
    pub fn with_max_points(mut self, max_points: usize) -> Self {
        self.max_points = max_points;
        self
    }

    /// Validate parameters.
    ///
    /// # Errors
    ///
    /// Returns `ClusterError::InvalidParameter` if max_points < 2.
    pub fn validate(&self) -> ClusterResult<()> {
        if self.max_points < 2 {
            return Err(ClusterError::invalid_parameter(format!(
                "hierarchical.max_points must be >= 2, got {}",
                self.max_points
            )));
        }
        Ok(())
    }
}

/// One merge step of the dendrogram.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Merge {
    /// Representative point of the first cluster.
    pub a: usize,
    /// Representative point of the second cluster.
    pub b: usize,
    /// Ward distance at which the clusters merged.
    pub height: f64,
}

/// Ward dendrogram of `data`, merges sorted by ascending height.
pub(crate) fn ward_merges(data: &[Vec<f64>]) -> Vec<Merge> {
    let n = data.len();
    if n < 2 {
        return Vec::new();
    }

    let mut dist = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in (i + 1)..n {
            let d = squared_euclidean(&data[i], &data[j]);
            dist[i][j] = d;
            dist[j][i] = d;
        }
    }

    let mut size = vec![1.0_f64; n];
    let mut active = vec![true; n];
    let mut chain: Vec<usize> = Vec::with_capacity(n);
    let mut merges = Vec::with_capacity(n - 1);

    for _ in 0..(n - 1) {
        if chain.is_empty() {
            if let Some(first) = active.iter().position(|&a| a) {
                chain.push(first);
            }
        }

        let (a, b) = loop {
            let a = chain[chain.len() - 1];
            let prev = if chain.len() >= 2 {
                Some(chain[chain.len() - 2])
            } else {
                None
            };

            // Prefer the previous chain element on ties so the chain terminates.
            let (mut best, mut best_d) = match prev {
                Some(p) => (p, dist[a][p]),
                None => (usize::MAX, f64::INFINITY),
            };
            for k in 0..n {
                if k == a || !active[k] {
                    continue;
                }
                if dist[a][k] < best_d {
                    best_d = dist[a][k];
                    best = k;
                }
            }

            if Some(best) == prev {
                chain.pop();
                chain.pop();
                break (a, best);
            }
            chain.push(best);
        };

        let keep = a.min(b);
        let drop = a.max(b);
        let d_ab = dist[a][b];
        merges.push(Merge { a: keep, b: drop, height: d_ab });

        let (n_keep, n_drop) = (size[keep], size[drop]);
        for k in 0..n {
            if !active[k] || k == keep || k == drop {
                continue;
            }
            let n_k = size[k];
            let updated = ((n_keep + n_k) * dist[keep][k] + (n_drop + n_k) * dist[drop][k]
                - n_k * d_ab)
                / (n_keep + n_drop + n_k);
            dist[keep][k] = updated;
            dist[k][keep] = updated;
        }
        size[keep] = n_keep + n_drop;
        active[drop] = false;
    }

    merges.sort_by(|x, y| x.height.total_cmp(&y.height));
    merges
}

fn find(parent: &mut [usize], mut x: usize) -> usize {
    while parent[x] != x {
        parent[x] = parent[parent[x]];
        x = parent[x];
    }
    x
}

/// Cut a sorted Ward dendrogram over `n` points into `n_clusters` groups.
///
/// Labels are dense and numbered by first appearance in point order.
pub(crate) fn cut_tree(n: usize, merges: &[Merge], n_clusters: usize) -> Vec<usize> {
    let mut parent: Vec<usize> = (0..n).collect();
    let steps = n.saturating_sub(n_clusters).min(merges.len());
    for m in &merges[..steps] {
        let ra = find(&mut parent, m.a);
        let rb = find(&mut parent, m.b);
        if ra != rb {
            parent[ra.max(rb)] = ra.min(rb);
        }
    }

    let mut label_of_root = vec![usize::MAX; n];
    let mut next = 0;
    (0..n)
        .map(|i| {
            let root = find(&mut parent, i);
            if label_of_root[root] == usize::MAX {
                label_of_root[root] = next;
                next += 1;
            }
            label_of_root[root]
        })
        .collect()
}

/// Fitted Ward clustering.
#[derive(Debug, Clone)]
pub struct Agglomerative {
    labels: Vec<usize>,
    merges: Vec<Merge>,
}

impl Agglomerative {
    /// Cluster `data` into `n_clusters` groups with Ward linkage.
    ///
    /// # Errors
    ///
    /// - `InvalidParameter` if `n_clusters == 0` or the corpus exceeds
    ///   `params.max_points`
    /// - `InsufficientData` if there are fewer points than clusters
    pub fn fit(
        data: &[Vec<f64>],
        n_clusters: usize,
        params: &HierarchicalParams,
    ) -> ClusterResult<Self> {
        params.validate()?;
        if n_clusters == 0 {
            return Err(ClusterError::invalid_parameter("n_clusters must be >= 1"));
        }
        validate_matrix(data, n_clusters)?;
        if data.len() > params.max_points {
            return Err(ClusterError::invalid_parameter(format!(
                "{} points exceed hierarchical.max_points = {}",
                data.len(),
                params.max_points
            )));
        }

        let merges = ward_merges(data);
        let labels = cut_tree(data.len(), &merges, n_clusters);

        tracing::debug!(
            "Ward clustering: {} points, {} merges applied",
            data.len(),
            data.len() - n_clusters
        );

        Ok(Self { labels, merges })
    }

    /// Dendrogram merges sorted by height.
    pub fn merges(&self) -> &[Merge] {
        &self.merges
    }
}

impl ClusterModel for Agglomerative {
    fn kind(&self) -> ModelKind {
        ModelKind::Hierarchical
    }

    fn training_labels(&self) -> &[usize] {
        &self.labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ward_three_groups_on_a_line() {
        let data: Vec<Vec<f64>> = [0.0, 0.1, 0.2, 5.0, 5.1, 10.0, 10.2, 10.1]
            .iter()
            .map(|&x| vec![x])
            .collect();
        let model = Agglomerative::fit(&data, 3, &HierarchicalParams::default()).unwrap();
        assert_eq!(model.training_labels(), &[0, 0, 0, 1, 1, 2, 2, 2]);
        assert_eq!(model.merges().len(), 7);
        assert!(model
            .merges()
            .windows(2)
            .all(|w| w[0].height <= w[1].height));
        println!(
            "[PASS] test_ward_three_groups_on_a_line - labels={:?}",
            model.training_labels()
        );
    }

    #[test]
    fn test_ward_heights_match_closed_form() {
        // Two points at distance 2: Ward height for singletons is ||a-b||^2.
        let merges = ward_merges(&[vec![0.0, 0.0], vec![2.0, 0.0]]);
        assert_eq!(merges.len(), 1);
        assert!((merges[0].height - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_one_cluster_per_point() {
        let data = vec![vec![0.0], vec![1.0], vec![3.0]];
        let model = Agglomerative::fit(&data, 3, &HierarchicalParams::default()).unwrap();
        assert_eq!(model.training_labels(), &[0, 1, 2]);
    }

    #[test]
    fn test_no_native_predict() {
        let data = vec![vec![0.0], vec![1.0], vec![3.0]];
        let model = Agglomerative::fit(&data, 2, &HierarchicalParams::default()).unwrap();
        assert!(!model.supports_predict());
        assert!(model.predict(&data).is_err());
    }

    #[test]
    fn test_zero_clusters_rejected() {
        assert!(Agglomerative::fit(&[vec![0.0]], 0, &HierarchicalParams::default()).is_err());
    }

    #[test]
    fn test_corpus_above_max_points_rejected() {
        let data: Vec<Vec<f64>> = (0..10).map(|i| vec![i as f64]).collect();
        let params = HierarchicalParams::default().with_max_points(5);
        let err = Agglomerative::fit(&data, 2, &params).unwrap_err();
        assert!(err.to_string().contains("max_points"));
    }
}
