//! BIRCH clustering: CF-tree plus a Ward global step.
//!
//! # Clustering Feature (CF)
//!
//! The CF is a triple (n, LS, SS) that summarizes a set of points:
//! - n: number of data points
//! - LS: linear sum (vector sum of all points)
//! - SS: squared sum (scalar sum of squared norms)
//!
//! Key property: CFs are additive. CF(A ∪ B) = CF(A) + CF(B)
//!
//! # Fitting
//!
//! 1. Every training point is inserted into the CF-tree. A point joins the
//!    closest leaf subcluster if the merged radius stays within `threshold`,
//!    otherwise it opens a new subcluster. Nodes, leaf or not, holding more
//!    than `branching_factor` entries are split around their farthest pair.
//! 2. When the tree ends with more leaf subclusters than requested groups,
//!    the subcluster centroids are merged with Ward linkage. Otherwise each
//!    subcluster is its own group.
//! 3. Points, training or new, take the group of their nearest subcluster
//!    centroid.

use serde::{Deserialize, Serialize};

use super::agglomerative::{cut_tree, ward_merges};
use super::centroid::{nearest_index, squared_euclidean};
use super::error::{validate_matrix, ClusterError, ClusterResult};
use super::model::{ClusterModel, ModelKind};

// =============================================================================
// BirchParams
// =============================================================================

/// Parameters for BIRCH clustering.
///
/// # Example
///
/// ```
/// use severity_core::clustering::BirchParams;
///
/// let params = BirchParams::default();
/// assert_eq!(params.branching_factor, 50);
/// assert!(params.with_threshold(0.0).validate().is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BirchParams {
    /// Maximum entries per node: subclusters in a leaf, children elsewhere.
    /// A node that grows past it is split in two.
    pub branching_factor: usize,

    /// Maximum radius of a leaf subcluster after absorbing a point.
    pub threshold: f64,
}

impl Default for BirchParams {
    fn default() -> Self {
        Self {
            branching_factor: 50,
            threshold: 0.5,
        }
    }
}

impl BirchParams {
    /// Set branching factor.
    ///
    /// Value is NOT automatically clamped - use validate() to check.
    #[must_use]
    pub fn with_branching_factor(mut self, bf: usize) -> Self {
        self.branching_factor = bf;
        self
    }

    /// Set threshold.
    ///
    /// Value is NOT automatically clamped - use validate() to check.
    #[must_use]
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Validate parameters.
    ///
    /// # Errors
    ///
    /// Returns `ClusterError::InvalidParameter` if:
    /// - branching_factor < 2
    /// - threshold <= 0.0 or threshold is NaN/Infinity
    pub fn validate(&self) -> ClusterResult<()> {
        if self.branching_factor < 2 {
            return Err(ClusterError::invalid_parameter(format!(
                "birch.branching_factor must be >= 2, got {}",
                self.branching_factor
            )));
        }

        if !(self.threshold > 0.0 && self.threshold.is_finite()) {
            return Err(ClusterError::invalid_parameter(format!(
                "birch.threshold must be > 0.0 and finite, got {}",
                self.threshold
            )));
        }

        Ok(())
    }
}

// =============================================================================
// ClusteringFeature
// =============================================================================

/// Clustering Feature - statistical summary for BIRCH.
///
/// # Example
///
/// ```
/// use severity_core::clustering::ClusteringFeature;
///
/// let mut cf = ClusteringFeature::from_point(&[1.0, 2.0, 3.0]);
/// cf.add_point(&[2.0, 3.0, 4.0]).unwrap();
///
/// assert_eq!(cf.n, 2);
/// assert_eq!(cf.centroid(), vec![1.5, 2.5, 3.5]);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusteringFeature {
    /// Number of data points summarized.
    pub n: usize,
    /// Linear sum: Σ Xi.
    pub ls: Vec<f64>,
    /// Squared sum: Σ ||Xi||².
    pub ss: f64,
}

impl ClusteringFeature {
    /// Create empty CF with given dimension.
    pub fn new(dimension: usize) -> Self {
        Self {
            n: 0,
            ls: vec![0.0; dimension],
            ss: 0.0,
        }
    }

    /// Create CF from a single point.
    pub fn from_point(point: &[f64]) -> Self {
        Self {
            n: 1,
            ls: point.to_vec(),
            ss: point.iter().map(|x| x * x).sum(),
        }
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.ls.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// centroid = LS / n; the zero vector when empty.
    pub fn centroid(&self) -> Vec<f64> {
        if self.n == 0 {
            return self.ls.clone();
        }
        let n = self.n as f64;
        self.ls.iter().map(|x| x / n).collect()
    }

    /// RMS distance from the centroid: sqrt(SS/n - ||centroid||²).
    ///
    /// Returns 0.0 if n=0 or if rounding makes the variance negative.
    pub fn radius(&self) -> f64 {
        if self.n == 0 {
            return 0.0;
        }
        let n = self.n as f64;
        let centroid_norm_sq: f64 = self.ls.iter().map(|x| (x / n) * (x / n)).sum();
        let variance = self.ss / n - centroid_norm_sq;
        if variance > 0.0 {
            variance.sqrt()
        } else {
            0.0
        }
    }

    /// CF(A ∪ B) = (n_A + n_B, LS_A + LS_B, SS_A + SS_B)
    ///
    /// # Errors
    ///
    /// Returns `ClusterError::DimensionMismatch` if dimensions differ.
    pub fn merge(&mut self, other: &ClusteringFeature) -> ClusterResult<()> {
        if other.n == 0 {
            return Ok(());
        }
        if self.n == 0 {
            *self = other.clone();
            return Ok(());
        }
        if self.ls.len() != other.ls.len() {
            return Err(ClusterError::dimension_mismatch(self.ls.len(), other.ls.len()));
        }

        self.n += other.n;
        for (a, b) in self.ls.iter_mut().zip(other.ls.iter()) {
            *a += b;
        }
        self.ss += other.ss;
        Ok(())
    }

    /// Add a single point to this CF.
    ///
    /// # Errors
    ///
    /// Returns `ClusterError::DimensionMismatch` if point dimension differs.
    pub fn add_point(&mut self, point: &[f64]) -> ClusterResult<()> {
        if self.n == 0 && self.ls.is_empty() {
            self.ls = vec![0.0; point.len()];
        }
        if self.ls.len() != point.len() {
            return Err(ClusterError::dimension_mismatch(self.ls.len(), point.len()));
        }

        self.n += 1;
        for (a, b) in self.ls.iter_mut().zip(point.iter()) {
            *a += b;
        }
        self.ss += point.iter().map(|x| x * x).sum::<f64>();
        Ok(())
    }

    /// Squared Euclidean distance from the centroid to `point`.
    pub fn distance_sq_to(&self, point: &[f64]) -> f64 {
        squared_euclidean(&self.centroid(), point)
    }

    /// Euclidean distance between the centroids of two CFs.
    ///
    /// # Errors
    ///
    /// Returns `ClusterError::DimensionMismatch` if dimensions differ.
    pub fn distance(&self, other: &ClusteringFeature) -> ClusterResult<f64> {
        if self.ls.len() != other.ls.len() {
            return Err(ClusterError::dimension_mismatch(self.ls.len(), other.ls.len()));
        }
        Ok(squared_euclidean(&self.centroid(), &other.centroid()).sqrt())
    }

    /// Whether the radius after absorbing `point` stays within `threshold`.
    pub fn would_fit(&self, point: &[f64], threshold: f64) -> bool {
        if self.n == 0 {
            return true;
        }
        if self.ls.len() != point.len() {
            return false;
        }

        let new_n = (self.n + 1) as f64;
        let new_ss = self.ss + point.iter().map(|x| x * x).sum::<f64>();
        let new_centroid_norm_sq: f64 = self
            .ls
            .iter()
            .zip(point.iter())
            .map(|(a, b)| {
                let c = (a + b) / new_n;
                c * c
            })
            .sum();

        let variance = new_ss / new_n - new_centroid_norm_sq;
        variance <= 0.0 || variance.sqrt() <= threshold
    }
}

// =============================================================================
// CF-tree
// =============================================================================

/// Entry in a CF-tree node: a leaf subcluster or a pointer to a child node.
#[derive(Debug, Clone)]
struct CfEntry {
    cf: ClusteringFeature,
    child: Option<Box<CfNode>>,
    /// Training point indices (leaf entries only).
    members: Vec<usize>,
}

impl CfEntry {
    fn from_point(point: &[f64], index: usize) -> Self {
        Self {
            cf: ClusteringFeature::from_point(point),
            child: None,
            members: vec![index],
        }
    }

    fn with_child(child: CfNode) -> ClusterResult<Self> {
        let cf = child.total_cf()?;
        Ok(Self {
            cf,
            child: Some(Box::new(child)),
            members: Vec::new(),
        })
    }
}

#[derive(Debug, Clone)]
struct CfNode {
    is_leaf: bool,
    entries: Vec<CfEntry>,
}

impl CfNode {
    fn new(is_leaf: bool) -> Self {
        Self {
            is_leaf,
            entries: Vec::new(),
        }
    }

    fn total_cf(&self) -> ClusterResult<ClusteringFeature> {
        let dim = self.entries.first().map(|e| e.cf.dimension()).unwrap_or(0);
        let mut total = ClusteringFeature::new(dim);
        for entry in &self.entries {
            total.merge(&entry.cf)?;
        }
        Ok(total)
    }

    /// Index of the entry whose centroid is closest; lowest index on ties.
    fn find_closest(&self, point: &[f64]) -> Option<usize> {
        let mut best = None;
        let mut best_d = f64::INFINITY;
        for (i, entry) in self.entries.iter().enumerate() {
            let d = entry.cf.distance_sq_to(point);
            if d < best_d {
                best_d = d;
                best = Some(i);
            }
        }
        best
    }

    /// Split around the farthest pair of entries; others join the closer seed.
    fn split(self) -> (CfNode, CfNode) {
        let (seed1, seed2) = find_farthest_pair(&self.entries);
        let c1 = self.entries[seed1].cf.centroid();
        let c2 = self.entries[seed2].cf.centroid();

        let mut node1 = CfNode::new(self.is_leaf);
        let mut node2 = CfNode::new(self.is_leaf);
        for (i, entry) in self.entries.into_iter().enumerate() {
            if i == seed1 {
                node1.entries.push(entry);
            } else if i == seed2 {
                node2.entries.push(entry);
            } else if entry.cf.distance_sq_to(&c1) <= entry.cf.distance_sq_to(&c2) {
                node1.entries.push(entry);
            } else {
                node2.entries.push(entry);
            }
        }
        (node1, node2)
    }
}

fn find_farthest_pair(entries: &[CfEntry]) -> (usize, usize) {
    if entries.len() < 2 {
        return (0, entries.len().saturating_sub(1));
    }

    let centroids: Vec<Vec<f64>> = entries.iter().map(|e| e.cf.centroid()).collect();
    let mut max_dist = -1.0;
    let mut pair = (0, 1);
    for i in 0..centroids.len() {
        for j in (i + 1)..centroids.len() {
            let d = squared_euclidean(&centroids[i], &centroids[j]);
            if d > max_dist {
                max_dist = d;
                pair = (i, j);
            }
        }
    }
    pair
}

/// BIRCH CF-tree over the training points.
#[derive(Debug, Clone)]
pub struct CfTree {
    params: BirchParams,
    root: CfNode,
    dimension: usize,
    total_points: usize,
}

impl CfTree {
    /// Create an empty tree.
    ///
    /// # Errors
    ///
    /// Returns `ClusterError::InvalidParameter` if `dimension` is 0 or the
    /// params are invalid.
    pub fn new(params: BirchParams, dimension: usize) -> ClusterResult<Self> {
        if dimension == 0 {
            return Err(ClusterError::invalid_parameter("CF-tree dimension must be > 0"));
        }
        params.validate()?;
        Ok(Self {
            params,
            root: CfNode::new(true),
            dimension,
            total_points: 0,
        })
    }

    /// Insert a point tagged with its training index.
    ///
    /// # Errors
    ///
    /// Returns `DimensionMismatch` or `InvalidParameter` for a non-finite
    /// coordinate.
    pub fn insert(&mut self, point: &[f64], index: usize) -> ClusterResult<()> {
        if point.len() != self.dimension {
            return Err(ClusterError::dimension_mismatch(self.dimension, point.len()));
        }
        if let Some(i) = point.iter().position(|v| !v.is_finite()) {
            return Err(ClusterError::invalid_parameter(format!(
                "coordinate {} is not finite: {}",
                i, point[i]
            )));
        }

        Self::insert_into(&mut self.root, point, index, &self.params)?;

        if self.root.entries.len() > self.params.branching_factor {
            let old = std::mem::replace(&mut self.root, CfNode::new(false));
            let (left, right) = old.split();
            self.root.entries.push(CfEntry::with_child(left)?);
            self.root.entries.push(CfEntry::with_child(right)?);
        }

        self.total_points += 1;
        Ok(())
    }

    fn insert_into(
        node: &mut CfNode,
        point: &[f64],
        index: usize,
        params: &BirchParams,
    ) -> ClusterResult<()> {
        if node.is_leaf {
            let mut best = None;
            let mut best_d = f64::INFINITY;
            for (i, entry) in node.entries.iter().enumerate() {
                if entry.cf.would_fit(point, params.threshold) {
                    let d = entry.cf.distance_sq_to(point);
                    if d < best_d {
                        best_d = d;
                        best = Some(i);
                    }
                }
            }
            match best {
                Some(i) => {
                    node.entries[i].cf.add_point(point)?;
                    node.entries[i].members.push(index);
                }
                None => node.entries.push(CfEntry::from_point(point, index)),
            }
            return Ok(());
        }

        let Some(i) = node.find_closest(point) else {
            return Err(ClusterError::numerical("CF-tree has an empty internal node"));
        };

        node.entries[i].cf.add_point(point)?;
        let overflow = match node.entries[i].child.as_deref_mut() {
            Some(child) => {
                Self::insert_into(child, point, index, params)?;
                child.entries.len() > params.branching_factor
            }
            None => false,
        };

        if overflow {
            if let Some(child) = node.entries[i].child.take() {
                let (left, right) = (*child).split();
                node.entries[i] = CfEntry::with_child(left)?;
                node.entries.insert(i + 1, CfEntry::with_child(right)?);
            }
        }
        Ok(())
    }

    /// Leaf subclusters in tree order with their member indices.
    pub fn leaf_subclusters(&self) -> Vec<(ClusteringFeature, Vec<usize>)> {
        let mut out = Vec::new();
        Self::collect_leaves(&self.root, &mut out);
        out
    }

    fn collect_leaves(node: &CfNode, out: &mut Vec<(ClusteringFeature, Vec<usize>)>) {
        for entry in &node.entries {
            match entry.child.as_deref() {
                Some(child) => Self::collect_leaves(child, out),
                None => out.push((entry.cf.clone(), entry.members.clone())),
            }
        }
    }

    #[inline]
    pub fn total_points(&self) -> usize {
        self.total_points
    }

    /// Tree height, 1 for a single leaf root.
    pub fn height(&self) -> usize {
        let mut h = 1;
        let mut node = &self.root;
        while let Some(child) = node.entries.first().and_then(|e| e.child.as_deref()) {
            h += 1;
            node = child;
        }
        h
    }
}

// =============================================================================
// Birch model
// =============================================================================

/// Fitted BIRCH model.
#[derive(Debug, Clone)]
pub struct Birch {
    subcluster_centroids: Vec<Vec<f64>>,
    subcluster_labels: Vec<usize>,
    labels: Vec<usize>,
}

impl Birch {
    /// Build the CF-tree over `data` and reduce it to at most `n_clusters`
    /// groups.
    ///
    /// # Errors
    ///
    /// - `InvalidParameter` for bad params or `n_clusters == 0`
    /// - `InsufficientData` if there are fewer points than clusters
    pub fn fit(data: &[Vec<f64>], n_clusters: usize, params: &BirchParams) -> ClusterResult<Self> {
        params.validate()?;
        if n_clusters == 0 {
            return Err(ClusterError::invalid_parameter("n_clusters must be >= 1"));
        }
        let dim = validate_matrix(data, n_clusters)?;

        let mut tree = CfTree::new(params.clone(), dim)?;
        for (i, point) in data.iter().enumerate() {
            tree.insert(point, i)?;
        }

        let subclusters = tree.leaf_subclusters();
        let subcluster_centroids: Vec<Vec<f64>> =
            subclusters.iter().map(|(cf, _)| cf.centroid()).collect();

        let subcluster_labels = if subcluster_centroids.len() > n_clusters {
            let merges = ward_merges(&subcluster_centroids);
            cut_tree(subcluster_centroids.len(), &merges, n_clusters)
        } else {
            (0..subcluster_centroids.len()).collect()
        };

        tracing::debug!(
            "BIRCH: {} points, {} subclusters, tree height {}",
            tree.total_points(),
            subcluster_centroids.len(),
            tree.height()
        );

        let mut model = Self {
            subcluster_centroids,
            subcluster_labels,
            labels: Vec::new(),
        };
        model.labels = model.predict(data)?;
        Ok(model)
    }

    /// Number of leaf subclusters in the fitted tree.
    pub fn n_subclusters(&self) -> usize {
        self.subcluster_centroids.len()
    }

    /// Leaf subcluster centroids.
    pub fn subcluster_centroids(&self) -> &[Vec<f64>] {
        &self.subcluster_centroids
    }
}

impl ClusterModel for Birch {
    fn kind(&self) -> ModelKind {
        ModelKind::Birch
    }

    fn training_labels(&self) -> &[usize] {
        &self.labels
    }

    /// Group of the nearest subcluster centroid; lowest subcluster on ties.
    fn predict(&self, points: &[Vec<f64>]) -> ClusterResult<Vec<usize>> {
        let dim = self.subcluster_centroids.first().map(Vec::len).unwrap_or(0);
        points
            .iter()
            .map(|p| {
                if p.len() != dim {
                    return Err(ClusterError::dimension_mismatch(dim, p.len()));
                }
                let (idx, _) = nearest_index(p, &self.subcluster_centroids)
                    .ok_or_else(|| ClusterError::numerical("BIRCH model has no subclusters"))?;
                Ok(self.subcluster_labels[idx])
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // ClusteringFeature TESTS
    // =========================================================================

    #[test]
    fn test_cf_radius_two_symmetric_points() {
        let mut cf = ClusteringFeature::from_point(&[-1.0, 0.0]);
        cf.add_point(&[1.0, 0.0]).unwrap();
        assert_eq!(cf.centroid(), vec![0.0, 0.0]);
        assert!((cf.radius() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_cf_merge_is_additive() {
        let mut a = ClusteringFeature::from_point(&[1.0, 2.0]);
        let b = ClusteringFeature::from_point(&[3.0, 4.0]);
        a.merge(&b).unwrap();
        assert_eq!(a.n, 2);
        assert_eq!(a.ls, vec![4.0, 6.0]);
        assert!((a.ss - 30.0).abs() < 1e-12);

        let mut empty = ClusteringFeature::new(2);
        empty.merge(&a).unwrap();
        assert_eq!(empty, a);
    }

    #[test]
    fn test_cf_dimension_mismatch() {
        let mut cf = ClusteringFeature::from_point(&[1.0, 2.0]);
        assert!(cf.add_point(&[1.0]).is_err());
        assert!(cf.distance(&ClusteringFeature::from_point(&[0.0])).is_err());
    }

    #[test]
    fn test_cf_would_fit() {
        let cf = ClusteringFeature::from_point(&[0.0, 0.0]);
        assert!(cf.would_fit(&[0.1, 0.0], 0.5));
        assert!(!cf.would_fit(&[5.0, 0.0], 0.5));
        assert!(ClusteringFeature::new(2).would_fit(&[100.0, 0.0], 0.1));
    }

    // =========================================================================
    // CF-tree TESTS
    // =========================================================================

    #[test]
    fn test_tree_splits_and_keeps_every_point() {
        let params = BirchParams::default()
            .with_branching_factor(3)
            .with_threshold(0.01);
        let mut tree = CfTree::new(params, 1).unwrap();
        for i in 0..40 {
            tree.insert(&[i as f64], i).unwrap();
        }

        let leaves = tree.leaf_subclusters();
        let mut members: Vec<usize> = leaves.iter().flat_map(|(_, m)| m.clone()).collect();
        members.sort_unstable();
        assert_eq!(members, (0..40).collect::<Vec<_>>());
        assert_eq!(leaves.len(), 40);
        assert!(tree.height() >= 3);

        println!(
            "[PASS] test_tree_splits_and_keeps_every_point - leaves={}, height={}",
            leaves.len(),
            tree.height()
        );
    }

    fn widest_node(node: &CfNode) -> usize {
        node.entries
            .iter()
            .filter_map(|e| e.child.as_deref())
            .map(widest_node)
            .fold(node.entries.len(), usize::max)
    }

    #[test]
    fn test_branching_factor_bounds_every_node() {
        let build = |bf: usize| {
            let params = BirchParams::default().with_branching_factor(bf).with_threshold(0.01);
            let mut tree = CfTree::new(params, 1).unwrap();
            for i in 0..40 {
                tree.insert(&[i as f64], i).unwrap();
            }
            tree
        };

        for bf in [2, 3, 5, 8] {
            let tree = build(bf);
            assert!(widest_node(&tree.root) <= bf, "bf={} widest={}", bf, widest_node(&tree.root));
            assert_eq!(tree.leaf_subclusters().len(), 40);
        }

        let wide = build(50);
        assert_eq!(wide.height(), 1);
        assert!(build(2).height() > build(8).height());
        println!("[PASS] test_branching_factor_bounds_every_node");
    }

    #[test]
    fn test_tree_rejects_bad_points() {
        let mut tree = CfTree::new(BirchParams::default(), 2).unwrap();
        assert!(tree.insert(&[1.0], 0).is_err());
        assert!(tree.insert(&[f64::NAN, 0.0], 0).is_err());
        assert!(CfTree::new(BirchParams::default(), 0).is_err());
    }

    // =========================================================================
    // Birch model TESTS
    // =========================================================================

    #[test]
    fn test_birch_global_step_reduces_to_k() {
        let mut data = Vec::new();
        for c in 0..3 {
            for i in 0..10 {
                data.push(vec![c as f64 * 10.0 + i as f64 * 0.3, 0.0]);
            }
        }
        let model = Birch::fit(&data, 3, &BirchParams::default()).unwrap();
        assert!(model.n_subclusters() > 3);
        assert_eq!(model.observed_groups(), 3);

        let labels = model.training_labels();
        for c in 0..3 {
            let block = &labels[c * 10..(c + 1) * 10];
            assert!(block.iter().all(|&l| l == block[0]));
        }
        assert_eq!(model.predict(&data).unwrap(), labels);
    }

    #[test]
    fn test_birch_fewer_subclusters_than_k() {
        let data = vec![
            vec![0.0, 0.0],
            vec![0.01, 0.0],
            vec![5.0, 5.0],
            vec![5.01, 5.0],
        ];
        let model = Birch::fit(&data, 4, &BirchParams::default()).unwrap();
        assert_eq!(model.n_subclusters(), 2);
        assert_eq!(model.observed_groups(), 2);
        assert_eq!(model.predict(&[vec![4.9, 5.1]]).unwrap()[0], model.training_labels()[2]);
    }

    #[test]
    fn test_birch_params_validation() {
        assert!(BirchParams::default().validate().is_ok());
        assert!(BirchParams::default().with_branching_factor(1).validate().is_err());
        assert!(BirchParams::default().with_threshold(f64::NAN).validate().is_err());
    }
}
