//! Group centroids and nearest-centroid assignment.
//!
//! A [`GroupCentroids`] holds the mean point of every observed group label in
//! a labelled point set. It is shared by the severity scale mapper (which
//! ranks groups by their centroids) and by the out-of-sample assigner (which
//! sends new points to the nearest centroid).
//!
//! Groups are kept sorted by ascending label, so every scan over them is
//! deterministic and ties resolve to the lowest label.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::error::{ClusterError, ClusterResult};

/// Squared Euclidean distance between two equal-length points.
#[inline]
pub fn squared_euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Index of the centroid nearest to `point`, with its squared distance.
///
/// Ties resolve to the lowest index. Returns `None` for an empty slice.
pub fn nearest_index(point: &[f64], centroids: &[Vec<f64>]) -> Option<(usize, f64)> {
    let mut best: Option<(usize, f64)> = None;
    for (i, c) in centroids.iter().enumerate() {
        let d = squared_euclidean(point, c);
        match best {
            Some((_, bd)) if d >= bd => {}
            _ => best = Some((i, d)),
        }
    }
    best
}

/// Mean point of one group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupCentroid {
    /// Raw group label produced by the model.
    pub label: usize,
    /// Mean of the member points.
    pub centroid: Vec<f64>,
    /// Number of member points.
    pub size: usize,
}

/// Centroids of every non-empty group, sorted by ascending label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupCentroids {
    groups: Vec<GroupCentroid>,
    dimension: usize,
}

impl GroupCentroids {
    /// Group `points` by `labels` and average each group.
    ///
    /// # Errors
    ///
    /// - `InsufficientData` if there are no points
    /// - `DimensionMismatch` if `labels` and `points` differ in length or
    ///   points are ragged
    pub fn compute(points: &[Vec<f64>], labels: &[usize]) -> ClusterResult<Self> {
        if points.is_empty() {
            return Err(ClusterError::insufficient_data(1, 0));
        }
        if points.len() != labels.len() {
            return Err(ClusterError::dimension_mismatch(points.len(), labels.len()));
        }

        let dimension = points[0].len();
        let mut sums: BTreeMap<usize, (Vec<f64>, usize)> = BTreeMap::new();

        for (point, &label) in points.iter().zip(labels.iter()) {
            if point.len() != dimension {
                return Err(ClusterError::dimension_mismatch(dimension, point.len()));
            }
            let (sum, count) = sums
                .entry(label)
                .or_insert_with(|| (vec![0.0; dimension], 0));
            for (s, v) in sum.iter_mut().zip(point.iter()) {
                *s += v;
            }
            *count += 1;
        }

        let groups = sums
            .into_iter()
            .map(|(label, (sum, size))| GroupCentroid {
                label,
                centroid: sum.into_iter().map(|s| s / size as f64).collect(),
                size,
            })
            .collect();

        Ok(Self { groups, dimension })
    }

    /// Label of the centroid nearest to `point` (Euclidean).
    ///
    /// Equidistant centroids resolve to the lowest label.
    ///
    /// # Errors
    ///
    /// Returns `DimensionMismatch` if `point` has the wrong dimension.
    pub fn nearest(&self, point: &[f64]) -> ClusterResult<usize> {
        if point.len() != self.dimension {
            return Err(ClusterError::dimension_mismatch(self.dimension, point.len()));
        }
        let mut best_label = self.groups[0].label;
        let mut best_dist = f64::INFINITY;
        for group in &self.groups {
            let d = squared_euclidean(point, &group.centroid);
            if d < best_dist {
                best_dist = d;
                best_label = group.label;
            }
        }
        Ok(best_label)
    }

    /// Centroid of a given label.
    pub fn get(&self, label: usize) -> Option<&GroupCentroid> {
        self.groups
            .binary_search_by_key(&label, |g| g.label)
            .ok()
            .map(|i| &self.groups[i])
    }

    /// All groups in ascending label order.
    pub fn iter(&self) -> impl Iterator<Item = &GroupCentroid> {
        self.groups.iter()
    }

    /// Number of non-empty groups.
    #[inline]
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Always false for a successfully computed value.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Dimension of the centroids.
    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_groups_sorted_by_label() {
        let points = vec![
            vec![0.0, 0.0],
            vec![10.0, 10.0],
            vec![2.0, 0.0],
            vec![12.0, 10.0],
        ];
        let labels = vec![7, 3, 7, 3];
        let centroids = GroupCentroids::compute(&points, &labels).unwrap();

        let got: Vec<usize> = centroids.iter().map(|g| g.label).collect();
        assert_eq!(got, vec![3, 7]);
        assert_eq!(centroids.get(3).unwrap().centroid, vec![11.0, 10.0]);
        assert_eq!(centroids.get(7).unwrap().centroid, vec![1.0, 0.0]);
        assert_eq!(centroids.get(7).unwrap().size, 2);
        assert!(centroids.get(5).is_none());

        println!("[PASS] test_compute_groups_sorted_by_label");
    }

    #[test]
    fn test_nearest_ties_resolve_to_lowest_label() {
        let points = vec![vec![-1.0], vec![1.0]];
        let centroids = GroupCentroids::compute(&points, &[9, 4]).unwrap();

        // 0.0 is equidistant from both centroids.
        assert_eq!(centroids.nearest(&[0.0]).unwrap(), 4);
        assert_eq!(centroids.nearest(&[-0.9]).unwrap(), 9);
        assert!(centroids.nearest(&[0.0, 1.0]).is_err());
    }

    #[test]
    fn test_nearest_index_ties_lowest_index() {
        let cs = vec![vec![1.0], vec![-1.0]];
        assert_eq!(nearest_index(&[0.0], &cs).unwrap().0, 0);
        assert!(nearest_index(&[0.0], &[]).is_none());
    }

    #[test]
    fn test_length_mismatch_is_error() {
        assert!(GroupCentroids::compute(&[vec![1.0]], &[0, 1]).is_err());
        assert!(GroupCentroids::compute(&[], &[]).is_err());
    }
}
