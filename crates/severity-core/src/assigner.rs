//! Out-of-sample assignment for labels-only models.
//!
//! A new standardized point takes the label of the training group whose
//! centroid is nearest in Euclidean distance. Equidistant centroids resolve to
//! the lowest label. The centroids come from [`GroupCentroids::compute`], the
//! same routine the scale mapper ranks.

use crate::clustering::{ClusterModel, ClusterResult, GroupCentroids};

/// Assign `points` to the nearest of precomputed group centroids.
///
/// # Errors
///
/// `DimensionMismatch` if a point has the wrong dimension.
pub fn assign_to_centroids(
    centroids: &GroupCentroids,
    points: &[Vec<f64>],
) -> ClusterResult<Vec<usize>> {
    points.iter().map(|p| centroids.nearest(p)).collect()
}

/// Assign `points` using `model`'s training groups over `training`.
///
/// # Errors
///
/// `DimensionMismatch` if `training` does not match the model's labels or a
/// point has the wrong dimension.
pub fn assign(
    model: &dyn ClusterModel,
    training: &[Vec<f64>],
    points: &[Vec<f64>],
) -> ClusterResult<Vec<usize>> {
    let centroids = GroupCentroids::compute(training, model.training_labels())?;
    assign_to_centroids(&centroids, points)
}
