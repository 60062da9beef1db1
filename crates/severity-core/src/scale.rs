//! Severity scale mapping.
//!
//! Turns one model's unordered group labels into ranks 1..K'. Each observed
//! group's severity index is the mean of the severity-indicator coordinates of
//! its standardized centroid. Groups are sorted ascending by that index, ties
//! broken by ascending raw label, and ranked by position.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::clustering::{ClusterModel, GroupCentroids, ModelKind};
use crate::error::{ScaleError, ScaleResult};

/// One ranked group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupRank {
    /// Raw label produced by the model.
    pub label: usize,
    /// Position on the severity scale, starting at 1.
    pub rank: usize,
    /// Mean of the indicator coordinates of the group centroid.
    pub severity_index: f64,
    /// Training points in the group.
    pub size: usize,
}

/// Mean of the coordinates of `centroid` at `indices`.
pub fn severity_index(centroid: &[f64], indices: &[usize]) -> f64 {
    let sum: f64 = indices.iter().map(|&i| centroid[i]).sum();
    sum / indices.len() as f64
}

/// Label -> rank bijection for one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaleMapping {
    model: ModelKind,
    ranks: BTreeMap<usize, usize>,
    groups: Vec<GroupRank>,
}

impl ScaleMapping {
    /// Build the mapping from a model's training labels over `corpus`.
    ///
    /// # Errors
    ///
    /// - `ModelFit` if the labels do not line up with the corpus
    /// - `Data` if an indicator index is outside the centroid dimension
    pub fn build_mapping(
        model: &dyn ClusterModel,
        corpus: &[Vec<f64>],
        severity_indices: &[usize],
    ) -> ScaleResult<Self> {
        let centroids = GroupCentroids::compute(corpus, model.training_labels())
            .map_err(|e| ScaleError::model_fit(model.kind().name(), e))?;
        Self::from_centroids(model.kind(), &centroids, severity_indices)
    }

    /// Build the mapping from precomputed group centroids.
    ///
    /// # Errors
    ///
    /// `Data` if there are no indicators, an indicator index is outside the
    /// centroid dimension, or a severity index is not finite.
    pub fn from_centroids(
        model: ModelKind,
        centroids: &GroupCentroids,
        severity_indices: &[usize],
    ) -> ScaleResult<Self> {
        if severity_indices.is_empty() {
            return Err(ScaleError::data("no severity-indicator dimensions"));
        }
        if let Some(&bad) = severity_indices.iter().find(|&&i| i >= centroids.dimension()) {
            return Err(ScaleError::data(format!(
                "severity indicator index {} outside dimension {}",
                bad,
                centroids.dimension()
            )));
        }

        let mut scored: Vec<(usize, f64, usize)> = centroids
            .iter()
            .map(|g| (g.label, severity_index(&g.centroid, severity_indices), g.size))
            .collect();
        if let Some((label, _, _)) = scored.iter().find(|(_, s, _)| !s.is_finite()) {
            return Err(ScaleError::data(format!(
                "model '{}' group {} has a non-finite severity index",
                model, label
            )));
        }

        scored.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));

        let groups: Vec<GroupRank> = scored
            .into_iter()
            .enumerate()
            .map(|(pos, (label, severity_index, size))| GroupRank {
                label,
                rank: pos + 1,
                severity_index,
                size,
            })
            .collect();
        let ranks = groups.iter().map(|g| (g.label, g.rank)).collect();

        tracing::debug!(
            "Scale mapping for {}: {:?}",
            model,
            groups.iter().map(|g| (g.label, g.rank)).collect::<Vec<_>>()
        );

        Ok(Self {
            model,
            ranks,
            groups,
        })
    }

    /// Rank of `label`, if the label was observed in training.
    pub fn rank(&self, label: usize) -> Option<usize> {
        self.ranks.get(&label).copied()
    }

    pub fn model(&self) -> ModelKind {
        self.model
    }

    /// Groups in ascending rank order.
    pub fn groups(&self) -> &[GroupRank] {
        &self.groups
    }

    /// Number of ranked groups (K').
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn forget_label(&mut self, label: usize) {
        self.ranks.remove(&label);
    }
}
