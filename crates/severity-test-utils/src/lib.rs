//! Deterministic synthetic patient corpora.
//!
//! Every generator takes a seed and uses `ChaCha8Rng`, so a corpus is
//! identical across runs and platforms. Records use the default ten-feature
//! schema (`q1, q2, w1..w8`).

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use severity_core::FeatureRecord;

/// Default feature order, indicators first.
pub const DEFAULT_FEATURES: [&str; 10] = ["q1", "q2", "w1", "w2", "w3", "w4", "w5", "w6", "w7", "w8"];

/// Distance between consecutive cluster centres on the indicator axes.
pub const INDICATOR_STEP: f64 = 10.0;

/// Symptom-weight centres are drawn from `-WEIGHT_SPREAD..WEIGHT_SPREAD`.
pub const WEIGHT_SPREAD: f64 = 40.0;

/// Records scatter uniformly within `+-NOISE` of their cluster centre.
pub const NOISE: f64 = 0.5;

/// A corpus of well-separated clusters with known generating centres.
///
/// Cluster `c` has both indicator coordinates equal to `c * INDICATOR_STEP`,
/// so severity increases with the cluster index.
#[derive(Debug, Clone)]
pub struct ClusteredCorpus {
    pub records: Vec<FeatureRecord>,
    /// Generating centre of each cluster, in feature order.
    pub centers: Vec<Vec<f64>>,
    /// Generating cluster of each record.
    pub clusters: Vec<usize>,
}

impl ClusteredCorpus {
    pub fn n_clusters(&self) -> usize {
        self.centers.len()
    }

    /// A record placed exactly at the generating centre of cluster `c`.
    pub fn center_record(&self, c: usize) -> FeatureRecord {
        record_from_values(format!("center-{}", c), &self.centers[c])
    }

    /// Sample mean of the records generated by cluster `c`.
    pub fn sample_centroid(&self, c: usize) -> Vec<f64> {
        let mut sum = vec![0.0; DEFAULT_FEATURES.len()];
        let mut n = 0usize;
        for (record, &cluster) in self.records.iter().zip(self.clusters.iter()) {
            if cluster != c {
                continue;
            }
            for (s, name) in sum.iter_mut().zip(DEFAULT_FEATURES.iter()) {
                *s += record.values[*name];
            }
            n += 1;
        }
        sum.iter().map(|s| s / n as f64).collect()
    }
}

/// Build a record from values in default feature order.
pub fn record_from_values(id: impl Into<String>, values: &[f64]) -> FeatureRecord {
    FeatureRecord::from_pairs(id, DEFAULT_FEATURES.iter().copied().zip(values.iter().copied()))
}

/// `n_clusters` clusters of `per_cluster` records each.
pub fn clustered_corpus(n_clusters: usize, per_cluster: usize, seed: u64) -> ClusteredCorpus {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    let centers: Vec<Vec<f64>> = (0..n_clusters)
        .map(|c| {
            let severity = c as f64 * INDICATOR_STEP;
            let mut center = vec![severity, severity];
            center.extend((2..DEFAULT_FEATURES.len()).map(|_| rng.gen_range(-WEIGHT_SPREAD..WEIGHT_SPREAD)));
            center
        })
        .collect();

    let mut records = Vec::with_capacity(n_clusters * per_cluster);
    let mut clusters = Vec::with_capacity(n_clusters * per_cluster);
    for (c, center) in centers.iter().enumerate() {
        for i in 0..per_cluster {
            let values: Vec<f64> = center.iter().map(|v| v + rng.gen_range(-NOISE..NOISE)).collect();
            records.push(record_from_values(format!("c{}-r{}", c, i), &values));
            clusters.push(c);
        }
    }

    ClusteredCorpus {
        records,
        centers,
        clusters,
    }
}

/// The reference scenario: 200 records across 10 clusters, seed 42.
pub fn scenario_corpus() -> ClusteredCorpus {
    clustered_corpus(10, 20, 42)
}

/// `n` unstructured records with dimension-specific scales and offsets.
pub fn noisy_corpus(n: usize, seed: u64) -> Vec<FeatureRecord> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..n)
        .map(|i| {
            let values: Vec<f64> = (0..DEFAULT_FEATURES.len())
                .map(|d| {
                    let scale = (d + 1) as f64;
                    d as f64 * 3.0 + scale * rng.gen_range(-1.0..1.0)
                })
                .collect();
            record_from_values(format!("n{}", i), &values)
        })
        .collect()
}

/// Render records as CSV with an `id` column followed by `features`.
pub fn to_csv(records: &[FeatureRecord], features: &[&str]) -> String {
    let mut out = String::from("id");
    for name in features {
        out.push(',');
        out.push_str(name);
    }
    out.push('\n');
    for record in records {
        out.push_str(&record.id);
        for name in features {
            out.push(',');
            out.push_str(&record.values[*name].to_string());
        }
        out.push('\n');
    }
    out
}
