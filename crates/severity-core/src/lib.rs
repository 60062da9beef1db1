//! Severity Core Library
//!
//! Turns a multivariate patient feature vector into an ordinal severity score
//! on a 1..K scale, using an ensemble of unsupervised clustering models.
//!
//! # Architecture
//!
//! - [`normalizer`]: per-dimension z-score standardization fitted once on the corpus
//! - [`clustering`]: the six cluster models and their shared centroid routines
//! - [`bank`]: trains the model roster, excluding models that fail
//! - [`scale`]: ranks each model's groups by the mean of the severity indicators
//! - [`assigner`]: nearest-centroid labels for models without native predict
//! - [`ensemble`]: the trained ensemble, averaging mapped ranks per record
//!
//! # Example
//!
//! ```
//! use severity_core::{FeatureSchema, SeverityConfig};
//!
//! let mut config = SeverityConfig::default();
//! config.schema = FeatureSchema::new(["q1", "q2", "w1"], ["q1", "q2"]).unwrap();
//! config.training.n_groups = 4;
//! assert!(config.validate().is_ok());
//! ```

pub mod assigner;
pub mod bank;
pub mod clustering;
pub mod config;
pub mod ensemble;
pub mod error;
pub mod normalizer;
pub mod scale;
pub mod schema;

// Re-exports for convenience
pub use bank::{ExcludedModel, FittedModel, ModelBank};
pub use clustering::{ClusterError, ClusterModel, ClusterResult, ModelKind};
pub use config::SeverityConfig;
pub use ensemble::{format_score, ModelVote, ScoreBreakdown, TrainedEnsemble, TrainingSummary};
pub use error::{ScaleError, ScaleResult};
pub use normalizer::NormalizerState;
pub use scale::{GroupRank, ScaleMapping};
pub use schema::{FeatureRecord, FeatureSchema};
