//! Configuration for training and scoring.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::clustering::{
    BirchParams, ClusterError, GmmParams, HierarchicalParams, KMeansParams, MiniBatchParams,
    ModelKind, SpectralParams,
};
use crate::error::{ScaleError, ScaleResult};
use crate::schema::FeatureSchema;

/// Main configuration structure.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SeverityConfig {
    pub schema: FeatureSchema,
    pub training: TrainingConfig,
    pub models: ModelsConfig,
    pub output: OutputConfig,
    pub logging: LoggingConfig,
}

impl SeverityConfig {
    /// Load configuration from files and environment.
    ///
    /// Configuration is loaded in order:
    /// 1. config/default.toml (base settings)
    /// 2. config/{SEVERITY_ENV}.toml (environment-specific)
    /// 3. Environment variables with SEVERITY__ prefix, `__` between keys
    ///    (e.g. `SEVERITY__TRAINING__N_GROUPS=8`)
    pub fn load() -> ScaleResult<Self> {
        let env = std::env::var("SEVERITY_ENV").unwrap_or_else(|_| "development".to_string());

        let builder = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{}", env)).required(false))
            .add_source(
                config::Environment::with_prefix("SEVERITY")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );

        let config: SeverityConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> ScaleResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ScaleError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        let config: SeverityConfig = toml::from_str(&content)
            .map_err(|e| ScaleError::Config(format!("Failed to parse config file: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> ScaleResult<()> {
        self.schema.validate()?;

        if self.training.n_groups < 2 {
            return Err(ScaleError::Config(format!(
                "training.n_groups must be >= 2, got {}",
                self.training.n_groups
            )));
        }

        if self.training.models.is_empty() {
            return Err(ScaleError::Config(
                "training.models must name at least one model".into(),
            ));
        }
        let mut seen = HashSet::new();
        for kind in &self.training.models {
            if !seen.insert(*kind) {
                return Err(ScaleError::Config(format!(
                    "training.models lists '{}' more than once",
                    kind
                )));
            }
        }

        let invalid = |e: ClusterError| ScaleError::Config(format!("models: {}", e));
        self.models.kmeans.validate().map_err(invalid)?;
        self.models.minibatch.validate().map_err(invalid)?;
        self.models.gmm.validate().map_err(invalid)?;
        self.models.hierarchical.validate().map_err(invalid)?;
        self.models.spectral.validate().map_err(invalid)?;
        self.models.birch.validate().map_err(invalid)?;

        if self.output.score_column.trim().is_empty() {
            return Err(ScaleError::Config(
                "output.score_column must not be empty".into(),
            ));
        }
        if self.schema.features.contains(&self.output.score_column) {
            return Err(ScaleError::Config(format!(
                "output.score_column '{}' collides with a feature name",
                self.output.score_column
            )));
        }
        if self.output.precision > 12 {
            return Err(ScaleError::Config(format!(
                "output.precision must be <= 12, got {}",
                self.output.precision
            )));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Target group count K for every model.
    pub n_groups: usize,
    /// Seed shared by every stochastic model.
    pub seed: u64,
    /// Fit models on the rayon pool.
    pub parallel: bool,
    /// Bank roster, in bank order.
    pub models: Vec<ModelKind>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            n_groups: 10,
            seed: 42,
            parallel: false,
            models: ModelKind::ALL.to_vec(),
        }
    }
}

/// Per-model hyperparameters.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ModelsConfig {
    pub kmeans: KMeansParams,
    pub minibatch: MiniBatchParams,
    pub gmm: GmmParams,
    pub hierarchical: HierarchicalParams,
    pub spectral: SpectralParams,
    pub birch: BirchParams,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Column appended by the batch job.
    pub score_column: String,
    /// Decimal places in the display format.
    pub precision: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            score_column: "itch_level".to_string(),
            precision: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SeverityConfig::default();
        assert_eq!(config.training.n_groups, 10);
        assert_eq!(config.training.seed, 42);
        assert_eq!(config.training.models.len(), 6);
        assert_eq!(config.output.score_column, "itch_level");
        assert_eq!(config.models.kmeans.n_init, 10);
        assert_eq!(config.models.minibatch.batch_size, 1024);
        assert_eq!(config.models.gmm.reg_covar, 1e-6);
        assert_eq!(config.models.birch.threshold, 0.5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_fails_single_group() {
        let mut config = SeverityConfig::default();
        config.training.n_groups = 1;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("training.n_groups"));
    }

    #[test]
    fn test_validation_fails_duplicate_model() {
        let mut config = SeverityConfig::default();
        config.training.models = vec![ModelKind::KMeans, ModelKind::Gmm, ModelKind::KMeans];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("kmeans"));
    }

    #[test]
    fn test_validation_fails_empty_roster() {
        let mut config = SeverityConfig::default();
        config.training.models.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_fails_bad_model_params() {
        let mut config = SeverityConfig::default();
        config.models.spectral.gamma = -1.0;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ScaleError::Config(_)));
        assert!(err.to_string().contains("spectral.gamma"));
    }

    #[test]
    fn test_validation_fails_score_column_collision() {
        let mut config = SeverityConfig::default();
        config.output.score_column = "q1".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_serialization_round_trip() {
        let config = SeverityConfig::default();
        let toml_str = toml::to_string(&config).expect("Config must serialize to TOML");
        let deserialized: SeverityConfig =
            toml::from_str(&toml_str).expect("Config must deserialize from TOML");
        assert_eq!(deserialized, config);
    }

    #[test]
    fn test_config_from_partial_toml_string() {
        let toml_str = r#"
            [training]
            n_groups = 5
            models = ["kmeans", "birch"]

            [models.birch]
            threshold = 0.8

            [output]
            score_column = "severity"
        "#;

        let config: SeverityConfig = toml::from_str(toml_str).expect("Config must parse from TOML");

        assert_eq!(config.training.n_groups, 5);
        assert_eq!(config.training.seed, 42);
        assert_eq!(config.training.models, vec![ModelKind::KMeans, ModelKind::Birch]);
        assert_eq!(config.models.birch.threshold, 0.8);
        assert_eq!(config.models.birch.branching_factor, 50);
        assert_eq!(config.output.score_column, "severity");
        assert_eq!(config.output.precision, 2);
        assert_eq!(config.schema, FeatureSchema::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_shipped_default_toml_matches_defaults() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config/default.toml");
        let config = SeverityConfig::from_file(&path).unwrap();
        assert_eq!(config, SeverityConfig::default());
    }

    #[test]
    fn test_from_file_reads_and_validates() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path();

        let good = dir.join("good.toml");
        std::fs::write(&good, "[training]\nseed = 7\n").unwrap();
        assert_eq!(SeverityConfig::from_file(&good).unwrap().training.seed, 7);

        let bad = dir.join("bad.toml");
        std::fs::write(&bad, "[training]\nn_groups = 0\n").unwrap();
        assert!(SeverityConfig::from_file(&bad).is_err());

        assert!(SeverityConfig::from_file(&dir.join("missing.toml")).is_err());
    }
}
