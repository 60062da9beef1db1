//! Error types for severity-core.

use thiserror::Error;

use crate::clustering::ClusterError;

/// Top-level error type for severity-core.
#[derive(Debug, Error)]
pub enum ScaleError {
    /// Training corpus is empty or degenerate (zero variance in a dimension).
    #[error("Data error: {0}")]
    Data(String),

    /// A record does not match the fitted feature schema.
    #[error("Schema error in record '{record}': {message}")]
    Schema { record: String, message: String },

    /// An individual clustering model failed to train.
    #[error("Model '{model}' failed to fit: {reason}")]
    ModelFit {
        model: String,
        #[source]
        reason: ClusterError,
    },

    /// Every model in the bank failed to train.
    #[error("Cluster model bank is empty: no model trained successfully")]
    EmptyBank,

    /// A group label has no rank in the model's scale mapping.
    #[error("Mapping error in record '{record}': model '{model}' produced unmapped group {label}")]
    Mapping {
        record: String,
        model: String,
        label: usize,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl ScaleError {
    /// Create a Data error.
    pub fn data(message: impl Into<String>) -> Self {
        Self::Data(message.into())
    }

    /// Create a Schema error for the given record.
    pub fn schema(record: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Schema {
            record: record.into(),
            message: message.into(),
        }
    }

    /// Create a ModelFit error attributing the failure to `model`.
    pub fn model_fit(model: impl Into<String>, reason: ClusterError) -> Self {
        Self::ModelFit {
            model: model.into(),
            reason,
        }
    }

    /// Identity of the record this error is about, if any.
    pub fn record(&self) -> Option<&str> {
        match self {
            Self::Schema { record, .. } | Self::Mapping { record, .. } => Some(record),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ScaleError {
    fn from(err: serde_json::Error) -> Self {
        ScaleError::Serialization(err.to_string())
    }
}

impl From<config::ConfigError> for ScaleError {
    fn from(err: config::ConfigError) -> Self {
        ScaleError::Config(err.to_string())
    }
}

/// Result type alias for severity-core operations.
pub type ScaleResult<T> = Result<T, ScaleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_error_names_record() {
        let err = ScaleError::schema("row-17", "missing dimension 'q2'");
        assert!(err.to_string().contains("row-17"));
        assert!(err.to_string().contains("q2"));
        assert_eq!(err.record(), Some("row-17"));
    }

    #[test]
    fn test_model_fit_error_names_model() {
        let err = ScaleError::model_fit("gmm", ClusterError::insufficient_data(10, 3));
        let msg = err.to_string();
        assert!(msg.contains("gmm"), "got: {}", msg);
        assert!(std::error::Error::source(&err).is_some());
        assert_eq!(err.record(), None);
    }

    #[test]
    fn test_mapping_error_display() {
        let err = ScaleError::Mapping {
            record: "patient-3".into(),
            model: "spectral".into(),
            label: 11,
        };
        let msg = err.to_string();
        assert!(msg.contains("patient-3"));
        assert!(msg.contains("spectral"));
        assert!(msg.contains("11"));
    }
}
