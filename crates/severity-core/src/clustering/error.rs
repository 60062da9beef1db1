//! Error types for clustering operations.

use thiserror::Error;

/// Errors that can occur while fitting or applying a clustering model.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// Not enough data points for clustering.
    #[error("Insufficient data: required {required}, actual {actual}")]
    InsufficientData {
        /// Minimum required data points
        required: usize,
        /// Actual data points provided
        actual: usize,
    },

    /// Point dimension doesn't match the dimension the model was fitted on.
    #[error("Dimension mismatch: expected {expected}, actual {actual}")]
    DimensionMismatch {
        /// Expected dimension
        expected: usize,
        /// Actual dimension provided
        actual: usize,
    },

    /// Invalid parameter provided.
    #[error("Invalid parameter: {message}")]
    InvalidParameter {
        /// Description of what's wrong with the parameter
        message: String,
    },

    /// The algorithm hit a numerical dead end (singular covariance, NaN, ...).
    #[error("Numerical failure: {message}")]
    NumericalFailure {
        /// What went wrong
        message: String,
    },

    /// The model has no native inference path.
    #[error("Operation not supported by {model}: {operation}")]
    Unsupported {
        /// Model name
        model: &'static str,
        /// Operation that was requested
        operation: &'static str,
    },
}

impl ClusterError {
    /// Create an InsufficientData error.
    pub fn insufficient_data(required: usize, actual: usize) -> Self {
        Self::InsufficientData { required, actual }
    }

    /// Create a DimensionMismatch error.
    pub fn dimension_mismatch(expected: usize, actual: usize) -> Self {
        Self::DimensionMismatch { expected, actual }
    }

    /// Create an InvalidParameter error.
    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            message: message.into(),
        }
    }

    /// Create a NumericalFailure error.
    pub fn numerical(message: impl Into<String>) -> Self {
        Self::NumericalFailure {
            message: message.into(),
        }
    }
}

/// Result alias for clustering operations.
pub type ClusterResult<T> = Result<T, ClusterError>;

/// Check that `data` is a non-empty, rectangular, finite matrix with at least
/// `min_points` rows. Returns the dimension.
pub(crate) fn validate_matrix(data: &[Vec<f64>], min_points: usize) -> ClusterResult<usize> {
    if data.len() < min_points.max(1) {
        return Err(ClusterError::insufficient_data(min_points.max(1), data.len()));
    }
    let dim = data[0].len();
    if dim == 0 {
        return Err(ClusterError::invalid_parameter(
            "points must have at least one dimension",
        ));
    }
    for (i, row) in data.iter().enumerate() {
        if row.len() != dim {
            return Err(ClusterError::dimension_mismatch(dim, row.len()));
        }
        if let Some(j) = row.iter().position(|v| !v.is_finite()) {
            return Err(ClusterError::invalid_parameter(format!(
                "point[{}][{}] is not finite: {}",
                i, j, row[j]
            )));
        }
    }
    Ok(dim)
}
