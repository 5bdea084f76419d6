//! Error types for the exoplanet classifier

use thiserror::Error;

/// Result type alias for classifier operations
pub type Result<T> = std::result::Result<T, ExoError>;

/// Main error type shared by training, registry and serving
#[derive(Error, Debug)]
pub enum ExoError {
    #[error("No model loaded. Train a model or switch to an available one first")]
    NotLoaded,

    #[error("Model artifact not found: {0}")]
    ArtifactNotFound(String),

    #[error("Missing required columns: {}", missing.join(", "))]
    SchemaMismatch { missing: Vec<String> },

    #[error("Target column '{0}' not found in dataset")]
    MissingTargetColumn(String),

    #[error("Unknown model family: {0}")]
    UnknownModelFamily(String),

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Model fitting failed: {0}")]
    FitFailure(String),

    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("Data error: {0}")]
    DataError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl ExoError {
    pub(crate) fn invalid_param(
        name: impl Into<String>,
        value: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        ExoError::InvalidParameter {
            name: name.into(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<polars::error::PolarsError> for ExoError {
    fn from(err: polars::error::PolarsError) -> Self {
        ExoError::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for ExoError {
    fn from(err: serde_json::Error) -> Self {
        ExoError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for ExoError {
    fn from(err: ndarray::ShapeError) -> Self {
        ExoError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_mismatch_lists_columns() {
        let err = ExoError::SchemaMismatch {
            missing: vec!["koi_period".to_string(), "koi_prad".to_string()],
        };
        assert_eq!(err.to_string(), "Missing required columns: koi_period, koi_prad");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: ExoError = io_err.into();
        assert!(matches!(err, ExoError::IoError(_)));
    }

    #[test]
    fn test_invalid_param_display() {
        let err = ExoError::invalid_param("n_estimators", 0, "must be within [10, 500]");
        assert_eq!(
            err.to_string(),
            "Invalid parameter: n_estimators = 0, must be within [10, 500]"
        );
    }
}
