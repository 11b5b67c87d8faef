//! Error types for the model runtime

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Engine-level failure carried as the cause of a prediction error
pub type ErrorCause = Arc<dyn std::error::Error + Send + Sync>;

/// Main runtime error type
#[derive(Error, Debug, Clone)]
pub enum RuntimeError {
    /// No adapter for the format, or its engine is not available
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// The stored bytes could not be deserialized
    #[error("Corrupt binary: {0}")]
    CorruptBinary(String),

    /// Request values cannot form the representation the model needs
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    /// The raw model result has no known normalizer
    #[error("Unsupported output type: {0}")]
    UnsupportedOutputType(String),

    /// The underlying model raised
    #[error("Prediction failed: {message}")]
    Prediction {
        message: String,
        #[source]
        cause: Option<ErrorCause>,
    },

    #[error("Binary lookup failed: {0}")]
    Lookup(String),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RuntimeError {
    pub fn prediction(message: impl Into<String>) -> Self {
        RuntimeError::Prediction {
            message: message.into(),
            cause: None,
        }
    }

    /// Wrap an engine failure, keeping it reachable through `source()`
    pub fn prediction_caused_by<E>(message: impl Into<String>, cause: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        RuntimeError::Prediction {
            message: message.into(),
            cause: Some(Arc::new(cause)),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            RuntimeError::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
            RuntimeError::CorruptBinary(_) => ErrorKind::CorruptBinary,
            RuntimeError::TypeMismatch(_) => ErrorKind::TypeMismatch,
            RuntimeError::UnsupportedOutputType(_) => ErrorKind::UnsupportedOutputType,
            RuntimeError::Prediction { .. } => ErrorKind::PredictionError,
            RuntimeError::Lookup(_) => ErrorKind::LookupError,
            RuntimeError::Configuration(_) => ErrorKind::ConfigurationError,
            RuntimeError::Internal(_) => ErrorKind::InternalError,
        }
    }

    /// Whether the failure happened while constructing an executor
    ///
    /// Construction failures are never cached; per-call failures leave the
    /// cached executor untouched.
    pub fn is_construction_failure(&self) -> bool {
        matches!(
            self,
            RuntimeError::UnsupportedFormat(_) | RuntimeError::CorruptBinary(_)
        )
    }

    /// Structured `{kind, message}` surface for callers
    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            kind: self.kind(),
            message: self.to_string(),
        }
    }
}

/// Stable classification of runtime failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    UnsupportedFormat,
    CorruptBinary,
    TypeMismatch,
    UnsupportedOutputType,
    PredictionError,
    LookupError,
    ConfigurationError,
    InternalError,
}

/// Serializable error body handed to the serving layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub message: String,
}

/// Configuration-related errors
#[derive(Error, Debug, Clone)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("IO error reading config file: {message}")]
    IoError { message: String },

    #[error("Configuration parsing error: {message}")]
    ParseError { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[derive(Debug, Error)]
    #[error("division by zero in node 3")]
    struct EngineFailure;

    #[test]
    fn test_prediction_error_keeps_cause() {
        let err = RuntimeError::prediction_caused_by("model raised", EngineFailure);
        assert_eq!(err.kind(), ErrorKind::PredictionError);
        let source = err.source().expect("cause should be attached");
        assert_eq!(source.to_string(), "division by zero in node 3");
    }

    #[test]
    fn test_error_body_serializes_kind_and_message() {
        let body = RuntimeError::CorruptBinary("truncated stream".to_string()).to_body();
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["kind"], "CorruptBinary");
        assert_eq!(json["message"], "Corrupt binary: truncated stream");
    }

    #[test]
    fn test_construction_failures_are_classified() {
        assert!(RuntimeError::UnsupportedFormat("PMML".into()).is_construction_failure());
        assert!(RuntimeError::CorruptBinary("x".into()).is_construction_failure());
        assert!(!RuntimeError::TypeMismatch("x".into()).is_construction_failure());
        assert!(!RuntimeError::prediction("x").is_construction_failure());
    }
}
