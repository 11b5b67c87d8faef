//! Format adapter and model handle traits
//!
//! A [`FormatAdapter`] turns the stored bytes of one [`BinaryFormat`] into a
//! [`ModelHandle`]. Handles expose their capabilities through
//! [`ModelHandle::has_method`], which the executor probes once at
//! construction instead of inspecting the model on every call.
//!
//! # Adding New Formats
//!
//! 1. Implement [`FormatAdapter`] and a [`ModelHandle`] for the loaded model
//! 2. Map deserialization failures to [`RuntimeError::CorruptBinary`] and a
//!    missing engine to [`RuntimeError::UnsupportedFormat`]
//! 3. Route engine failures through [`engine_failure`] so they are logged
//!    and wrapped as prediction errors
//! 4. Register the adapter in [`AdapterRegistry::with_defaults`](super::AdapterRegistry::with_defaults)

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::normalize::{InputNormalizer, ModelInput, RawOutput};
use crate::types::{BinaryFormat, RuntimeError};

/// Named capabilities a loaded model may expose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelMethod {
    Predict,
    PredictProba,
}

impl ModelMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelMethod::Predict => "predict",
            ModelMethod::PredictProba => "predict_proba",
        }
    }
}

/// Introspection data a handle can report about itself
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelSignature {
    pub model_name: Option<String>,
    pub subtype: Option<String>,
    /// Input field name → data type
    pub input_fields: Option<IndexMap<String, String>>,
    /// Output field name → data type
    pub output_fields: Option<IndexMap<String, String>>,
}

/// An invocable, deserialized model
pub trait ModelHandle: Send + Sync + std::fmt::Debug {
    /// Whether the model supports the named method
    fn has_method(&self, method: ModelMethod) -> bool;

    /// Run the model on a normalized input
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Prediction`] when the model engine fails.
    fn predict(&self, input: &ModelInput) -> Result<RawOutput, RuntimeError>;

    /// Class probabilities; only called when `has_method(PredictProba)` holds
    fn predict_proba(&self, input: &ModelInput) -> Result<RawOutput, RuntimeError> {
        let _ = input;
        Err(RuntimeError::prediction(format!(
            "model does not implement {}",
            ModelMethod::PredictProba.as_str()
        )))
    }

    /// Input representation used when the endpoint declares `AUTO`
    fn preferred_input(&self) -> InputNormalizer {
        InputNormalizer::DataFrame
    }

    fn signature(&self) -> ModelSignature {
        ModelSignature::default()
    }
}

/// Loader for one binary serialization format
pub trait FormatAdapter: Send + Sync {
    fn format(&self) -> BinaryFormat;

    /// Human-readable adapter name used in logs
    fn name(&self) -> &str;

    /// Deserialize `binary` into an invocable handle
    ///
    /// # Errors
    ///
    /// [`RuntimeError::UnsupportedFormat`] when the required engine is not
    /// available, [`RuntimeError::CorruptBinary`] when the bytes do not
    /// deserialize.
    fn load(&self, binary: &[u8]) -> Result<Arc<dyn ModelHandle>, RuntimeError>;
}

/// Log an engine failure together with the offending input, then wrap it
pub fn engine_failure<E>(format: BinaryFormat, input: &ModelInput, error: E) -> RuntimeError
where
    E: std::error::Error + Send + Sync + 'static,
{
    tracing::error!(
        format = %format,
        input = ?input,
        error = %error,
        "Failed to predict"
    );
    RuntimeError::prediction_caused_by(format!("{} model raised: {}", format, error), error)
}
