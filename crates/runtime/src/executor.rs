//! Invocation executor
//!
//! Binds one loaded model handle to an input normalizer and an output
//! normalizer. Both normalizers are either fixed at construction from the
//! endpoint's declared encodings or, under `AUTO`, resolved on first use and
//! then frozen for the life of the executor.

use std::sync::{Arc, OnceLock};

use crate::models::{AdapterRegistry, ModelHandle, ModelMethod};
use crate::normalize::{InputNormalizer, OutputNormalizer, RawOutput};
use crate::types::{
    BinaryFormat, InfoMap, InputEncoding, OutputEncoding, Prediction, PredictionRequest,
    RuntimeError, StoredBinary,
};

/// Response keys that auxiliary info may not shadow
const RESERVED_KEYS: [&str; 2] = ["predictions", "scores"];

pub struct InvocationExecutor {
    handle: Arc<dyn ModelHandle>,
    format: BinaryFormat,
    input: OnceLock<InputNormalizer>,
    output: OnceLock<OutputNormalizer>,
    can_predict_proba: bool,
    info: InfoMap,
}

impl InvocationExecutor {
    /// Load the stored binary through the matching adapter
    ///
    /// Fails fast with [`RuntimeError::UnsupportedFormat`] or
    /// [`RuntimeError::CorruptBinary`] so a bad binary never reaches the cache.
    pub fn new(registry: &AdapterRegistry, stored: &StoredBinary) -> Result<Self, RuntimeError> {
        let adapter = registry.get(stored.format)?;
        let handle = adapter.load(&stored.binary)?;
        Ok(Self::from_handle(
            handle,
            stored.format,
            stored.input_encoding,
            stored.output_encoding,
            stored.info.clone(),
        ))
    }

    /// Wrap an already loaded handle
    pub fn from_handle(
        handle: Arc<dyn ModelHandle>,
        format: BinaryFormat,
        input_encoding: InputEncoding,
        output_encoding: OutputEncoding,
        mut info: InfoMap,
    ) -> Self {
        for key in RESERVED_KEYS {
            if info.remove(key).is_some() {
                tracing::warn!(key, format = %format, "Dropping reserved key from auxiliary info");
            }
        }

        let input = match InputNormalizer::from_encoding(input_encoding) {
            Some(normalizer) => OnceLock::from(normalizer),
            None => OnceLock::new(),
        };
        let output = match OutputNormalizer::from_encoding(output_encoding) {
            Some(normalizer) => OnceLock::from(normalizer),
            None => OnceLock::new(),
        };
        let can_predict_proba = handle.has_method(ModelMethod::PredictProba);

        tracing::info!(
            format = %format,
            input_encoding = ?input_encoding,
            output_encoding = ?output_encoding,
            can_predict_proba,
            "Created invocation executor"
        );

        Self {
            handle,
            format,
            input,
            output,
            can_predict_proba,
            info,
        }
    }

    pub fn format(&self) -> BinaryFormat {
        self.format
    }

    pub fn can_predict_proba(&self) -> bool {
        self.can_predict_proba
    }

    pub fn info(&self) -> &InfoMap {
        &self.info
    }

    pub fn handle(&self) -> &Arc<dyn ModelHandle> {
        &self.handle
    }

    /// Resolved input normalizer, `None` until the first `AUTO` call
    pub fn input_normalizer(&self) -> Option<InputNormalizer> {
        self.input.get().copied()
    }

    /// Resolved output normalizer, `None` until the first `AUTO` result
    pub fn output_normalizer(&self) -> Option<OutputNormalizer> {
        self.output.get().copied()
    }

    fn resolve_input(&self) -> InputNormalizer {
        *self.input.get_or_init(|| {
            let normalizer = self.handle.preferred_input();
            tracing::debug!(format = %self.format, normalizer = normalizer.name(), "Resolved input normalizer");
            normalizer
        })
    }

    fn resolve_output(&self, raw: &RawOutput) -> Result<OutputNormalizer, RuntimeError> {
        if let Some(normalizer) = self.output.get() {
            return Ok(*normalizer);
        }
        let detected = OutputNormalizer::detect(raw)?;
        // a lost race stores the same normalizer for the same result kind
        let normalizer = *self.output.get_or_init(|| detected);
        tracing::debug!(format = %self.format, normalizer = normalizer.name(), "Resolved output normalizer");
        Ok(normalizer)
    }

    fn normalize_output(&self, raw: &RawOutput) -> Result<serde_json::Value, RuntimeError> {
        self.resolve_output(raw)?.apply(raw).map_err(|e| {
            tracing::error!(format = %self.format, output = ?raw, error = %e, "Failed to normalize output");
            e
        })
    }

    /// Normalize, invoke, normalize back, and attach auxiliary info
    ///
    /// Nothing is returned unless every step succeeds.
    pub fn predict(&self, request: &PredictionRequest) -> Result<Prediction, RuntimeError> {
        let normalizer = self.resolve_input();
        let input = normalizer.apply(request).map_err(|e| {
            tracing::error!(
                format = %self.format,
                normalizer = normalizer.name(),
                request = ?request,
                error = %e,
                "Failed to normalize input"
            );
            e
        })?;
        tracing::debug!(format = %self.format, input = ?input, "Invoking model");

        let raw = self.handle.predict(&input)?;
        tracing::debug!(format = %self.format, output = ?raw, "Model returned");
        let predictions = self.normalize_output(&raw)?;

        let scores = if self.can_predict_proba {
            let raw = self.handle.predict_proba(&input)?;
            Some(self.normalize_output(&raw)?)
        } else {
            None
        };

        Ok(Prediction {
            predictions,
            scores,
            info: self.info.clone(),
        })
    }
}

impl std::fmt::Debug for InvocationExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvocationExecutor")
            .field("format", &self.format)
            .field("input", &self.input.get())
            .field("output", &self.output.get())
            .field("can_predict_proba", &self.can_predict_proba)
            .field("info", &self.info)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::ModelInput;
    use crate::types::Parameter;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Echoes the row count and records which representation it received
    #[derive(Debug, Default)]
    struct EchoModel {
        proba: bool,
        raw: Option<RawOutput>,
        calls: AtomicUsize,
        last_input: parking_lot::Mutex<Option<&'static str>>,
    }

    impl ModelHandle for EchoModel {
        fn has_method(&self, method: ModelMethod) -> bool {
            match method {
                ModelMethod::Predict => true,
                ModelMethod::PredictProba => self.proba,
            }
        }

        fn predict(&self, input: &ModelInput) -> Result<RawOutput, RuntimeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_input.lock() = Some(input.type_name());
            let default = || RawOutput::Array(ndarray::Array1::from_elem(input.n_rows(), 0.5).into_dyn());
            Ok(self.raw.clone().unwrap_or_else(default))
        }

        fn predict_proba(&self, input: &ModelInput) -> Result<RawOutput, RuntimeError> {
            Ok(RawOutput::Array(
                ndarray::Array2::from_elem((input.n_rows(), 2), 0.5).into_dyn(),
            ))
        }
    }

    fn executor(model: EchoModel, input: InputEncoding, output: OutputEncoding) -> InvocationExecutor {
        InvocationExecutor::from_handle(Arc::new(model), BinaryFormat::Pickle, input, output, InfoMap::new())
    }

    fn single_row() -> PredictionRequest {
        PredictionRequest::row(vec![Parameter::new("x", 0.5), Parameter::new("y", 10)])
    }

    #[test]
    fn test_predict_assembles_response() {
        let mut info = InfoMap::new();
        info.insert("version".to_string(), json!("v2"));
        info.insert("scores".to_string(), json!("shadowed"));
        let model = EchoModel {
            proba: true,
            ..Default::default()
        };
        let executor = InvocationExecutor::from_handle(
            Arc::new(model),
            BinaryFormat::Pickle,
            InputEncoding::Auto,
            OutputEncoding::Auto,
            info,
        );
        assert!(executor.can_predict_proba());
        assert!(!executor.info().contains_key("scores"));

        let prediction = executor.predict(&single_row()).unwrap();
        assert_eq!(
            serde_json::to_value(&prediction).unwrap(),
            json!({"predictions": 0.5, "scores": [0.5, 0.5], "version": "v2"})
        );
    }

    #[test]
    fn test_auto_resolution_is_sticky() {
        let model = Arc::new(EchoModel::default());
        let executor = InvocationExecutor::from_handle(
            model.clone(),
            BinaryFormat::Pickle,
            InputEncoding::Auto,
            OutputEncoding::Auto,
            InfoMap::new(),
        );
        assert_eq!(executor.input_normalizer(), None);
        assert_eq!(executor.output_normalizer(), None);

        executor.predict(&single_row()).unwrap();
        assert_eq!(executor.input_normalizer(), Some(InputNormalizer::DataFrame));
        assert_eq!(executor.output_normalizer(), Some(OutputNormalizer::NdArray));

        executor.predict(&single_row()).unwrap();
        assert_eq!(executor.input_normalizer(), Some(InputNormalizer::DataFrame));
        assert_eq!(model.calls.load(Ordering::SeqCst), 2);
        assert_eq!(*model.last_input.lock(), Some("dataframe"));
    }

    #[test]
    fn test_explicit_encodings_are_preset() {
        let model = EchoModel::default();
        let executor = executor(model, InputEncoding::List, OutputEncoding::NumpyArray);
        assert_eq!(executor.input_normalizer(), Some(InputNormalizer::List));
        assert_eq!(executor.output_normalizer(), Some(OutputNormalizer::NdArray));
        executor.predict(&single_row()).unwrap();
    }

    #[test]
    fn test_type_mismatch_is_per_call() {
        let executor = executor(EchoModel::default(), InputEncoding::NumpyArray, OutputEncoding::Auto);
        let mixed = PredictionRequest::row(vec![Parameter::new("x", 0.5), Parameter::new("y", "bad")]);
        assert!(matches!(
            executor.predict(&mixed),
            Err(RuntimeError::TypeMismatch(_))
        ));
        assert!(executor.predict(&single_row()).is_ok());
    }

    #[test]
    fn test_unrecognized_output_leaves_slot_unresolved() {
        let model = EchoModel {
            raw: Some(RawOutput::Scalar(json!("odd"))),
            ..Default::default()
        };
        let executor = executor(model, InputEncoding::Auto, OutputEncoding::Auto);
        assert!(matches!(
            executor.predict(&single_row()),
            Err(RuntimeError::UnsupportedOutputType(_))
        ));
        assert_eq!(executor.output_normalizer(), None);
    }

    #[test]
    fn test_explicit_output_mismatch() {
        let model = EchoModel {
            raw: Some(RawOutput::List(vec![json!(1)])),
            ..Default::default()
        };
        let executor = executor(model, InputEncoding::Auto, OutputEncoding::Dataframe);
        assert!(matches!(
            executor.predict(&single_row()),
            Err(RuntimeError::UnsupportedOutputType(_))
        ));
    }

    #[test]
    fn test_unregistered_format_fails_construction() {
        let registry = AdapterRegistry::empty();
        let stored = StoredBinary::new(vec![0u8; 4], BinaryFormat::Pickle);
        assert!(matches!(
            InvocationExecutor::new(&registry, &stored),
            Err(RuntimeError::UnsupportedFormat(_))
        ));
    }
}
