//! Stored model binaries and the uniform prediction shape

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::{BinaryFormat, InputEncoding, OutputEncoding};

/// Auxiliary key/value pairs merged into every prediction of an endpoint
pub type InfoMap = serde_json::Map<String, serde_json::Value>;

/// Model binary plus the format metadata recorded at upload time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredBinary {
    pub binary: Bytes,
    pub format: BinaryFormat,
    #[serde(default)]
    pub input_encoding: InputEncoding,
    #[serde(default)]
    pub output_encoding: OutputEncoding,
    #[serde(default)]
    pub info: InfoMap,
}

impl StoredBinary {
    pub fn new(binary: impl Into<Bytes>, format: BinaryFormat) -> Self {
        Self {
            binary: binary.into(),
            format,
            input_encoding: InputEncoding::Auto,
            output_encoding: OutputEncoding::Auto,
            info: InfoMap::new(),
        }
    }

    pub fn with_encodings(mut self, input: InputEncoding, output: OutputEncoding) -> Self {
        self.input_encoding = input;
        self.output_encoding = output;
        self
    }

    pub fn with_info(mut self, info: InfoMap) -> Self {
        self.info = info;
        self
    }

    /// Take the auxiliary info from a model configuration's metadata object
    ///
    /// Only an object stored under `field` is used; anything else yields an
    /// empty map.
    pub fn with_metadata(mut self, metadata: Option<&serde_json::Value>, field: &str) -> Self {
        self.info = metadata
            .and_then(|m| m.get(field))
            .and_then(|v| v.as_object())
            .cloned()
            .unwrap_or_default();
        self
    }
}

/// Uniform prediction result: `{predictions, scores?, ...info}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub predictions: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scores: Option<serde_json::Value>,
    #[serde(flatten)]
    pub info: InfoMap,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_prediction_serializes_flat() {
        let mut info = InfoMap::new();
        info.insert("owner".to_string(), json!("risk-team"));
        let prediction = Prediction {
            predictions: json!(1),
            scores: None,
            info,
        };
        assert_eq!(
            serde_json::to_value(&prediction).unwrap(),
            json!({"predictions": 1, "owner": "risk-team"})
        );
    }

    #[test]
    fn test_with_metadata_extracts_configured_field() {
        let metadata = json!({"additional": {"version": "2"}, "other": 1});
        let stored = StoredBinary::new(vec![1u8], BinaryFormat::Pickle)
            .with_metadata(Some(&metadata), "additional");
        assert_eq!(stored.info.get("version"), Some(&json!("2")));

        let stored = StoredBinary::new(vec![1u8], BinaryFormat::Pickle)
            .with_metadata(Some(&json!({"additional": 5})), "additional");
        assert!(stored.info.is_empty());

        let stored = StoredBinary::new(vec![1u8], BinaryFormat::Pickle).with_metadata(None, "additional");
        assert!(stored.info.is_empty());
    }
}
