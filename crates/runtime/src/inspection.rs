//! Upload-time inspection of model binaries
//!
//! [`inspect_binary`] builds an executor exactly as the cache would, so a
//! binary that inspects cleanly will also load on the serving path.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::executor::InvocationExecutor;
use crate::models::pickle::decompress;
use crate::models::AdapterRegistry;
use crate::types::{BinaryFormat, RuntimeError, StoredBinary};

/// PROTO opcode opening every protocol 2+ stream
const PROTO: u8 = 0x80;

/// Opcodes that only exist in binary protocol streams
const BINARY_OPCODES: &[u8] = b"}])KJMXUTGqrhj";

/// What an uploaded binary declares about itself
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinarySignature {
    pub format: BinaryFormat,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_fields: Option<IndexMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_fields: Option<IndexMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pickle_protocol: Option<u8>,
    pub can_predict_proba: bool,
}

/// Probe a binary and report its signature
///
/// # Errors
///
/// Any construction failure, which means the upload must be rejected.
pub fn inspect_binary(
    registry: &AdapterRegistry,
    stored: &StoredBinary,
) -> Result<BinarySignature, RuntimeError> {
    let executor = InvocationExecutor::new(registry, stored)?;
    let signature = executor.handle().signature();

    let pickle_protocol = match stored.format {
        BinaryFormat::Pickle => pickle_protocol(&stored.binary),
        BinaryFormat::Joblib => pickle_protocol(&decompress(&stored.binary)?),
        _ => None,
    };

    tracing::debug!(format = %stored.format, ?pickle_protocol, "Inspected model binary");

    Ok(BinarySignature {
        format: stored.format,
        model_name: signature.model_name,
        subtype: signature.subtype,
        input_fields: signature.input_fields,
        output_fields: signature.output_fields,
        pickle_protocol,
        can_predict_proba: executor.can_predict_proba(),
    })
}

/// Protocol version of a pickle stream, `None` for an empty one
///
/// Streams of protocol 2 and later declare their version in a leading
/// PROTO opcode. Older streams are told apart by their opcodes: protocol 0
/// is printable ASCII throughout.
pub fn pickle_protocol(bytes: &[u8]) -> Option<u8> {
    match bytes {
        [] => None,
        [PROTO, version, ..] => Some(*version),
        [first, ..] if BINARY_OPCODES.contains(first) => Some(1),
        _ if bytes.iter().all(|b| b.is_ascii()) => Some(0),
        _ => Some(1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::booster::tests::stump_model;

    #[test]
    fn test_protocol_detection() {
        assert_eq!(pickle_protocol(&[]), None);
        assert_eq!(pickle_protocol(&[0x80, 0x04, 0x95]), Some(4));
        assert_eq!(pickle_protocol(b"(lp0\nI1\na."), Some(0));
        assert_eq!(pickle_protocol(b"]q\x00(K\x01e."), Some(1));

        let bytes = serde_pickle::to_vec(&vec![1, 2], serde_pickle::SerOptions::new()).unwrap();
        assert_eq!(pickle_protocol(&bytes), Some(bytes[1]));
    }

    #[test]
    fn test_inspect_booster() {
        let registry = AdapterRegistry::with_defaults();
        let stored = StoredBinary::new(stump_model("binary:logistic", "0.5"), BinaryFormat::Booster);
        let signature = inspect_binary(&registry, &stored).unwrap();

        assert_eq!(signature.format, BinaryFormat::Booster);
        assert_eq!(signature.subtype.as_deref(), Some("binary:logistic"));
        assert_eq!(signature.pickle_protocol, None);
        assert!(!signature.can_predict_proba);
        let fields: Vec<_> = signature.input_fields.unwrap().into_keys().collect();
        assert_eq!(fields, vec!["x", "y"]);
    }

    #[cfg(feature = "pmml")]
    #[test]
    fn test_inspect_pmml() {
        use crate::models::pmml::tests::LINEAR_PMML;

        let registry = AdapterRegistry::with_defaults();
        let stored = StoredBinary::new(LINEAR_PMML.as_bytes().to_vec(), BinaryFormat::Pmml);
        let signature = inspect_binary(&registry, &stored).unwrap();

        assert_eq!(signature.model_name.as_deref(), Some("linear"));
        assert_eq!(signature.subtype.as_deref(), Some("RegressionModel"));
        assert!(signature.input_fields.unwrap().contains_key("x"));
    }

    #[test]
    fn test_inspect_rejects_corrupt_upload() {
        let registry = AdapterRegistry::with_defaults();
        let stored = StoredBinary::new(vec![0x80u8, 0x03, 0xff], BinaryFormat::Pickle);
        assert!(matches!(
            inspect_binary(&registry, &stored),
            Err(RuntimeError::CorruptBinary(_))
        ));
    }
}
