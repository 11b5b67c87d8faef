//! PICKLE and JOBLIB adapter
//!
//! Both formats carry a pickled object graph; JOBLIB files may additionally
//! be zlib or gzip compressed. The decoded graph is offered to a list of
//! [`ObjectEngine`]s, the first engine that recognizes the object builds the
//! handle.

use flate2::read::{GzDecoder, ZlibDecoder};
use serde_pickle::{DeOptions, HashableValue, Value as PickleValue};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::io::Read;
use std::sync::Arc;

use super::adapter::{FormatAdapter, ModelHandle};
use super::estimator::LinearEstimatorEngine;
use crate::types::{BinaryFormat, RuntimeError};

/// Interprets a decoded pickle object as an invocable model
pub trait ObjectEngine: Send + Sync {
    fn name(&self) -> &str;

    /// `Ok(None)` when the object is not something this engine understands
    fn interpret(
        &self,
        format: BinaryFormat,
        object: &PickleValue,
    ) -> Result<Option<Arc<dyn ModelHandle>>, RuntimeError>;
}

pub struct PickleAdapter {
    format: BinaryFormat,
    engines: Vec<Arc<dyn ObjectEngine>>,
}

impl PickleAdapter {
    pub fn pickle() -> Self {
        Self::bare(BinaryFormat::Pickle).with_engine(Arc::new(LinearEstimatorEngine))
    }

    pub fn joblib() -> Self {
        Self::bare(BinaryFormat::Joblib).with_engine(Arc::new(LinearEstimatorEngine))
    }

    /// Adapter without any object engine
    pub fn bare(format: BinaryFormat) -> Self {
        Self {
            format,
            engines: Vec::new(),
        }
    }

    pub fn with_engine(mut self, engine: Arc<dyn ObjectEngine>) -> Self {
        self.engines.push(engine);
        self
    }

    pub fn engines(&self) -> impl Iterator<Item = &str> {
        self.engines.iter().map(|e| e.name())
    }
}

impl FormatAdapter for PickleAdapter {
    fn format(&self) -> BinaryFormat {
        self.format
    }

    fn name(&self) -> &str {
        match self.format {
            BinaryFormat::Joblib => "joblib",
            _ => "pickle",
        }
    }

    fn load(&self, binary: &[u8]) -> Result<Arc<dyn ModelHandle>, RuntimeError> {
        if self.engines.is_empty() {
            return Err(RuntimeError::UnsupportedFormat(format!(
                "no object engine available for {}",
                self.format
            )));
        }

        let bytes = match self.format {
            BinaryFormat::Joblib => decompress(binary)?,
            _ => Cow::Borrowed(binary),
        };
        let object = serde_pickle::value_from_slice(&bytes, DeOptions::new()).map_err(|e| {
            RuntimeError::CorruptBinary(format!("{} binary does not unpickle: {}", self.format, e))
        })?;

        for engine in &self.engines {
            if let Some(handle) = engine.interpret(self.format, &object)? {
                tracing::debug!(format = %self.format, engine = engine.name(), "Unpickled model");
                return Ok(handle);
            }
        }
        Err(RuntimeError::UnsupportedFormat(format!(
            "no object engine understands a pickled {}",
            describe(&object)
        )))
    }
}

/// Strip joblib compression, if any
pub(crate) fn decompress(binary: &[u8]) -> Result<Cow<'_, [u8]>, RuntimeError> {
    let corrupt = |e: std::io::Error| {
        RuntimeError::CorruptBinary(format!("JOBLIB binary does not decompress: {}", e))
    };
    match binary {
        [0x1f, 0x8b, ..] => {
            let mut out = Vec::new();
            GzDecoder::new(binary).read_to_end(&mut out).map_err(corrupt)?;
            Ok(Cow::Owned(out))
        }
        [0x78, second, ..] if ((u16::from(0x78u8) << 8) | u16::from(*second)) % 31 == 0 => {
            let mut out = Vec::new();
            ZlibDecoder::new(binary).read_to_end(&mut out).map_err(corrupt)?;
            Ok(Cow::Owned(out))
        }
        _ => Ok(Cow::Borrowed(binary)),
    }
}

/// Short type name of a pickled object, for error messages
pub(crate) fn describe(value: &PickleValue) -> &'static str {
    match value {
        PickleValue::None => "None",
        PickleValue::Bool(_) => "bool",
        PickleValue::I64(_) | PickleValue::Int(_) => "int",
        PickleValue::F64(_) => "float",
        PickleValue::Bytes(_) => "bytes",
        PickleValue::String(_) => "str",
        PickleValue::List(_) => "list",
        PickleValue::Tuple(_) => "tuple",
        PickleValue::Set(_) => "set",
        PickleValue::FrozenSet(_) => "frozenset",
        PickleValue::Dict(_) => "dict",
    }
}

/// Dictionary lookup accepting both text and byte-string keys
pub(crate) fn dict_get<'a>(
    dict: &'a BTreeMap<HashableValue, PickleValue>,
    key: &str,
) -> Option<&'a PickleValue> {
    dict.get(&HashableValue::String(key.to_string()))
        .or_else(|| dict.get(&HashableValue::Bytes(key.as_bytes().to_vec())))
}
