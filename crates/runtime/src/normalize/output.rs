//! Raw model result → smallest serializable shape

use ndarray::ArrayD;
use serde_json::Value;

use super::frame::DataFrame;
use crate::types::{OutputEncoding, ParamValue, RuntimeError};

/// Result of a model call before normalization
#[derive(Debug, Clone, PartialEq)]
pub enum RawOutput {
    /// Array-like numeric result of any rank
    Array(ArrayD<f64>),
    /// One-dimensional array of class labels
    Labels(Vec<Value>),
    /// Tabular result with named columns
    Table(DataFrame),
    /// Plain (possibly nested) sequence
    List(Vec<Value>),
    /// A bare value no normalizer understands
    Scalar(Value),
}

impl RawOutput {
    pub fn type_name(&self) -> &'static str {
        match self {
            RawOutput::Array(_) => "array",
            RawOutput::Labels(_) => "labels",
            RawOutput::Table(_) => "table",
            RawOutput::List(_) => "list",
            RawOutput::Scalar(_) => "scalar",
        }
    }
}

/// Conversion applied to every raw result before it leaves the executor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputNormalizer {
    NdArray,
    DataFrame,
    List,
}

impl OutputNormalizer {
    pub fn from_encoding(encoding: OutputEncoding) -> Option<Self> {
        match encoding {
            OutputEncoding::Auto => None,
            OutputEncoding::NumpyArray => Some(OutputNormalizer::NdArray),
            OutputEncoding::Dataframe => Some(OutputNormalizer::DataFrame),
            OutputEncoding::List => Some(OutputNormalizer::List),
        }
    }

    /// Pick the normalizer matching the runtime type of a raw result
    pub fn detect(raw: &RawOutput) -> Result<Self, RuntimeError> {
        match raw {
            RawOutput::Array(_) | RawOutput::Labels(_) => Ok(OutputNormalizer::NdArray),
            RawOutput::Table(_) => Ok(OutputNormalizer::DataFrame),
            RawOutput::List(_) => Ok(OutputNormalizer::List),
            RawOutput::Scalar(value) => Err(RuntimeError::UnsupportedOutputType(format!(
                "no normalizer for bare {} result",
                json_type(value)
            ))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            OutputNormalizer::NdArray => "ndarray",
            OutputNormalizer::DataFrame => "dataframe",
            OutputNormalizer::List => "list",
        }
    }

    pub fn apply(&self, raw: &RawOutput) -> Result<Value, RuntimeError> {
        match (self, raw) {
            (OutputNormalizer::NdArray, RawOutput::Array(array)) => Ok(from_ndarray(array)),
            (OutputNormalizer::NdArray, RawOutput::Labels(labels)) => Ok(from_list(labels)),
            (OutputNormalizer::DataFrame, RawOutput::Table(frame)) => Ok(from_dataframe(frame)),
            (OutputNormalizer::List, RawOutput::List(values)) => Ok(from_list(values)),
            (normalizer, raw) => Err(RuntimeError::UnsupportedOutputType(format!(
                "{} normalizer cannot handle a {} result",
                normalizer.name(),
                raw.type_name()
            ))),
        }
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Collapse a sequence: length-1 → scalar, 1×N → flat list, R×N unchanged
pub fn from_list(values: &[Value]) -> Value {
    match values {
        [] => Value::Array(Vec::new()),
        [Value::Array(first)] => match first.as_slice() {
            [only] => only.clone(),
            _ => Value::Array(first.clone()),
        },
        [single] => single.clone(),
        _ => Value::Array(values.to_vec()),
    }
}

/// Array → nested lists, then collapsed like [`from_list`]
pub fn from_ndarray(array: &ArrayD<f64>) -> Value {
    match nested(array) {
        Value::Array(values) => from_list(&values),
        scalar => scalar,
    }
}

fn nested(array: &ArrayD<f64>) -> Value {
    if array.ndim() == 0 {
        return array
            .iter()
            .next()
            .map(|v| ParamValue::Float(*v).to_json())
            .unwrap_or(Value::Null);
    }
    Value::Array(
        array
            .outer_iter()
            .map(|sub| nested(&sub.to_owned()))
            .collect(),
    )
}

/// Table → row dictionaries, then collapsed like [`from_list`]
pub fn from_dataframe(frame: &DataFrame) -> Value {
    from_list(&frame.records())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr0, array};
    use serde_json::json;

    #[test]
    fn test_from_list_collapses_singletons() {
        assert_eq!(from_list(&[json!(0.5)]), json!(0.5));
        assert_eq!(from_list(&[json!(1), json!(2)]), json!([1, 2]));
        assert_eq!(from_list(&[json!([0.5])]), json!(0.5));
        assert_eq!(from_list(&[json!([0.2, 0.8])]), json!([0.2, 0.8]));
        assert_eq!(
            from_list(&[json!([0.5, 0.5]), json!([0.5, 0.5])]),
            json!([[0.5, 0.5], [0.5, 0.5]])
        );
        assert_eq!(from_list(&[]), json!([]));
    }

    #[test]
    fn test_from_ndarray_shapes() {
        assert_eq!(from_ndarray(&array![0.5].into_dyn()), json!(0.5));
        assert_eq!(
            from_ndarray(&array![[0.5, 0.5], [0.5, 0.5]].into_dyn()),
            json!([[0.5, 0.5], [0.5, 0.5]])
        );
        assert_eq!(from_ndarray(&array![[0.1, 0.9]].into_dyn()), json!([0.1, 0.9]));
        assert_eq!(from_ndarray(&arr0(2.0).into_dyn()), json!(2.0));
        assert_eq!(from_ndarray(&array![f64::NAN, 1.0].into_dyn()), json!([null, 1.0]));
    }

    #[test]
    fn test_from_dataframe_yields_records() {
        let frame = DataFrame::new(
            vec!["label".to_string(), "p".to_string()],
            vec![
                vec![ParamValue::from("a"), ParamValue::Float(0.9)],
                vec![ParamValue::from("b"), ParamValue::Float(0.6)],
            ],
        )
        .unwrap();
        assert_eq!(
            from_dataframe(&frame),
            json!([{"label": "a", "p": 0.9}, {"label": "b", "p": 0.6}])
        );

        let single = DataFrame::new(vec!["p".to_string()], vec![vec![ParamValue::Float(0.9)]]).unwrap();
        assert_eq!(from_dataframe(&single), json!({"p": 0.9}));
    }

    #[test]
    fn test_detect_by_runtime_type() {
        assert_eq!(
            OutputNormalizer::detect(&RawOutput::Array(array![1.0].into_dyn())).unwrap(),
            OutputNormalizer::NdArray
        );
        assert_eq!(
            OutputNormalizer::detect(&RawOutput::Labels(vec![json!("a")])).unwrap(),
            OutputNormalizer::NdArray
        );
        assert_eq!(
            OutputNormalizer::detect(&RawOutput::List(vec![json!(1)])).unwrap(),
            OutputNormalizer::List
        );
        assert!(matches!(
            OutputNormalizer::detect(&RawOutput::Scalar(json!("x"))),
            Err(RuntimeError::UnsupportedOutputType(_))
        ));
    }

    #[test]
    fn test_explicit_normalizer_rejects_other_kinds() {
        let raw = RawOutput::List(vec![json!(1)]);
        assert!(matches!(
            OutputNormalizer::DataFrame.apply(&raw),
            Err(RuntimeError::UnsupportedOutputType(_))
        ));
    }
}
