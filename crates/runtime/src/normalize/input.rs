//! Request → model input conversions

use ndarray::Array2;

use super::frame::{DMatrix, DataFrame, NdArray};
use super::ModelInput;
use crate::types::{InputEncoding, ParamValue, Parameter, PredictionRequest, RuntimeError, ValueKind};

/// Conversion applied to every request before it reaches the model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputNormalizer {
    List,
    NdArray,
    DataFrame,
    DMatrix,
}

impl InputNormalizer {
    /// Explicit encodings map directly; `Auto` has no normalizer yet
    pub fn from_encoding(encoding: InputEncoding) -> Option<Self> {
        match encoding {
            InputEncoding::Auto => None,
            InputEncoding::List => Some(InputNormalizer::List),
            InputEncoding::NumpyArray => Some(InputNormalizer::NdArray),
            InputEncoding::Dataframe => Some(InputNormalizer::DataFrame),
            InputEncoding::Dmatrix => Some(InputNormalizer::DMatrix),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            InputNormalizer::List => "list",
            InputNormalizer::NdArray => "ndarray",
            InputNormalizer::DataFrame => "dataframe",
            InputNormalizer::DMatrix => "dmatrix",
        }
    }

    pub fn apply(&self, request: &PredictionRequest) -> Result<ModelInput, RuntimeError> {
        match self {
            InputNormalizer::List => to_list(request).map(ModelInput::List),
            InputNormalizer::NdArray => to_ndarray(request).map(ModelInput::NdArray),
            InputNormalizer::DataFrame => to_dataframe(request).map(ModelInput::DataFrame),
            InputNormalizer::DMatrix => to_dmatrix(request).map(ModelInput::DMatrix),
        }
    }
}

fn non_empty_rows(request: &PredictionRequest) -> Result<Vec<&[Parameter]>, RuntimeError> {
    let rows = request.rows();
    match rows.first() {
        Some(first) if !first.is_empty() => Ok(rows),
        _ => Err(RuntimeError::TypeMismatch(
            "request carries no parameters".to_string(),
        )),
    }
}

fn check_rectangular(rows: &[&[Parameter]]) -> Result<usize, RuntimeError> {
    let width = rows[0].len();
    if let Some((index, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != width) {
        return Err(RuntimeError::TypeMismatch(format!(
            "row {} has {} values, expected {}",
            index,
            row.len(),
            width
        )));
    }
    Ok(width)
}

/// Row → ordered value list; batch → list of rows
pub fn to_list(request: &PredictionRequest) -> Result<Vec<Vec<ParamValue>>, RuntimeError> {
    let rows = non_empty_rows(request)?;
    Ok(rows
        .iter()
        .map(|row| row.iter().map(|p| p.value.clone()).collect())
        .collect())
}

/// Same shape as [`to_list`], but every value must share one scalar type
///
/// Integers and floats together promote to a float array.
pub fn to_ndarray(request: &PredictionRequest) -> Result<NdArray, RuntimeError> {
    let rows = non_empty_rows(request)?;
    let width = check_rectangular(&rows)?;

    let mut kind: Option<ValueKind> = None;
    for param in rows.iter().flat_map(|r| r.iter()) {
        let next = param.value.kind();
        kind = Some(match (kind, next) {
            (None, k) => k,
            (Some(a), b) if a == b => a,
            (Some(ValueKind::Int), ValueKind::Float) | (Some(ValueKind::Float), ValueKind::Int) => {
                ValueKind::Float
            }
            (Some(a), b) => {
                return Err(RuntimeError::TypeMismatch(format!(
                    "cannot build a homogeneous array from {} and {} values (parameter '{}' = {})",
                    a, b, param.name, param.value
                )))
            }
        });
    }

    let shape = (rows.len(), width);
    let flat = rows.iter().flat_map(|r| r.iter().map(|p| &p.value));
    let shape_error = |e: ndarray::ShapeError| RuntimeError::Internal(e.to_string());
    let array = match kind.unwrap_or(ValueKind::Float) {
        ValueKind::Float => NdArray::Float(
            Array2::from_shape_vec(shape, flat.filter_map(ParamValue::as_f64).collect())
                .map_err(shape_error)?,
        ),
        ValueKind::Int => NdArray::Int(
            Array2::from_shape_vec(
                shape,
                flat.filter_map(|v| match v {
                    ParamValue::Int(i) => Some(*i),
                    _ => None,
                })
                .collect(),
            )
            .map_err(shape_error)?,
        ),
        ValueKind::Bool => NdArray::Bool(
            Array2::from_shape_vec(
                shape,
                flat.filter_map(|v| match v {
                    ParamValue::Bool(b) => Some(*b),
                    _ => None,
                })
                .collect(),
            )
            .map_err(shape_error)?,
        ),
        ValueKind::Str => NdArray::Str(
            Array2::from_shape_vec(
                shape,
                flat.filter_map(|v| v.as_str().map(str::to_string)).collect(),
            )
            .map_err(shape_error)?,
        ),
    };
    Ok(array)
}

/// Named-column table; column order is the first row's parameter order
pub fn to_dataframe(request: &PredictionRequest) -> Result<DataFrame, RuntimeError> {
    let columns = request.column_names();
    let values = to_list(request)?;
    DataFrame::new(columns, values)
}

/// Builds the frame first, then the boosting engine's matrix from it
pub fn to_dmatrix(request: &PredictionRequest) -> Result<DMatrix, RuntimeError> {
    DMatrix::from_dataframe(&to_dataframe(request)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn row(values: Vec<(&str, ParamValue)>) -> Vec<Parameter> {
        values.into_iter().map(|(n, v)| Parameter::new(n, v)).collect()
    }

    #[test]
    fn test_to_list_keeps_heterogeneous_values() {
        let request = PredictionRequest::row(row(vec![
            ("x", ParamValue::Float(0.5)),
            ("y", ParamValue::Int(10)),
        ]));
        assert_eq!(
            to_list(&request).unwrap(),
            vec![vec![ParamValue::Float(0.5), ParamValue::Int(10)]]
        );

        let batch = PredictionRequest::batch(vec![
            row(vec![("x", 0.5.into()), ("y", "bad".into())]),
            row(vec![("x", (-0.1).into()), ("y", "good".into())]),
        ]);
        assert_eq!(
            to_list(&batch).unwrap(),
            vec![
                vec![ParamValue::Float(0.5), ParamValue::from("bad")],
                vec![ParamValue::Float(-0.1), ParamValue::from("good")],
            ]
        );
    }

    #[test]
    fn test_to_ndarray_homogeneous_rows() {
        let request = PredictionRequest::row(row(vec![("x", 0.5.into()), ("y", 0.3.into())]));
        assert_eq!(
            to_ndarray(&request).unwrap(),
            NdArray::Float(array![[0.5, 0.3]])
        );

        let batch = PredictionRequest::batch(vec![
            row(vec![("x", 0.5.into()), ("y", 0.3.into())]),
            row(vec![("x", (-0.1).into()), ("y", 0.2.into())]),
        ]);
        assert_eq!(
            to_ndarray(&batch).unwrap(),
            NdArray::Float(array![[0.5, 0.3], [-0.1, 0.2]])
        );
    }

    #[test]
    fn test_to_ndarray_promotes_int_and_float() {
        let request = PredictionRequest::row(row(vec![("x", 0.5.into()), ("y", 10.into())]));
        assert_eq!(
            to_ndarray(&request).unwrap(),
            NdArray::Float(array![[0.5, 10.0]])
        );

        let ints = PredictionRequest::row(row(vec![("x", 10.into()), ("y", 10.into())]));
        assert_eq!(to_ndarray(&ints).unwrap(), NdArray::Int(array![[10, 10]]));

        let bools = PredictionRequest::row(row(vec![("x", true.into()), ("y", true.into())]));
        assert_eq!(to_ndarray(&bools).unwrap(), NdArray::Bool(array![[true, true]]));
    }

    #[test]
    fn test_to_ndarray_rejects_mixed_kinds() {
        for second in [ParamValue::Bool(true), ParamValue::from("good")] {
            let request = PredictionRequest::row(row(vec![("x", 0.5.into()), ("y", second)]));
            assert!(matches!(
                to_ndarray(&request),
                Err(RuntimeError::TypeMismatch(_))
            ));
        }
    }

    #[test]
    fn test_to_ndarray_rejects_ragged_batch() {
        let batch = PredictionRequest::batch(vec![
            row(vec![("x", 1.into()), ("y", 2.into())]),
            row(vec![("x", 1.into())]),
        ]);
        assert!(matches!(to_ndarray(&batch), Err(RuntimeError::TypeMismatch(_))));
    }

    #[test]
    fn test_to_dataframe_names_columns() {
        let request = PredictionRequest::row(row(vec![("x", 0.5.into()), ("y", 10.into())]));
        let frame = to_dataframe(&request).unwrap();
        assert_eq!(frame.columns(), &["x".to_string(), "y".to_string()]);
        assert_eq!(frame.get(0, "x"), Some(&ParamValue::Float(0.5)));
        assert_eq!(frame.get(0, "y"), Some(&ParamValue::Int(10)));
    }

    #[test]
    fn test_empty_request_is_rejected() {
        let request = PredictionRequest::row(Vec::new());
        assert!(matches!(to_list(&request), Err(RuntimeError::TypeMismatch(_))));
        assert!(matches!(
            InputNormalizer::DataFrame.apply(&PredictionRequest::batch(Vec::new())),
            Err(RuntimeError::TypeMismatch(_))
        ));
    }

    #[test]
    fn test_to_dmatrix_goes_through_dataframe() {
        let request = PredictionRequest::row(row(vec![("a", 1.into()), ("b", false.into())]));
        let matrix = to_dmatrix(&request).unwrap();
        assert_eq!(matrix.feature_names(), &["a".to_string(), "b".to_string()]);
        assert_eq!(matrix.row(0).to_vec(), vec![1.0, 0.0]);
    }
}
