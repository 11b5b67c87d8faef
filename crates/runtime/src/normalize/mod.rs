//! Input and output normalizers
//!
//! Pure conversions between the canonical request/response shapes and the
//! representations the individual model engines work with.

pub mod frame;
pub mod input;
pub mod output;

pub use frame::{DMatrix, DataFrame, NdArray};
pub use input::{to_dataframe, to_dmatrix, to_list, to_ndarray, InputNormalizer};
pub use output::{from_dataframe, from_list, from_ndarray, OutputNormalizer, RawOutput};

use ndarray::Array2;

use crate::types::ParamValue;

/// Normalized request as handed to a model handle
#[derive(Debug, Clone, PartialEq)]
pub enum ModelInput {
    List(Vec<Vec<ParamValue>>),
    NdArray(NdArray),
    DataFrame(DataFrame),
    DMatrix(DMatrix),
}

impl ModelInput {
    pub fn type_name(&self) -> &'static str {
        match self {
            ModelInput::List(_) => "list",
            ModelInput::NdArray(_) => "ndarray",
            ModelInput::DataFrame(_) => "dataframe",
            ModelInput::DMatrix(_) => "dmatrix",
        }
    }

    pub fn n_rows(&self) -> usize {
        match self {
            ModelInput::List(rows) => rows.len(),
            ModelInput::NdArray(array) => array.shape().0,
            ModelInput::DataFrame(frame) => frame.n_rows(),
            ModelInput::DMatrix(matrix) => matrix.num_rows(),
        }
    }

    /// Column names, when the representation carries them
    pub fn column_names(&self) -> Option<&[String]> {
        match self {
            ModelInput::DataFrame(frame) => Some(frame.columns()),
            ModelInput::DMatrix(matrix) if !matrix.feature_names().is_empty() => {
                Some(matrix.feature_names())
            }
            _ => None,
        }
    }

    /// Dense numeric matrix, or a description of the first value that has none
    pub fn to_numeric(&self) -> Result<Array2<f64>, String> {
        fn from_rows(rows: &[Vec<ParamValue>]) -> Result<Array2<f64>, String> {
            let width = rows.first().map(Vec::len).unwrap_or(0);
            let mut data = Array2::<f64>::zeros((rows.len(), width));
            for (r, row) in rows.iter().enumerate() {
                if row.len() != width {
                    return Err(format!("row {} has {} values, expected {}", r, row.len(), width));
                }
                for (c, value) in row.iter().enumerate() {
                    data[[r, c]] = value
                        .as_f64()
                        .ok_or_else(|| format!("could not convert {} to float", value))?;
                }
            }
            Ok(data)
        }

        match self {
            ModelInput::List(rows) => from_rows(rows),
            ModelInput::NdArray(array) => array
                .to_f64()
                .ok_or_else(|| format!("cannot use a {} array as numeric input", array.dtype())),
            ModelInput::DataFrame(frame) => from_rows(frame.rows()),
            ModelInput::DMatrix(matrix) => Ok(matrix.data().mapv(f64::from)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Parameter, PredictionRequest};
    use ndarray::array;

    #[test]
    fn test_numeric_view_of_every_representation() {
        let request = PredictionRequest::row(vec![
            Parameter::new("x", 1),
            Parameter::new("y", true),
        ]);
        let expected = array![[1.0, 1.0]];
        for normalizer in [
            InputNormalizer::List,
            InputNormalizer::DataFrame,
            InputNormalizer::DMatrix,
        ] {
            let input = normalizer.apply(&request).unwrap();
            assert_eq!(input.to_numeric().unwrap(), expected, "{}", normalizer.name());
        }
    }

    #[test]
    fn test_numeric_view_rejects_strings() {
        let request = PredictionRequest::row(vec![Parameter::new("c", "red")]);
        let input = InputNormalizer::List.apply(&request).unwrap();
        assert!(input.to_numeric().unwrap_err().contains("\"red\""));
        let input = InputNormalizer::NdArray.apply(&request).unwrap();
        assert!(input.to_numeric().is_err());
    }
}
