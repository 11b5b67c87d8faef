//! In-memory tabular and matrix representations handed to model engines

use ndarray::{Array2, ArrayView1};
use serde_json::Value;

use crate::types::{ParamValue, RuntimeError};

/// Two-dimensional table with named columns and heterogeneous values
#[derive(Debug, Clone, PartialEq)]
pub struct DataFrame {
    columns: Vec<String>,
    rows: Vec<Vec<ParamValue>>,
}

impl DataFrame {
    /// Build a frame; every row must have one value per column
    pub fn new(columns: Vec<String>, rows: Vec<Vec<ParamValue>>) -> Result<Self, RuntimeError> {
        for (index, row) in rows.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(RuntimeError::TypeMismatch(format!(
                    "row {} has {} values, expected {} columns",
                    index,
                    row.len(),
                    columns.len()
                )));
            }
        }
        Ok(Self { columns, rows })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<ParamValue>] {
        &self.rows
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn column(&self, name: &str) -> Option<Vec<&ParamValue>> {
        let index = self.column_index(name)?;
        Some(self.rows.iter().map(|row| &row[index]).collect())
    }

    pub fn get(&self, row: usize, name: &str) -> Option<&ParamValue> {
        let index = self.column_index(name)?;
        self.rows.get(row).map(|r| &r[index])
    }

    /// Rows as `{column: value}` objects, columns in frame order
    pub fn records(&self) -> Vec<Value> {
        self.rows
            .iter()
            .map(|row| {
                let record = self
                    .columns
                    .iter()
                    .cloned()
                    .zip(row.iter().map(ParamValue::to_json))
                    .collect::<serde_json::Map<_, _>>();
                Value::Object(record)
            })
            .collect()
    }
}

/// Homogeneously typed 2-D array
#[derive(Debug, Clone, PartialEq)]
pub enum NdArray {
    Float(Array2<f64>),
    Int(Array2<i64>),
    Bool(Array2<bool>),
    Str(Array2<String>),
}

impl NdArray {
    pub fn shape(&self) -> (usize, usize) {
        match self {
            NdArray::Float(a) => a.dim(),
            NdArray::Int(a) => a.dim(),
            NdArray::Bool(a) => a.dim(),
            NdArray::Str(a) => a.dim(),
        }
    }

    pub fn dtype(&self) -> &'static str {
        match self {
            NdArray::Float(_) => "float64",
            NdArray::Int(_) => "int64",
            NdArray::Bool(_) => "bool",
            NdArray::Str(_) => "str",
        }
    }

    /// Numeric view; string arrays have none
    pub fn to_f64(&self) -> Option<Array2<f64>> {
        match self {
            NdArray::Float(a) => Some(a.clone()),
            NdArray::Int(a) => Some(a.mapv(|v| v as f64)),
            NdArray::Bool(a) => Some(a.mapv(|v| if v { 1.0 } else { 0.0 })),
            NdArray::Str(_) => None,
        }
    }

    /// Nested JSON lists, one inner list per row
    pub fn to_json(&self) -> Value {
        fn rows<T>(a: &Array2<T>, f: impl Fn(&T) -> Value) -> Value {
            Value::Array(
                a.outer_iter()
                    .map(|row| Value::Array(row.iter().map(&f).collect()))
                    .collect(),
            )
        }
        match self {
            NdArray::Float(a) => rows(a, |v| ParamValue::Float(*v).to_json()),
            NdArray::Int(a) => rows(a, |v| Value::from(*v)),
            NdArray::Bool(a) => rows(a, |v| Value::Bool(*v)),
            NdArray::Str(a) => rows(a, |v| Value::String(v.clone())),
        }
    }
}

/// Dense feature matrix in the layout the boosting engine consumes
#[derive(Debug, Clone, PartialEq)]
pub struct DMatrix {
    feature_names: Vec<String>,
    data: Array2<f32>,
}

impl DMatrix {
    pub fn new(feature_names: Vec<String>, data: Array2<f32>) -> Self {
        Self {
            feature_names,
            data,
        }
    }

    /// Convert a frame; booleans become 0/1, strings are rejected
    pub fn from_dataframe(frame: &DataFrame) -> Result<Self, RuntimeError> {
        let mut data = Array2::<f32>::zeros((frame.n_rows(), frame.n_cols()));
        for (r, row) in frame.rows().iter().enumerate() {
            for (c, value) in row.iter().enumerate() {
                data[[r, c]] = value.as_f64().ok_or_else(|| {
                    RuntimeError::TypeMismatch(format!(
                        "column '{}' holds {} which cannot enter a DMatrix",
                        frame.columns()[c],
                        value
                    ))
                })? as f32;
            }
        }
        Ok(Self::new(frame.columns().to_vec(), data))
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn num_rows(&self) -> usize {
        self.data.nrows()
    }

    pub fn num_cols(&self) -> usize {
        self.data.ncols()
    }

    pub fn row(&self, index: usize) -> ArrayView1<'_, f32> {
        self.data.row(index)
    }

    pub fn data(&self) -> &Array2<f32> {
        &self.data
    }
}
