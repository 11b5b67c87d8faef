//! Linear estimators restored from pickled fit state
//!
//! Understands a dictionary of fitted attributes:
//!
//! ```text
//! {"estimator": "LogisticRegression", "coef_": [[...]], "intercept_": [...],
//!  "classes_": [...], "feature_names_in_": [...]}
//! ```
//!
//! `estimator` selects the decision rule; `classes_` is required for
//! classifiers and `feature_names_in_` is optional.

use ndarray::{Array1, Array2, Axis};
use serde_json::Value;
use serde_pickle::Value as PickleValue;
use std::sync::Arc;

use super::adapter::{engine_failure, ModelHandle, ModelMethod, ModelSignature};
use super::pickle::{describe, dict_get, ObjectEngine};
use crate::normalize::{ModelInput, RawOutput};
use crate::types::{BinaryFormat, RuntimeError};

/// Decision rule family of a linear estimator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EstimatorKind {
    /// Continuous targets
    Regressor,
    /// Classifier with calibrated class probabilities
    Logistic,
    /// Classifier exposing decisions only
    Margin,
}

impl EstimatorKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "LinearRegression" | "Ridge" | "Lasso" | "ElasticNet" | "SGDRegressor"
            | "LinearSVR" | "HuberRegressor" | "BayesianRidge" => Some(EstimatorKind::Regressor),
            "LogisticRegression" | "LogisticRegressionCV" => Some(EstimatorKind::Logistic),
            "LinearSVC" | "RidgeClassifier" | "Perceptron" | "SGDClassifier"
            | "PassiveAggressiveClassifier" => Some(EstimatorKind::Margin),
            _ => None,
        }
    }

    fn is_classifier(&self) -> bool {
        !matches!(self, EstimatorKind::Regressor)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EstimatorError {
    #[error("X has {got} features, but {estimator} is expecting {expected} features as input")]
    FeatureCount {
        estimator: String,
        expected: usize,
        got: usize,
    },

    #[error("feature names should match those passed during fit: expected {expected:?}, got {got:?}")]
    FeatureNames {
        expected: Vec<String>,
        got: Vec<String>,
    },

    #[error("{0}")]
    NonNumeric(String),
}

/// Recognizes dictionaries carrying a `coef_` entry
pub struct LinearEstimatorEngine;

impl ObjectEngine for LinearEstimatorEngine {
    fn name(&self) -> &str {
        "linear-estimator"
    }

    fn interpret(
        &self,
        format: BinaryFormat,
        object: &PickleValue,
    ) -> Result<Option<Arc<dyn ModelHandle>>, RuntimeError> {
        let PickleValue::Dict(state) = object else {
            return Ok(None);
        };
        let Some(coef) = dict_get(state, "coef_") else {
            return Ok(None);
        };

        let name = match dict_get(state, "estimator") {
            Some(PickleValue::String(name)) => name.clone(),
            Some(other) => {
                return Err(corrupt(format!("estimator name is a {}", describe(other))))
            }
            None if dict_get(state, "classes_").is_some() => "LinearClassifier".to_string(),
            None => "LinearRegression".to_string(),
        };
        let kind = match EstimatorKind::from_name(&name) {
            Some(kind) => kind,
            None if name == "LinearClassifier" => EstimatorKind::Margin,
            None => {
                tracing::debug!(estimator = %name, "Unknown linear estimator");
                return Ok(None);
            }
        };

        let coef = matrix(coef).ok_or_else(|| corrupt("coef_ is not a numeric matrix"))?;
        let intercept = match dict_get(state, "intercept_") {
            Some(value) => vector(value).ok_or_else(|| corrupt("intercept_ is not numeric"))?,
            None => vec![0.0; coef.nrows()],
        };
        let intercept = match intercept.len() {
            n if n == coef.nrows() => Array1::from(intercept),
            1 => Array1::from_elem(coef.nrows(), intercept[0]),
            n => {
                return Err(corrupt(format!(
                    "intercept_ has {} entries for {} coefficient rows",
                    n,
                    coef.nrows()
                )))
            }
        };

        let classes = match dict_get(state, "classes_") {
            Some(value) => labels(value).ok_or_else(|| corrupt("classes_ holds unsupported labels"))?,
            None => Vec::new(),
        };
        if kind.is_classifier() {
            let consistent = match (coef.nrows(), classes.len()) {
                (1, 2) => true,
                (rows, n) => n > 2 && rows == n,
            };
            if !consistent {
                return Err(corrupt(format!(
                    "{} coefficient rows do not fit {} classes",
                    coef.nrows(),
                    classes.len()
                )));
            }
        }

        let feature_names = match dict_get(state, "feature_names_in_") {
            Some(value) => Some(strings(value).ok_or_else(|| corrupt("feature_names_in_ is not a list of names"))?),
            None => None,
        };
        if let Some(names) = &feature_names {
            if names.len() != coef.ncols() {
                return Err(corrupt(format!(
                    "{} feature names for {} coefficients",
                    names.len(),
                    coef.ncols()
                )));
            }
        }

        Ok(Some(Arc::new(LinearEstimator {
            format,
            name,
            kind,
            coef,
            intercept,
            classes,
            feature_names,
        })))
    }
}

fn corrupt(message: impl std::fmt::Display) -> RuntimeError {
    RuntimeError::CorruptBinary(format!("invalid linear estimator state: {}", message))
}

fn scalar(value: &PickleValue) -> Option<f64> {
    match value {
        PickleValue::F64(v) => Some(*v),
        PickleValue::I64(v) => Some(*v as f64),
        PickleValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn items(value: &PickleValue) -> Option<&[PickleValue]> {
    match value {
        PickleValue::List(items) | PickleValue::Tuple(items) => Some(items),
        _ => None,
    }
}

fn vector(value: &PickleValue) -> Option<Vec<f64>> {
    match items(value) {
        Some(items) => items.iter().map(scalar).collect(),
        None => scalar(value).map(|v| vec![v]),
    }
}

fn matrix(value: &PickleValue) -> Option<Array2<f64>> {
    let rows = items(value)?;
    if rows.iter().all(|r| items(r).is_none()) {
        let row = vector(value)?;
        return Array2::from_shape_vec((1, row.len()), row).ok();
    }
    let rows = rows.iter().map(vector).collect::<Option<Vec<_>>>()?;
    let width = rows.first()?.len();
    if rows.iter().any(|r| r.len() != width) {
        return None;
    }
    Array2::from_shape_vec((rows.len(), width), rows.concat()).ok()
}

fn labels(value: &PickleValue) -> Option<Vec<Value>> {
    items(value)?
        .iter()
        .map(|label| match label {
            PickleValue::String(s) => Some(Value::String(s.clone())),
            PickleValue::I64(i) => Some(Value::from(*i)),
            PickleValue::F64(f) => serde_json::Number::from_f64(*f).map(Value::Number),
            PickleValue::Bool(b) => Some(Value::Bool(*b)),
            _ => None,
        })
        .collect()
}

fn strings(value: &PickleValue) -> Option<Vec<String>> {
    items(value)?
        .iter()
        .map(|v| match v {
            PickleValue::String(s) => Some(s.clone()),
            _ => None,
        })
        .collect()
}

/// Fitted linear model
#[derive(Debug)]
pub struct LinearEstimator {
    format: BinaryFormat,
    name: String,
    kind: EstimatorKind,
    /// One row per target or class
    coef: Array2<f64>,
    intercept: Array1<f64>,
    classes: Vec<Value>,
    feature_names: Option<Vec<String>>,
}

impl LinearEstimator {
    pub fn kind(&self) -> EstimatorKind {
        self.kind
    }

    fn decision(&self, input: &ModelInput) -> Result<Array2<f64>, RuntimeError> {
        if let (Some(expected), Some(got)) = (&self.feature_names, input.column_names()) {
            if expected.as_slice() != got {
                return Err(engine_failure(
                    self.format,
                    input,
                    EstimatorError::FeatureNames {
                        expected: expected.clone(),
                        got: got.to_vec(),
                    },
                ));
            }
        }

        let x = input
            .to_numeric()
            .map_err(|m| engine_failure(self.format, input, EstimatorError::NonNumeric(m)))?;
        if x.ncols() != self.coef.ncols() {
            return Err(engine_failure(
                self.format,
                input,
                EstimatorError::FeatureCount {
                    estimator: self.name.clone(),
                    expected: self.coef.ncols(),
                    got: x.ncols(),
                },
            ));
        }
        Ok(x.dot(&self.coef.t()) + &self.intercept)
    }

    fn class_indices(&self, scores: &Array2<f64>) -> Vec<usize> {
        scores
            .outer_iter()
            .map(|row| {
                if row.len() == 1 {
                    usize::from(row[0] > 0.0)
                } else {
                    argmax(row.iter().copied())
                }
            })
            .collect()
    }
}

fn argmax(values: impl Iterator<Item = f64>) -> usize {
    values
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |best, (i, v)| if v > best.1 { (i, v) } else { best })
        .0
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

impl ModelHandle for LinearEstimator {
    fn has_method(&self, method: ModelMethod) -> bool {
        match method {
            ModelMethod::Predict => true,
            ModelMethod::PredictProba => self.kind == EstimatorKind::Logistic,
        }
    }

    fn predict(&self, input: &ModelInput) -> Result<RawOutput, RuntimeError> {
        let scores = self.decision(input)?;
        if !self.kind.is_classifier() {
            return Ok(if scores.ncols() == 1 {
                RawOutput::Array(scores.column(0).to_owned().into_dyn())
            } else {
                RawOutput::Array(scores.into_dyn())
            });
        }

        let predicted: Vec<Value> = self
            .class_indices(&scores)
            .into_iter()
            .map(|i| self.classes[i].clone())
            .collect();
        let numeric: Option<Vec<f64>> = predicted.iter().map(Value::as_f64).collect();
        Ok(match numeric {
            Some(values) => RawOutput::Array(Array1::from(values).into_dyn()),
            None => RawOutput::Labels(predicted),
        })
    }

    fn predict_proba(&self, input: &ModelInput) -> Result<RawOutput, RuntimeError> {
        if self.kind != EstimatorKind::Logistic {
            return Err(RuntimeError::prediction(format!(
                "{} does not implement predict_proba",
                self.name
            )));
        }
        let scores = self.decision(input)?;
        let proba = if scores.ncols() == 1 {
            let positive = scores.column(0).mapv(sigmoid);
            let mut proba = Array2::<f64>::zeros((scores.nrows(), 2));
            proba.column_mut(0).assign(&positive.mapv(|p| 1.0 - p));
            proba.column_mut(1).assign(&positive);
            proba
        } else {
            let mut proba = scores;
            for mut row in proba.axis_iter_mut(Axis(0)) {
                let max = row.fold(f64::NEG_INFINITY, |m, v| m.max(*v));
                row.mapv_inplace(|v| (v - max).exp());
                let sum = row.sum();
                row.mapv_inplace(|v| v / sum);
            }
            proba
        };
        Ok(RawOutput::Array(proba.into_dyn()))
    }

    fn signature(&self) -> ModelSignature {
        ModelSignature {
            model_name: Some(self.name.clone()),
            subtype: Some(
                if self.kind.is_classifier() { "classifier" } else { "regressor" }.to_string(),
            ),
            input_fields: self
                .feature_names
                .as_ref()
                .map(|names| names.iter().map(|n| (n.clone(), "double".to_string())).collect()),
            output_fields: None,
        }
    }
}
