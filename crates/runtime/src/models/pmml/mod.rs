//! PMML adapter
//!
//! Parses the XML document into an element tree and evaluates
//! `RegressionModel` (regression and classification) and `Scorecard`
//! models. Results come back as a table with one column per output field,
//! which the executor turns into row records.

pub mod document;
pub mod fields;
pub mod predicate;
pub mod regression;
pub mod scorecard;

use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::Arc;

use self::document::Element;
use self::fields::{DataField, FieldUsage, MiningField, OutputField, ResultFeature};
use self::regression::RegressionModel;
use self::scorecard::Scorecard;
use super::adapter::{engine_failure, FormatAdapter, ModelHandle, ModelMethod, ModelSignature};
use crate::normalize::{DataFrame, ModelInput, NdArray, RawOutput};
use crate::types::{BinaryFormat, ParamValue, RuntimeError};

/// Input values of one record by field name; absent fields are missing
pub type Row = HashMap<String, ParamValue>;

#[derive(Debug, thiserror::Error)]
pub enum PmmlError {
    #[error("malformed PMML: {0}")]
    Xml(String),

    #[error("invalid PMML: {0}")]
    Invalid(String),

    #[error("unsupported PMML model element '{0}'")]
    UnsupportedModel(String),

    #[error("unsupported PMML construct: {0}")]
    Unsupported(String),

    #[error("{0}")]
    Evaluation(String),
}

impl PmmlError {
    fn into_load_error(self) -> RuntimeError {
        match self {
            PmmlError::Xml(_) | PmmlError::Invalid(_) => RuntimeError::CorruptBinary(self.to_string()),
            PmmlError::UnsupportedModel(_) | PmmlError::Unsupported(_) => {
                RuntimeError::UnsupportedFormat(self.to_string())
            }
            PmmlError::Evaluation(_) => RuntimeError::Internal(self.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MiningFunction {
    Regression,
    Classification,
}

/// Result of scoring one record; `predicted` is `None` when missing
#[derive(Debug, Clone, PartialEq)]
pub struct Scored {
    pub predicted: Option<ParamValue>,
    pub probabilities: IndexMap<String, f64>,
    pub reason_codes: Vec<String>,
}

impl Scored {
    pub fn missing() -> Self {
        Self {
            predicted: None,
            probabilities: IndexMap::new(),
            reason_codes: Vec::new(),
        }
    }

    fn output(&self, field: &OutputField) -> ParamValue {
        let value = match &field.feature {
            ResultFeature::PredictedValue | ResultFeature::PredictedDisplayValue => {
                self.predicted.clone()
            }
            ResultFeature::Probability => {
                let category = field.value.clone().or_else(|| match &self.predicted {
                    Some(ParamValue::Str(c)) => Some(c.clone()),
                    _ => None,
                });
                category
                    .and_then(|c| self.probabilities.get(&c).copied())
                    .map(ParamValue::Float)
            }
            ResultFeature::ReasonCode => field
                .rank
                .checked_sub(1)
                .and_then(|i| self.reason_codes.get(i))
                .map(|code| ParamValue::Str(code.clone())),
            ResultFeature::Other(_) => None,
        };
        // NaN serializes as null
        value.unwrap_or(ParamValue::Float(f64::NAN))
    }
}

#[derive(Debug, Clone, PartialEq)]
enum ModelKind {
    Regression(RegressionModel),
    Scorecard(Scorecard),
}

/// A parsed PMML document ready for evaluation
#[derive(Debug)]
pub struct PmmlModel {
    version: Option<String>,
    element: String,
    model_name: Option<String>,
    data_fields: IndexMap<String, DataField>,
    mining_fields: Vec<MiningField>,
    outputs: Vec<OutputField>,
    kind: ModelKind,
}

const MODEL_ELEMENTS: &[&str] = &[
    "AnomalyDetectionModel",
    "AssociationModel",
    "BayesianNetworkModel",
    "BaselineModel",
    "ClusteringModel",
    "GaussianProcessModel",
    "GeneralRegressionModel",
    "MiningModel",
    "NaiveBayesModel",
    "NearestNeighborModel",
    "NeuralNetwork",
    "RegressionModel",
    "RuleSetModel",
    "SequenceModel",
    "Scorecard",
    "SupportVectorMachineModel",
    "TextModel",
    "TimeSeriesModel",
    "TreeModel",
];

impl PmmlModel {
    pub fn parse(xml: &str) -> Result<Self, PmmlError> {
        let root = Element::parse(xml)?;
        if root.name != "PMML" {
            return Err(PmmlError::Invalid(format!(
                "root element is '{}', expected 'PMML'",
                root.name
            )));
        }
        let data_fields = fields::parse_data_dictionary(&root)?;
        let model = root
            .children
            .iter()
            .find(|c| MODEL_ELEMENTS.contains(&c.name.as_str()))
            .ok_or_else(|| PmmlError::Invalid("document contains no model".to_string()))?;

        let function = match model.required("functionName")? {
            "regression" => MiningFunction::Regression,
            "classification" => MiningFunction::Classification,
            other => {
                return Err(PmmlError::Unsupported(format!("functionName '{}'", other)))
            }
        };
        let kind = match model.name.as_str() {
            "RegressionModel" => ModelKind::Regression(RegressionModel::parse(model, function)?),
            "Scorecard" => ModelKind::Scorecard(Scorecard::parse(model)?),
            other => return Err(PmmlError::UnsupportedModel(other.to_string())),
        };

        let mining_fields = fields::parse_mining_schema(model)?;
        for field in &mining_fields {
            if !data_fields.contains_key(&field.name) {
                return Err(PmmlError::Invalid(format!(
                    "mining field '{}' is not in the DataDictionary",
                    field.name
                )));
            }
        }
        let target = mining_fields
            .iter()
            .find(|f| f.usage == FieldUsage::Target)
            .and_then(|f| data_fields.get(&f.name));
        let categories = match &kind {
            ModelKind::Regression(regression) => regression.categories(),
            ModelKind::Scorecard(_) => Vec::new(),
        };
        let outputs = fields::parse_outputs(model, target, &categories)?;

        Ok(Self {
            version: root.attr("version").map(str::to_string),
            element: model.name.clone(),
            model_name: model.attr("modelName").map(str::to_string),
            data_fields,
            mining_fields,
            outputs,
            kind,
        })
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Active input fields in mining schema order
    pub fn active_fields(&self) -> impl Iterator<Item = &MiningField> {
        self.mining_fields
            .iter()
            .filter(|f| f.usage == FieldUsage::Active)
    }

    fn rows(&self, input: &ModelInput) -> Result<Vec<Row>, PmmlError> {
        let names: Vec<&str> = self.active_fields().map(|f| f.name.as_str()).collect();
        let positional = |values: Vec<Vec<ParamValue>>| -> Result<Vec<Row>, PmmlError> {
            values
                .into_iter()
                .map(|row| {
                    if row.len() != names.len() {
                        return Err(PmmlError::Evaluation(format!(
                            "expected {} input values, got {}",
                            names.len(),
                            row.len()
                        )));
                    }
                    Ok(names.iter().map(|n| n.to_string()).zip(row).collect())
                })
                .collect()
        };
        let named = |columns: &[String], values: Vec<Vec<ParamValue>>| -> Vec<Row> {
            values
                .into_iter()
                .map(|row| columns.iter().cloned().zip(row).collect())
                .collect()
        };

        let mut rows = match input {
            ModelInput::DataFrame(frame) => named(frame.columns(), frame.rows().to_vec()),
            ModelInput::List(values) => positional(values.clone())?,
            ModelInput::NdArray(array) => positional(ndarray_rows(array))?,
            ModelInput::DMatrix(matrix) => {
                let values = matrix
                    .data()
                    .outer_iter()
                    .map(|r| r.iter().map(|v| ParamValue::Float(f64::from(*v))).collect())
                    .collect();
                if matrix.feature_names().is_empty() {
                    positional(values)?
                } else {
                    named(matrix.feature_names(), values)
                }
            }
        };

        for field in self.active_fields() {
            let Some(replacement) = &field.missing_value_replacement else {
                continue;
            };
            let value = match replacement.trim().parse::<f64>() {
                Ok(number) => ParamValue::Float(number),
                Err(_) => ParamValue::Str(replacement.clone()),
            };
            for row in rows.iter_mut() {
                row.entry(field.name.clone()).or_insert_with(|| value.clone());
            }
        }
        Ok(rows)
    }

    fn score(&self, row: &Row) -> Scored {
        match &self.kind {
            ModelKind::Regression(model) => model.score(row),
            ModelKind::Scorecard(model) => model.score(row),
        }
    }

    /// Evaluate every record into a table of output fields
    pub fn evaluate(&self, input: &ModelInput) -> Result<DataFrame, PmmlError> {
        let records = self
            .rows(input)?
            .iter()
            .map(|row| {
                let scored = self.score(row);
                self.outputs.iter().map(|o| scored.output(o)).collect()
            })
            .collect();
        let columns = self.outputs.iter().map(|o| o.name.clone()).collect();
        DataFrame::new(columns, records).map_err(|e| PmmlError::Evaluation(e.to_string()))
    }
}

fn ndarray_rows(array: &NdArray) -> Vec<Vec<ParamValue>> {
    fn collect<T>(a: &ndarray::Array2<T>, f: impl Fn(&T) -> ParamValue) -> Vec<Vec<ParamValue>> {
        a.outer_iter().map(|r| r.iter().map(&f).collect()).collect()
    }
    match array {
        NdArray::Float(a) => collect(a, |v| ParamValue::Float(*v)),
        NdArray::Int(a) => collect(a, |v| ParamValue::Int(*v)),
        NdArray::Bool(a) => collect(a, |v| ParamValue::Bool(*v)),
        NdArray::Str(a) => collect(a, |v| ParamValue::Str(v.clone())),
    }
}

impl ModelHandle for PmmlModel {
    fn has_method(&self, method: ModelMethod) -> bool {
        matches!(method, ModelMethod::Predict)
    }

    fn predict(&self, input: &ModelInput) -> Result<RawOutput, RuntimeError> {
        self.evaluate(input)
            .map(RawOutput::Table)
            .map_err(|e| engine_failure(BinaryFormat::Pmml, input, e))
    }

    fn signature(&self) -> ModelSignature {
        let input_fields = self
            .active_fields()
            .map(|f| {
                let data_type = self
                    .data_fields
                    .get(&f.name)
                    .map(|d| d.data_type.clone())
                    .unwrap_or_else(|| "string".to_string());
                (f.name.clone(), data_type)
            })
            .collect();
        let output_fields = self
            .outputs
            .iter()
            .map(|o| (o.name.clone(), o.data_type.clone()))
            .collect();
        ModelSignature {
            model_name: self.model_name.clone(),
            subtype: Some(self.element.clone()),
            input_fields: Some(input_fields),
            output_fields: Some(output_fields),
        }
    }
}

pub struct PmmlAdapter;

impl PmmlAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PmmlAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl FormatAdapter for PmmlAdapter {
    fn format(&self) -> BinaryFormat {
        BinaryFormat::Pmml
    }

    fn name(&self) -> &str {
        "pmml"
    }

    fn load(&self, binary: &[u8]) -> Result<Arc<dyn ModelHandle>, RuntimeError> {
        let xml = std::str::from_utf8(binary)
            .map_err(|e| RuntimeError::CorruptBinary(format!("PMML is not UTF-8: {}", e)))?;
        let model = PmmlModel::parse(xml).map_err(PmmlError::into_load_error)?;
        tracing::debug!(
            element = %model.element,
            model_name = ?model.model_name,
            version = ?model.version,
            "Loaded PMML model"
        );
        Ok(Arc::new(model))
    }
}
