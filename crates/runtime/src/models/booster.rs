//! BOOSTER adapter for gradient boosted tree ensembles
//!
//! Reads the JSON model document written by `Booster.save_model("*.json")`
//! and evaluates the trees natively. Only `gbtree` boosters with numerical
//! splits are supported; the model only accepts a [`DMatrix`] input.

use ndarray::{Array1, Array2};
use serde::Deserialize;
use std::sync::Arc;

use super::adapter::{engine_failure, FormatAdapter, ModelHandle, ModelMethod, ModelSignature};
use crate::normalize::{DMatrix, InputNormalizer, ModelInput, RawOutput};
use crate::types::{BinaryFormat, RuntimeError};

#[derive(Debug, Deserialize)]
struct BoosterDocument {
    learner: LearnerDocument,
}

#[derive(Debug, Deserialize)]
struct LearnerDocument {
    #[serde(default)]
    feature_names: Vec<String>,
    gradient_booster: GradientBoosterDocument,
    learner_model_param: LearnerModelParam,
    objective: ObjectiveDocument,
}

#[derive(Debug, Deserialize)]
struct GradientBoosterDocument {
    name: String,
    #[serde(default)]
    model: Option<TreeModelDocument>,
}

#[derive(Debug, Deserialize)]
struct TreeModelDocument {
    trees: Vec<TreeDocument>,
    #[serde(default)]
    tree_info: Vec<usize>,
}

#[derive(Debug, Deserialize)]
struct TreeDocument {
    left_children: Vec<i64>,
    right_children: Vec<i64>,
    split_indices: Vec<usize>,
    split_conditions: Vec<f32>,
    default_left: Vec<serde_json::Value>,
    #[serde(default)]
    split_type: Vec<u8>,
}

#[derive(Debug, Deserialize)]
struct LearnerModelParam {
    base_score: String,
    #[serde(default)]
    num_class: Option<String>,
    #[serde(default)]
    num_feature: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ObjectiveDocument {
    name: String,
}

/// Learning objective, which fixes the base margin and output transform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Objective {
    /// Raw margin is the prediction
    Identity,
    /// Sigmoid of the margin
    Logistic,
    /// Margin of a logistic model, untransformed
    LogitRaw,
    /// Exponential of the margin
    Exp,
    /// Softmax over class margins, one column per class
    SoftProb,
    /// Index of the highest class margin
    SoftMax,
}

impl Objective {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "reg:squarederror" | "reg:linear" | "reg:squaredlogerror" | "reg:pseudohubererror"
            | "reg:absoluteerror" | "reg:quantileerror" | "rank:pairwise" | "rank:ndcg"
            | "rank:map" => Some(Objective::Identity),
            "reg:logistic" | "binary:logistic" => Some(Objective::Logistic),
            "binary:logitraw" => Some(Objective::LogitRaw),
            "count:poisson" | "reg:gamma" | "reg:tweedie" => Some(Objective::Exp),
            "multi:softprob" => Some(Objective::SoftProb),
            "multi:softmax" => Some(Objective::SoftMax),
            _ => None,
        }
    }

    /// Convert the stored base score into margin space
    fn base_margin(&self, base_score: f32) -> f32 {
        match self {
            Objective::Logistic | Objective::LogitRaw => -(1.0 / base_score - 1.0).ln(),
            Objective::Exp => base_score.ln(),
            _ => base_score,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Node {
    left: i64,
    right: i64,
    feature: usize,
    /// Split threshold, or the leaf value when `left == -1`
    value: f32,
    default_left: bool,
}

#[derive(Debug, Clone)]
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn from_document(index: usize, doc: TreeDocument) -> Result<Self, RuntimeError> {
        let n = doc.left_children.len();
        let lengths = [
            doc.right_children.len(),
            doc.split_indices.len(),
            doc.split_conditions.len(),
            doc.default_left.len(),
        ];
        if n == 0 || lengths.iter().any(|l| *l != n) {
            return Err(corrupt(format!("tree {} has inconsistent node arrays", index)));
        }
        if doc.split_type.iter().any(|t| *t != 0) {
            return Err(RuntimeError::UnsupportedFormat(format!(
                "tree {} uses categorical splits",
                index
            )));
        }

        let mut nodes = Vec::with_capacity(n);
        for i in 0..n {
            let (left, right) = (doc.left_children[i], doc.right_children[i]);
            let is_leaf = left == -1;
            // children always follow their parent, which rules out cycles
            let child_ok = |c: i64| c > i as i64 && (c as usize) < n;
            if !is_leaf && !(child_ok(left) && child_ok(right)) {
                return Err(corrupt(format!("tree {} node {} has invalid children", index, i)));
            }
            let default_left = match &doc.default_left[i] {
                serde_json::Value::Bool(b) => *b,
                serde_json::Value::Number(n) => n.as_i64() != Some(0),
                other => return Err(corrupt(format!("default_left holds {}", other))),
            };
            nodes.push(Node {
                left,
                right,
                feature: doc.split_indices[i],
                value: doc.split_conditions[i],
                default_left,
            });
        }
        Ok(Self { nodes })
    }

    fn max_feature(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| n.left != -1)
            .map(|n| n.feature + 1)
            .max()
            .unwrap_or(0)
    }

    fn leaf_value(&self, row: &[f32]) -> f32 {
        let mut node = self.nodes[0];
        while node.left != -1 {
            let value = row.get(node.feature).copied().unwrap_or(f32::NAN);
            let next = if value.is_nan() {
                if node.default_left { node.left } else { node.right }
            } else if value < node.value {
                node.left
            } else {
                node.right
            };
            node = self.nodes[next as usize];
        }
        node.value
    }
}

/// Length and container markers that may follow the opening `{` of a
/// UBJSON object; none of them can follow `{` in JSON
const UBJSON_OBJECT_MARKERS: &[u8] = b"iUIlL$#";

/// Booster encodings that are valid but cannot be evaluated natively
fn unsupported_encoding(binary: &[u8]) -> Option<&'static str> {
    match binary {
        [b'b', b'i', b'n', b'f', ..] => Some("legacy binary"),
        [b'{', marker, ..] if UBJSON_OBJECT_MARKERS.contains(marker) => Some("UBJSON"),
        _ => None,
    }
}

fn corrupt(message: impl std::fmt::Display) -> RuntimeError {
    RuntimeError::CorruptBinary(format!("invalid booster model: {}", message))
}

/// Parse `"5E-1"` and the bracketed `"[5E-1]"` form
fn parse_base_score(raw: &str) -> Result<f32, RuntimeError> {
    raw.trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .split(',')
        .next()
        .unwrap_or_default()
        .trim()
        .parse::<f32>()
        .map_err(|e| corrupt(format!("base_score '{}': {}", raw, e)))
}

fn parse_count(raw: Option<&str>, field: &str) -> Result<usize, RuntimeError> {
    match raw {
        None => Ok(0),
        Some(raw) => raw
            .trim()
            .parse::<usize>()
            .map_err(|e| corrupt(format!("{} '{}': {}", field, raw, e))),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BoosterError {
    #[error("expecting a DMatrix input, got {0}")]
    NotADMatrix(&'static str),

    #[error("feature_names mismatch: expected {expected:?}, got {got:?}")]
    FeatureNames {
        expected: Vec<String>,
        got: Vec<String>,
    },

    #[error("Feature shape mismatch, expected: {expected}, got {got}")]
    FeatureShape { expected: usize, got: usize },
}

/// Decoded tree ensemble
#[derive(Debug)]
pub struct Booster {
    trees: Vec<Tree>,
    /// Output group of each tree
    tree_groups: Vec<usize>,
    num_groups: usize,
    num_feature: usize,
    base_margin: f32,
    objective: Objective,
    objective_name: String,
    feature_names: Vec<String>,
}

impl Booster {
    pub fn from_json(binary: &[u8]) -> Result<Self, RuntimeError> {
        if let Some(encoding) = unsupported_encoding(binary) {
            return Err(RuntimeError::UnsupportedFormat(format!(
                "{} booster encoding is not supported; save the model as JSON",
                encoding
            )));
        }

        let doc: BoosterDocument = serde_json::from_slice(binary)
            .map_err(|e| corrupt(format!("not a JSON booster document: {}", e)))?;
        let learner = doc.learner;

        if learner.gradient_booster.name != "gbtree" {
            return Err(RuntimeError::UnsupportedFormat(format!(
                "booster type '{}' is not supported",
                learner.gradient_booster.name
            )));
        }
        let objective = Objective::from_name(&learner.objective.name).ok_or_else(|| {
            RuntimeError::UnsupportedFormat(format!(
                "objective '{}' is not supported",
                learner.objective.name
            ))
        })?;
        let model = learner
            .gradient_booster
            .model
            .ok_or_else(|| corrupt("gbtree carries no model"))?;

        let params = &learner.learner_model_param;
        let num_groups = parse_count(params.num_class.as_deref(), "num_class")?.max(1);
        let base_score = parse_base_score(&params.base_score)?;

        let tree_groups = if model.tree_info.is_empty() {
            vec![0; model.trees.len()]
        } else {
            model.tree_info
        };
        if tree_groups.len() != model.trees.len() || tree_groups.iter().any(|g| *g >= num_groups) {
            return Err(corrupt("tree_info does not match the trees"));
        }

        let trees = model
            .trees
            .into_iter()
            .enumerate()
            .map(|(i, t)| Tree::from_document(i, t))
            .collect::<Result<Vec<_>, _>>()?;
        let num_feature = parse_count(params.num_feature.as_deref(), "num_feature")?
            .max(trees.iter().map(Tree::max_feature).max().unwrap_or(0))
            .max(learner.feature_names.len());

        Ok(Self {
            trees,
            tree_groups,
            num_groups,
            num_feature,
            base_margin: objective.base_margin(base_score),
            objective,
            objective_name: learner.objective.name,
            feature_names: learner.feature_names,
        })
    }

    pub fn objective(&self) -> Objective {
        self.objective
    }

    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }

    fn check_features(&self, matrix: &DMatrix) -> Result<(), BoosterError> {
        if !self.feature_names.is_empty()
            && !matrix.feature_names().is_empty()
            && self.feature_names.as_slice() != matrix.feature_names()
        {
            return Err(BoosterError::FeatureNames {
                expected: self.feature_names.clone(),
                got: matrix.feature_names().to_vec(),
            });
        }
        if matrix.num_cols() < self.num_feature {
            return Err(BoosterError::FeatureShape {
                expected: self.num_feature,
                got: matrix.num_cols(),
            });
        }
        Ok(())
    }

    /// Raw margins, one column per output group
    pub fn margins(&self, matrix: &DMatrix) -> Array2<f32> {
        let mut margins = Array2::from_elem((matrix.num_rows(), self.num_groups), self.base_margin);
        for (r, mut out) in margins.outer_iter_mut().enumerate() {
            let row = matrix.row(r).to_vec();
            for (tree, group) in self.trees.iter().zip(&self.tree_groups) {
                out[*group] += tree.leaf_value(&row);
            }
        }
        margins
    }

    fn transform(&self, margins: Array2<f32>) -> RawOutput {
        let margins = margins.mapv(f64::from);
        let column = |m: Array2<f64>| m.column(0).to_owned();
        let output: ndarray::ArrayD<f64> = match self.objective {
            Objective::Identity | Objective::LogitRaw if self.num_groups == 1 => {
                column(margins).into_dyn()
            }
            Objective::Identity | Objective::LogitRaw => margins.into_dyn(),
            Objective::Logistic => column(margins).mapv(|m| 1.0 / (1.0 + (-m).exp())).into_dyn(),
            Objective::Exp => column(margins).mapv(f64::exp).into_dyn(),
            Objective::SoftProb => {
                let mut proba = margins;
                for mut row in proba.outer_iter_mut() {
                    let max = row.fold(f64::NEG_INFINITY, |m, v| m.max(*v));
                    row.mapv_inplace(|v| (v - max).exp());
                    let sum = row.sum();
                    row.mapv_inplace(|v| v / sum);
                }
                proba.into_dyn()
            }
            Objective::SoftMax => margins
                .outer_iter()
                .map(|row| {
                    row.iter()
                        .enumerate()
                        .fold((0usize, f64::NEG_INFINITY), |best, (i, v)| {
                            if *v > best.1 { (i, *v) } else { best }
                        })
                        .0 as f64
                })
                .collect::<Array1<f64>>()
                .into_dyn(),
        };
        RawOutput::Array(output)
    }
}

impl ModelHandle for Booster {
    fn has_method(&self, method: ModelMethod) -> bool {
        matches!(method, ModelMethod::Predict)
    }

    fn predict(&self, input: &ModelInput) -> Result<RawOutput, RuntimeError> {
        let ModelInput::DMatrix(matrix) = input else {
            return Err(engine_failure(
                BinaryFormat::Booster,
                input,
                BoosterError::NotADMatrix(input.type_name()),
            ));
        };
        self.check_features(matrix)
            .map_err(|e| engine_failure(BinaryFormat::Booster, input, e))?;
        Ok(self.transform(self.margins(matrix)))
    }

    fn preferred_input(&self) -> InputNormalizer {
        InputNormalizer::DMatrix
    }

    fn signature(&self) -> ModelSignature {
        ModelSignature {
            model_name: None,
            subtype: Some(self.objective_name.clone()),
            input_fields: (!self.feature_names.is_empty()).then(|| {
                self.feature_names
                    .iter()
                    .map(|n| (n.clone(), "float".to_string()))
                    .collect()
            }),
            output_fields: None,
        }
    }
}

pub struct BoosterAdapter;

impl BoosterAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for BoosterAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl FormatAdapter for BoosterAdapter {
    fn format(&self) -> BinaryFormat {
        BinaryFormat::Booster
    }

    fn name(&self) -> &str {
        "booster"
    }

    fn load(&self, binary: &[u8]) -> Result<Arc<dyn ModelHandle>, RuntimeError> {
        let booster = Booster::from_json(binary)?;
        tracing::debug!(
            trees = booster.num_trees(),
            objective = %booster.objective_name,
            "Loaded booster"
        );
        Ok(Arc::new(booster))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::types::{Parameter, PredictionRequest};
    use serde_json::json;

    /// Single stump on feature 0 at 0.5: left leaf -1.0, right leaf 1.0
    pub(crate) fn stump_model(objective: &str, base_score: &str) -> Vec<u8> {
        json!({
            "learner": {
                "feature_names": ["x", "y"],
                "gradient_booster": {
                    "name": "gbtree",
                    "model": {
                        "trees": [{
                            "left_children": [1, -1, -1],
                            "right_children": [2, -1, -1],
                            "split_indices": [0, 0, 0],
                            "split_conditions": [0.5, -1.0, 1.0],
                            "default_left": [1, 0, 0]
                        }],
                        "tree_info": [0]
                    }
                },
                "learner_model_param": {
                    "base_score": base_score,
                    "num_class": "0",
                    "num_feature": "2"
                },
                "objective": {"name": objective}
            }
        })
        .to_string()
        .into_bytes()
    }

    fn matrix(rows: Vec<Vec<(&str, f64)>>) -> ModelInput {
        let request = PredictionRequest::batch(
            rows.into_iter()
                .map(|r| r.into_iter().map(|(n, v)| Parameter::new(n, v)).collect())
                .collect(),
        );
        InputNormalizer::DMatrix.apply(&request).unwrap()
    }

    #[test]
    fn test_regression_stump() {
        let booster = BoosterAdapter.load(&stump_model("reg:squarederror", "5E-1")).unwrap();
        let output = booster
            .predict(&matrix(vec![vec![("x", 0.2), ("y", 0.0)], vec![("x", 0.9), ("y", 0.0)]]))
            .unwrap();
        assert_eq!(output, RawOutput::Array(ndarray::array![-0.5, 1.5].into_dyn()));
        assert_eq!(booster.preferred_input(), InputNormalizer::DMatrix);
        assert!(!booster.has_method(ModelMethod::PredictProba));
    }

    #[test]
    fn test_logistic_base_score_is_a_probability() {
        let booster = Booster::from_json(&stump_model("binary:logistic", "[5E-1]")).unwrap();
        let RawOutput::Array(output) = booster.transform(booster.margins(&DMatrix::new(
            vec!["x".into(), "y".into()],
            ndarray::array![[0.9, 0.0]],
        ))) else {
            panic!("expected array");
        };
        let expected = 1.0 / (1.0 + (-1.0f64).exp());
        assert!((output[[0]] - expected).abs() < 1e-6);
    }

    #[test]
    fn test_missing_value_follows_default_direction() {
        let booster = Booster::from_json(&stump_model("reg:squarederror", "0")).unwrap();
        let margins = booster.margins(&DMatrix::new(
            vec!["x".into(), "y".into()],
            ndarray::array![[f32::NAN, 0.0]],
        ));
        assert_eq!(margins[[0, 0]], -1.0);
    }

    #[test]
    fn test_requires_dmatrix_input() {
        let booster = BoosterAdapter.load(&stump_model("reg:squarederror", "0")).unwrap();
        let request = PredictionRequest::row(vec![Parameter::new("x", 1.0), Parameter::new("y", 1.0)]);
        let frame = InputNormalizer::DataFrame.apply(&request).unwrap();
        let err = booster.predict(&frame).unwrap_err();
        assert!(matches!(err, RuntimeError::Prediction { .. }));
    }

    #[test]
    fn test_feature_name_mismatch() {
        let booster = BoosterAdapter.load(&stump_model("reg:squarederror", "0")).unwrap();
        let err = booster
            .predict(&matrix(vec![vec![("a", 1.0), ("b", 1.0)]]))
            .unwrap_err();
        assert!(err.to_string().contains("feature_names mismatch"));
    }

    #[test]
    fn test_softprob_groups() {
        let tree = |leaf: f64| {
            json!({
                "left_children": [-1],
                "right_children": [-1],
                "split_indices": [0],
                "split_conditions": [leaf],
                "default_left": [false]
            })
        };
        let model = json!({
            "learner": {
                "gradient_booster": {
                    "name": "gbtree",
                    "model": {"trees": [tree(0.0), tree(0.0)], "tree_info": [0, 1]}
                },
                "learner_model_param": {"base_score": "0.5", "num_class": "2", "num_feature": "1"},
                "objective": {"name": "multi:softprob"}
            }
        });
        let booster = BoosterAdapter.load(model.to_string().as_bytes()).unwrap();
        let output = booster.predict(&matrix(vec![vec![("f0", 3.0)]])).unwrap();
        assert_eq!(output, RawOutput::Array(ndarray::array![[0.5, 0.5]].into_dyn()));
    }

    #[test]
    fn test_load_failures() {
        assert!(matches!(
            BoosterAdapter.load(b"not a booster"),
            Err(RuntimeError::CorruptBinary(_))
        ));
        assert!(matches!(
            BoosterAdapter.load(&stump_model("survival:cox", "0")),
            Err(RuntimeError::UnsupportedFormat(_))
        ));
        let broken = String::from_utf8(stump_model("reg:squarederror", "0"))
            .unwrap()
            .replace("\"right_children\":[2,-1,-1]", "\"right_children\":[0,-1,-1]");
        assert!(matches!(
            BoosterAdapter.load(broken.as_bytes()),
            Err(RuntimeError::CorruptBinary(_))
        ));
    }

    #[test]
    fn test_binary_encodings_are_unsupported() {
        // legacy `binf` header and a UBJSON object opening with an int8 key length
        for binary in [&b"binf\x00\x00\x00\x3f"[..], &b"{i\x07learner{"[..], &b"{U\x07learner"[..]] {
            assert!(matches!(
                BoosterAdapter.load(binary),
                Err(RuntimeError::UnsupportedFormat(_))
            ));
        }
        // JSON with leading whitespace is still parsed
        let spaced = [b" ".as_slice(), stump_model("reg:squarederror", "0").as_slice()].concat();
        assert!(BoosterAdapter.load(&spaced).is_ok());
    }
}
