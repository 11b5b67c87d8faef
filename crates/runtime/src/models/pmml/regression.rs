//! `RegressionModel` for regression and classification functions

use indexmap::IndexMap;

use super::document::Element;
use super::predicate::compare;
use super::{MiningFunction, PmmlError, Row, Scored};
use crate::types::ParamValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Normalization {
    None,
    Softmax,
    Simplemax,
    Logit,
    Exp,
}

impl Normalization {
    fn parse(raw: Option<&str>) -> Result<Self, PmmlError> {
        Ok(match raw.unwrap_or("none") {
            "none" => Normalization::None,
            "softmax" => Normalization::Softmax,
            "simplemax" => Normalization::Simplemax,
            "logit" => Normalization::Logit,
            "exp" => Normalization::Exp,
            other => {
                return Err(PmmlError::Unsupported(format!(
                    "normalizationMethod '{}'",
                    other
                )))
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
struct NumericPredictor {
    name: String,
    exponent: i32,
    coefficient: f64,
}

#[derive(Debug, Clone, PartialEq)]
struct CategoricalPredictor {
    name: String,
    value: String,
    coefficient: f64,
}

#[derive(Debug, Clone, PartialEq)]
struct RegressionTable {
    intercept: f64,
    target_category: Option<String>,
    numeric: Vec<NumericPredictor>,
    categorical: Vec<CategoricalPredictor>,
}

impl RegressionTable {
    fn parse(element: &Element) -> Result<Self, PmmlError> {
        if element.child("PredictorTerm").is_some() {
            return Err(PmmlError::Unsupported("PredictorTerm interactions".to_string()));
        }
        let numeric = element
            .children_named("NumericPredictor")
            .map(|p| {
                Ok(NumericPredictor {
                    name: p.required("name")?.to_string(),
                    exponent: p.number("exponent")?.unwrap_or(1.0) as i32,
                    coefficient: p.number("coefficient")?.ok_or_else(|| {
                        PmmlError::Invalid("NumericPredictor without coefficient".to_string())
                    })?,
                })
            })
            .collect::<Result<Vec<_>, PmmlError>>()?;
        let categorical = element
            .children_named("CategoricalPredictor")
            .map(|p| {
                Ok(CategoricalPredictor {
                    name: p.required("name")?.to_string(),
                    value: p.required("value")?.to_string(),
                    coefficient: p.number("coefficient")?.ok_or_else(|| {
                        PmmlError::Invalid("CategoricalPredictor without coefficient".to_string())
                    })?,
                })
            })
            .collect::<Result<Vec<_>, PmmlError>>()?;
        Ok(Self {
            intercept: element.number("intercept")?.unwrap_or(0.0),
            target_category: element.attr("targetCategory").map(str::to_string),
            numeric,
            categorical,
        })
    }

    /// Linear score; `None` when a numeric predictor is missing
    fn score(&self, row: &Row) -> Option<f64> {
        let mut total = self.intercept;
        for predictor in &self.numeric {
            let x = row.get(&predictor.name)?.as_f64()?;
            total += predictor.coefficient * x.powi(predictor.exponent);
        }
        for predictor in &self.categorical {
            let matches = row
                .get(&predictor.name)
                .map(|v| compare(v, &predictor.value) == Some(std::cmp::Ordering::Equal))
                .unwrap_or(false);
            if matches {
                total += predictor.coefficient;
            }
        }
        Some(total)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegressionModel {
    function: MiningFunction,
    normalization: Normalization,
    tables: Vec<RegressionTable>,
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

impl RegressionModel {
    pub fn parse(element: &Element, function: MiningFunction) -> Result<Self, PmmlError> {
        let normalization = Normalization::parse(element.attr("normalizationMethod"))?;
        let tables = element
            .children_named("RegressionTable")
            .map(RegressionTable::parse)
            .collect::<Result<Vec<_>, _>>()?;

        match function {
            MiningFunction::Regression if tables.len() != 1 => {
                return Err(PmmlError::Invalid(format!(
                    "regression needs exactly one RegressionTable, found {}",
                    tables.len()
                )))
            }
            MiningFunction::Classification => {
                if tables.len() < 2 || tables.iter().any(|t| t.target_category.is_none()) {
                    return Err(PmmlError::Invalid(
                        "classification needs a RegressionTable per targetCategory".to_string(),
                    ));
                }
                if normalization == Normalization::Exp {
                    return Err(PmmlError::Unsupported(
                        "exp normalization for classification".to_string(),
                    ));
                }
            }
            _ => {}
        }

        Ok(Self {
            function,
            normalization,
            tables,
        })
    }

    pub fn categories(&self) -> Vec<String> {
        self.tables
            .iter()
            .filter_map(|t| t.target_category.clone())
            .collect()
    }

    pub fn score(&self, row: &Row) -> Scored {
        let scores: Option<Vec<f64>> = self.tables.iter().map(|t| t.score(row)).collect();
        let Some(scores) = scores else {
            return Scored::missing();
        };

        if self.function == MiningFunction::Regression {
            let y = scores[0];
            let value = match self.normalization {
                Normalization::None | Normalization::Simplemax => y,
                Normalization::Softmax | Normalization::Logit => sigmoid(y),
                Normalization::Exp => y.exp(),
            };
            return Scored {
                predicted: Some(ParamValue::Float(value)),
                ..Scored::missing()
            };
        }

        let k = scores.len();
        let probabilities: Vec<f64> = match self.normalization {
            Normalization::Softmax => {
                let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                let exp: Vec<f64> = scores.iter().map(|s| (s - max).exp()).collect();
                let sum: f64 = exp.iter().sum();
                exp.into_iter().map(|e| e / sum).collect()
            }
            Normalization::Simplemax => {
                let sum: f64 = scores.iter().sum();
                scores.iter().map(|s| s / sum).collect()
            }
            Normalization::Logit | Normalization::None | Normalization::Exp => {
                let mut probabilities: Vec<f64> = scores[..k - 1]
                    .iter()
                    .map(|s| {
                        if self.normalization == Normalization::Logit {
                            sigmoid(*s)
                        } else {
                            *s
                        }
                    })
                    .collect();
                let rest: f64 = probabilities.iter().sum();
                probabilities.push(1.0 - rest);
                probabilities
            }
        };

        let probabilities: IndexMap<String, f64> = self
            .categories()
            .into_iter()
            .zip(probabilities)
            .collect();
        let predicted = probabilities
            .iter()
            .fold(None::<(&String, f64)>, |best, (c, p)| match best {
                Some((_, bp)) if bp >= *p => best,
                _ => Some((c, *p)),
            })
            .map(|(c, _)| ParamValue::Str(c.clone()));
        Scored {
            predicted,
            probabilities,
            reason_codes: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(entries: &[(&str, ParamValue)]) -> Row {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_linear_regression_with_categories() {
        let element = Element::parse(
            r#"<RegressionModel functionName="regression">
                 <RegressionTable intercept="1.0">
                   <NumericPredictor name="x" coefficient="2.0"/>
                   <NumericPredictor name="y" exponent="2" coefficient="1.0"/>
                   <CategoricalPredictor name="c" value="red" coefficient="10"/>
                 </RegressionTable>
               </RegressionModel>"#,
        )
        .unwrap();
        let model = RegressionModel::parse(&element, MiningFunction::Regression).unwrap();
        let scored = model.score(&row(&[
            ("x", ParamValue::Float(0.5)),
            ("y", ParamValue::Int(3)),
            ("c", "red".into()),
        ]));
        assert_eq!(scored.predicted, Some(ParamValue::Float(21.0)));
        assert!(model.score(&row(&[("y", ParamValue::Int(3))])).predicted.is_none());
    }

    #[test]
    fn test_binary_logit_classification() {
        let element = Element::parse(
            r#"<RegressionModel functionName="classification" normalizationMethod="logit">
                 <RegressionTable intercept="0" targetCategory="yes">
                   <NumericPredictor name="x" coefficient="1"/>
                 </RegressionTable>
                 <RegressionTable intercept="0" targetCategory="no"/>
               </RegressionModel>"#,
        )
        .unwrap();
        let model = RegressionModel::parse(&element, MiningFunction::Classification).unwrap();
        assert_eq!(model.categories(), vec!["yes", "no"]);

        let scored = model.score(&row(&[("x", ParamValue::Float(0.0))]));
        assert_eq!(scored.probabilities["yes"], 0.5);
        assert_eq!(scored.probabilities["no"], 0.5);

        let scored = model.score(&row(&[("x", ParamValue::Float(2.0))]));
        assert_eq!(scored.predicted, Some(ParamValue::from("yes")));
    }

    #[test]
    fn test_softmax_sums_to_one() {
        let element = Element::parse(
            r#"<RegressionModel functionName="classification" normalizationMethod="softmax">
                 <RegressionTable intercept="1" targetCategory="a"/>
                 <RegressionTable intercept="2" targetCategory="b"/>
                 <RegressionTable intercept="3" targetCategory="c"/>
               </RegressionModel>"#,
        )
        .unwrap();
        let model = RegressionModel::parse(&element, MiningFunction::Classification).unwrap();
        let scored = model.score(&Row::new());
        let total: f64 = scored.probabilities.values().sum();
        assert!((total - 1.0).abs() < 1e-12);
        assert_eq!(scored.predicted, Some(ParamValue::from("c")));
    }

    #[test]
    fn test_unsupported_shapes() {
        let terms = Element::parse(
            r#"<RegressionModel><RegressionTable intercept="0"><PredictorTerm/></RegressionTable></RegressionModel>"#,
        )
        .unwrap();
        assert!(matches!(
            RegressionModel::parse(&terms, MiningFunction::Regression),
            Err(PmmlError::Unsupported(_))
        ));
        let probit = Element::parse(r#"<RegressionModel normalizationMethod="probit"/>"#).unwrap();
        assert!(RegressionModel::parse(&probit, MiningFunction::Regression).is_err());
    }
}
