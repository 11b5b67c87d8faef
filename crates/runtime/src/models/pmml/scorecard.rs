//! `Scorecard` with reason code ranking

use indexmap::IndexMap;

use super::document::Element;
use super::predicate::Predicate;
use super::{PmmlError, Row, Scored};
use crate::types::ParamValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReasonCodeAlgorithm {
    PointsBelow,
    PointsAbove,
}

#[derive(Debug, Clone, PartialEq)]
struct Attribute {
    predicate: Predicate,
    partial_score: f64,
    reason_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
struct Characteristic {
    name: String,
    baseline_score: Option<f64>,
    attributes: Vec<Attribute>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Scorecard {
    initial_score: f64,
    use_reason_codes: bool,
    algorithm: ReasonCodeAlgorithm,
    characteristics: Vec<Characteristic>,
}

impl Scorecard {
    pub fn parse(element: &Element) -> Result<Self, PmmlError> {
        let use_reason_codes = element.attr("useReasonCodes").unwrap_or("true") == "true";
        let algorithm = match element.attr("reasonCodeAlgorithm").unwrap_or("pointsBelow") {
            "pointsBelow" => ReasonCodeAlgorithm::PointsBelow,
            "pointsAbove" => ReasonCodeAlgorithm::PointsAbove,
            other => {
                return Err(PmmlError::Invalid(format!(
                    "unknown reasonCodeAlgorithm '{}'",
                    other
                )))
            }
        };
        let model_baseline = element.number("baselineScore")?;

        let container = element
            .child("Characteristics")
            .ok_or_else(|| PmmlError::Invalid("Scorecard has no Characteristics".to_string()))?;
        let mut characteristics = Vec::new();
        for characteristic in container.children_named("Characteristic") {
            let name = characteristic
                .attr("name")
                .map(str::to_string)
                .unwrap_or_else(|| format!("characteristic_{}", characteristics.len()));
            let default_code = characteristic.attr("reasonCode");
            let baseline_score = characteristic.number("baselineScore")?.or(model_baseline);

            let mut attributes = Vec::new();
            for attribute in characteristic.children_named("Attribute") {
                if attribute.child("ComplexPartialScore").is_some() {
                    return Err(PmmlError::Unsupported("ComplexPartialScore".to_string()));
                }
                let reason_code = attribute.attr("reasonCode").or(default_code).map(str::to_string);
                if use_reason_codes && reason_code.is_none() {
                    return Err(PmmlError::Invalid(format!(
                        "attribute of '{}' has no reason code",
                        name
                    )));
                }
                attributes.push(Attribute {
                    predicate: Predicate::find_in(attribute)?,
                    partial_score: attribute.number("partialScore")?.ok_or_else(|| {
                        PmmlError::Invalid(format!("attribute of '{}' has no partialScore", name))
                    })?,
                    reason_code,
                });
            }
            if use_reason_codes && baseline_score.is_none() {
                return Err(PmmlError::Invalid(format!("'{}' has no baselineScore", name)));
            }
            characteristics.push(Characteristic {
                name,
                baseline_score,
                attributes,
            });
        }

        Ok(Self {
            initial_score: element.number("initialScore")?.unwrap_or(0.0),
            use_reason_codes,
            algorithm,
            characteristics,
        })
    }

    pub fn score(&self, row: &Row) -> Scored {
        let mut total = self.initial_score;
        let mut points: IndexMap<String, f64> = IndexMap::new();

        for characteristic in &self.characteristics {
            let Some(attribute) = characteristic
                .attributes
                .iter()
                .find(|a| a.predicate.evaluate(row) == Some(true))
            else {
                tracing::debug!(characteristic = %characteristic.name, "No scorecard attribute matched");
                return Scored::missing();
            };
            total += attribute.partial_score;

            if let (true, Some(code), Some(baseline)) = (
                self.use_reason_codes,
                &attribute.reason_code,
                characteristic.baseline_score,
            ) {
                let difference = match self.algorithm {
                    ReasonCodeAlgorithm::PointsBelow => baseline - attribute.partial_score,
                    ReasonCodeAlgorithm::PointsAbove => attribute.partial_score - baseline,
                };
                *points.entry(code.clone()).or_insert(0.0) += difference;
            }
        }

        // stable sort keeps characteristic order among equal points
        let mut ranked: Vec<(String, f64)> = points.into_iter().collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        Scored {
            predicted: Some(ParamValue::Float(total)),
            probabilities: IndexMap::new(),
            reason_codes: ranked.into_iter().map(|(code, _)| code).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CARD: &str = r#"
        <Scorecard functionName="regression" initialScore="10" useReasonCodes="true"
                   reasonCodeAlgorithm="pointsBelow" baselineScore="0">
          <Characteristics>
            <Characteristic name="ageScore" reasonCode="RC_AGE" baselineScore="20">
              <Attribute partialScore="5">
                <SimplePredicate field="age" operator="lessThan" value="30"/>
              </Attribute>
              <Attribute partialScore="25">
                <True/>
              </Attribute>
            </Characteristic>
            <Characteristic name="incomeScore" baselineScore="10">
              <Attribute partialScore="3" reasonCode="RC_LOW_INCOME">
                <SimplePredicate field="income" operator="lessOrEqual" value="1000"/>
              </Attribute>
              <Attribute partialScore="15" reasonCode="RC_INCOME">
                <SimplePredicate field="income" operator="greaterThan" value="1000"/>
              </Attribute>
            </Characteristic>
          </Characteristics>
        </Scorecard>"#;

    fn row(age: i64, income: f64) -> Row {
        [
            ("age".to_string(), ParamValue::Int(age)),
            ("income".to_string(), ParamValue::Float(income)),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_score_sums_partial_scores() {
        let card = Scorecard::parse(&Element::parse(CARD).unwrap()).unwrap();
        assert_eq!(card.score(&row(25, 500.0)).predicted, Some(ParamValue::Float(18.0)));
        assert_eq!(card.score(&row(40, 5000.0)).predicted, Some(ParamValue::Float(50.0)));
    }

    #[test]
    fn test_reason_codes_ranked_by_points_below_baseline() {
        let card = Scorecard::parse(&Element::parse(CARD).unwrap()).unwrap();
        // age: 20 - 5 = 15, income: 10 - 3 = 7
        assert_eq!(card.score(&row(25, 500.0)).reason_codes, vec!["RC_AGE", "RC_LOW_INCOME"]);
        // age: 20 - 25 = -5, income: 10 - 15 = -5
        assert_eq!(card.score(&row(40, 5000.0)).reason_codes, vec!["RC_AGE", "RC_INCOME"]);
    }

    #[test]
    fn test_unmatched_characteristic_yields_missing() {
        let card = Scorecard::parse(&Element::parse(CARD).unwrap()).unwrap();
        let partial: Row = [("age".to_string(), ParamValue::Int(25))].into_iter().collect();
        assert!(card.score(&partial).predicted.is_none());
    }

    #[test]
    fn test_reason_codes_required_when_enabled() {
        let xml = CARD.replace(r#"reasonCode="RC_LOW_INCOME""#, "");
        assert!(Scorecard::parse(&Element::parse(&xml).unwrap()).is_err());
    }
}
