//! Predicates with three-valued logic; `None` means unknown

use std::cmp::Ordering;

use super::document::Element;
use super::fields::array_values;
use super::{PmmlError, Row};
use crate::types::ParamValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Equal,
    NotEqual,
    LessThan,
    LessOrEqual,
    GreaterThan,
    GreaterOrEqual,
    IsMissing,
    IsNotMissing,
}

impl Operator {
    fn parse(raw: &str) -> Result<Self, PmmlError> {
        Ok(match raw {
            "equal" => Operator::Equal,
            "notEqual" => Operator::NotEqual,
            "lessThan" => Operator::LessThan,
            "lessOrEqual" => Operator::LessOrEqual,
            "greaterThan" => Operator::GreaterThan,
            "greaterOrEqual" => Operator::GreaterOrEqual,
            "isMissing" => Operator::IsMissing,
            "isNotMissing" => Operator::IsNotMissing,
            other => return Err(PmmlError::Invalid(format!("unknown operator '{}'", other))),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BooleanOperator {
    And,
    Or,
    Xor,
    Surrogate,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    True,
    False,
    Simple {
        field: String,
        operator: Operator,
        value: Option<String>,
    },
    SimpleSet {
        field: String,
        is_in: bool,
        values: Vec<String>,
    },
    Compound {
        operator: BooleanOperator,
        predicates: Vec<Predicate>,
    },
}

pub fn is_predicate(name: &str) -> bool {
    matches!(
        name,
        "True" | "False" | "SimplePredicate" | "SimpleSetPredicate" | "CompoundPredicate"
    )
}

impl Predicate {
    /// First predicate child of `parent`
    pub fn find_in(parent: &Element) -> Result<Self, PmmlError> {
        let element = parent
            .children
            .iter()
            .find(|c| is_predicate(&c.name))
            .ok_or_else(|| PmmlError::Invalid(format!("{} has no predicate", parent.name)))?;
        Self::parse(element)
    }

    pub fn parse(element: &Element) -> Result<Self, PmmlError> {
        match element.name.as_str() {
            "True" => Ok(Predicate::True),
            "False" => Ok(Predicate::False),
            "SimplePredicate" => {
                let operator = Operator::parse(element.required("operator")?)?;
                let value = element.attr("value").map(str::to_string);
                if value.is_none() && !matches!(operator, Operator::IsMissing | Operator::IsNotMissing) {
                    return Err(PmmlError::Invalid(
                        "SimplePredicate comparison without a value".to_string(),
                    ));
                }
                Ok(Predicate::Simple {
                    field: element.required("field")?.to_string(),
                    operator,
                    value,
                })
            }
            "SimpleSetPredicate" => {
                let is_in = match element.required("booleanOperator")? {
                    "isIn" => true,
                    "isNotIn" => false,
                    other => {
                        return Err(PmmlError::Invalid(format!(
                            "unknown set operator '{}'",
                            other
                        )))
                    }
                };
                Ok(Predicate::SimpleSet {
                    field: element.required("field")?.to_string(),
                    is_in,
                    values: array_values(element)?,
                })
            }
            "CompoundPredicate" => {
                let operator = match element.required("booleanOperator")? {
                    "and" => BooleanOperator::And,
                    "or" => BooleanOperator::Or,
                    "xor" => BooleanOperator::Xor,
                    "surrogate" => BooleanOperator::Surrogate,
                    other => {
                        return Err(PmmlError::Invalid(format!(
                            "unknown boolean operator '{}'",
                            other
                        )))
                    }
                };
                let predicates = element
                    .children
                    .iter()
                    .filter(|c| is_predicate(&c.name))
                    .map(Predicate::parse)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Predicate::Compound {
                    operator,
                    predicates,
                })
            }
            other => Err(PmmlError::Unsupported(format!("predicate '{}'", other))),
        }
    }

    pub fn evaluate(&self, row: &Row) -> Option<bool> {
        match self {
            Predicate::True => Some(true),
            Predicate::False => Some(false),
            Predicate::Simple {
                field,
                operator,
                value,
            } => {
                let input = row.get(field);
                match operator {
                    Operator::IsMissing => return Some(input.is_none()),
                    Operator::IsNotMissing => return Some(input.is_some()),
                    _ => {}
                }
                let ordering = compare(input?, value.as_deref()?)?;
                Some(match operator {
                    Operator::Equal => ordering == Ordering::Equal,
                    Operator::NotEqual => ordering != Ordering::Equal,
                    Operator::LessThan => ordering == Ordering::Less,
                    Operator::LessOrEqual => ordering != Ordering::Greater,
                    Operator::GreaterThan => ordering == Ordering::Greater,
                    Operator::GreaterOrEqual => ordering != Ordering::Less,
                    Operator::IsMissing | Operator::IsNotMissing => false,
                })
            }
            Predicate::SimpleSet {
                field,
                is_in,
                values,
            } => {
                let input = row.get(field)?;
                let found = values
                    .iter()
                    .any(|v| compare(input, v) == Some(Ordering::Equal));
                Some(found == *is_in)
            }
            Predicate::Compound {
                operator,
                predicates,
            } => {
                let results: Vec<Option<bool>> = predicates.iter().map(|p| p.evaluate(row)).collect();
                match operator {
                    BooleanOperator::And => {
                        if results.contains(&Some(false)) {
                            Some(false)
                        } else if results.iter().all(|r| *r == Some(true)) {
                            Some(true)
                        } else {
                            None
                        }
                    }
                    BooleanOperator::Or => {
                        if results.contains(&Some(true)) {
                            Some(true)
                        } else if results.iter().all(|r| *r == Some(false)) {
                            Some(false)
                        } else {
                            None
                        }
                    }
                    BooleanOperator::Xor => results
                        .into_iter()
                        .try_fold(false, |acc, r| r.map(|b| acc ^ b)),
                    BooleanOperator::Surrogate => results.into_iter().flatten().next(),
                }
            }
        }
    }
}

fn text_of(value: &ParamValue) -> String {
    match value {
        ParamValue::Str(s) => s.clone(),
        ParamValue::Bool(b) => b.to_string(),
        ParamValue::Int(i) => i.to_string(),
        ParamValue::Float(f) => f.to_string(),
    }
}

/// Numeric comparison when both sides are numbers, text comparison otherwise
pub fn compare(input: &ParamValue, literal: &str) -> Option<Ordering> {
    let numeric = match input {
        ParamValue::Int(_) | ParamValue::Float(_) => input.as_f64(),
        ParamValue::Str(s) => s.trim().parse::<f64>().ok(),
        ParamValue::Bool(_) => None,
    };
    match (numeric, literal.trim().parse::<f64>()) {
        (Some(a), Ok(b)) => a.partial_cmp(&b),
        _ => Some(text_of(input).as_str().cmp(literal)),
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

    fn parse(xml: &str) -> Predicate {
        Predicate::parse(&Element::parse(xml).unwrap()).unwrap()
    }

    #[test]
    fn test_simple_numeric_comparison() {
        let p = parse(r#"<SimplePredicate field="age" operator="lessThan" value="30"/>"#);
        assert_eq!(p.evaluate(&row(&[("age", ParamValue::Int(25))])), Some(true));
        assert_eq!(p.evaluate(&row(&[("age", ParamValue::Float(30.0))])), Some(false));
        assert_eq!(p.evaluate(&row(&[])), None);
    }

    #[test]
    fn test_missing_operators() {
        let p = parse(r#"<SimplePredicate field="age" operator="isMissing"/>"#);
        assert_eq!(p.evaluate(&row(&[])), Some(true));
        assert_eq!(p.evaluate(&row(&[("age", ParamValue::Int(1))])), Some(false));
    }

    #[test]
    fn test_set_membership() {
        let p = parse(
            r#"<SimpleSetPredicate field="color" booleanOperator="isIn">
                 <Array n="2" type="string">red "dark blue"</Array>
               </SimpleSetPredicate>"#,
        );
        assert_eq!(p.evaluate(&row(&[("color", "dark blue".into())])), Some(true));
        assert_eq!(p.evaluate(&row(&[("color", "green".into())])), Some(false));
    }

    #[test]
    fn test_compound_three_valued_logic() {
        let and = parse(
            r#"<CompoundPredicate booleanOperator="and">
                 <SimplePredicate field="a" operator="equal" value="1"/>
                 <SimplePredicate field="b" operator="equal" value="1"/>
               </CompoundPredicate>"#,
        );
        let one = ParamValue::Int(1);
        assert_eq!(and.evaluate(&row(&[("a", one.clone()), ("b", one.clone())])), Some(true));
        assert_eq!(and.evaluate(&row(&[("a", ParamValue::Int(0))])), Some(false));
        assert_eq!(and.evaluate(&row(&[("a", one.clone())])), None);

        let surrogate = parse(
            r#"<CompoundPredicate booleanOperator="surrogate">
                 <SimplePredicate field="a" operator="greaterThan" value="0"/>
                 <True/>
               </CompoundPredicate>"#,
        );
        assert_eq!(surrogate.evaluate(&row(&[])), Some(true));
        assert_eq!(surrogate.evaluate(&row(&[("a", ParamValue::Int(-1))])), Some(false));
    }

    #[test]
    fn test_unknown_operator_is_invalid() {
        let element =
            Element::parse(r#"<SimplePredicate field="a" operator="like" value="x"/>"#).unwrap();
        assert!(matches!(Predicate::parse(&element), Err(PmmlError::Invalid(_))));
    }
}
