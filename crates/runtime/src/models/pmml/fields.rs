//! Data dictionary, mining schema, and output declarations

use indexmap::IndexMap;

use super::document::{array_tokens, Element};
use super::PmmlError;

#[derive(Debug, Clone, PartialEq)]
pub struct DataField {
    pub name: String,
    pub data_type: String,
    pub optype: Option<String>,
    /// Declared categories, in document order
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldUsage {
    Active,
    Target,
    Other,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MiningField {
    pub name: String,
    pub usage: FieldUsage,
    pub missing_value_replacement: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultFeature {
    PredictedValue,
    PredictedDisplayValue,
    Probability,
    ReasonCode,
    Other(String),
}

impl ResultFeature {
    fn parse(raw: Option<&str>) -> Self {
        match raw.unwrap_or("predictedValue") {
            "predictedValue" => ResultFeature::PredictedValue,
            "predictedDisplayValue" => ResultFeature::PredictedDisplayValue,
            "probability" => ResultFeature::Probability,
            "reasonCode" => ResultFeature::ReasonCode,
            other => ResultFeature::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutputField {
    pub name: String,
    pub feature: ResultFeature,
    /// Category selected by `probability` outputs
    pub value: Option<String>,
    /// 1-based rank selected by `reasonCode` outputs
    pub rank: usize,
    pub data_type: String,
}

pub fn parse_data_dictionary(root: &Element) -> Result<IndexMap<String, DataField>, PmmlError> {
    let dictionary = root
        .child("DataDictionary")
        .ok_or_else(|| PmmlError::Invalid("PMML document has no DataDictionary".to_string()))?;
    dictionary
        .children_named("DataField")
        .map(|field| {
            let name = field.required("name")?.to_string();
            let values = field
                .children_named("Value")
                .filter_map(|v| v.attr("value").map(str::to_string))
                .collect();
            Ok((
                name.clone(),
                DataField {
                    name,
                    data_type: field.attr("dataType").unwrap_or("string").to_string(),
                    optype: field.attr("optype").map(str::to_string),
                    values,
                },
            ))
        })
        .collect()
}

pub fn parse_mining_schema(model: &Element) -> Result<Vec<MiningField>, PmmlError> {
    let schema = model.child("MiningSchema").ok_or_else(|| {
        PmmlError::Invalid(format!("{} has no MiningSchema", model.name))
    })?;
    schema
        .children_named("MiningField")
        .map(|field| {
            let usage = match field.attr("usageType").unwrap_or("active") {
                "active" => FieldUsage::Active,
                "target" | "predicted" => FieldUsage::Target,
                _ => FieldUsage::Other,
            };
            Ok(MiningField {
                name: field.required("name")?.to_string(),
                usage,
                missing_value_replacement: field.attr("missingValueReplacement").map(str::to_string),
            })
        })
        .collect()
}

/// Declared outputs, or the engine defaults when the model declares none
pub fn parse_outputs(
    model: &Element,
    target: Option<&DataField>,
    categories: &[String],
) -> Result<Vec<OutputField>, PmmlError> {
    if let Some(output) = model.child("Output") {
        let fields = output
            .children_named("OutputField")
            .map(|field| {
                let feature = ResultFeature::parse(field.attr("feature"));
                let default_type = match feature {
                    ResultFeature::Probability => "double",
                    ResultFeature::ReasonCode => "string",
                    _ => target.map(|t| t.data_type.as_str()).unwrap_or("double"),
                };
                let rank = match field.attr("rank") {
                    Some(raw) => raw.trim().parse::<usize>().map_err(|_| {
                        PmmlError::Invalid(format!("OutputField rank '{}' is not a position", raw))
                    })?,
                    None => 1,
                };
                Ok(OutputField {
                    name: field.required("name")?.to_string(),
                    feature,
                    value: field.attr("value").map(str::to_string),
                    rank,
                    data_type: field.attr("dataType").unwrap_or(default_type).to_string(),
                })
            })
            .collect::<Result<Vec<_>, PmmlError>>()?;
        if !fields.is_empty() {
            return Ok(fields);
        }
    }

    let target_name = target.map(|t| t.name.as_str()).unwrap_or("value");
    let mut fields = vec![OutputField {
        name: format!("predicted_{}", target_name),
        feature: ResultFeature::PredictedValue,
        value: None,
        rank: 1,
        data_type: target.map(|t| t.data_type.clone()).unwrap_or_else(|| "double".to_string()),
    }];
    fields.extend(categories.iter().map(|category| OutputField {
        name: format!("probability_{}", category),
        feature: ResultFeature::Probability,
        value: Some(category.clone()),
        rank: 1,
        data_type: "double".to_string(),
    }));
    Ok(fields)
}

/// Array element text split into its values
pub fn array_values(element: &Element) -> Result<Vec<String>, PmmlError> {
    let array = element
        .child("Array")
        .ok_or_else(|| PmmlError::Invalid(format!("{} has no Array", element.name)))?;
    Ok(array_tokens(&array.text))
}
