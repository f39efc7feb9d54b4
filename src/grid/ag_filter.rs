//! Translates AG Grid's column-keyed `filterModel` into the core's native [`FilterGroup`].
//!
//! This is a best-effort, acknowledged-lossy translation: AG Grid's combined `{operator,
//! conditions}` shape is flattened to AND rather than reconstructed as a nested OR group (see
//! the design note on this in the specification this module implements). A strict translator
//! could build the nested group instead; this one stays faithful to the simpler behaviour and
//! documents the gap rather than silently diverging from it.

use serde_json::{Map, Value};

use crate::filter::{FilterCondition, FilterGroup};
use crate::value::{FilterOperator, FilterValue, ScalarValue};
use crate::{ErrorKind, Result};

/// Translates a whole `filterModel` map (column name to AG Grid filter definition) into a
/// single AND-combined [`FilterGroup`].
pub fn parse_ag_grid_filter_model(model: &Map<String, Value>) -> Result<FilterGroup> {
    let mut conditions = Vec::new();
    for (field, def) in model {
        conditions.extend(ag_filter_to_conditions(field, def)?);
    }
    Ok(FilterGroup::and(conditions))
}

fn ag_filter_to_conditions(field: &str, def: &Value) -> Result<Vec<FilterCondition>> {
    let Value::Object(obj) = def else {
        return Err(ErrorKind::FilterValidationError
            .with_message(format!("filterModel entry for {field} must be an object")));
    };

    // Combined filter: `{operator, conditions: [...]}`. Flattened to AND, an acknowledged
    // limitation — see the module doc comment.
    if let Some(Value::Array(sub_conditions)) = obj.get("conditions") {
        let mut out = Vec::new();
        for sub in sub_conditions {
            out.extend(ag_filter_to_conditions(field, sub)?);
        }
        return Ok(out);
    }

    let filter_type = obj.get("filterType").and_then(Value::as_str).unwrap_or("");

    match filter_type {
        "set" => {
            let values = obj
                .get("values")
                .and_then(Value::as_array)
                .map(|items| items.iter().map(json_to_scalar).collect())
                .unwrap_or_default();
            Ok(vec![FilterCondition::new(field, FilterOperator::In)
                .with_value(FilterValue::List(values))])
        }
        "text" => ag_text_filter(field, obj),
        "number" | "date" => ag_comparable_filter(field, obj),
        _ => {
            // Unknown filter type: fall back to EQ on `filter`, or `values` if present.
            let value = obj
                .get("filter")
                .or_else(|| obj.get("values"))
                .map(json_to_scalar)
                .unwrap_or(ScalarValue::Null);
            Ok(vec![FilterCondition::new(field, FilterOperator::Eq)
                .with_value(FilterValue::Scalar(value))])
        }
    }
}

fn ag_text_filter(field: &str, obj: &Map<String, Value>) -> Result<Vec<FilterCondition>> {
    let ty = obj.get("type").and_then(Value::as_str).unwrap_or("equals");
    let filter = obj.get("filter").map(json_to_scalar).unwrap_or(ScalarValue::Null);
    let condition = match ty {
        "contains" => {
            FilterCondition::new(field, FilterOperator::Contains).with_value(FilterValue::Scalar(filter))
        }
        "notContains" => FilterCondition::new(field, FilterOperator::Contains)
            .with_value(FilterValue::Scalar(filter))
            .negated(),
        "equals" => FilterCondition::new(field, FilterOperator::Eq).with_value(FilterValue::Scalar(filter)),
        "notEqual" => FilterCondition::new(field, FilterOperator::Neq).with_value(FilterValue::Scalar(filter)),
        "startsWith" => {
            FilterCondition::new(field, FilterOperator::StartsWith).with_value(FilterValue::Scalar(filter))
        }
        "endsWith" => {
            FilterCondition::new(field, FilterOperator::EndsWith).with_value(FilterValue::Scalar(filter))
        }
        "blank" => FilterCondition::new(field, FilterOperator::IsNull),
        "notBlank" => FilterCondition::new(field, FilterOperator::IsNotNull),
        other => {
            return Err(ErrorKind::FilterValidationError
                .with_message(format!("unsupported text filter type: {other}")))
        }
    };
    Ok(vec![condition])
}

fn ag_comparable_filter(field: &str, obj: &Map<String, Value>) -> Result<Vec<FilterCondition>> {
    let ty = obj.get("type").and_then(Value::as_str).unwrap_or("equals");
    if ty == "inRange" {
        let lo = obj.get("filter").map(json_to_scalar).unwrap_or(ScalarValue::Null);
        let hi = obj.get("filterTo").map(json_to_scalar).unwrap_or(ScalarValue::Null);
        return Ok(vec![
            FilterCondition::new(field, FilterOperator::Between).with_value(FilterValue::Pair(lo, hi)),
        ]);
    }
    let filter = obj.get("filter").map(json_to_scalar).unwrap_or(ScalarValue::Null);
    let operator = match ty {
        "equals" => FilterOperator::Eq,
        "notEqual" => FilterOperator::Neq,
        "greaterThan" => FilterOperator::Gt,
        "greaterThanOrEqual" => FilterOperator::Gte,
        "lessThan" => FilterOperator::Lt,
        "lessThanOrEqual" => FilterOperator::Lte,
        "blank" => FilterOperator::IsNull,
        "notBlank" => FilterOperator::IsNotNull,
        other => {
            return Err(ErrorKind::FilterValidationError
                .with_message(format!("unsupported number/date filter type: {other}")))
        }
    };
    let condition = if matches!(operator, FilterOperator::IsNull | FilterOperator::IsNotNull) {
        FilterCondition::new(field, operator)
    } else {
        FilterCondition::new(field, operator).with_value(FilterValue::Scalar(filter))
    };
    Ok(vec![condition])
}

fn json_to_scalar(value: &Value) -> ScalarValue {
    match value {
        Value::Null => ScalarValue::Null,
        Value::Bool(b) => ScalarValue::Bool(*b),
        Value::Number(n) => ScalarValue::Number(n.as_f64().unwrap_or(f64::NAN)),
        Value::String(s) => ScalarValue::String(s.clone()),
        other => ScalarValue::String(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn set_filter_becomes_in() {
        let model: Map<String, Value> = serde_json::from_value(json!({
            "region": { "filterType": "set", "values": ["North", "South"] }
        }))
        .unwrap();
        let group = parse_ag_grid_filter_model(&model).unwrap();
        assert_eq!(group.conditions.len(), 1);
        assert_eq!(group.conditions[0].operator, FilterOperator::In);
    }

    #[test]
    fn text_not_contains_negates_contains() {
        let model: Map<String, Value> = serde_json::from_value(json!({
            "product": { "filterType": "text", "type": "notContains", "filter": "Widget" }
        }))
        .unwrap();
        let group = parse_ag_grid_filter_model(&model).unwrap();
        assert_eq!(group.conditions[0].operator, FilterOperator::Contains);
        assert!(group.conditions[0].negate);
    }

    #[test]
    fn number_in_range_becomes_between() {
        let model: Map<String, Value> = serde_json::from_value(json!({
            "amount": { "filterType": "number", "type": "inRange", "filter": 10, "filterTo": 100 }
        }))
        .unwrap();
        let group = parse_ag_grid_filter_model(&model).unwrap();
        assert_eq!(group.conditions[0].operator, FilterOperator::Between);
    }

    #[test]
    fn combined_filter_flattens_to_and() {
        let model: Map<String, Value> = serde_json::from_value(json!({
            "amount": {
                "filterType": "number",
                "operator": "OR",
                "conditions": [
                    { "filterType": "number", "type": "lessThan", "filter": 10 },
                    { "filterType": "number", "type": "greaterThan", "filter": 100 }
                ]
            }
        }))
        .unwrap();
        let group = parse_ag_grid_filter_model(&model).unwrap();
        assert_eq!(group.combinator, crate::value::FilterCombinator::And);
        assert_eq!(group.conditions.len(), 2);
    }

    #[test]
    fn unknown_filter_type_falls_back_to_eq() {
        let model: Map<String, Value> = serde_json::from_value(json!({
            "region": { "filterType": "exotic", "filter": "North" }
        }))
        .unwrap();
        let group = parse_ag_grid_filter_model(&model).unwrap();
        assert_eq!(group.conditions[0].operator, FilterOperator::Eq);
    }
}
