//! The recursive predicate tree and its two executors: an in-memory row evaluator and a SQL
//! `WHERE`-clause compiler. Both must agree on visible results for the same filter and data
//! (see the module tests and `tests/filter_equivalence.rs` for the cross-check).

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::value::{FilterOperator, FilterValue, Row, ScalarValue};
use crate::{ErrorKind, Result};

/// One leaf predicate: `column operator value`, optionally negated.
#[derive(Clone, Debug, PartialEq)]
pub struct FilterCondition {
    pub column: String,
    pub operator: FilterOperator,
    pub value: Option<FilterValue>,
    pub negate: bool,
}

impl FilterCondition {
    pub fn new(column: impl Into<String>, operator: FilterOperator) -> Self {
        FilterCondition {
            column: column.into(),
            operator,
            value: None,
            negate: false,
        }
    }

    pub fn with_value(mut self, value: FilterValue) -> Self {
        self.value = Some(value);
        self
    }

    pub fn negated(mut self) -> Self {
        self.negate = true;
        self
    }

    /// Evaluates this condition against one row. Absent columns are treated as null.
    pub fn evaluate(&self, row: &Row) -> bool {
        let cell = row.get(&self.column);
        let result = self.matches(cell);
        if self.negate {
            !result
        } else {
            result
        }
    }

    fn matches(&self, cell: Option<&ScalarValue>) -> bool {
        let is_null = cell.map(ScalarValue::is_null).unwrap_or(true);
        match self.operator {
            FilterOperator::IsNull => is_null,
            FilterOperator::IsNotNull => !is_null,
            FilterOperator::Eq => match (cell, self.scalar_value()) {
                (Some(c), Some(v)) => structural_eq(c, v),
                (None, Some(v)) => v.is_null(),
                _ => false,
            },
            FilterOperator::Neq => match (cell, self.scalar_value()) {
                (Some(c), Some(v)) => !structural_eq(c, v),
                (None, Some(v)) => !v.is_null(),
                _ => true,
            },
            FilterOperator::Gt | FilterOperator::Lt | FilterOperator::Gte | FilterOperator::Lte => {
                let (Some(c), Some(v)) = (cell, self.scalar_value()) else {
                    return false;
                };
                if c.is_null() || v.is_null() {
                    return false;
                }
                match c.safe_cmp(v) {
                    Some(std::cmp::Ordering::Less) => {
                        matches!(self.operator, FilterOperator::Lt | FilterOperator::Lte)
                    }
                    Some(std::cmp::Ordering::Greater) => {
                        matches!(self.operator, FilterOperator::Gt | FilterOperator::Gte)
                    }
                    Some(std::cmp::Ordering::Equal) => {
                        matches!(self.operator, FilterOperator::Gte | FilterOperator::Lte)
                    }
                    None => false,
                }
            }
            FilterOperator::Contains | FilterOperator::StartsWith | FilterOperator::EndsWith => {
                let (Some(c), Some(v)) = (cell, self.scalar_value()) else {
                    return false;
                };
                if c.is_null() || v.is_null() {
                    return false;
                }
                let haystack = stringify_for_match(c);
                let needle = stringify_for_match(v);
                match self.operator {
                    FilterOperator::Contains => haystack.contains(&needle),
                    FilterOperator::StartsWith => haystack.starts_with(&needle),
                    FilterOperator::EndsWith => haystack.ends_with(&needle),
                    _ => unreachable!(),
                }
            }
            FilterOperator::Between => {
                let Some(c) = cell else { return false };
                if c.is_null() {
                    return false;
                }
                let Some(FilterValue::Pair(lo, hi)) = &self.value else {
                    return false;
                };
                matches!(c.safe_cmp(lo), Some(std::cmp::Ordering::Greater | std::cmp::Ordering::Equal))
                    && matches!(c.safe_cmp(hi), Some(std::cmp::Ordering::Less | std::cmp::Ordering::Equal))
            }
            FilterOperator::In => {
                let cell_value = cell.cloned().unwrap_or(ScalarValue::Null);
                let Some(items) = self.value.as_ref().and_then(FilterValue::as_list) else {
                    return false;
                };
                items.iter().any(|item| structural_eq(&cell_value, item))
            }
        }
    }

    fn scalar_value(&self) -> Option<&ScalarValue> {
        self.value.as_ref().and_then(FilterValue::as_scalar)
    }
}

fn structural_eq(a: &ScalarValue, b: &ScalarValue) -> bool {
    a == b
}

fn stringify_for_match(v: &ScalarValue) -> String {
    match v {
        ScalarValue::String(s) => s.clone(),
        other => other.stringify(),
    }
}

/// A recursive boolean tree of conditions and nested groups.
///
/// Invariants: an empty group (no conditions, no children) evaluates to `true`; the
/// `combinator` only matters once there is at least one child.
#[derive(Clone, Debug, PartialEq)]
pub struct FilterGroup {
    pub combinator: crate::value::FilterCombinator,
    pub negate: bool,
    pub conditions: Vec<FilterCondition>,
    pub groups: Vec<FilterGroup>,
}

impl FilterGroup {
    pub fn and(conditions: Vec<FilterCondition>) -> Self {
        FilterGroup {
            combinator: crate::value::FilterCombinator::And,
            negate: false,
            conditions,
            groups: Vec::new(),
        }
    }

    pub fn or(conditions: Vec<FilterCondition>) -> Self {
        FilterGroup {
            combinator: crate::value::FilterCombinator::Or,
            negate: false,
            conditions,
            groups: Vec::new(),
        }
    }

    pub fn empty() -> Self {
        FilterGroup::and(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty() && self.groups.is_empty()
    }

    pub fn negated(mut self) -> Self {
        self.negate = true;
        self
    }

    /// Evaluates this group (and its children, recursively) against one row.
    pub fn evaluate(&self, row: &Row) -> bool {
        let result = if self.is_empty() {
            true
        } else {
            let condition_results = self.conditions.iter().map(|c| c.evaluate(row));
            let group_results = self.groups.iter().map(|g| g.evaluate(row));
            let mut all_results = condition_results.chain(group_results);
            match self.combinator {
                crate::value::FilterCombinator::And => all_results.all(|r| r),
                crate::value::FilterCombinator::Or => all_results.any(|r| r),
            }
        };
        if self.negate {
            !result
        } else {
            result
        }
    }

    /// Returns every column name referenced anywhere in this tree, for pre-validation against
    /// a dataset's `get_columns()` before execution.
    pub fn referenced_columns(&self) -> Vec<&str> {
        let mut out: Vec<&str> = self.conditions.iter().map(|c| c.column.as_str()).collect();
        for group in &self.groups {
            out.extend(group.referenced_columns());
        }
        out
    }
}

impl Default for FilterGroup {
    fn default() -> Self {
        FilterGroup::empty()
    }
}

// --- JSON wire format -------------------------------------------------------------------
//
// `FilterGroup`/`FilterCondition` accept `"not"` as an alias for `negate` on both node types,
// and serialise back using `"not"`. This can't be expressed with a plain `#[serde(rename)]`
// because the Rust field is also named `negate` for readability in non-serde code, so both
// types get hand-written `Serialize`/`Deserialize` impls.

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireCondition {
    column: String,
    operator: FilterOperator,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<FilterValue>,
    #[serde(rename = "not", skip_serializing_if = "std::ops::Not::not", default)]
    not: bool,
}

impl Serialize for FilterCondition {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        WireCondition {
            column: self.column.clone(),
            operator: self.operator,
            value: self.value.clone(),
            not: self.negate,
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for FilterCondition {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let wire = WireCondition::deserialize(deserializer)?;
        Ok(FilterCondition {
            column: wire.column,
            operator: wire.operator,
            value: wire.value,
            negate: wire.not,
        })
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireGroup {
    combinator: crate::value::FilterCombinator,
    #[serde(rename = "not", skip_serializing_if = "std::ops::Not::not", default)]
    not: bool,
    #[serde(default)]
    conditions: Vec<FilterCondition>,
    #[serde(default)]
    groups: Vec<FilterGroup>,
}

impl Serialize for FilterGroup {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        WireGroup {
            combinator: self.combinator,
            not: self.negate,
            conditions: self.conditions.clone(),
            groups: self.groups.clone(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for FilterGroup {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let wire = WireGroup::deserialize(deserializer)?;
        Ok(FilterGroup {
            combinator: wire.combinator,
            negate: wire.not,
            conditions: wire.conditions,
            groups: wire.groups,
        })
    }
}

/// Validates that every column referenced by `group` resolves against `known_columns`,
/// returning `ColumnNotFound` (used by the SQL compiler; see [`crate::sql::filter_compiler`])
/// for the first one that doesn't.
pub fn validate_columns(group: &FilterGroup, known_columns: &[String]) -> Result<()> {
    for column in group.referenced_columns() {
        if !known_columns.iter().any(|c| c == column) {
            return Err(ErrorKind::ColumnNotFound
                .with_message(format!("unknown column in filter: {column}")));
        }
    }
    Ok(())
}

/// Helper for deserializing a `FilterGroup` from a JSON string, surfacing malformed shapes as
/// `FilterValidationError` per the error taxonomy rather than a raw serde error.
pub fn parse_filter_group(json: &str) -> Result<FilterGroup> {
    serde_json::from_str(json)
        .map_err(|e| ErrorKind::FilterValidationError.with_source(SerdeErrAdapter(e.to_string())))
}

#[derive(Debug)]
struct SerdeErrAdapter(String);

impl std::fmt::Display for SerdeErrAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for SerdeErrAdapter {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{FilterCombinator, Row};

    fn row(pairs: &[(&str, ScalarValue)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn empty_group_matches_all() {
        assert!(FilterGroup::empty().evaluate(&row(&[])));
    }

    #[test]
    fn eq_treats_absent_column_as_null() {
        let cond = FilterCondition::new("region", FilterOperator::Eq)
            .with_value(FilterValue::Scalar(ScalarValue::Null));
        assert!(cond.evaluate(&row(&[])));
    }

    #[test]
    fn comparison_with_null_is_false_not_error() {
        let cond = FilterCondition::new("amount", FilterOperator::Gt)
            .with_value(FilterValue::Scalar(ScalarValue::Number(10.0)));
        assert!(!cond.evaluate(&row(&[("amount", ScalarValue::Null)])));
    }

    #[test]
    fn between_with_inverted_bounds_matches_nothing() {
        let cond = FilterCondition::new("amount", FilterOperator::Between).with_value(
            FilterValue::Pair(ScalarValue::Number(100.0), ScalarValue::Number(10.0)),
        );
        assert!(!cond.evaluate(&row(&[("amount", ScalarValue::Number(50.0))])));
    }

    #[test]
    fn in_with_empty_collection_matches_nothing() {
        let cond =
            FilterCondition::new("region", FilterOperator::In).with_value(FilterValue::List(vec![]));
        assert!(!cond.evaluate(&row(&[("region", ScalarValue::String("N".into()))])));
    }

    #[test]
    fn negate_inverts_after_evaluation() {
        let cond = FilterCondition::new("region", FilterOperator::IsNull).negated();
        assert!(!cond.evaluate(&row(&[("region", ScalarValue::String("N".into()))])));
        assert!(cond.evaluate(&row(&[])));
    }

    #[test]
    fn or_group_matches_if_any_child_matches() {
        let group = FilterGroup::or(vec![
            FilterCondition::new("region", FilterOperator::Eq)
                .with_value(FilterValue::Scalar(ScalarValue::String("N".into()))),
            FilterCondition::new("region", FilterOperator::Eq)
                .with_value(FilterValue::Scalar(ScalarValue::String("S".into()))),
        ]);
        assert!(group.evaluate(&row(&[("region", ScalarValue::String("S".into()))])));
        assert!(!group.evaluate(&row(&[("region", ScalarValue::String("E".into()))])));
    }

    #[test]
    fn not_alias_round_trips_through_json() {
        let group = FilterGroup {
            combinator: FilterCombinator::And,
            negate: true,
            conditions: vec![FilterCondition::new("region", FilterOperator::IsNull)],
            groups: vec![],
        };
        let json = serde_json::to_string(&group).unwrap();
        assert!(json.contains("\"not\":true"));
        let parsed: FilterGroup = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, group);

        let aliased = r#"{"combinator":"and","not":true,"conditions":[{"column":"region","operator":"isNull","not":false}],"groups":[]}"#;
        let via_alias: FilterGroup = serde_json::from_str(aliased).unwrap();
        assert_eq!(via_alias, group);
    }

    #[test]
    fn validate_columns_rejects_unknown_name() {
        let group = FilterGroup::and(vec![FilterCondition::new(
            "nonexistent",
            FilterOperator::IsNull,
        )]);
        let err = validate_columns(&group, &["region".to_string()]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ColumnNotFound);
    }
}
