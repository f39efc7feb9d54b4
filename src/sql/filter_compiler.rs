//! Compiles a [`FilterGroup`] to a parameterised SQL `WHERE` fragment.
//!
//! This is the SQL-side twin of [`crate::filter::FilterGroup::evaluate`]; the two must agree
//! on which rows match (see `tests/filter_equivalence.rs`, invariant U1).

use rusqlite::types::Value as SqlValue;

use crate::filter::{FilterCondition, FilterGroup};
use crate::value::{FilterOperator, FilterValue, ScalarValue};
use crate::{ErrorKind, Result};

/// A compiled fragment: SQL text with `?` placeholders plus the parameters to bind, in order.
#[derive(Debug)]
pub struct CompiledFilter {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

/// Compiles `group` to a boolean SQL expression, validating that every referenced column is
/// in `known_columns` first.
///
/// Per the filter tree's SQL-compiler contract, an unknown column here is reported as
/// `FilterValidationError` (not `ColumnNotFound` as used elsewhere) — the source of truth for
/// this distinction is the compiler's own documented failure mode, not the general
/// column-reference check used by provider `query`/`aggregate` parameter validation.
pub fn compile_filter_group(group: &FilterGroup, known_columns: &[String]) -> Result<CompiledFilter> {
    for column in group.referenced_columns() {
        if !known_columns.iter().any(|c| c == column) {
            return Err(ErrorKind::FilterValidationError
                .with_message(format!("unknown column in filter: {column}")));
        }
    }

    if group.is_empty() {
        return Ok(CompiledFilter {
            sql: "TRUE".to_string(),
            params: Vec::new(),
        });
    }

    let mut params = Vec::new();
    let sql = compile_group(group, &mut params);
    Ok(CompiledFilter { sql, params })
}

fn compile_group(group: &FilterGroup, params: &mut Vec<SqlValue>) -> String {
    if group.is_empty() {
        return wrap_negate("TRUE".to_string(), group.negate);
    }

    let joiner = match group.combinator {
        crate::value::FilterCombinator::And => " AND ",
        crate::value::FilterCombinator::Or => " OR ",
    };

    let mut parts: Vec<String> = group
        .conditions
        .iter()
        .map(|c| compile_condition(c, params))
        .collect();
    parts.extend(group.groups.iter().map(|g| format!("({})", compile_group(g, params))));

    let joined = parts.join(joiner);
    wrap_negate(joined, group.negate)
}

fn wrap_negate(sql: String, negate: bool) -> String {
    if negate {
        format!("NOT ({sql})")
    } else {
        sql
    }
}

fn compile_condition(condition: &FilterCondition, params: &mut Vec<SqlValue>) -> String {
    let column = quote_identifier(&condition.column);
    let sql = match condition.operator {
        FilterOperator::IsNull => format!("{column} IS NULL"),
        FilterOperator::IsNotNull => format!("{column} IS NOT NULL"),
        // `= NULL`/`!= NULL` are always unknown in SQL, never true, so an explicit null
        // comparison target has to compile to `IS [NOT] NULL` to match the row evaluator's
        // treatment of an absent/null column as equal to a null filter value. A condition
        // with no scalar payload at all (missing, or a `Pair`/`List` mismatched to the
        // operator) never matches in the row evaluator regardless of the cell, and its `Neq`
        // counterpart always matches — mirrored here rather than pushed through `= ?`.
        FilterOperator::Eq => match scalar_arg(condition.value.as_ref()) {
            None => "FALSE".to_string(),
            Some(ScalarValue::Null) => format!("{column} IS NULL"),
            Some(_) => {
                push_scalar(params, condition.value.as_ref());
                format!("{column} = ?")
            }
        },
        FilterOperator::Neq => match scalar_arg(condition.value.as_ref()) {
            None => "TRUE".to_string(),
            Some(ScalarValue::Null) => format!("{column} IS NOT NULL"),
            Some(_) => {
                push_scalar(params, condition.value.as_ref());
                format!("{column} != ?")
            }
        },
        FilterOperator::Gt => {
            push_scalar(params, condition.value.as_ref());
            format!("{column} > ?")
        }
        FilterOperator::Lt => {
            push_scalar(params, condition.value.as_ref());
            format!("{column} < ?")
        }
        FilterOperator::Gte => {
            push_scalar(params, condition.value.as_ref());
            format!("{column} >= ?")
        }
        FilterOperator::Lte => {
            push_scalar(params, condition.value.as_ref());
            format!("{column} <= ?")
        }
        FilterOperator::Contains if is_null_or_missing_scalar(condition.value.as_ref()) => "FALSE".to_string(),
        FilterOperator::StartsWith if is_null_or_missing_scalar(condition.value.as_ref()) => "FALSE".to_string(),
        FilterOperator::EndsWith if is_null_or_missing_scalar(condition.value.as_ref()) => "FALSE".to_string(),
        FilterOperator::Contains => {
            push_like(params, condition.value.as_ref(), "%{}%");
            format!("{column} LIKE ?")
        }
        FilterOperator::StartsWith => {
            push_like(params, condition.value.as_ref(), "{}%");
            format!("{column} LIKE ?")
        }
        FilterOperator::EndsWith => {
            push_like(params, condition.value.as_ref(), "%{}");
            format!("{column} LIKE ?")
        }
        FilterOperator::Between => match condition.value.as_ref().and_then(FilterValue::as_pair) {
            Some((lo, hi)) => {
                params.push(to_sql_value(lo));
                params.push(to_sql_value(hi));
                format!("{column} BETWEEN ? AND ?")
            }
            None => "TRUE".to_string(),
        },
        FilterOperator::In => match condition.value.as_ref().and_then(FilterValue::as_list) {
            Some(items) if !items.is_empty() => {
                let placeholders = vec!["?"; items.len()].join(", ");
                for item in items {
                    params.push(to_sql_value(item));
                }
                format!("{column} IN ({placeholders})")
            }
            // Empty IN-list matches nothing, mirroring the row evaluator.
            _ => "FALSE".to_string(),
        },
    };
    wrap_negate(sql, condition.negate)
}

fn scalar_arg(value: Option<&FilterValue>) -> Option<&ScalarValue> {
    value.and_then(FilterValue::as_scalar)
}

fn is_null_or_missing_scalar(value: Option<&FilterValue>) -> bool {
    matches!(scalar_arg(value), None | Some(ScalarValue::Null))
}

fn push_scalar(params: &mut Vec<SqlValue>, value: Option<&FilterValue>) {
    let scalar = value.and_then(FilterValue::as_scalar).cloned().unwrap_or(ScalarValue::Null);
    params.push(to_sql_value(&scalar));
}

fn push_like(params: &mut Vec<SqlValue>, value: Option<&FilterValue>, pattern: &str) {
    let scalar = value.and_then(FilterValue::as_scalar);
    let text = scalar.and_then(ScalarValue::as_str).unwrap_or_default();
    params.push(SqlValue::Text(pattern.replace("{}", text)));
}

fn to_sql_value(value: &ScalarValue) -> SqlValue {
    match value {
        ScalarValue::Null => SqlValue::Null,
        ScalarValue::Bool(b) => SqlValue::Integer(if *b { 1 } else { 0 }),
        ScalarValue::Number(n) => SqlValue::Real(*n),
        ScalarValue::String(s) => SqlValue::Text(s.clone()),
    }
}

/// A conservative identifier quoting helper: double-quotes the identifier and escapes any
/// embedded quote, since column names come from registered [`crate::value::ColumnMeta`]
/// rather than arbitrary request input, but defence in depth costs nothing here.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FilterCondition;

    fn cols() -> Vec<String> {
        vec!["region".into(), "amount".into()]
    }

    #[test]
    fn empty_group_compiles_to_true() {
        let compiled = compile_filter_group(&FilterGroup::empty(), &cols()).unwrap();
        assert_eq!(compiled.sql, "TRUE");
        assert!(compiled.params.is_empty());
    }

    #[test]
    fn unknown_column_is_filter_validation_error() {
        let group = FilterGroup::and(vec![FilterCondition::new("nope", FilterOperator::IsNull)]);
        let err = compile_filter_group(&group, &cols()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FilterValidationError);
    }

    #[test]
    fn between_renders_placeholders() {
        let group = FilterGroup::and(vec![FilterCondition::new("amount", FilterOperator::Between)
            .with_value(FilterValue::Pair(ScalarValue::Number(1.0), ScalarValue::Number(2.0)))]);
        let compiled = compile_filter_group(&group, &cols()).unwrap();
        assert!(compiled.sql.contains("BETWEEN ? AND ?"));
        assert_eq!(compiled.params.len(), 2);
    }

    #[test]
    fn in_renders_one_placeholder_per_item() {
        let group = FilterGroup::and(vec![FilterCondition::new("region", FilterOperator::In)
            .with_value(FilterValue::List(vec![
                ScalarValue::String("N".into()),
                ScalarValue::String("S".into()),
            ]))]);
        let compiled = compile_filter_group(&group, &cols()).unwrap();
        assert!(compiled.sql.contains("IN (?, ?)"));
        assert_eq!(compiled.params.len(), 2);
    }

    #[test]
    fn empty_in_list_compiles_to_false() {
        let group = FilterGroup::and(vec![
            FilterCondition::new("region", FilterOperator::In).with_value(FilterValue::List(vec![])),
        ]);
        let compiled = compile_filter_group(&group, &cols()).unwrap();
        assert!(compiled.sql.contains("FALSE"));
    }

    #[test]
    fn eq_null_compiles_to_is_null_not_equals_null() {
        let group = FilterGroup::and(vec![FilterCondition::new("region", FilterOperator::Eq)
            .with_value(FilterValue::Scalar(ScalarValue::Null))]);
        let compiled = compile_filter_group(&group, &cols()).unwrap();
        assert_eq!(compiled.sql, "\"region\" IS NULL");
        assert!(compiled.params.is_empty());
    }

    #[test]
    fn neq_null_compiles_to_is_not_null() {
        let group = FilterGroup::and(vec![FilterCondition::new("region", FilterOperator::Neq)
            .with_value(FilterValue::Scalar(ScalarValue::Null))]);
        let compiled = compile_filter_group(&group, &cols()).unwrap();
        assert_eq!(compiled.sql, "\"region\" IS NOT NULL");
    }

    #[test]
    fn negate_wraps_in_not() {
        let group = FilterGroup::and(vec![FilterCondition::new("region", FilterOperator::IsNull).negated()]);
        let compiled = compile_filter_group(&group, &cols()).unwrap();
        assert!(compiled.sql.starts_with("NOT ("));
    }
}
