//! Pure SQL-text construction for the two-pass pivot compiler: combo discovery followed by
//! `CASE WHEN` measure expansion. Kept free of any database handle so the statement shapes
//! are unit-testable without a connection.

use crate::sql::filter_compiler::quote_identifier;
use crate::value::AggFunc;

/// Pass 1: `SELECT DISTINCT <pivot_cols> FROM (<selectable>) WHERE <filter> ORDER BY
/// <pivot_cols>`. The `ORDER BY` fixes a deterministic column layout for pass 2.
pub fn combo_discovery_sql(selectable: &str, pivot_cols: &[String], filter_sql: &str) -> String {
    let cols = pivot_cols.iter().map(|c| quote_identifier(c)).collect::<Vec<_>>().join(", ");
    format!(
        "SELECT DISTINCT {cols} FROM ({selectable}) AS pivot_source WHERE {filter_sql} ORDER BY {cols}"
    )
}

/// The `AGG(CASE WHEN ... THEN col END)` expression for one `(discovered tuple, value spec)`
/// pair, aliased to the pivot column key.
pub fn case_expr(pivot_cols: &[String], combo: &[String], agg: AggFunc, column: &str) -> String {
    let conditions: Vec<String> = pivot_cols
        .iter()
        .zip(combo.iter())
        .map(|(col, value)| format!("{} = '{}'", quote_identifier(col), escape_literal(value)))
        .collect();
    let when = conditions.join(" AND ");
    let case = format!("CASE WHEN {when} THEN {} END", quote_identifier(column));
    let key = pivot_key(combo, agg, column);
    format!("{} AS {}", agg_sql(agg, &case), quote_identifier(&key))
}

/// The stable, `_`-joined machine key for one pivot column: `join(combo ++ [agg, column],
/// "_")`. Treated as opaque by callers; see [`crate::value::AggregateColumn`].
pub fn pivot_key(combo: &[String], agg: AggFunc, column: &str) -> String {
    let mut parts = combo.to_vec();
    parts.push(agg.token().to_string());
    parts.push(column.to_string());
    parts.join("_")
}

/// Maps an [`AggFunc`] to the SQL aggregate wrapping its expression.
///
/// `FIRST`/`LAST` are approximated by `MIN`/`MAX` — this is a documented infidelity, not a
/// bug: standard `SELECT/GROUP BY` has no portable "first row in group" aggregate without a
/// dialect-specific window function, and introducing one would make the result
/// order-dependent in a way the rest of this compiler deliberately avoids.
pub fn agg_sql(agg: AggFunc, expr: &str) -> String {
    match agg {
        AggFunc::Sum => format!("SUM({expr})"),
        AggFunc::Avg => format!("AVG({expr})"),
        AggFunc::Min | AggFunc::First => format!("MIN({expr})"),
        AggFunc::Max | AggFunc::Last => format!("MAX({expr})"),
        AggFunc::Count => format!("COUNT({expr})"),
        AggFunc::DistinctCount => format!("COUNT(DISTINCT {expr})"),
    }
}

fn escape_literal(value: &str) -> String {
    value.replace('\'', "''")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combo_discovery_orders_by_pivot_columns() {
        let sql = combo_discovery_sql("orders", &["product".to_string()], "TRUE");
        assert!(sql.starts_with("SELECT DISTINCT \"product\""));
        assert!(sql.ends_with("ORDER BY \"product\""));
    }

    #[test]
    fn case_expr_builds_key_and_wraps_agg() {
        let expr = case_expr(&["product".to_string()], &["Widget".to_string()], AggFunc::Sum, "amount");
        assert!(expr.contains("CASE WHEN \"product\" = 'Widget' THEN \"amount\" END"));
        assert!(expr.starts_with("SUM("));
        assert!(expr.ends_with("AS \"Widget_sum_amount\""));
    }

    #[test]
    fn first_and_last_approximate_with_min_max() {
        assert_eq!(agg_sql(AggFunc::First, "x"), "MIN(x)");
        assert_eq!(agg_sql(AggFunc::Last, "x"), "MAX(x)");
    }

    #[test]
    fn literal_quotes_are_escaped() {
        let expr = case_expr(&["name".to_string()], &["O'Brien".to_string()], AggFunc::Count, "id");
        assert!(expr.contains("'O''Brien'"));
    }
}
