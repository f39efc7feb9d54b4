//! Shared fixture data (C10): the same small sales dataset used by the in-memory provider's
//! tests, the SQL provider's tests, and the cross-checking integration tests, so all three
//! exercise identical rows rather than three independently-typed copies that could drift.

use crate::value::{AggFunc, ColumnMeta, ColumnType, PivotRole, Row, ScalarValue};

/// Column metadata for the `sales` fixture: `year`, `region`, `product` dimensions and an
/// `amount`/`quantity` pair of measures.
pub fn sales_columns() -> Vec<ColumnMeta> {
    vec![
        ColumnMeta::new("year", "Year", ColumnType::Number).with_pivot(PivotRole::dimension()),
        ColumnMeta::new("region", "Region", ColumnType::String).with_pivot(PivotRole::dimension()),
        ColumnMeta::new("product", "Product", ColumnType::String).with_pivot(PivotRole::dimension()),
        ColumnMeta::new("amount", "Amount", ColumnType::Currency)
            .with_pivot(PivotRole::measure(vec![AggFunc::Sum, AggFunc::Avg, AggFunc::Min, AggFunc::Max])),
        ColumnMeta::new("quantity", "Quantity", ColumnType::Number)
            .with_pivot(PivotRole::measure(vec![AggFunc::Sum, AggFunc::Count, AggFunc::DistinctCount])),
    ]
}

/// Eight rows spanning two years, two regions, and two products: enough to exercise a 2x2
/// pivot, multi-year drill-down, and region/product grouping without a combinatorial fixture.
pub fn sales_rows() -> Vec<Row> {
    let data: &[(i32, &str, &str, f64, f64)] = &[
        (2023, "North", "Widget", 100.0, 10.0),
        (2023, "North", "Gadget", 200.0, 5.0),
        (2023, "South", "Widget", 150.0, 8.0),
        (2023, "South", "Gadget", 250.0, 12.0),
        (2024, "North", "Widget", 120.0, 11.0),
        (2024, "North", "Gadget", 220.0, 6.0),
        (2024, "South", "Widget", 170.0, 9.0),
        (2024, "South", "Gadget", 270.0, 14.0),
    ];
    data.iter()
        .map(|(year, region, product, amount, quantity)| {
            let mut row = Row::new();
            row.insert("year".into(), ScalarValue::Number(*year as f64));
            row.insert("region".into(), ScalarValue::String((*region).into()));
            row.insert("product".into(), ScalarValue::String((*product).into()));
            row.insert("amount".into(), ScalarValue::Number(*amount));
            row.insert("quantity".into(), ScalarValue::Number(*quantity));
            row
        })
        .collect()
}

/// The same fixture expressed as `CREATE TABLE`/`INSERT` statements, for seeding an in-memory
/// SQL connection with identical data.
pub fn sales_sql_schema() -> &'static str {
    "CREATE TABLE sales (year INTEGER, region TEXT, product TEXT, amount REAL, quantity INTEGER);
     INSERT INTO sales VALUES
        (2023,'North','Widget',100,10),
        (2023,'North','Gadget',200,5),
        (2023,'South','Widget',150,8),
        (2023,'South','Gadget',250,12),
        (2024,'North','Widget',120,11),
        (2024,'North','Gadget',220,6),
        (2024,'South','Widget',170,9),
        (2024,'South','Gadget',270,14);"
}

/// A secondary fixture of unordered order-line rows, useful for exercising `FIRST`/`LAST`
/// (which are position-sensitive) and multi-column sort together with a `DISTINCT_COUNT` over
/// a repeating `customer` column.
pub fn order_lines_columns() -> Vec<ColumnMeta> {
    vec![
        ColumnMeta::new("order_id", "Order Id", ColumnType::Number),
        ColumnMeta::new("customer", "Customer", ColumnType::String)
            .with_pivot(PivotRole::measure(vec![AggFunc::DistinctCount, AggFunc::First, AggFunc::Last])),
        ColumnMeta::new("line_total", "Line Total", ColumnType::Currency)
            .with_pivot(PivotRole::measure(vec![AggFunc::Sum])),
    ]
}

pub fn order_lines_rows() -> Vec<Row> {
    let data: &[(i32, &str, f64)] = &[
        (1, "Acme", 40.0),
        (1, "Acme", 15.0),
        (2, "Globex", 22.5),
        (3, "Acme", 5.0),
        (2, "Initech", 60.0),
    ];
    data.iter()
        .map(|(order_id, customer, line_total)| {
            let mut row = Row::new();
            row.insert("order_id".into(), ScalarValue::Number(*order_id as f64));
            row.insert("customer".into(), ScalarValue::String((*customer).into()));
            row.insert("line_total".into(), ScalarValue::Number(*line_total));
            row
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sales_rows_and_columns_agree_on_field_names() {
        let columns: Vec<String> = sales_columns().into_iter().map(|c| c.name).collect();
        for row in sales_rows() {
            for key in row.keys() {
                assert!(columns.contains(key), "row has undeclared column {key}");
            }
        }
    }

    #[test]
    fn order_lines_rows_and_columns_agree_on_field_names() {
        let columns: Vec<String> = order_lines_columns().into_iter().map(|c| c.name).collect();
        for row in order_lines_rows() {
            for key in row.keys() {
                assert!(columns.contains(key), "row has undeclared column {key}");
            }
        }
    }
}
