//! Shapes `query`/`aggregate` results into a `(headers, rows, filename)` triple ready for a
//! renderer to encode as CSV, XLSX, or whatever else a caller wants. Byte-level encoding is
//! explicitly out of scope here; this module stops at a flat, already-ordered table.

use crate::context::RequestContext;
use crate::provider::{AggregateRequest, DataProvider, QueryRequest};
use crate::value::ScalarValue;
use crate::Result;

/// A shaped export: column headers in display order, one `Vec<ScalarValue>` per row in the
/// same order as `headers`, and a suggested filename.
#[derive(Clone, Debug, PartialEq)]
pub struct ExportSheet {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<ScalarValue>>,
    pub filename: String,
}

/// Exports a flat, unaggregated view: runs `query` with no limit and renders straight through,
/// using each column's `ColumnMeta.label` as its header.
pub fn export_flat(
    provider: &dyn DataProvider,
    request: QueryRequest,
    ctx: Option<&RequestContext>,
) -> Result<ExportSheet> {
    let request = request.unlimited();
    let selected = request.selected_columns.clone();
    let labels = column_labels(provider)?;
    let result = provider.query(&request, ctx)?;

    let headers = selected
        .iter()
        .map(|name| labels.get(name).cloned().unwrap_or_else(|| name.clone()))
        .collect();
    let rows = result
        .rows
        .into_iter()
        .map(|row| {
            selected
                .iter()
                .map(|name| row.get(name).cloned().unwrap_or(ScalarValue::Null))
                .collect()
        })
        .collect();

    Ok(ExportSheet {
        headers,
        rows,
        filename: format!("{}.csv", provider.key()),
    })
}

/// Exports a grouped or pivoted view: runs `aggregate` with no limit and re-keys each row from
/// its machine key (e.g. `"Widget_sum_amount"`) to the column's display header (e.g.
/// `"Widget (sum)"`), in the same order the aggregate reported its columns.
pub fn export_pivot(
    provider: &dyn DataProvider,
    request: AggregateRequest,
    ctx: Option<&RequestContext>,
) -> Result<ExportSheet> {
    let request = AggregateRequest { limit: None, ..request };
    let result = provider.aggregate(&request, ctx)?;

    let headers: Vec<String> = result.columns.iter().map(|c| c.header.clone()).collect();
    let rows = result
        .rows
        .into_iter()
        .map(|row| {
            result
                .columns
                .iter()
                .map(|c| row.get(&c.key).cloned().unwrap_or(ScalarValue::Null))
                .collect()
        })
        .collect();

    Ok(ExportSheet {
        headers,
        rows,
        filename: format!("{}-pivot.csv", provider.key()),
    })
}

fn column_labels(provider: &dyn DataProvider) -> Result<std::collections::BTreeMap<String, String>> {
    Ok(provider
        .get_columns()?
        .into_iter()
        .map(|c| (c.name, c.label))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FilterGroup;
    use crate::memory::MemoryProvider;
    use crate::value::{AggFunc, ColumnMeta, ColumnType, PivotRole, Row, ValueSpec};

    fn seed() -> MemoryProvider {
        let columns = vec![
            ColumnMeta::new("region", "Region", ColumnType::String).with_pivot(PivotRole::dimension()),
            ColumnMeta::new("product", "Product", ColumnType::String).with_pivot(PivotRole::dimension()),
            ColumnMeta::new("amount", "Amount", ColumnType::Currency)
                .with_pivot(PivotRole::measure(vec![AggFunc::Sum])),
        ];
        let row = |region: &str, product: &str, amount: f64| -> Row {
            [
                ("region".to_string(), ScalarValue::String(region.into())),
                ("product".to_string(), ScalarValue::String(product.into())),
                ("amount".to_string(), ScalarValue::Number(amount)),
            ]
            .into_iter()
            .collect()
        };
        let rows = vec![
            row("North", "Widget", 100.0),
            row("North", "Gadget", 200.0),
            row("South", "Widget", 150.0),
        ];
        MemoryProvider::new("sales", "Sales", columns, rows)
    }

    #[test]
    fn flat_export_uses_column_labels_as_headers() {
        let provider = seed();
        let request = QueryRequest::new(vec!["region".into(), "amount".into()]).with_limit(1);
        let sheet = export_flat(&provider, request, None).unwrap();
        assert_eq!(sheet.headers, vec!["Region".to_string(), "Amount".to_string()]);
        assert_eq!(sheet.rows.len(), 3, "unlimited() should override the caller's limit");
        assert_eq!(sheet.filename, "sales.csv");
    }

    #[test]
    fn flat_export_honours_a_filter() {
        let provider = seed();
        let request = QueryRequest::new(vec!["region".into()]).with_filter(FilterGroup::and(vec![
            crate::filter::FilterCondition::new("region", crate::value::FilterOperator::Eq)
                .with_value(crate::value::FilterValue::Scalar(ScalarValue::String("North".into()))),
        ]));
        let sheet = export_flat(&provider, request, None).unwrap();
        assert_eq!(sheet.rows.len(), 2);
    }

    #[test]
    fn pivot_export_rekeys_machine_keys_to_display_headers() {
        let provider = seed();
        let request = AggregateRequest::new(
            vec!["region".into()],
            vec![ValueSpec {
                column: "amount".into(),
                agg: AggFunc::Sum,
                label: None,
            }],
        )
        .with_pivot(vec!["product".into()]);
        let sheet = export_pivot(&provider, request, None).unwrap();
        assert!(sheet.headers.contains(&"region".to_string()));
        assert!(sheet.headers.iter().any(|h| h.contains("Widget") && h.contains("sum")));
        assert_eq!(sheet.filename, "sales-pivot.csv");

        let north_idx = sheet
            .headers
            .iter()
            .position(|h| h == "region")
            .unwrap();
        let north_row = sheet
            .rows
            .iter()
            .find(|r| r[north_idx] == ScalarValue::String("North".into()))
            .unwrap();
        let widget_idx = sheet.headers.iter().position(|h| h.contains("Widget")).unwrap();
        assert_eq!(north_row[widget_idx], ScalarValue::Number(100.0));
    }
}
