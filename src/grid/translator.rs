//! Drives one `getRows` request end to end: resolves the effective filter (drill-down plus
//! whatever filter the grid sent), decides whether this is an intermediate group level, a
//! pivoted leaf, or a flat leaf, dispatches to the provider, and shapes the response.

use crate::context::RequestContext;
use crate::filter::FilterGroup;
use crate::grid::ag_filter::parse_ag_grid_filter_model;
use crate::grid::request::{ColumnVo, ServerSideGetRowsRequest, ServerSideGetRowsResponse, SortModelItem};
use crate::provider::{AggregateRequest, DataProvider, QueryRequest};
use crate::value::{AggFunc, FilterOperator, FilterValue, SortDirection, SortSpec, ValueSpec};
use crate::{ErrorKind, Result};

/// Resolves the request body and a provider into a shaped response.
///
/// The row axis and the column (pivot) axis are decided independently, then combined into at
/// most one `aggregate` call:
///
/// * Row axis: `groupKeys.len() < rowGroupCols.len()` means the grid hasn't drilled all the
///   way down yet, so the next row-group dimension is grouped on.
/// * Column axis: `pivotMode` with non-empty `pivotCols` means the request pivots, so those
///   columns are grouped on as pivot dimensions.
///
/// Either axis, both, or neither can be active: a non-leaf request while pivoted aggregates by
/// the next row dimension *and* the pivot columns in one call, matching the drill-down and
/// pivot-at-the-same-time case the grid can send. Only when both axes are empty does the
/// request fall through to a flat `query` over the value columns.
pub fn handle_get_rows(
    provider: &dyn DataProvider,
    request: &ServerSideGetRowsRequest,
    ctx: Option<&RequestContext>,
) -> Result<ServerSideGetRowsResponse> {
    let filter = resolve_filter(request)?;
    let depth = request.group_keys.len();
    let total_row_group_levels = request.row_group_cols.len();

    let row_dims: Vec<String> = if depth < total_row_group_levels {
        vec![request.row_group_cols[depth].field().to_string()]
    } else {
        Vec::new()
    };
    let pivoting = request.pivot_mode && !request.pivot_cols.is_empty();
    let col_dims: Vec<String> = if pivoting {
        request.pivot_cols.iter().map(|c| c.field().to_string()).collect()
    } else {
        Vec::new()
    };

    if !row_dims.is_empty() || !col_dims.is_empty() {
        let mut agg_request = AggregateRequest::new(row_dims, value_specs(&request.value_cols)?)
            .with_filter(filter)
            .with_sort(translate_sort(&request.sort_model))
            .with_limit(page_size(request))
            .with_offset(request.start_row);
        if !col_dims.is_empty() {
            agg_request = agg_request.with_pivot(col_dims);
        }
        let result = provider.aggregate(&agg_request, ctx)?;

        let (pivot_result_fields, secondary_col_defs) = if pivoting {
            let pivot_columns: Vec<_> =
                result.columns.iter().filter(|c| !c.pivot_keys.is_empty()).cloned().collect();
            (Some(pivot_columns.iter().map(|c| c.key.clone()).collect()), Some(pivot_columns))
        } else {
            (None, None)
        };
        return Ok(ServerSideGetRowsResponse {
            row_data: result.rows,
            row_count: result.total,
            pivot_result_fields,
            secondary_col_defs,
        });
    }

    let selected_columns: Vec<String> = request.value_cols.iter().map(|c| c.field().to_string()).collect();
    let selected_columns = if selected_columns.is_empty() {
        provider.get_columns()?.into_iter().map(|c| c.name).collect()
    } else {
        selected_columns
    };
    let result = provider.query(
        &QueryRequest::new(selected_columns)
            .with_filter(filter)
            .with_sort(translate_sort(&request.sort_model))
            .with_limit(page_size(request))
            .with_offset(request.start_row),
        ctx,
    )?;
    Ok(ServerSideGetRowsResponse {
        row_data: result.rows,
        row_count: result.total,
        pivot_result_fields: None,
        secondary_col_defs: None,
    })
}

fn page_size(request: &ServerSideGetRowsRequest) -> usize {
    request.end_row.saturating_sub(request.start_row)
}

fn value_specs(value_cols: &[ColumnVo]) -> Result<Vec<ValueSpec>> {
    value_cols
        .iter()
        .map(|col| {
            let agg = parse_agg_func(col.agg_func.as_deref().unwrap_or("sum"))?;
            Ok(ValueSpec {
                column: col.field().to_string(),
                agg,
                label: Some(col.display_name.clone()),
            })
        })
        .collect()
}

fn parse_agg_func(token: &str) -> Result<AggFunc> {
    serde_json::from_value(serde_json::Value::String(token.to_string()))
        .map_err(|_| ErrorKind::AggregationNotSupported.with_message(format!("unknown aggFunc: {token}")))
}

fn translate_sort(sort_model: &[SortModelItem]) -> Vec<SortSpec> {
    sort_model
        .iter()
        .map(|item| SortSpec {
            column: item.col_id.clone(),
            direction: if item.sort.eq_ignore_ascii_case("desc") {
                SortDirection::Desc
            } else {
                SortDirection::Asc
            },
        })
        .collect()
}

/// Combines whatever filter the request carries (a rich [`FilterGroup`] takes precedence over
/// an AG Grid `filterModel`) with drill-down equality conditions derived from `groupKeys`.
fn resolve_filter(request: &ServerSideGetRowsRequest) -> Result<FilterGroup> {
    let base = if let Some(filter) = &request.filter {
        filter.clone()
    } else if let Some(model) = &request.filter_model {
        parse_ag_grid_filter_model(model)?
    } else {
        FilterGroup::empty()
    };

    let drilldown: Vec<_> = request
        .group_keys
        .iter()
        .zip(request.row_group_cols.iter())
        .map(|(key, col)| {
            crate::filter::FilterCondition::new(col.field(), FilterOperator::Eq)
                .with_value(FilterValue::Scalar(key.clone()))
        })
        .collect();

    if drilldown.is_empty() {
        return Ok(base);
    }
    if base.is_empty() {
        return Ok(FilterGroup::and(drilldown));
    }
    Ok(FilterGroup {
        combinator: crate::value::FilterCombinator::And,
        negate: false,
        conditions: Vec::new(),
        groups: vec![base, FilterGroup::and(drilldown)],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryProvider;
    use crate::value::{ColumnMeta, ColumnType, PivotRole, Row, ScalarValue};
    use std::sync::Arc;

    fn seed() -> Arc<dyn DataProvider> {
        let columns = vec![
            ColumnMeta::new("region", "Region", ColumnType::String).with_pivot(PivotRole::dimension()),
            ColumnMeta::new("product", "Product", ColumnType::String).with_pivot(PivotRole::dimension()),
            ColumnMeta::new("amount", "Amount", ColumnType::Number)
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
            row("North", "Widget", 120.0),
            row("North", "Gadget", 200.0),
            row("South", "Widget", 150.0),
        ];
        Arc::new(MemoryProvider::new("sales", "Sales", columns, rows))
    }

    fn column_vo(id: &str, agg: Option<&str>) -> ColumnVo {
        ColumnVo {
            id: id.to_string(),
            display_name: id.to_string(),
            field: Some(id.to_string()),
            agg_func: agg.map(str::to_string),
        }
    }

    #[test]
    fn top_level_group_aggregates_by_first_row_group_col() {
        let provider = seed();
        let request = ServerSideGetRowsRequest {
            start_row: 0,
            end_row: 100,
            row_group_cols: vec![column_vo("region", None)],
            value_cols: vec![column_vo("amount", Some("sum"))],
            ..Default::default()
        };
        let response = handle_get_rows(provider.as_ref(), &request, None).unwrap();
        assert_eq!(response.row_count, 2);
        assert!(response.pivot_result_fields.is_none());
    }

    #[test]
    fn drill_down_into_group_filters_by_group_keys() {
        let provider = seed();
        let request = ServerSideGetRowsRequest {
            start_row: 0,
            end_row: 100,
            row_group_cols: vec![column_vo("region", None)],
            group_keys: vec![ScalarValue::String("North".into())],
            value_cols: vec![column_vo("amount", Some("sum")), column_vo("product", None)],
            ..Default::default()
        };
        let response = handle_get_rows(provider.as_ref(), &request, None).unwrap();
        assert_eq!(response.row_count, 3);
        assert!(response
            .row_data
            .iter()
            .all(|row| row.get("region") == Some(&ScalarValue::String("North".into()))));
    }

    #[test]
    fn pivot_mode_at_leaf_produces_pivot_result_fields() {
        let provider = seed();
        let request = ServerSideGetRowsRequest {
            start_row: 0,
            end_row: 100,
            row_group_cols: vec![],
            pivot_cols: vec![column_vo("product", None)],
            pivot_mode: true,
            value_cols: vec![column_vo("amount", Some("sum"))],
            ..Default::default()
        };
        let response = handle_get_rows(provider.as_ref(), &request, None).unwrap();
        assert!(response.pivot_result_fields.is_some());
        assert_eq!(response.row_data.len(), 1);
    }

    #[test]
    fn non_leaf_group_level_still_pivots_when_pivot_mode_is_on() {
        let provider = seed();
        let request = ServerSideGetRowsRequest {
            start_row: 0,
            end_row: 100,
            row_group_cols: vec![column_vo("region", None)],
            pivot_cols: vec![column_vo("product", None)],
            pivot_mode: true,
            value_cols: vec![column_vo("amount", Some("sum"))],
            ..Default::default()
        };
        let response = handle_get_rows(provider.as_ref(), &request, None).unwrap();
        assert!(response.pivot_result_fields.is_some());
        assert_eq!(response.row_data.len(), 2);
        assert!(response
            .row_data
            .iter()
            .any(|row| row.get("Widget_sum_amount").is_some()));
        assert!(response.row_data.iter().all(|row| row.get("region").is_some()));
    }
}
