//! The in-memory reference [`DataProvider`]: a provider over a fixed sequence of row records,
//! used both as a teaching example and as the cross-check partner for the SQL provider's
//! filter and pivot semantics (see `tests/filter_equivalence.rs`).

use std::collections::HashSet;

use tracing::debug;

use crate::context::RequestContext;
use crate::filter::FilterGroup;
use crate::provider::{AggregateRequest, DataProvider, QueryRequest};
use crate::value::{
    AggFunc, AggregateColumn, AggregateResult, ColumnMeta, DatasetCapabilities, Row, ScalarValue,
    SortDirection, SortSpec, TabularResult, ValueSpec,
};
use crate::{ErrorKind, Result};

/// A dataset backed by a `Vec<Row>` held entirely in memory.
pub struct MemoryProvider {
    key: String,
    label: String,
    description: String,
    columns: Vec<ColumnMeta>,
    rows: Vec<Row>,
    capabilities: DatasetCapabilities,
}

impl MemoryProvider {
    pub fn new(key: impl Into<String>, label: impl Into<String>, columns: Vec<ColumnMeta>, rows: Vec<Row>) -> Self {
        MemoryProvider {
            key: key.into(),
            label: label.into(),
            description: String::new(),
            columns,
            rows,
            capabilities: DatasetCapabilities { pivot: true },
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    fn require_columns(&self, names: &[String]) -> Result<()> {
        let known = self.column_names();
        for name in names {
            if !known.iter().any(|c| c == name) {
                return Err(crate::Error::unknown_column(name));
            }
        }
        Ok(())
    }

    fn filtered_rows<'a>(&'a self, filter: Option<&FilterGroup>) -> Vec<&'a Row> {
        match filter {
            Some(group) if !group.is_empty() => {
                self.rows.iter().filter(|row| group.evaluate(row)).collect()
            }
            _ => self.rows.iter().collect(),
        }
    }
}

/// Stable multi-key sort applied in reverse list order so the first [`SortSpec`] ends up the
/// primary key; null last ascending, null first descending.
pub fn sort_rows(rows: &mut [&Row], sort: &[SortSpec]) {
    for spec in sort.iter().rev() {
        rows.sort_by(|a, b| compare_by_spec(a, b, spec));
    }
}

fn compare_by_spec(a: &Row, b: &Row, spec: &SortSpec) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    let av = a.get(&spec.column);
    let bv = b.get(&spec.column);
    let a_null = av.map(ScalarValue::is_null).unwrap_or(true);
    let b_null = bv.map(ScalarValue::is_null).unwrap_or(true);

    let ordering = match (a_null, b_null) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => av
            .unwrap()
            .safe_cmp(bv.unwrap())
            .unwrap_or(Ordering::Equal),
    };

    match spec.direction {
        SortDirection::Asc => ordering,
        // Null-first on descending: flip the non-null ordering but keep nulls sorting first.
        SortDirection::Desc => match (a_null, b_null) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => ordering.reverse(),
        },
    }
}

impl DataProvider for MemoryProvider {
    fn key(&self) -> &str {
        &self.key
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn capabilities(&self) -> DatasetCapabilities {
        self.capabilities
    }

    fn get_columns(&self) -> Result<Vec<ColumnMeta>> {
        Ok(self.columns.clone())
    }

    #[tracing::instrument(level = "debug", skip_all, fields(dataset = %self.key))]
    fn query(&self, request: &QueryRequest, _ctx: Option<&RequestContext>) -> Result<TabularResult> {
        if request.selected_columns.is_empty() {
            return Err(ErrorKind::FilterValidationError.with_message("selected_columns must be non-empty"));
        }
        self.require_columns(&request.selected_columns)?;
        if let Some(filter) = &request.filter {
            validate_filter(filter, &self.column_names())?;
        }

        let mut matched = self.filtered_rows(request.filter.as_ref());
        let total = matched.len();
        sort_rows(&mut matched, &request.sort);

        let page: Vec<&Row> = if request.limit == 0 {
            matched
        } else {
            matched
                .into_iter()
                .skip(request.offset)
                .take(request.limit)
                .collect()
        };

        let rows = page
            .into_iter()
            .map(|row| project(row, &request.selected_columns))
            .collect();

        debug!(matched = total, returned_rows = ?request.limit, "memory provider query complete");

        Ok(TabularResult {
            columns: request.selected_columns.clone(),
            rows,
            total,
        })
    }

    #[tracing::instrument(level = "debug", skip_all, fields(dataset = %self.key))]
    fn aggregate(
        &self,
        request: &AggregateRequest,
        _ctx: Option<&RequestContext>,
    ) -> Result<AggregateResult> {
        if request.is_pivot() && !self.capabilities.pivot {
            return Err(ErrorKind::AggregationNotSupported
                .with_message("dataset does not support pivot aggregation"));
        }
        let mut referenced: Vec<String> = request.group_by_rows.clone();
        referenced.extend(request.group_by_cols.clone());
        referenced.extend(request.values.iter().map(|v| v.column.clone()));
        self.require_columns(&referenced)?;
        if let Some(filter) = &request.filter {
            validate_filter(filter, &self.column_names())?;
        }

        let matched = self.filtered_rows(request.filter.as_ref());

        if request.is_pivot() {
            pivot_aggregate(request, &matched)
        } else {
            simple_aggregate(request, &matched)
        }
    }
}

fn validate_filter(filter: &FilterGroup, known: &[String]) -> Result<()> {
    crate::filter::validate_columns(filter, known)
}

fn project(row: &Row, selected_columns: &[String]) -> Row {
    selected_columns
        .iter()
        .map(|col| (col.clone(), row.get(col).cloned().unwrap_or(ScalarValue::Null)))
        .collect()
}

fn group_key(row: &Row, columns: &[String]) -> Vec<String> {
    columns
        .iter()
        .map(|c| row.get(c).map(ScalarValue::stringify).unwrap_or_else(|| "null".into()))
        .collect()
}

fn simple_aggregate(request: &AggregateRequest, rows: &[&Row]) -> Result<AggregateResult> {
    let mut buckets: Vec<(Vec<String>, Vec<&Row>)> = Vec::new();
    if request.group_by_rows.is_empty() {
        buckets.push((Vec::new(), rows.to_vec()));
    } else {
        for row in rows {
            let key = group_key(row, &request.group_by_rows);
            match buckets.iter_mut().find(|(k, _)| *k == key) {
                Some((_, bucket)) => bucket.push(row),
                None => buckets.push((key, vec![row])),
            }
        }
    }

    let mut columns: Vec<AggregateColumn> = request
        .group_by_rows
        .iter()
        .map(AggregateColumn::dimension)
        .collect();
    for value in &request.values {
        let key = format!("{}_{}", value.agg.token(), value.column);
        let header = value
            .label
            .clone()
            .unwrap_or_else(|| format!("{} ({})", value.column, value.agg));
        columns.push(AggregateColumn::measure_column(
            key,
            header,
            value.column.clone(),
            value.agg,
        ));
    }

    let total = buckets.len();
    let mut output_rows: Vec<Row> = buckets
        .iter()
        .map(|(key, bucket)| {
            let mut out = Row::new();
            for (dim, value) in request.group_by_rows.iter().zip(key.iter()) {
                out.insert(dim.clone(), ScalarValue::String(value.clone()));
            }
            for value_spec in &request.values {
                let key = format!("{}_{}", value_spec.agg.token(), value_spec.column);
                let computed = compute_agg(value_spec.agg, &value_spec.column, bucket);
                out.insert(key, computed);
            }
            out
        })
        .collect();

    sort_aggregate_rows(&mut output_rows, &request.sort);
    let output_rows = paginate(output_rows, request.limit, request.offset);

    Ok(AggregateResult {
        columns,
        rows: output_rows,
        total,
    })
}

fn pivot_aggregate(request: &AggregateRequest, rows: &[&Row]) -> Result<AggregateResult> {
    let n_row_dims = request.group_by_rows.len();
    let mut all_dims = request.group_by_rows.clone();
    all_dims.extend(request.group_by_cols.clone());

    // Bucket every matched row by the full (row-dims, col-dims) tuple.
    let mut buckets: Vec<(Vec<String>, Vec<&Row>)> = Vec::new();
    for row in rows {
        let key = group_key(row, &all_dims);
        match buckets.iter_mut().find(|(k, _)| *k == key) {
            Some((_, bucket)) => bucket.push(row),
            None => buckets.push((key, vec![row])),
        }
    }

    // Discover distinct pivot (column-dims) combinations, sorted for determinism.
    let mut combos: Vec<Vec<String>> = buckets
        .iter()
        .map(|(key, _)| key[n_row_dims..].to_vec())
        .collect();
    combos.sort();
    combos.dedup();

    let mut columns: Vec<AggregateColumn> = request
        .group_by_rows
        .iter()
        .map(AggregateColumn::dimension)
        .collect();
    for combo in &combos {
        for value_spec in &request.values {
            let mut key_parts = combo.clone();
            key_parts.push(value_spec.agg.token().to_string());
            key_parts.push(value_spec.column.clone());
            let key = key_parts.join("_");
            let header = format!("{} ({})", combo.join(" \u{203a} "), value_spec.agg);
            columns.push(AggregateColumn::pivot_column(
                key,
                header,
                combo.clone(),
                value_spec.column.clone(),
                value_spec.agg,
            ));
        }
    }

    // Re-group by the row dimensions only, accumulating per discovered combo.
    let mut row_groups: Vec<(Vec<String>, Vec<(Vec<String>, &Vec<&Row>)>)> = Vec::new();
    for (key, bucket) in &buckets {
        let row_key = key[..n_row_dims].to_vec();
        let combo = key[n_row_dims..].to_vec();
        match row_groups.iter_mut().find(|(k, _)| *k == row_key) {
            Some((_, entries)) => entries.push((combo, bucket)),
            None => row_groups.push((row_key, vec![(combo, bucket)])),
        }
    }

    let total = row_groups.len();
    let mut output_rows: Vec<Row> = row_groups
        .iter()
        .map(|(row_key, entries)| {
            let mut out = Row::new();
            for (dim, value) in request.group_by_rows.iter().zip(row_key.iter()) {
                out.insert(dim.clone(), ScalarValue::String(value.clone()));
            }
            for combo in &combos {
                let bucket = entries
                    .iter()
                    .find(|(c, _)| c == combo)
                    .map(|(_, b)| b.as_slice())
                    .unwrap_or(&[]);
                for value_spec in &request.values {
                    let mut key_parts = combo.clone();
                    key_parts.push(value_spec.agg.token().to_string());
                    key_parts.push(value_spec.column.clone());
                    let key = key_parts.join("_");
                    out.insert(key, compute_agg(value_spec.agg, &value_spec.column, bucket));
                }
            }
            out
        })
        .collect();

    sort_aggregate_rows(&mut output_rows, &request.sort);
    let output_rows = paginate(output_rows, request.limit, request.offset);

    Ok(AggregateResult {
        columns,
        rows: output_rows,
        total,
    })
}

fn sort_aggregate_rows(rows: &mut [Row], sort: &[SortSpec]) {
    for spec in sort.iter().rev() {
        rows.sort_by(|a, b| compare_by_spec(a, b, spec));
    }
}

fn paginate(rows: Vec<Row>, limit: Option<usize>, offset: usize) -> Vec<Row> {
    match limit {
        Some(limit) => rows.into_iter().skip(offset).take(limit).collect(),
        None => rows.into_iter().skip(offset).collect(),
    }
}

/// Computes one aggregate function over a bucket of rows for one measure column, following
/// the per-op table: `COUNT`/`DISTINCT_COUNT` include nulls and default to `0` on an empty
/// bucket; `SUM`/`AVG`/`MIN`/`MAX`/`FIRST`/`LAST` drop nulls (except `FIRST`/`LAST`, which
/// read the raw first/last row regardless of nullness) and default to `null`.
fn compute_agg(agg: AggFunc, column: &str, rows: &[&Row]) -> ScalarValue {
    match agg {
        AggFunc::Count => ScalarValue::Number(rows.len() as f64),
        AggFunc::DistinctCount => {
            let mut seen: HashSet<String> = HashSet::new();
            for row in rows {
                let value = row.get(column).cloned().unwrap_or(ScalarValue::Null);
                seen.insert(distinct_key(&value));
            }
            ScalarValue::Number(seen.len() as f64)
        }
        AggFunc::Sum => {
            let values: Vec<f64> = non_null_numbers(rows, column);
            if values.is_empty() {
                ScalarValue::Null
            } else {
                ScalarValue::Number(values.iter().sum())
            }
        }
        AggFunc::Avg => {
            let values = non_null_numbers(rows, column);
            if values.is_empty() {
                ScalarValue::Null
            } else {
                ScalarValue::Number(values.iter().sum::<f64>() / values.len() as f64)
            }
        }
        AggFunc::Min => non_null_values(rows, column)
            .into_iter()
            .min_by(|a, b| a.safe_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
            .unwrap_or(ScalarValue::Null),
        AggFunc::Max => non_null_values(rows, column)
            .into_iter()
            .max_by(|a, b| a.safe_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
            .unwrap_or(ScalarValue::Null),
        AggFunc::First => rows
            .first()
            .and_then(|row| row.get(column).cloned())
            .unwrap_or(ScalarValue::Null),
        AggFunc::Last => rows
            .last()
            .and_then(|row| row.get(column).cloned())
            .unwrap_or(ScalarValue::Null),
    }
}

fn distinct_key(value: &ScalarValue) -> String {
    match value {
        ScalarValue::Null => "null:".to_string(),
        ScalarValue::Bool(b) => format!("bool:{b}"),
        ScalarValue::Number(n) => format!("num:{n}"),
        ScalarValue::String(s) => format!("str:{s}"),
    }
}

fn non_null_values(rows: &[&Row], column: &str) -> Vec<ScalarValue> {
    rows.iter()
        .filter_map(|row| row.get(column))
        .filter(|v| !v.is_null())
        .cloned()
        .collect()
}

fn non_null_numbers(rows: &[&Row], column: &str) -> Vec<f64> {
    non_null_values(rows, column)
        .into_iter()
        .filter_map(|v| v.as_f64())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seed;

    fn seed_provider() -> MemoryProvider {
        MemoryProvider::new("sales", "Sales", seed::sales_columns(), seed::sales_rows())
    }

    #[test]
    fn scenario_1_query_filtered_by_region() {
        let provider = seed_provider();
        let request = QueryRequest::new(vec!["year".into(), "region".into(), "amount".into()])
            .with_filter(FilterGroup::and(vec![crate::filter::FilterCondition::new(
                "region",
                crate::value::FilterOperator::Eq,
            )
            .with_value(crate::value::FilterValue::Scalar(ScalarValue::String(
                "North".into(),
            )))]))
            .with_limit(10);
        let result = provider.query(&request, None).unwrap();
        assert_eq!(result.rows.len(), 4);
        assert_eq!(result.total, 4);
    }

    #[test]
    fn scenario_2_simple_aggregate_sum_by_region() {
        let provider = seed_provider();
        let request = AggregateRequest::new(
            vec!["region".into()],
            vec![ValueSpec {
                column: "amount".into(),
                agg: AggFunc::Sum,
                label: None,
            }],
        );
        let result = provider.aggregate(&request, None).unwrap();
        assert_eq!(result.total, 2);
        let north = result
            .rows
            .iter()
            .find(|r| r.get("region") == Some(&ScalarValue::String("North".into())))
            .unwrap();
        assert_eq!(north.get("sum_amount"), Some(&ScalarValue::Number(640.0)));
        let south = result
            .rows
            .iter()
            .find(|r| r.get("region") == Some(&ScalarValue::String("South".into())))
            .unwrap();
        assert_eq!(south.get("sum_amount"), Some(&ScalarValue::Number(840.0)));
    }

    #[test]
    fn scenario_3_pivot_aggregate_by_product() {
        let provider = seed_provider();
        let request = AggregateRequest::new(
            vec!["region".into()],
            vec![ValueSpec {
                column: "amount".into(),
                agg: AggFunc::Sum,
                label: None,
            }],
        )
        .with_pivot(vec!["product".into()]);
        let result = provider.aggregate(&request, None).unwrap();
        let north = result
            .rows
            .iter()
            .find(|r| r.get("region") == Some(&ScalarValue::String("North".into())))
            .unwrap();
        assert_eq!(
            north.get("Gadget_sum_amount"),
            Some(&ScalarValue::Number(420.0))
        );
        assert_eq!(
            north.get("Widget_sum_amount"),
            Some(&ScalarValue::Number(220.0))
        );
    }

    #[test]
    fn scenario_4_drill_down_matches_parent_group_sum() {
        let provider = seed_provider();
        let drilled = AggregateRequest::new(
            vec!["product".into()],
            vec![ValueSpec {
                column: "amount".into(),
                agg: AggFunc::Sum,
                label: None,
            }],
        )
        .with_filter(FilterGroup::and(vec![crate::filter::FilterCondition::new(
            "region",
            crate::value::FilterOperator::Eq,
        )
        .with_value(crate::value::FilterValue::Scalar(ScalarValue::String(
            "North".into(),
        )))]));
        let result = provider.aggregate(&drilled, None).unwrap();
        assert_eq!(result.rows.len(), 2);
        let widget = result
            .rows
            .iter()
            .find(|r| r.get("product") == Some(&ScalarValue::String("Widget".into())))
            .unwrap();
        assert_eq!(widget.get("sum_amount"), Some(&ScalarValue::Number(220.0)));
    }

    #[test]
    fn empty_bucket_aggregate_follows_per_op_table() {
        let empty: Vec<&Row> = Vec::new();
        assert_eq!(compute_agg(AggFunc::Count, "amount", &empty), ScalarValue::Number(0.0));
        assert_eq!(
            compute_agg(AggFunc::DistinctCount, "amount", &empty),
            ScalarValue::Number(0.0)
        );
        assert_eq!(compute_agg(AggFunc::Sum, "amount", &empty), ScalarValue::Null);
        assert_eq!(compute_agg(AggFunc::Avg, "amount", &empty), ScalarValue::Null);
        assert_eq!(compute_agg(AggFunc::Min, "amount", &empty), ScalarValue::Null);
        assert_eq!(compute_agg(AggFunc::Max, "amount", &empty), ScalarValue::Null);
        assert_eq!(compute_agg(AggFunc::First, "amount", &empty), ScalarValue::Null);
        assert_eq!(compute_agg(AggFunc::Last, "amount", &empty), ScalarValue::Null);
    }

    #[test]
    fn sort_is_stable_and_reverse_spec_order_primary() {
        let mut rows = vec![
            Row::from([
                ("a".to_string(), ScalarValue::Number(1.0)),
                ("b".to_string(), ScalarValue::Number(2.0)),
            ]),
            Row::from([
                ("a".to_string(), ScalarValue::Number(1.0)),
                ("b".to_string(), ScalarValue::Number(1.0)),
            ]),
        ];
        let refs: Vec<&Row> = rows.iter().collect();
        let mut refs = refs;
        let sort = vec![
            SortSpec {
                column: "a".into(),
                direction: SortDirection::Asc,
            },
            SortSpec {
                column: "b".into(),
                direction: SortDirection::Asc,
            },
        ];
        sort_rows(&mut refs, &sort);
        assert_eq!(refs[0].get("b"), Some(&ScalarValue::Number(1.0)));
        drop(refs);
        rows.clear();
    }
}
