//! The SQL-backed [`DataProvider`]: compiles predicates, group-bys, and a two-pass pivot
//! against a pre-composed selectable.
//!
//! The reference backend is an embedded SQL engine (`rusqlite`) so the core and its tests
//! carry no external service dependency; the statements built here are plain
//! `SELECT/WHERE/GROUP BY/ORDER BY/LIMIT/OFFSET` with `?` placeholders, so pointing this at a
//! server-backed engine is a matter of supplying a different connection factory rather than
//! rewriting the compiler.

use std::sync::{Mutex, OnceLock};

use rusqlite::types::ValueRef;
use rusqlite::{params_from_iter, Connection};
use tracing::debug;

use crate::context::RequestContext;
use crate::provider::{AggregateRequest, DataProvider, QueryRequest};
use crate::sql::filter_compiler::{compile_filter_group, quote_identifier, CompiledFilter};
use crate::sql::pivot::{agg_sql, case_expr, combo_discovery_sql, pivot_key};
use crate::value::{
    AggregateColumn, AggregateResult, ColumnMeta, ColumnType, DatasetCapabilities, Row, ScalarValue,
    SortDirection, SortSpec, TabularResult,
};
use crate::{ErrorKind, Result};

/// A dataset backed by a SQL selectable (a base table name or a parenthesised subquery).
pub struct SqlProvider {
    key: String,
    label: String,
    description: String,
    capabilities: DatasetCapabilities,
    connection: Mutex<Connection>,
    selectable: String,
    columns: OnceLock<Vec<ColumnMeta>>,
    explicit_columns: Option<Vec<ColumnMeta>>,
}

impl SqlProvider {
    /// Builds a provider with an explicit column list (no schema inference needed).
    pub fn new(
        key: impl Into<String>,
        label: impl Into<String>,
        connection: Connection,
        selectable: impl Into<String>,
        columns: Vec<ColumnMeta>,
    ) -> Self {
        SqlProvider {
            key: key.into(),
            label: label.into(),
            description: String::new(),
            capabilities: DatasetCapabilities { pivot: true },
            connection: Mutex::new(connection),
            selectable: selectable.into(),
            columns: OnceLock::new(),
            explicit_columns: Some(columns),
        }
    }

    /// Builds a provider that infers its column list from the selectable's result columns on
    /// first use.
    pub fn with_inferred_columns(
        key: impl Into<String>,
        label: impl Into<String>,
        connection: Connection,
        selectable: impl Into<String>,
    ) -> Self {
        SqlProvider {
            key: key.into(),
            label: label.into(),
            description: String::new(),
            capabilities: DatasetCapabilities { pivot: true },
            connection: Mutex::new(connection),
            selectable: selectable.into(),
            columns: OnceLock::new(),
            explicit_columns: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// The selectable wrapped as a subquery target, per §4.4: a bare table name is used
    /// as-is, a `SELECT` statement is wrapped so `WHERE/GROUP BY/ORDER BY/LIMIT` apply to its
    /// output rather than its inputs.
    fn from_clause(&self) -> String {
        let trimmed = self.selectable.trim();
        if trimmed.to_uppercase().starts_with("SELECT") {
            format!("({trimmed})")
        } else {
            quote_identifier(trimmed)
        }
    }

    fn column_names(&self) -> Vec<String> {
        self.explicit_columns
            .as_ref()
            .or_else(|| self.columns.get())
            .map(|cols| cols.iter().map(|c| c.name.clone()).collect())
            .unwrap_or_default()
    }

    fn require_known(&self, names: &[String]) -> Result<()> {
        let known = self.column_names();
        for name in names {
            if !known.iter().any(|c| c == name) {
                return Err(crate::Error::unknown_column(name));
            }
        }
        Ok(())
    }

    fn compile(&self, filter: Option<&crate::filter::FilterGroup>) -> Result<CompiledFilter> {
        let known = self.column_names();
        match filter {
            Some(group) => compile_filter_group(group, &known),
            None => compile_filter_group(&crate::filter::FilterGroup::empty(), &known),
        }
    }

    fn infer_columns(&self, conn: &Connection) -> Result<Vec<ColumnMeta>> {
        let sql = format!("SELECT * FROM {} LIMIT 0", self.from_clause());
        let stmt = conn
            .prepare(&sql)
            .map_err(|e| ErrorKind::BackendError.with_source(e))?;
        let mut columns = Vec::new();
        for col in stmt.columns() {
            let decl = col.decl_type().unwrap_or("").to_uppercase();
            let column_type = infer_column_type(&decl);
            columns.push(ColumnMeta::new(col.name(), titlecase(col.name()), column_type));
        }
        Ok(columns)
    }

    fn ensure_columns(&self) -> Result<&[ColumnMeta]> {
        if let Some(explicit) = &self.explicit_columns {
            return Ok(explicit.as_slice());
        }
        if let Some(cached) = self.columns.get() {
            return Ok(cached.as_slice());
        }
        let conn = self.connection.lock().expect("sql provider mutex poisoned");
        let inferred = self.infer_columns(&conn)?;
        Ok(self.columns.get_or_init(|| inferred))
    }
}

fn infer_column_type(decl: &str) -> ColumnType {
    match decl {
        d if d.contains("INT") || d.contains("FLOAT") || d.contains("NUMERIC") || d.contains("DECIMAL") || d.contains("REAL") || d.contains("DOUBLE") => {
            ColumnType::Number
        }
        d if d.contains("BOOL") => ColumnType::Boolean,
        d if d.contains("TIMESTAMP") || d.contains("DATETIME") => ColumnType::DateTime,
        d if d.contains("DATE") => ColumnType::Date,
        _ => ColumnType::String,
    }
}

fn titlecase(name: &str) -> String {
    name.split(['_', '-'])
        .filter(|p| !p.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn sql_value_to_scalar(value: ValueRef<'_>) -> ScalarValue {
    match value {
        ValueRef::Null => ScalarValue::Null,
        ValueRef::Integer(i) => ScalarValue::Number(i as f64),
        ValueRef::Real(f) => ScalarValue::Number(f),
        ValueRef::Text(t) => ScalarValue::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(_) => ScalarValue::Null,
    }
}

fn order_by_clause(sort: &[SortSpec], fallback_columns: &[String], offset: usize) -> String {
    if !sort.is_empty() {
        let parts: Vec<String> = sort
            .iter()
            .map(|s| {
                let dir = match s.direction {
                    SortDirection::Asc => "ASC",
                    SortDirection::Desc => "DESC",
                };
                format!("{} {dir}", quote_identifier(&s.column))
            })
            .collect();
        return format!(" ORDER BY {}", parts.join(", "));
    }
    if offset > 0 && !fallback_columns.is_empty() {
        let parts: Vec<String> = fallback_columns.iter().map(|c| format!("{} ASC", quote_identifier(c))).collect();
        return format!(" ORDER BY {}", parts.join(", "));
    }
    String::new()
}

impl DataProvider for SqlProvider {
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
        Ok(self.ensure_columns()?.to_vec())
    }

    #[tracing::instrument(level = "debug", skip_all, fields(dataset = %self.key))]
    fn query(&self, request: &QueryRequest, _ctx: Option<&RequestContext>) -> Result<TabularResult> {
        if request.selected_columns.is_empty() {
            return Err(ErrorKind::FilterValidationError.with_message("selected_columns must be non-empty"));
        }
        self.ensure_columns()?;
        self.require_known(&request.selected_columns)?;

        let compiled = self.compile(request.filter.as_ref())?;
        let from_clause = self.from_clause();
        let conn = self.connection.lock().expect("sql provider mutex poisoned");

        let count_sql = format!("SELECT COUNT(*) FROM {from_clause} WHERE {}", compiled.sql);
        debug!(sql = %count_sql, params = compiled.params.len(), "executing count query");
        let total: i64 = conn
            .query_row(&count_sql, params_from_iter(compiled.params.iter()), |r| r.get(0))
            .map_err(|e| ErrorKind::BackendError.with_source(e))?;

        let projection = request
            .selected_columns
            .iter()
            .map(|c| quote_identifier(c))
            .collect::<Vec<_>>()
            .join(", ");
        let order_by = order_by_clause(&request.sort, &request.selected_columns, request.offset);
        let limit_clause = if request.limit == 0 {
            String::new()
        } else {
            format!(" LIMIT {} OFFSET {}", request.limit, request.offset)
        };
        let data_sql =
            format!("SELECT {projection} FROM {from_clause} WHERE {}{order_by}{limit_clause}", compiled.sql);
        debug!(sql = %data_sql, "executing data query");

        let mut stmt = conn
            .prepare(&data_sql)
            .map_err(|e| ErrorKind::BackendError.with_source(e))?;
        let rows = stmt
            .query_map(params_from_iter(compiled.params.iter()), |r| {
                let mut row = Row::new();
                for (idx, name) in request.selected_columns.iter().enumerate() {
                    row.insert(name.clone(), sql_value_to_scalar(r.get_ref(idx)?));
                }
                Ok(row)
            })
            .map_err(|e| ErrorKind::BackendError.with_source(e))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| ErrorKind::BackendError.with_source(e))?;

        Ok(TabularResult {
            columns: request.selected_columns.clone(),
            rows,
            total: total as usize,
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
        self.ensure_columns()?;
        let mut referenced = request.group_by_rows.clone();
        referenced.extend(request.group_by_cols.clone());
        referenced.extend(request.values.iter().map(|v| v.column.clone()));
        self.require_known(&referenced)?;

        let compiled = self.compile(request.filter.as_ref())?;
        if request.is_pivot() {
            self.pivot_aggregate(request, &compiled)
        } else {
            self.simple_aggregate(request, &compiled)
        }
    }
}

impl SqlProvider {
    fn simple_aggregate(
        &self,
        request: &AggregateRequest,
        compiled: &CompiledFilter,
    ) -> Result<AggregateResult> {
        let from_clause = self.from_clause();
        let conn = self.connection.lock().expect("sql provider mutex poisoned");

        let group_cols: Vec<String> = request.group_by_rows.iter().map(|c| quote_identifier(c)).collect();
        let group_by = if group_cols.is_empty() {
            String::new()
        } else {
            format!(" GROUP BY {}", group_cols.join(", "))
        };

        let mut select_parts = group_cols.clone();
        let mut keys = Vec::new();
        for value in &request.values {
            let key = format!("{}_{}", value.agg.token(), value.column);
            let expr = agg_sql(value.agg, &quote_identifier(&value.column));
            select_parts.push(format!("{expr} AS {}", quote_identifier(&key)));
            keys.push(key);
        }

        let order_by = order_by_clause(&request.sort, &request.group_by_rows, request.offset);
        let limit_clause = match request.limit {
            Some(limit) => format!(" LIMIT {limit} OFFSET {}", request.offset),
            None => String::new(),
        };
        let data_sql = format!(
            "SELECT {} FROM {from_clause} WHERE {}{group_by}{order_by}{limit_clause}",
            select_parts.join(", "),
            compiled.sql
        );

        debug!(sql = %data_sql, "executing simple aggregate query");
        let mut stmt = conn
            .prepare(&data_sql)
            .map_err(|e| ErrorKind::BackendError.with_source(e))?;
        let row_dims = request.group_by_rows.clone();
        let key_list = keys.clone();
        let rows = stmt
            .query_map(params_from_iter(compiled.params.iter()), |r| {
                let mut row = Row::new();
                for (idx, dim) in row_dims.iter().enumerate() {
                    row.insert(dim.clone(), sql_value_to_scalar(r.get_ref(idx)?));
                }
                for (idx, key) in key_list.iter().enumerate() {
                    row.insert(key.clone(), sql_value_to_scalar(r.get_ref(row_dims.len() + idx)?));
                }
                Ok(row)
            })
            .map_err(|e| ErrorKind::BackendError.with_source(e))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| ErrorKind::BackendError.with_source(e))?;

        // An ungrouped aggregate always yields exactly one row-group tuple; only the grouped
        // case needs a query to count distinct group keys.
        let total: i64 = if group_cols.is_empty() {
            1
        } else {
            let count_sql = format!(
                "SELECT COUNT(*) FROM (SELECT {} FROM {from_clause} WHERE {}{group_by}) AS sub",
                group_cols.join(", "),
                compiled.sql
            );
            conn.query_row(&count_sql, params_from_iter(compiled.params.iter()), |r| r.get(0))
                .map_err(|e| ErrorKind::BackendError.with_source(e))?
        };

        let mut columns: Vec<AggregateColumn> =
            request.group_by_rows.iter().map(AggregateColumn::dimension).collect();
        for value in &request.values {
            let key = format!("{}_{}", value.agg.token(), value.column);
            let header = value
                .label
                .clone()
                .unwrap_or_else(|| format!("{} ({})", value.column, value.agg));
            columns.push(AggregateColumn::measure_column(key, header, value.column.clone(), value.agg));
        }

        Ok(AggregateResult {
            columns,
            rows,
            total: total as usize,
        })
    }

    fn pivot_aggregate(
        &self,
        request: &AggregateRequest,
        compiled: &CompiledFilter,
    ) -> Result<AggregateResult> {
        let from_clause = self.from_clause();
        let conn = self.connection.lock().expect("sql provider mutex poisoned");

        // Pass 1: discover distinct pivot-dimension combinations.
        let discovery_sql = combo_discovery_sql(&from_clause, &request.group_by_cols, &compiled.sql);
        debug!(sql = %discovery_sql, "executing pivot combo discovery");
        let mut discovery_stmt = conn
            .prepare(&discovery_sql)
            .map_err(|e| ErrorKind::BackendError.with_source(e))?;
        let n_pivot_cols = request.group_by_cols.len();
        let combos: Vec<Vec<String>> = discovery_stmt
            .query_map(params_from_iter(compiled.params.iter()), |r| {
                (0..n_pivot_cols)
                    .map(|i| Ok(sql_value_to_scalar(r.get_ref(i)?).stringify()))
                    .collect::<rusqlite::Result<Vec<String>>>()
            })
            .map_err(|e| ErrorKind::BackendError.with_source(e))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| ErrorKind::BackendError.with_source(e))?;

        // Pass 2: one CASE-WHEN expression per (combo x value spec), grouped by row dims only.
        let group_cols: Vec<String> = request.group_by_rows.iter().map(|c| quote_identifier(c)).collect();
        let group_by = if group_cols.is_empty() {
            String::new()
        } else {
            format!(" GROUP BY {}", group_cols.join(", "))
        };

        let mut select_parts = group_cols.clone();
        let mut keys = Vec::new();
        for combo in &combos {
            for value in &request.values {
                select_parts.push(case_expr(&request.group_by_cols, combo, value.agg, &value.column));
                keys.push(pivot_key(combo, value.agg, &value.column));
            }
        }

        let order_by = order_by_clause(&request.sort, &request.group_by_rows, request.offset);
        let limit_clause = match request.limit {
            Some(limit) => format!(" LIMIT {limit} OFFSET {}", request.offset),
            None => String::new(),
        };
        let data_sql = format!(
            "SELECT {} FROM {from_clause} WHERE {}{group_by}{order_by}{limit_clause}",
            select_parts.join(", "),
            compiled.sql
        );
        debug!(sql = %data_sql, "executing pivot expansion query");

        let mut stmt = conn
            .prepare(&data_sql)
            .map_err(|e| ErrorKind::BackendError.with_source(e))?;
        let row_dims = request.group_by_rows.clone();
        let key_list = keys.clone();
        let rows = stmt
            .query_map(params_from_iter(compiled.params.iter()), |r| {
                let mut row = Row::new();
                for (idx, dim) in row_dims.iter().enumerate() {
                    row.insert(dim.clone(), sql_value_to_scalar(r.get_ref(idx)?));
                }
                for (idx, key) in key_list.iter().enumerate() {
                    row.insert(key.clone(), sql_value_to_scalar(r.get_ref(row_dims.len() + idx)?));
                }
                Ok(row)
            })
            .map_err(|e| ErrorKind::BackendError.with_source(e))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| ErrorKind::BackendError.with_source(e))?;

        // An ungrouped pivot always yields exactly one row-group tuple; only the grouped case
        // needs a query to count distinct group keys.
        let total: i64 = if group_cols.is_empty() {
            1
        } else {
            let count_sql = format!(
                "SELECT COUNT(*) FROM (SELECT {} FROM {from_clause} WHERE {}{group_by}) AS sub",
                group_cols.join(", "),
                compiled.sql
            );
            conn.query_row(&count_sql, params_from_iter(compiled.params.iter()), |r| r.get(0))
                .map_err(|e| ErrorKind::BackendError.with_source(e))?
        };

        let mut columns: Vec<AggregateColumn> =
            request.group_by_rows.iter().map(AggregateColumn::dimension).collect();
        for combo in &combos {
            for value in &request.values {
                let key = pivot_key(combo, value.agg, &value.column);
                let header = format!("{} ({})", combo.join(" \u{203a} "), value.agg);
                columns.push(AggregateColumn::pivot_column(
                    key,
                    header,
                    combo.clone(),
                    value.column.clone(),
                    value.agg,
                ));
            }
        }

        Ok(AggregateResult {
            columns,
            rows,
            total: total as usize,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seed;
    use crate::value::{AggFunc, ValueSpec};

    fn seed_connection() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(seed::sales_sql_schema()).unwrap();
        conn
    }

    fn provider() -> SqlProvider {
        SqlProvider::new("sales", "Sales", seed_connection(), "sales", seed::sales_columns())
    }

    #[test]
    fn query_filters_and_counts_total() {
        let provider = provider();
        let request = QueryRequest::new(vec!["year".into(), "region".into(), "amount".into()])
            .with_filter(crate::filter::FilterGroup::and(vec![crate::filter::FilterCondition::new(
                "region",
                crate::value::FilterOperator::Eq,
            )
            .with_value(crate::value::FilterValue::Scalar(ScalarValue::String("North".into())))]))
            .with_limit(10);
        let result = provider.query(&request, None).unwrap();
        assert_eq!(result.total, 4);
        assert_eq!(result.rows.len(), 4);
    }

    #[test]
    fn simple_aggregate_sums_by_region() {
        let provider = provider();
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
    }

    #[test]
    fn pivot_aggregate_matches_in_memory_shape() {
        let provider = provider();
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
        assert_eq!(north.get("Gadget_sum_amount"), Some(&ScalarValue::Number(420.0)));
        assert_eq!(north.get("Widget_sum_amount"), Some(&ScalarValue::Number(220.0)));
    }

    #[test]
    fn unknown_selected_column_is_column_not_found() {
        let provider = provider();
        let request = QueryRequest::new(vec!["nonexistent".into()]);
        let err = provider.query(&request, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ColumnNotFound);
    }
}
