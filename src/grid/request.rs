//! Wire DTOs for the paginated grid request/response protocol (AG Grid's Server-Side Row
//! Model shape).

use serde::{Deserialize, Serialize};
use serde_json::Map;

use crate::filter::FilterGroup;
use crate::value::ScalarValue;

/// One column reference as sent by the grid: `rowGroupCols`/`valueCols`/`pivotCols` entries
/// all share this shape.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnVo {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub agg_func: Option<String>,
}

impl ColumnVo {
    /// The field this entry refers to, falling back to `id` when `field` is absent.
    pub fn field(&self) -> &str {
        self.field.as_deref().unwrap_or(&self.id)
    }
}

/// One entry of `sortModel`.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SortModelItem {
    pub col_id: String,
    pub sort: String,
}

/// The paginated grid request body (table endpoint plus the pivot-only fields).
#[derive(Clone, Debug, Deserialize, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ServerSideGetRowsRequest {
    pub start_row: usize,
    pub end_row: usize,
    #[serde(default)]
    pub row_group_cols: Vec<ColumnVo>,
    #[serde(default)]
    pub group_keys: Vec<ScalarValue>,
    #[serde(default)]
    pub value_cols: Vec<ColumnVo>,
    #[serde(default)]
    pub pivot_cols: Vec<ColumnVo>,
    #[serde(default)]
    pub pivot_mode: bool,
    #[serde(default)]
    pub sort_model: Vec<SortModelItem>,
    #[serde(default)]
    pub filter: Option<FilterGroup>,
    #[serde(default)]
    pub filter_model: Option<Map<String, serde_json::Value>>,
}

/// The paginated grid response body.
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServerSideGetRowsResponse {
    pub row_data: Vec<crate::value::Row>,
    pub row_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pivot_result_fields: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secondary_col_defs: Option<Vec<crate::value::AggregateColumn>>,
}
