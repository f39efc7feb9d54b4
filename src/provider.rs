//! The narrow capability interface a grid-agnostic request layer uses to list columns and
//! execute flat or aggregated queries, independent of whether the data lives in memory or in
//! a SQL backend.

use crate::context::RequestContext;
use crate::filter::FilterGroup;
use crate::value::{
    AggregateResult, ColumnMeta, DatasetCapabilities, SortSpec, TabularResult, ValueSpec,
};
use crate::Result;

/// A dataset: something that can describe its own columns and answer flat or aggregated
/// queries against its data.
///
/// Implementations are tagged variants ([`crate::memory::MemoryProvider`] and
/// [`crate::sql::SqlProvider`]) rather than an inheritance chain; this trait is the entire
/// interface a provider has to satisfy. Implementations must be `Send + Sync` so a single
/// provider instance can serve concurrent requests from the registry without additional
/// locking at the call site.
impl std::fmt::Debug for dyn DataProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataProvider").field("key", &self.key()).finish()
    }
}

pub trait DataProvider: Send + Sync {
    /// A stable key, unique across the registry.
    fn key(&self) -> &str;

    /// A human-readable display name.
    fn label(&self) -> &str;

    /// A longer human-readable description.
    fn description(&self) -> &str {
        ""
    }

    /// Which optional behaviours this provider supports.
    fn capabilities(&self) -> DatasetCapabilities;

    /// Lists this dataset's columns. Must be cheap and safe to call repeatedly; an
    /// implementation that resolves its schema lazily must memoize after the first call.
    fn get_columns(&self) -> Result<Vec<ColumnMeta>>;

    /// Executes a flat, unaggregated query.
    ///
    /// `selected_columns` must be non-empty and each name must resolve via
    /// [`DataProvider::get_columns`]. `limit = 0` means "no limit" (used by export paths).
    /// The result preserves `selected_columns` order in both `columns` and row-map key order.
    fn query(&self, request: &QueryRequest, ctx: Option<&RequestContext>) -> Result<TabularResult>;

    /// Executes a grouped or pivoted aggregation.
    ///
    /// If `group_by_cols` is empty this behaves as a simple `GROUP BY`; otherwise it behaves
    /// as a pivot, producing one output column per discovered `(group_by_cols tuple) x
    /// value_spec` combination.
    fn aggregate(
        &self,
        request: &AggregateRequest,
        ctx: Option<&RequestContext>,
    ) -> Result<AggregateResult>;
}

/// The parameters of a flat [`DataProvider::query`] call.
#[derive(Clone, Debug, Default)]
pub struct QueryRequest {
    pub selected_columns: Vec<String>,
    pub filter: Option<FilterGroup>,
    pub sort: Vec<SortSpec>,
    pub limit: usize,
    pub offset: usize,
}

impl QueryRequest {
    pub fn new(selected_columns: Vec<String>) -> Self {
        QueryRequest {
            selected_columns,
            filter: None,
            sort: Vec::new(),
            limit: 100,
            offset: 0,
        }
    }

    pub fn with_filter(mut self, filter: FilterGroup) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_sort(mut self, sort: Vec<SortSpec>) -> Self {
        self.sort = sort;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// `limit = 0` means "no limit", used by the export shaper.
    pub fn unlimited(mut self) -> Self {
        self.limit = 0;
        self
    }
}

/// The parameters of an [`DataProvider::aggregate`] call.
#[derive(Clone, Debug, Default)]
pub struct AggregateRequest {
    pub group_by_rows: Vec<String>,
    pub group_by_cols: Vec<String>,
    pub values: Vec<ValueSpec>,
    pub filter: Option<FilterGroup>,
    pub sort: Vec<SortSpec>,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl AggregateRequest {
    pub fn new(group_by_rows: Vec<String>, values: Vec<ValueSpec>) -> Self {
        AggregateRequest {
            group_by_rows,
            group_by_cols: Vec::new(),
            values,
            filter: None,
            sort: Vec::new(),
            limit: None,
            offset: 0,
        }
    }

    pub fn with_pivot(mut self, group_by_cols: Vec<String>) -> Self {
        self.group_by_cols = group_by_cols;
        self
    }

    pub fn with_filter(mut self, filter: FilterGroup) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_sort(mut self, sort: Vec<SortSpec>) -> Self {
        self.sort = sort;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn is_pivot(&self) -> bool {
        !self.group_by_cols.is_empty()
    }
}
