//! The paginated grid-protocol translator (C7): wire DTOs, AG Grid `filterModel` translation,
//! and the `getRows` dispatcher that drives a [`crate::provider::DataProvider`] through
//! group-level, pivoted-leaf, and flat-leaf requests.

pub mod ag_filter;
pub mod request;
mod translator;

pub use request::{ColumnVo, ServerSideGetRowsRequest, ServerSideGetRowsResponse, SortModelItem};
pub use translator::handle_get_rows;
