//! The SQL-backed provider: filter compilation, the two-pass pivot compiler, and the
//! [`SqlProvider`] that ties them to an embedded SQL engine.

pub mod filter_compiler;
pub mod pivot;
mod provider;

pub use provider::SqlProvider;
