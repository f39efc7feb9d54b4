//! A dynamic reporting engine for tabular business data.
//!
//! End users compose ad-hoc reports against registered [`datasets`](provider), choosing
//! columns, filters, sorts, row groupings, pivot dimensions, and measure aggregations. This
//! crate implements the parts of that system that are language- and transport-agnostic: the
//! [`value`] model, the recursive [`filter`] tree with its two execution paths, the
//! [`provider`] abstraction and its [`memory`] and [`sql`] implementations, the [`registry`]
//! of datasets, the [`grid`] protocol translator, and the [`export`] shaper.

#![cfg_attr(not(debug_assertions), deny(warnings))]

mod error;

pub use error::{Error, ErrorKind, Result};

pub mod value;

pub mod filter;

pub mod provider;

pub mod memory;

pub mod sql;

pub mod registry;

pub mod grid;

pub mod export;

pub mod context;

pub mod seed;
