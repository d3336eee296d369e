//! Aggregation core of the NADAC heat map dashboard.
//!
//! [`dataset::BaseDataset`] opens the parquet fact table once and answers
//! catalog queries; [`pipeline::compute_map`] and
//! [`pipeline::compute_trend`] turn filtered fact rows into the per-state
//! and per-quarter aggregates the two charts draw.

pub mod dataset;
pub mod error;
pub mod expressions;
pub mod figures;
pub mod filters;
pub mod geo;
pub mod pipeline;
pub mod storage;
pub mod supersede;

pub use dataset::{BaseDataset, Catalogs, FactQuery, FactRow};
pub use error::{DashboardError, Result};
pub use filters::{BrandGeneric, DrugScope, Metric, Period, UtilizationType};
pub use pipeline::{MapFilters, MapRow, TrendFilters, TrendRow, compute_map, compute_trend};
