use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the accessor, the pipelines and the hosting glue.
///
/// Zero-volume divisions and empty rank sets are not errors; they show up
/// as `None` in the derived columns.
#[derive(Debug, Error)]
pub enum DashboardError {
    /// Period label did not match `"<year> Q<1-4>"`.
    #[error("invalid period '{0}': expected \"<year> Q<1-4>\"")]
    InvalidPeriod(String),

    /// A filter value outside its accepted set.
    #[error("invalid {field} value '{value}'")]
    InvalidFilter { field: &'static str, value: String },

    /// The fact file is missing, unreadable or lacks the expected columns.
    #[error("data unavailable at {path}: {message}")]
    DataUnavailable { path: PathBuf, message: String },

    /// Query failed after the source was opened.
    #[error("query failed: {0}")]
    Query(String),

    /// Pipeline exceeded the configured query timeout.
    #[error("query timed out after {0}s")]
    Timeout(u64),

    /// A newer event for the same chart arrived first.
    #[error("request superseded by a newer event")]
    Superseded,
}

impl DashboardError {
    pub(crate) fn invalid_filter(field: &'static str, value: &str) -> Self {
        Self::InvalidFilter {
            field,
            value: value.to_string(),
        }
    }

    /// True for errors caused by caller input rather than the data source.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidPeriod(_) | Self::InvalidFilter { .. })
    }
}

/// Result type for dashboard operations.
pub type Result<T> = std::result::Result<T, DashboardError>;
