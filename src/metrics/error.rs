//! Metrics error types

use crate::index::IndexError;
use thiserror::Error;

/// Errors raised while recording or querying metrics
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Time-bucket unit outside day/week/month
    #[error("Invalid time unit: {0}")]
    InvalidUnit(String),

    /// Group name is not `[A-Za-z0-9_-]+`
    #[error("Invalid metrics group: {0}")]
    InvalidGroup(String),

    /// Field name is not `[A-Za-z0-9_]+`
    #[error("Invalid metrics field: {0}")]
    InvalidField(String),

    /// Event is missing a required field or has a malformed one
    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    /// Underlying store failure
    #[error(transparent)]
    Index(#[from] IndexError),
}

impl From<rusqlite::Error> for MetricsError {
    fn from(err: rusqlite::Error) -> Self {
        MetricsError::Index(IndexError::from(err))
    }
}

impl From<serde_json::Error> for MetricsError {
    fn from(err: serde_json::Error) -> Self {
        MetricsError::Index(IndexError::from(err))
    }
}

/// Result type for metrics operations
pub type MetricsResult<T> = Result<T, MetricsError>;
