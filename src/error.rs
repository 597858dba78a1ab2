//! Crate-level error taxonomy
//!
//! Every layer error converts into a `DatalensError`, which carries the
//! caller-visible classification: a stable code, a message and whether a
//! retry can succeed.

use crate::index::IndexError;
use crate::metrics::MetricsError;
use crate::query::QueryError;
use crate::snapshot::SnapshotError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced by the dataset service
#[derive(Error, Debug)]
pub enum DatalensError {
    /// Missing revision, file or record
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed snapshot payload or invalid asset attributes
    #[error("Decode error: {0}")]
    Decode(String),

    /// Malformed or contradictory query parameters
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    /// Query issued before the index finished building
    #[error("Index not ready: {0}")]
    IndexNotReady(String),

    /// Underlying store I/O failure
    #[error("Store error: {0}")]
    Store(String),

    /// Unsupported time-bucket unit
    #[error("Invalid unit: {0}")]
    InvalidUnit(String),

    /// The request deadline passed
    #[error("Deadline exceeded: {0}")]
    Timeout(String),

    /// Unexpected failure (background task panic, join error)
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Stable, caller-visible error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    NotFound,
    #[serde(rename = "DECODE_ERROR")]
    Decode,
    InvalidFilter,
    IndexNotReady,
    #[serde(rename = "STORE_ERROR")]
    Store,
    InvalidUnit,
    Timeout,
    #[serde(rename = "INTERNAL_ERROR")]
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "NOT_FOUND",
            Self::Decode => "DECODE_ERROR",
            Self::InvalidFilter => "INVALID_FILTER",
            Self::IndexNotReady => "INDEX_NOT_READY",
            Self::Store => "STORE_ERROR",
            Self::InvalidUnit => "INVALID_UNIT",
            Self::Timeout => "TIMEOUT",
            Self::Internal => "INTERNAL_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl DatalensError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::Decode(_) => ErrorCode::Decode,
            Self::InvalidFilter(_) => ErrorCode::InvalidFilter,
            Self::IndexNotReady(_) => ErrorCode::IndexNotReady,
            Self::Store(_) => ErrorCode::Store,
            Self::InvalidUnit(_) => ErrorCode::InvalidUnit,
            Self::Timeout(_) => ErrorCode::Timeout,
            Self::Internal(_) => ErrorCode::Internal,
        }
    }

    /// Whether the caller should retry (index still building, deadline hit)
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::IndexNotReady(_) | Self::Timeout(_))
    }
}

impl From<SnapshotError> for DatalensError {
    fn from(err: SnapshotError) -> Self {
        match err {
            SnapshotError::RevisionNotFound(_) | SnapshotError::FileNotFound { .. } => {
                DatalensError::NotFound(err.to_string())
            }
            SnapshotError::Decode(_) => DatalensError::Decode(err.to_string()),
            SnapshotError::Io(_) => DatalensError::Store(err.to_string()),
        }
    }
}

impl From<IndexError> for DatalensError {
    fn from(err: IndexError) -> Self {
        match err {
            IndexError::NotReady(revision) => DatalensError::IndexNotReady(revision),
            IndexError::Timeout => DatalensError::Timeout(err.to_string()),
            IndexError::InvalidAsset { .. } => DatalensError::Decode(err.to_string()),
            IndexError::BuildPanicked(_) => DatalensError::Internal(err.to_string()),
            IndexError::Store(_)
            | IndexError::Serialization(_)
            | IndexError::ClaimLost(_)
            | IndexError::Io(_) => DatalensError::Store(err.to_string()),
        }
    }
}

impl From<QueryError> for DatalensError {
    fn from(err: QueryError) -> Self {
        match err {
            QueryError::InvalidFilter(msg) => DatalensError::InvalidFilter(msg),
            QueryError::Index(e) => e.into(),
        }
    }
}

impl From<MetricsError> for DatalensError {
    fn from(err: MetricsError) -> Self {
        match err {
            MetricsError::InvalidUnit(unit) => DatalensError::InvalidUnit(unit),
            MetricsError::InvalidGroup(_)
            | MetricsError::InvalidField(_)
            | MetricsError::InvalidEvent(_) => DatalensError::InvalidFilter(err.to_string()),
            MetricsError::Index(e) => e.into(),
        }
    }
}

/// Result type alias for service operations
pub type DatalensResult<T> = Result<T, DatalensError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_errors_map_to_taxonomy() {
        let err: DatalensError = SnapshotError::RevisionNotFound("u/r/b@t".into()).into();
        assert_eq!(err.code(), ErrorCode::NotFound);

        let err: DatalensError = SnapshotError::FileNotFound {
            revision: "u/r/b@t".into(),
            file: "tasks".into(),
        }
        .into();
        assert_eq!(err.code(), ErrorCode::NotFound);

        let err: DatalensError = SnapshotError::Decode("bad magic".into()).into();
        assert_eq!(err.code(), ErrorCode::Decode);
    }

    #[test]
    fn test_retryable() {
        let err: DatalensError = IndexError::NotReady("b@t".into()).into();
        assert_eq!(err.code(), ErrorCode::IndexNotReady);
        assert!(err.is_retryable());

        let err: DatalensError = QueryError::Index(IndexError::Timeout).into();
        assert_eq!(err.code(), ErrorCode::Timeout);
        assert!(err.is_retryable());

        let err: DatalensError = QueryError::InvalidFilter("x".into()).into();
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_invalid_asset_is_decode() {
        let err: DatalensError = IndexError::InvalidAsset {
            asset_id: "a".into(),
            reason: "zero width".into(),
        }
        .into();
        assert_eq!(err.code(), ErrorCode::Decode);
    }

    #[test]
    fn test_metrics_errors() {
        let err: DatalensError = MetricsError::InvalidUnit("year".into()).into();
        assert_eq!(err.code(), ErrorCode::InvalidUnit);
        assert_eq!(err.code().to_string(), "INVALID_UNIT");

        let err: DatalensError = MetricsError::InvalidGroup("a b".into()).into();
        assert_eq!(err.code(), ErrorCode::InvalidFilter);
    }
}
