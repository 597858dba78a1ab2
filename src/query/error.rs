//! Query error types

use crate::index::IndexError;
use thiserror::Error;

/// Errors that can occur while compiling or executing an asset query
#[derive(Error, Debug)]
pub enum QueryError {
    /// Malformed or contradictory filter parameters
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    /// Index not ready, store failure or timeout
    #[error(transparent)]
    Index(#[from] IndexError),
}

impl From<rusqlite::Error> for QueryError {
    fn from(err: rusqlite::Error) -> Self {
        QueryError::Index(IndexError::from(err))
    }
}

impl From<serde_json::Error> for QueryError {
    fn from(err: serde_json::Error) -> Self {
        QueryError::Index(IndexError::from(err))
    }
}

/// Result type for query operations
pub type QueryResult<T> = Result<T, QueryError>;
