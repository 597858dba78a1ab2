//! Index store error types

use thiserror::Error;

/// Errors raised by the index store
#[derive(Error, Debug)]
pub enum IndexError {
    /// The revision's index is absent or still building
    #[error("Index not ready: {0}")]
    NotReady(String),

    /// Underlying store failure
    #[error("Store error: {0}")]
    Store(String),

    /// A store call ran past its deadline and was interrupted
    #[error("Store call exceeded its deadline")]
    Timeout,

    /// An asset cannot be projected into an index document
    #[error("Invalid asset {asset_id}: {reason}")]
    InvalidAsset { asset_id: String, reason: String },

    /// Document or histogram (de)serialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The build's metadata record vanished before it could be marked ready
    #[error("Index build for {0} lost its claim")]
    ClaimLost(String),

    /// The build body panicked; the claim was rolled back
    #[error("Index build panicked: {0}")]
    BuildPanicked(String),

    /// I/O failure preparing the store
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rusqlite::Error> for IndexError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _)
                if e.code == rusqlite::ErrorCode::OperationInterrupted =>
            {
                IndexError::Timeout
            }
            _ => IndexError::Store(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for IndexError {
    fn from(err: serde_json::Error) -> Self {
        IndexError::Serialization(err.to_string())
    }
}

/// Result type alias for index operations
pub type IndexResult<T> = Result<T, IndexError>;
