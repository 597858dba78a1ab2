//! Snapshot loader error types

use thiserror::Error;

/// Errors raised while reading snapshot files from the object store
#[derive(Error, Debug)]
pub enum SnapshotError {
    /// The revision (branch@task ref) does not exist
    #[error("Revision not found: {0}")]
    RevisionNotFound(String),

    /// The revision exists but the named file does not
    #[error("File '{file}' not found in revision {revision}")]
    FileNotFound { revision: String, file: String },

    /// Bytes are present but cannot be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// I/O failure while reading the object store
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<bincode::Error> for SnapshotError {
    fn from(err: bincode::Error) -> Self {
        SnapshotError::Decode(err.to_string())
    }
}

impl From<lz4_flex::block::DecompressError> for SnapshotError {
    fn from(err: lz4_flex::block::DecompressError) -> Self {
        SnapshotError::Decode(format!("LZ4 decompression failed: {}", err))
    }
}

/// Result type alias for snapshot operations
pub type SnapshotResult<T> = Result<T, SnapshotError>;
