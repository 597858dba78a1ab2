//! Application State
//!
//! Shared state accessible by all API handlers.
//! Wrapped in Arc for thread-safe sharing across async tasks.

use crate::api::dto::RevisionDto;
use crate::model::DatasetRevision;
use crate::query::QueryResult;
use crate::service::DatasetService;
use std::path::PathBuf;
use std::time::Instant;

/// Shared application state for all handlers
#[derive(Clone)]
pub struct AppState {
    /// Dataset service answering every query
    pub service: DatasetService,
    /// Object-store sandbox that request revisions resolve against
    pub sandbox_root: PathBuf,
    /// Server start time for uptime tracking
    pub start_time: Instant,
}

impl AppState {
    pub fn new(service: DatasetService, sandbox_root: impl Into<PathBuf>) -> Self {
        Self {
            service,
            sandbox_root: sandbox_root.into(),
            start_time: Instant::now(),
        }
    }

    /// Resolve a request revision inside the sandbox
    pub fn revision(&self, dto: RevisionDto) -> QueryResult<DatasetRevision> {
        dto.into_revision(&self.sandbox_root)
    }

    /// Get server uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
