//! Orchestration Handler
//!
//! The public surface of the engine. Each operation decides whether the
//! revision's index must be built, runs the blocking work off the async
//! runtime and maps layer failures onto the crate error taxonomy.

mod handler;
mod results;

pub use handler::{DatasetService, DEFAULT_REQUEST_TIMEOUT};
pub use results::DatasetMetaResult;
