//! Datalens Index
//!
//! Lazily materializes immutable revisions into a queryable secondary index:
//!
//! - **projector**: joins snapshot parts into one `AssetRecord` per asset
//! - **collection**: per-revision tables (documents + class/cm/tag rows)
//! - **histogram**: fixed bucket schemas computed once at build time
//! - **store**: the exist/ready state machine, build, rollback and sweep
//!
//! # Architecture
//!
//! ```text
//! IndexSource ──▶ AssetProjector ──▶ Collection (sorted inserts, batched)
//!                                         │
//!                                         ▼
//!                          histogram::compute_all ──▶ index_metadata.ready = 1
//! ```

pub mod collection;
pub mod error;
pub mod histogram;
pub mod projector;
pub mod store;

pub use collection::Collection;
pub use error::{IndexError, IndexResult};
pub use histogram::{HistogramBucket, HistogramMap, HistogramSchema, IndexHistograms};
pub use projector::AssetProjector;
pub use store::{BuildOutcome, IndexMetadata, IndexStatus, IndexStore, IndexStoreConfig};
