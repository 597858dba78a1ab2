//! # Datalens
//!
//! Read-side indexing and query engine for versioned, annotated media
//! datasets. Immutable dataset revisions are decoded from a versioned object
//! store, projected into per-revision index collections on demand, and
//! answered through filtered, paginated asset queries, statistics,
//! histograms, dedup counts and usage-metrics rollups.
//!
//! ## Modules
//!
//! - [`snapshot`]: Binary snapshot files of a revision and the loader
//! - [`index`]: Asset projection, index store and histograms
//! - [`query`]: Asset filters, predicate compilation and execution
//! - [`metrics`]: Usage-event collections and rollups
//! - [`dedup`]: Cross-revision duplication counts
//! - [`service`]: Orchestration of all of the above
//! - [`api`]: REST API server with Axum
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use datalens::{AssetFilter, DatasetRevision, DatasetService, IndexStore, IndexStoreConfig, SnapshotLoader};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = IndexStore::open(IndexStoreConfig::new("/var/lib/datalens/index.db"))?;
//!     let service = DatasetService::new(store, SnapshotLoader::filesystem());
//!
//!     let revision = DatasetRevision::new("/sandbox", "user", "repo", "branch", "task");
//!     let filter = AssetFilter::builder().class_ids([1, 2]).cks(["city:paris"]).build()?;
//!
//!     // Builds the revision's index on first use
//!     let page = service.get_assets(revision, filter).await?;
//!     println!("{} of {} assets", page.assets.len(), page.total_assets_count);
//!
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod dedup;
pub mod error;
pub mod index;
pub mod metrics;
pub mod model;
pub mod query;
pub mod service;
pub mod snapshot;

#[cfg(test)]
pub(crate) mod testing;

// Re-export top-level types for convenience
pub use error::{DatalensError, DatalensResult, ErrorCode};

pub use model::{AnnotationLayer, AssetRecord, ConfusionMatrix, DatasetRevision};

pub use snapshot::{ObjectStore, SnapshotError, SnapshotLoader};

pub use index::{IndexError, IndexStatus, IndexStore, IndexStoreConfig};

pub use query::{AssetFilter, QueryAssetsResult, QueryDatasetStatsResult, QueryError, TagExpr};

pub use metrics::{BucketMode, MetricsPoint, MetricsQuery, TimeUnit};

pub use dedup::QueryDatasetDupResult;

pub use service::{DatasetMetaResult, DatasetService};

pub use api::{build_router, serve, ApiError, AppState};

pub use config::{generate_default_config, Config, ConfigError};
