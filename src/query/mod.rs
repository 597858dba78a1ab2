//! Datalens Query Engine
//!
//! Turns structured, multi-dimensional filter requests into store queries:
//!
//! - **filter**: validated `AssetFilter` and tag expressions
//! - **predicate**: store-neutral predicate tree rendered to SQL
//! - **compiler**: filter → predicate (AND across dimensions, OR within)
//! - **executor**: fused anchor counting, paging and dataset statistics
//!
//! # Examples
//!
//! ```rust,ignore
//! use datalens::query::{AssetFilter, QueryExecutor};
//!
//! let filter = AssetFilter::builder()
//!     .class_ids([1, 2])
//!     .cks(["city:paris", "weather"])
//!     .anchor("asset00042")
//!     .limit(50)
//!     .build()?;
//!
//! let page = QueryExecutor::new(store).execute(&revision, &filter)?;
//! println!("{} of {} (anchor {})", page.assets.len(), page.total_assets_count, page.anchor);
//! ```

mod compiler;
mod error;
mod executor;
mod filter;
mod predicate;
mod results;

pub use compiler::{compile, compile_page};
pub use error::{QueryError, QueryResult};
pub use executor::QueryExecutor;
pub use filter::{AssetFilter, AssetFilterBuilder, TagExpr, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
pub use predicate::{Predicate, SqlFragment, TagScope};
pub use results::{AnnotationStats, QueryAssetsResult, QueryDatasetStatsResult, TagCounts};
