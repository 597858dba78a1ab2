//! Metrics Aggregator
//!
//! Append-only usage events grouped into named collections, answering two
//! rollups per user:
//!
//! - **count**: flatten a (possibly multi-valued) field, top N values by count
//! - **time**: N calendar buckets (day/week/month) ending now, zero-filled

pub mod bucket;
pub mod error;
pub mod store;

pub use bucket::TimeUnit;
pub use error::{MetricsError, MetricsResult};
pub use store::{BucketMode, MetricsPoint, MetricsQuery, MetricsStore, DEFAULT_TIME_WINDOW, DEFAULT_TOP_N};
