//! Dataset Service
//!
//! Sequences loader, index store, query executor, metrics store and dedup
//! engine for each public operation.
//!
//! # Index lifecycle per request
//!
//! ```text
//!   ready     → query
//!   building  → IndexNotReady (retryable, caller polls)
//!   absent    → load snapshot → build (bounded by the request deadline) → query
//! ```
//!
//! Every operation runs its blocking store and loader work on the blocking
//! pool, bounded by the request timeout twice: `tokio::time::timeout` frees
//! the caller, and the store deadline interrupts the statement still running.

use crate::dedup::{DedupEngine, QueryDatasetDupResult};
use crate::error::{DatalensError, DatalensResult};
use crate::index::{BuildOutcome, IndexStatus, IndexStore};
use crate::metrics::{MetricsPoint, MetricsQuery, MetricsStore, DEFAULT_TOP_N};
use crate::model::DatasetRevision;
use crate::query::{AssetFilter, QueryAssetsResult, QueryDatasetStatsResult, QueryExecutor};
use crate::service::results::DatasetMetaResult;
use crate::snapshot::{ModelInfo, SnapshotLoader};
use serde_json::Value as JsonValue;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

/// Default bound on a single request
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Entry point for every dataset query
#[derive(Clone)]
pub struct DatasetService {
    store: IndexStore,
    loader: SnapshotLoader,
    default_top_n: usize,
    request_timeout: Duration,
}

impl DatasetService {
    pub fn new(store: IndexStore, loader: SnapshotLoader) -> Self {
        Self {
            store,
            loader,
            default_top_n: DEFAULT_TOP_N,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_default_top_n(mut self, n: usize) -> Self {
        self.default_top_n = n;
        self
    }

    pub fn store(&self) -> &IndexStore {
        &self.store
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Filtered page of assets, building the index first if it is absent
    pub async fn get_assets(
        &self,
        revision: DatasetRevision,
        filter: AssetFilter,
    ) -> DatalensResult<QueryAssetsResult> {
        let loader = self.loader.clone();
        self.run_blocking("get_assets", move |store| {
            ensure_index(&store, &loader, &revision)?;
            Ok(QueryExecutor::new(store).execute(&revision, &filter)?)
        })
        .await
    }

    /// Revision statistics, building the index first if it is absent
    pub async fn get_dataset_stats(
        &self,
        revision: DatasetRevision,
        class_ids: Vec<i32>,
        want_asset_hist: bool,
        want_anno_hist: bool,
    ) -> DatalensResult<QueryDatasetStatsResult> {
        let loader = self.loader.clone();
        self.run_blocking("get_dataset_stats", move |store| {
            ensure_index(&store, &loader, &revision)?;
            Ok(QueryExecutor::new(store).dataset_stats(
                &revision,
                &class_ids,
                want_asset_hist,
                want_anno_hist,
            )?)
        })
        .await
    }

    /// Revision summary from the `context` file
    ///
    /// An absent index is built in the background; the response carries the
    /// flags observed before that build starts, so clients poll until ready.
    pub async fn get_dataset_meta(&self, revision: DatasetRevision) -> DatalensResult<DatasetMetaResult> {
        let loader = self.loader.clone();
        let rev = revision.clone();
        let (context, status) = self
            .run_blocking("get_dataset_meta", move |store| {
                let context = loader.context(&rev)?;
                Ok((context, store.check_index(&rev)))
            })
            .await?;

        if status == IndexStatus::Absent {
            let _ = self.spawn_build(revision);
        }
        Ok(DatasetMetaResult::new(context, status))
    }

    /// Readiness probe for polling clients; store failures read as absent
    pub async fn check_index(&self, revision: DatasetRevision) -> DatalensResult<IndexStatus> {
        self.run_blocking("check_index", move |store| Ok(store.check_index(&revision)))
            .await
    }

    /// Duplication across candidates and residuals of corrodees
    pub async fn get_dataset_dup(
        &self,
        candidates: Vec<DatasetRevision>,
        corrodees: Vec<DatasetRevision>,
    ) -> DatalensResult<QueryDatasetDupResult> {
        let engine = DedupEngine::new(self.loader.clone());
        self.run_blocking("get_dataset_dup", move |_| {
            Ok(engine.dataset_dup(&candidates, &corrodees)?)
        })
        .await
    }

    /// Model of the revision's task, falling back to the head task
    pub async fn get_model_info(&self, revision: DatasetRevision) -> DatalensResult<ModelInfo> {
        let loader = self.loader.clone();
        self.run_blocking("get_model_info", move |_| {
            let tasks = loader.tasks(&revision)?;
            tasks
                .task_or_head(&revision.task_id)
                .and_then(|task| task.model.clone())
                .ok_or_else(|| DatalensError::NotFound(format!("model of {}", revision)))
        })
        .await
    }

    pub async fn record_metric(&self, group: String, event: JsonValue) -> DatalensResult<String> {
        let top_n = self.default_top_n;
        self.run_blocking("record_metric", move |store| {
            Ok(MetricsStore::new(store).with_default_top_n(top_n).record(&group, event)?)
        })
        .await
    }

    pub async fn query_metrics(
        &self,
        group: String,
        query: MetricsQuery,
    ) -> DatalensResult<Vec<MetricsPoint>> {
        let top_n = self.default_top_n;
        self.run_blocking("query_metrics", move |store| {
            Ok(MetricsStore::new(store).with_default_top_n(top_n).query(&group, &query)?)
        })
        .await
    }

    /// Number of known indexes; fails when the store is unreachable
    pub async fn index_count(&self) -> DatalensResult<u64> {
        self.run_blocking("index_count", |store| Ok(store.index_count()?))
            .await
    }

    /// Sweep revisions left in building by a crashed process
    pub async fn drop_unready(&self) -> DatalensResult<Vec<String>> {
        self.run_blocking("drop_unready", |store| Ok(store.drop_unready()?))
            .await
    }

    /// Fire-and-forget index build
    ///
    /// Failures and panics inside the build roll back the build's own claim
    /// in the store. A panic outside the build (while loading) never claimed
    /// anything, so it is only logged.
    pub fn spawn_build(&self, revision: DatasetRevision) -> JoinHandle<()> {
        let store = self.store.clone();
        let loader = self.loader.clone();

        tokio::spawn(async move {
            let rev = revision.clone();
            let result = tokio::task::spawn_blocking(move || -> DatalensResult<BuildOutcome> {
                let source = loader.load_index_source(&rev)?;
                Ok(store.build_index(&rev, &source)?)
            })
            .await;

            match result {
                Ok(Ok(BuildOutcome::Built { assets })) => {
                    tracing::info!(revision = %revision, assets, "Background index build finished");
                }
                Ok(Ok(BuildOutcome::AlreadyExists)) => {}
                Ok(Err(e)) => {
                    tracing::error!(revision = %revision, error = %e, "Background index build failed");
                }
                Err(join_err) if join_err.is_panic() => {
                    tracing::error!(revision = %revision, "Background index build task panicked");
                }
                Err(join_err) => {
                    tracing::error!(revision = %revision, error = %join_err, "Background index build aborted");
                }
            }
        })
    }

    /// Run `op` on the blocking pool under the request deadline
    async fn run_blocking<T, F>(&self, name: &'static str, op: F) -> DatalensResult<T>
    where
        T: Send + 'static,
        F: FnOnce(IndexStore) -> DatalensResult<T> + Send + 'static,
    {
        let started = Instant::now();
        let store = self.store.with_deadline(started + self.request_timeout);
        let handle = tokio::task::spawn_blocking(move || op(store));

        let result = match tokio::time::timeout(self.request_timeout, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(DatalensError::Internal(format!("{} failed: {}", name, join_err))),
            Err(_) => Err(DatalensError::Timeout(format!(
                "{} exceeded {} ms",
                name,
                self.request_timeout.as_millis()
            ))),
        };

        tracing::debug!(
            op = name,
            ok = result.is_ok(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Service call finished"
        );
        result
    }
}

/// Make sure the revision's index is ready, building it when absent
fn ensure_index(
    store: &IndexStore,
    loader: &SnapshotLoader,
    revision: &DatasetRevision,
) -> DatalensResult<()> {
    match store.index_status(revision)? {
        IndexStatus::Ready => Ok(()),
        IndexStatus::Building => Err(DatalensError::IndexNotReady(revision.revision_key())),
        IndexStatus::Absent => {
            let source = loader.load_index_source(revision)?;
            match store.build_index(revision, &source)? {
                BuildOutcome::Built { .. } => Ok(()),
                // lost the race: ready only if the winner already finished
                BuildOutcome::AlreadyExists => match store.index_status(revision)? {
                    IndexStatus::Ready => Ok(()),
                    _ => Err(DatalensError::IndexNotReady(revision.revision_key())),
                },
            }
        }
    }
}
