//! Dataset Routes
//!
//! - POST /api/v1/assets - Filtered, anchored page of assets
//! - POST /api/v1/stats - Revision statistics and histograms
//! - POST /api/v1/meta - Precomputed summary, triggers a background build
//! - POST /api/v1/model - Model of the revision's task
//! - POST /api/v1/dup - Duplication across revisions

use axum::{extract::State, Json};
use std::sync::Arc;

use crate::api::dto::{AssetsRequest, DupRequest, RevisionDto, StatsRequest};
use crate::api::error::ApiResult;
use crate::api::state::AppState;
use crate::dedup::QueryDatasetDupResult;
use crate::query::{QueryAssetsResult, QueryDatasetStatsResult, QueryResult};
use crate::service::DatasetMetaResult;
use crate::snapshot::ModelInfo;

/// POST /api/v1/assets
pub async fn get_assets(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AssetsRequest>,
) -> ApiResult<Json<QueryAssetsResult>> {
    let filter = req.filter()?;
    let revision = state.revision(req.revision)?;
    let result = state.service.get_assets(revision, filter).await?;
    Ok(Json(result))
}

/// POST /api/v1/stats
pub async fn get_dataset_stats(
    State(state): State<Arc<AppState>>,
    Json(req): Json<StatsRequest>,
) -> ApiResult<Json<QueryDatasetStatsResult>> {
    let revision = state.revision(req.revision)?;
    let result = state
        .service
        .get_dataset_stats(
            revision,
            req.class_ids,
            req.asset_histograms,
            req.annotation_histograms,
        )
        .await?;
    Ok(Json(result))
}

/// POST /api/v1/meta
pub async fn get_dataset_meta(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RevisionDto>,
) -> ApiResult<Json<DatasetMetaResult>> {
    let revision = state.revision(req)?;
    Ok(Json(state.service.get_dataset_meta(revision).await?))
}

/// POST /api/v1/model
pub async fn get_model_info(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RevisionDto>,
) -> ApiResult<Json<ModelInfo>> {
    let revision = state.revision(req)?;
    Ok(Json(state.service.get_model_info(revision).await?))
}

/// POST /api/v1/dup
pub async fn get_dataset_dup(
    State(state): State<Arc<AppState>>,
    Json(req): Json<DupRequest>,
) -> ApiResult<Json<QueryDatasetDupResult>> {
    let candidates = req
        .candidates
        .into_iter()
        .map(|r| state.revision(r))
        .collect::<QueryResult<Vec<_>>>()?;
    let corrodees = req
        .corrodees
        .into_iter()
        .map(|r| state.revision(r))
        .collect::<QueryResult<Vec<_>>>()?;
    let result = state.service.get_dataset_dup(candidates, corrodees).await?;
    Ok(Json(result))
}
