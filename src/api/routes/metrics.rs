//! Metrics Routes
//!
//! - POST /api/v1/metrics/:group - Record (upsert) one event
//! - POST /api/v1/metrics/:group/query - Count or time-bucketed rollup

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::Value as JsonValue;
use std::sync::Arc;

use crate::api::dto::RecordMetricResponse;
use crate::api::error::ApiResult;
use crate::api::state::AppState;
use crate::metrics::{MetricsPoint, MetricsQuery};

/// POST /api/v1/metrics/:group
pub async fn record_metric(
    State(state): State<Arc<AppState>>,
    Path(group): Path<String>,
    Json(event): Json<JsonValue>,
) -> ApiResult<(StatusCode, Json<RecordMetricResponse>)> {
    let id = state.service.record_metric(group, event).await?;
    Ok((
        StatusCode::CREATED,
        Json(RecordMetricResponse {
            status: "ok".to_string(),
            id,
        }),
    ))
}

/// POST /api/v1/metrics/:group/query
pub async fn query_metrics(
    State(state): State<Arc<AppState>>,
    Path(group): Path<String>,
    Json(query): Json<MetricsQuery>,
) -> ApiResult<Json<Vec<MetricsPoint>>> {
    Ok(Json(state.service.query_metrics(group, query).await?))
}
