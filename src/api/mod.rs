//! Datalens REST API
//!
//! Thin HTTP layer over [`DatasetService`](crate::service::DatasetService),
//! built with Axum.
//!
//! # Endpoints
//!
//! ## Datasets
//! - `POST /api/v1/assets` - Filtered, anchored page of assets
//! - `POST /api/v1/stats` - Revision statistics and histograms
//! - `POST /api/v1/meta` - Revision summary plus index flags
//! - `POST /api/v1/model` - Model info of a revision
//! - `POST /api/v1/dup` - Duplication and residual counts
//!
//! ## Metrics
//! - `POST /api/v1/metrics/:group` - Record an event
//! - `POST /api/v1/metrics/:group/query` - Query a rollup
//!
//! ## Health
//! - `GET /health/live` - Liveness probe
//! - `GET /health/ready` - Readiness probe
//! - `GET /health` - Full health status
//!
//! Failures answer `{"error": {"code", "message", "retryable"?}, "request_id"}`.

pub mod dto;
pub mod error;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use state::AppState;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Build the API router with all routes and middleware
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/assets", post(routes::datasets::get_assets))
        .route("/stats", post(routes::datasets::get_dataset_stats))
        .route("/meta", post(routes::datasets::get_dataset_meta))
        .route("/model", post(routes::datasets::get_model_info))
        .route("/dup", post(routes::datasets::get_dataset_dup))
        .route("/metrics/:group", post(routes::metrics::record_metric))
        .route("/metrics/:group/query", post(routes::metrics::query_metrics));

    let health_routes = Router::new()
        .route("/live", get(routes::health::liveness))
        .route("/ready", get(routes::health::readiness))
        .route("/", get(routes::health::full_health));

    let shared_state = Arc::new(state);

    Router::new()
        .nest("/api/v1", api_routes)
        .nest("/health", health_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(shared_state)
}

/// Start the API server
pub async fn serve(state: AppState, addr: &str) -> Result<(), ApiError> {
    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("Datalens API listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ApiError::Internal(format!("Server error: {}", e)))?;

    tracing::info!("Datalens API shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::error::ErrorResponse;
    use crate::index::{IndexStore, IndexStoreConfig};
    use crate::query::QueryAssetsResult;
    use crate::service::DatasetService;
    use crate::snapshot::SnapshotLoader;
    use crate::testing::{sample_source, write_revision};
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
        response::Response,
    };
    use serde::de::DeserializeOwned;
    use tempfile::tempdir;
    use tower::util::ServiceExt;

    fn create_test_app(dir: &tempfile::TempDir) -> Router {
        let store = IndexStore::open(IndexStoreConfig::new(dir.path().join("index.db"))).unwrap();
        let service = DatasetService::new(store, SnapshotLoader::filesystem());
        write_revision(dir.path(), "b", "t1", &sample_source());
        build_router(AppState::new(service, dir.path()))
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body<T: DeserializeOwned>(response: Response) -> T {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_live() {
        let dir = tempdir().unwrap();
        let app = create_test_app(&dir);

        let response = app
            .oneshot(Request::builder().uri("/health/live").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health_ready() {
        let dir = tempdir().unwrap();
        let app = create_test_app(&dir);

        let response = app
            .oneshot(Request::builder().uri("/health/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_get_assets() {
        let dir = tempdir().unwrap();
        let app = create_test_app(&dir);

        let response = app
            .oneshot(post_json(
                "/api/v1/assets",
                r#"{"user_id": "u", "repo_id": "repo", "branch_id": "b", "task_id": "t1",
                    "cks": ["city:paris"], "anchor_asset_id": "a5"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let result: QueryAssetsResult = json_body(response).await;
        assert_eq!(result.total_assets_count, 2);
        assert_eq!(result.anchor, 1);
        assert_eq!(result.assets.len(), 1);
        assert_eq!(result.assets[0].asset_id, "a5");
    }

    #[tokio::test]
    async fn test_conflicting_cm_is_bad_request() {
        let dir = tempdir().unwrap();
        let app = create_test_app(&dir);

        let response = app
            .oneshot(post_json(
                "/api/v1/assets",
                r#"{"user_id": "u", "repo_id": "repo", "branch_id": "b", "task_id": "t1",
                    "include_cm": ["TP"], "exclude_cm": ["FP"]}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body: ErrorResponse = json_body(response).await;
        assert_eq!(body.error.code, "INVALID_FILTER");
        assert!(!body.error.retryable);
        assert!(!body.request_id.is_empty());
    }

    #[tokio::test]
    async fn test_revision_outside_sandbox_is_bad_request() {
        let dir = tempdir().unwrap();
        let store = IndexStore::open(IndexStoreConfig::new(dir.path().join("index.db"))).unwrap();
        let service = DatasetService::new(store, SnapshotLoader::filesystem());
        let app = build_router(AppState::new(service, dir.path().join("sandbox")));

        // a readable revision next to the sandbox
        write_revision(&dir.path().join("outside"), "b", "t1", &sample_source());

        let response = app
            .oneshot(post_json(
                "/api/v1/assets",
                r#"{"user_id": "..", "repo_id": "outside/u/repo", "branch_id": "b", "task_id": "t1"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body: ErrorResponse = json_body(response).await;
        assert_eq!(body.error.code, "INVALID_FILTER");
    }

    #[tokio::test]
    async fn test_missing_revision_is_not_found() {
        let dir = tempdir().unwrap();
        let app = create_test_app(&dir);

        let response = app
            .oneshot(post_json(
                "/api/v1/model",
                r#"{"user_id": "u", "repo_id": "repo", "branch_id": "nope", "task_id": "t1"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body: ErrorResponse = json_body(response).await;
        assert_eq!(body.error.code, "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_record_and_query_metrics() {
        let dir = tempdir().unwrap();
        let app = create_test_app(&dir);

        let response = app
            .clone()
            .oneshot(post_json(
                "/api/v1/metrics/usage",
                r#"{"id": "e1", "user_id": "u1", "kind": ["det", "seg"]}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = app
            .clone()
            .oneshot(post_json(
                "/api/v1/metrics/usage/query",
                r#"{"user_id": "u1", "field": "kind", "mode": "count"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let points: Vec<crate::metrics::MetricsPoint> = json_body(response).await;
        assert_eq!(points.len(), 2);

        let response = app
            .oneshot(post_json(
                "/api/v1/metrics/usage/query",
                r#"{"user_id": "u1", "field": "create_time", "mode": "time", "unit": "year"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: ErrorResponse = json_body(response).await;
        assert_eq!(body.error.code, "INVALID_UNIT");
    }
}
