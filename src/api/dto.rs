//! Data Transfer Objects
//!
//! Request and response types for the API endpoints.
//! These types are serialized/deserialized to/from JSON.

use crate::model::{AnnotationLayer, ConfusionMatrix, DatasetRevision};
use crate::query::{AssetFilter, QueryError, QueryResult, DEFAULT_PAGE_SIZE};
use serde::{Deserialize, Serialize};
use std::path::Path;

// ============================================
// REVISION
// ============================================

/// Revision address inside the configured sandbox
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevisionDto {
    pub user_id: String,
    pub repo_id: String,
    pub branch_id: String,
    pub task_id: String,
}

impl RevisionDto {
    /// Resolve against `sandbox_root`, rejecting ids that would leave it
    pub fn into_revision(self, sandbox_root: &Path) -> QueryResult<DatasetRevision> {
        let revision = DatasetRevision::new(
            sandbox_root,
            self.user_id,
            self.repo_id,
            self.branch_id,
            self.task_id,
        );
        revision.validate().map_err(QueryError::InvalidFilter)?;
        Ok(revision)
    }
}

// ============================================
// QUERY DTOs
// ============================================

/// Asset page request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetsRequest {
    #[serde(flatten)]
    pub revision: RevisionDto,
    #[serde(default)]
    pub offset: usize,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub class_ids: Vec<i32>,
    /// `gt` and/or `pred`
    #[serde(default)]
    pub annotation_layers: Vec<AnnotationLayer>,
    #[serde(default)]
    pub anchor_asset_id: Option<String>,
    #[serde(default)]
    pub include_cm: Vec<ConfusionMatrix>,
    #[serde(default)]
    pub exclude_cm: Vec<ConfusionMatrix>,
    /// `key` or `key:value`
    #[serde(default)]
    pub cks: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

fn default_limit() -> usize {
    DEFAULT_PAGE_SIZE
}

impl AssetsRequest {
    /// Validated filter; contradictory parameters fail here, before any query
    pub fn filter(&self) -> QueryResult<AssetFilter> {
        let mut builder = AssetFilter::builder()
            .offset(self.offset)
            .limit(self.limit)
            .class_ids(self.class_ids.iter().copied())
            .layers(self.annotation_layers.iter().copied())
            .include_cm(self.include_cm.iter().copied())
            .exclude_cm(self.exclude_cm.iter().copied())
            .cks(self.cks.iter().cloned())
            .tags(self.tags.iter().cloned());
        if let Some(anchor) = &self.anchor_asset_id {
            builder = builder.anchor(anchor.clone());
        }
        builder.build()
    }
}

/// Dataset statistics request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsRequest {
    #[serde(flatten)]
    pub revision: RevisionDto,
    #[serde(default)]
    pub class_ids: Vec<i32>,
    #[serde(default)]
    pub asset_histograms: bool,
    #[serde(default)]
    pub annotation_histograms: bool,
}

/// Duplication request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DupRequest {
    pub candidates: Vec<RevisionDto>,
    #[serde(default)]
    pub corrodees: Vec<RevisionDto>,
}

// ============================================
// METRICS DTOs
// ============================================

/// Record metric response
#[derive(Debug, Serialize, Deserialize)]
pub struct RecordMetricResponse {
    pub status: String,
    pub id: String,
}

// ============================================
// HEALTH DTOs
// ============================================

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Overall status: "healthy" or "unhealthy"
    pub status: String,
    /// Index store status: "ok" or "error"
    pub index_store: String,
    /// Server uptime in seconds
    pub uptime_seconds: u64,
    pub version: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::QueryError;

    #[test]
    fn test_assets_request_defaults() {
        let req: AssetsRequest = serde_json::from_str(
            r#"{"user_id": "u", "repo_id": "r", "branch_id": "b", "task_id": "t"}"#,
        )
        .unwrap();
        assert_eq!(req.limit, DEFAULT_PAGE_SIZE);
        assert_eq!(req.offset, 0);

        let revision = req.revision.clone().into_revision(Path::new("/sandbox")).unwrap();
        assert_eq!(revision.revision_key(), "b@t");
        assert_eq!(req.filter().unwrap(), AssetFilter::all());
    }

    #[test]
    fn test_assets_request_filter() {
        let req: AssetsRequest = serde_json::from_str(
            r#"{
                "user_id": "u", "repo_id": "r", "branch_id": "b", "task_id": "t",
                "class_ids": [2, 1], "annotation_layers": ["pred"],
                "include_cm": ["TP", "MTP"], "cks": ["city:paris"], "anchor_asset_id": "a3"
            }"#,
        )
        .unwrap();
        let filter = req.filter().unwrap();
        assert_eq!(filter.class_ids, vec![1, 2]);
        assert_eq!(filter.layers, vec![AnnotationLayer::Prediction]);
        assert_eq!(filter.include_cm, vec![ConfusionMatrix::Tp, ConfusionMatrix::Mtp]);
        assert_eq!(filter.anchor_asset_id.as_deref(), Some("a3"));
    }

    #[test]
    fn test_conflicting_cm_rejected() {
        let req: AssetsRequest = serde_json::from_str(
            r#"{
                "user_id": "u", "repo_id": "r", "branch_id": "b", "task_id": "t",
                "include_cm": ["TP"], "exclude_cm": ["FP"]
            }"#,
        )
        .unwrap();
        assert!(matches!(req.filter(), Err(QueryError::InvalidFilter(_))));
    }

    #[test]
    fn test_revision_outside_sandbox_rejected() {
        let dto: RevisionDto = serde_json::from_str(
            r#"{"user_id": "..", "repo_id": "elsewhere/u/repo", "branch_id": "b", "task_id": "t1"}"#,
        )
        .unwrap();
        assert!(matches!(
            dto.into_revision(Path::new("/sandbox")),
            Err(QueryError::InvalidFilter(_))
        ));
    }
}
