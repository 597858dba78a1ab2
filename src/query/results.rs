//! Query response types

use crate::index::{HistogramMap, IndexStatus};
use crate::model::AssetRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Tag key → value → number of assets
pub type TagCounts = BTreeMap<String, BTreeMap<String, u64>>;

/// One page of an asset query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryAssetsResult {
    pub assets: Vec<AssetRecord>,
    /// Matching assets ordered before the anchor id
    pub anchor: u64,
    pub total_assets_count: u64,
}

/// Per-layer annotation statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnotationStats {
    /// Class id → number of assets annotated with it
    pub class_ids_count: BTreeMap<i32, u64>,
    /// Assets with at least one annotation of the requested classes
    pub positive_assets_count: u64,
    pub negative_assets_count: u64,
    pub annos_count: u64,
    pub tags_count: TagCounts,
}

/// Summary statistics of a revision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryDatasetStatsResult {
    pub total_assets_count: u64,
    pub total_assets_bytes: u64,
    pub gt: AnnotationStats,
    pub pred: AnnotationStats,
    pub cks_count: TagCounts,
    pub asset_histograms: Option<HistogramMap>,
    pub gt_histograms: Option<HistogramMap>,
    pub pred_histograms: Option<HistogramMap>,
    pub index_status: IndexStatus,
}
