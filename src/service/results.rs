//! Service-level response types

use crate::index::IndexStatus;
use crate::query::TagCounts;
use crate::snapshot::{ContextSnapshot, LayerContext};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Precomputed revision summary plus the index flags a polling client needs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetMetaResult {
    pub asset_count: u64,
    pub total_asset_mbytes: u64,
    pub class_names: BTreeMap<i32, String>,
    pub gt: LayerContext,
    pub pred: LayerContext,
    pub cks_count: TagCounts,
    pub index_exist: bool,
    pub index_ready: bool,
}

impl DatasetMetaResult {
    pub fn new(context: ContextSnapshot, status: IndexStatus) -> Self {
        Self {
            asset_count: context.images_count,
            total_asset_mbytes: context.total_asset_mbytes,
            class_names: context.class_names,
            gt: context.gt,
            pred: context.pred,
            cks_count: context.cks_count,
            index_exist: status.exist(),
            index_ready: status.ready(),
        }
    }
}
