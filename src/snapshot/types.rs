//! Typed payloads of the snapshot files
//!
//! Each logical file of a revision decodes into exactly one of these
//! records. Maps keyed by asset id are `HashMap`s: the file format gives
//! no ordering guarantee, consumers that need one must sort.

use crate::model::{AssetMetadata, AssetType, BoundingBox, ConfusionMatrix, Point};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Logical file kinds stored in a revision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SnapshotKind {
    Metadatas = 1,
    Annotations = 2,
    Context = 3,
    Tasks = 4,
}

impl SnapshotKind {
    pub fn all() -> &'static [SnapshotKind] {
        &[
            SnapshotKind::Metadatas,
            SnapshotKind::Annotations,
            SnapshotKind::Context,
            SnapshotKind::Tasks,
        ]
    }

    /// Logical file name inside a revision
    pub fn file_name(&self) -> &'static str {
        match self {
            SnapshotKind::Metadatas => "metadatas",
            SnapshotKind::Annotations => "annotations",
            SnapshotKind::Context => "context",
            SnapshotKind::Tasks => "tasks",
        }
    }
}

impl TryFrom<u8> for SnapshotKind {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(SnapshotKind::Metadatas),
            2 => Ok(SnapshotKind::Annotations),
            3 => Ok(SnapshotKind::Context),
            4 => Ok(SnapshotKind::Tasks),
            other => Err(other),
        }
    }
}

impl std::fmt::Display for SnapshotKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.file_name())
    }
}

/// A record that is stored as one snapshot file
pub trait SnapshotPayload: Serialize + DeserializeOwned {
    const KIND: SnapshotKind;

    /// Domain invariants checked right after decoding
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

/// `metadatas`: attributes of every asset in the revision
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct MetadataSnapshot {
    pub attributes: HashMap<String, AssetMetadata>,
}

impl SnapshotPayload for MetadataSnapshot {
    const KIND: SnapshotKind = SnapshotKind::Metadatas;

    /// Images must have a positive width and height
    fn validate(&self) -> Result<(), String> {
        let invalid = self
            .attributes
            .iter()
            .filter(|(_, m)| m.asset_type == AssetType::Image && (m.width == 0 || m.height == 0))
            .min_by(|a, b| a.0.cmp(b.0));

        match invalid {
            Some((id, m)) => Err(format!(
                "asset {} has non-positive image size {}x{}",
                id, m.width, m.height
            )),
            None => Ok(()),
        }
    }
}

/// One object as stored in the annotations file (no resolved class name)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SnapshotObject {
    pub index: i32,
    pub bbox: BoundingBox,
    pub polygon: Vec<Point>,
    pub class_id: i32,
    pub score: f32,
    pub anno_quality: f32,
    pub tags: HashMap<String, String>,
    pub cm: ConfusionMatrix,
    pub det_link_id: i32,
    pub mask_area: Option<u64>,
}

/// Objects annotated on one asset
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ImageAnnotations {
    pub boxes: Vec<SnapshotObject>,
}

/// One annotation layer produced by one task
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct TaskAnnotations {
    pub task_id: String,
    pub image_annotations: HashMap<String, ImageAnnotations>,
}

/// Asset-level tags and quality
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ImageCks {
    pub cks: HashMap<String, String>,
    pub image_quality: f32,
}

/// `annotations`: ground truth, predictions and per-asset tags
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AnnotationSnapshot {
    pub ground_truth: TaskAnnotations,
    pub prediction: TaskAnnotations,
    pub image_cks: HashMap<String, ImageCks>,
}

impl SnapshotPayload for AnnotationSnapshot {
    const KIND: SnapshotKind = SnapshotKind::Annotations;
}

/// Aggregate counts of one annotation layer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct LayerContext {
    pub annos_count: u64,
    pub positive_assets_count: u64,
    pub negative_assets_count: u64,
    pub class_ids_count: BTreeMap<i32, u64>,
    pub tags_count: BTreeMap<String, BTreeMap<String, u64>>,
}

/// `context`: precomputed aggregates of the whole revision
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ContextSnapshot {
    pub images_count: u64,
    pub total_asset_mbytes: u64,
    pub class_names: BTreeMap<i32, String>,
    pub gt: LayerContext,
    pub pred: LayerContext,
    pub cks_count: BTreeMap<String, BTreeMap<String, u64>>,
}

impl SnapshotPayload for ContextSnapshot {
    const KIND: SnapshotKind = SnapshotKind::Context;
}

/// One training stage of a model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ModelStage {
    pub stage_name: String,
    pub files: Vec<String>,
    pub timestamp: i64,
    pub mean_average_precision: f32,
}

/// Model produced by a training task
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ModelMeta {
    pub model_hash: String,
    pub mean_average_precision: f32,
    pub context: String,
    pub stages: BTreeMap<String, ModelStage>,
    pub best_stage_name: String,
}

/// Model information returned to callers
pub type ModelInfo = ModelMeta;

/// One task in a revision's history
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Task {
    pub task_id: String,
    pub name: String,
    pub task_type: String,
    pub timestamp: i64,
    pub model: Option<ModelMeta>,
}

/// `tasks`: task history of the revision
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct TaskSnapshot {
    pub tasks: HashMap<String, Task>,
    pub head_task_id: String,
}

impl TaskSnapshot {
    /// Task by id, falling back to the head task
    pub fn task_or_head(&self, task_id: &str) -> Option<&Task> {
        self.tasks
            .get(task_id)
            .or_else(|| self.tasks.get(&self.head_task_id))
    }
}

impl SnapshotPayload for TaskSnapshot {
    const KIND: SnapshotKind = SnapshotKind::Tasks;
}

/// Whatever subset of a revision's files was requested
#[derive(Debug, Clone, Default)]
pub struct DatasetSnapshot {
    pub metadatas: Option<MetadataSnapshot>,
    pub annotations: Option<AnnotationSnapshot>,
    pub context: Option<ContextSnapshot>,
    pub tasks: Option<TaskSnapshot>,
}

/// Everything the index build needs from one revision
#[derive(Debug, Clone, Default)]
pub struct IndexSource {
    pub metadatas: MetadataSnapshot,
    pub annotations: AnnotationSnapshot,
    pub context: ContextSnapshot,
}

impl IndexSource {
    /// Asset ids in lexicographic order
    pub fn sorted_asset_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.metadatas.attributes.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}
