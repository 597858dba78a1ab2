//! Core data model shared by the loader, index and query layers

mod asset;
mod revision;

pub use asset::{
    polygon_area, AnnotationLayer, AssetMetadata, AssetRecord, AssetTimestamp, AssetType,
    BoundingBox, ConfusionMatrix, ObjectAnnotation, Point, NO_QUALITY,
};
pub use revision::DatasetRevision;
