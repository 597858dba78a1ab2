//! Indexed asset records
//!
//! `AssetRecord` is the denormalized document stored in a revision's index
//! collection: image attributes, both annotation layers, cks tags and the
//! asset quality score.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Sentinel quality value meaning "no quality score"
pub const NO_QUALITY: f32 = -1.0;

/// Media type of an asset
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AssetType {
    #[default]
    Image,
    Video,
    Unknown,
}

/// Capture timestamp of an asset
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct AssetTimestamp {
    /// Start time, unix seconds
    pub start: i64,
    /// Duration in seconds (videos only)
    pub duration: f32,
}

/// Image/video attributes of an asset
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AssetMetadata {
    pub asset_type: AssetType,
    pub width: u32,
    pub height: u32,
    pub image_channels: u32,
    pub byte_size: u64,
    pub origin_filename: String,
    pub timestamp: AssetTimestamp,
}

impl AssetMetadata {
    /// Pixel area of the asset
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Height / width ratio, `None` for degenerate sizes
    pub fn hw_ratio(&self) -> Option<f64> {
        if self.width == 0 {
            return None;
        }
        Some(self.height as f64 / self.width as f64)
    }
}

/// Which annotation layer an object belongs to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AnnotationLayer {
    /// Ground truth
    #[serde(rename = "gt")]
    GroundTruth,
    /// Model prediction
    #[serde(rename = "pred")]
    Prediction,
}

impl AnnotationLayer {
    pub fn all() -> &'static [AnnotationLayer] {
        &[AnnotationLayer::GroundTruth, AnnotationLayer::Prediction]
    }

    /// Field name of the layer inside an indexed document
    pub fn as_str(&self) -> &'static str {
        match self {
            AnnotationLayer::GroundTruth => "gt",
            AnnotationLayer::Prediction => "pred",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "gt" | "ground_truth" => Some(Self::GroundTruth),
            "pred" | "prediction" => Some(Self::Prediction),
            _ => None,
        }
    }
}

impl std::fmt::Display for AnnotationLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Confusion-matrix classification of an annotation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfusionMatrix {
    #[default]
    NotSet,
    /// True positive
    Tp,
    /// False positive
    Fp,
    /// False negative
    Fn,
    /// True negative
    Tn,
    Unknown,
    /// Matched true positive (prediction side of a TP pair)
    Mtp,
    Ignored,
}

impl ConfusionMatrix {
    /// Stable numeric code stored in the index
    pub fn code(&self) -> i64 {
        match self {
            Self::NotSet => 0,
            Self::Tp => 1,
            Self::Fp => 2,
            Self::Fn => 3,
            Self::Tn => 4,
            Self::Unknown => 5,
            Self::Mtp => 11,
            Self::Ignored => 12,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        Some(match code {
            0 => Self::NotSet,
            1 => Self::Tp,
            2 => Self::Fp,
            3 => Self::Fn,
            4 => Self::Tn,
            5 => Self::Unknown,
            11 => Self::Mtp,
            12 => Self::Ignored,
            _ => return None,
        })
    }
}

/// Axis-aligned (optionally rotated) bounding box in pixels
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
    pub rotate_angle: f32,
}

/// Polygon vertex in pixels
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

/// Area of a simple polygon (shoelace formula)
pub fn polygon_area(points: &[Point]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let twice: i64 = points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(a, b)| a.x as i64 * b.y as i64 - b.x as i64 * a.y as i64)
        .sum();
    twice.abs() as f64 / 2.0
}

/// One labeled or detected object inside an asset
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ObjectAnnotation {
    pub index: i32,
    pub bbox: BoundingBox,
    #[serde(default)]
    pub polygon: Vec<Point>,
    pub class_id: i32,
    #[serde(default)]
    pub class_name: String,
    pub score: f32,
    pub anno_quality: f32,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    pub cm: ConfusionMatrix,
    pub det_link_id: i32,
    #[serde(default)]
    pub mask_area: Option<u64>,
    /// Object area in pixels (mask, else polygon, else box)
    pub area: f64,
}

impl ObjectAnnotation {
    /// Height / width ratio of the bounding box
    pub fn hw_ratio(&self) -> Option<f64> {
        if self.bbox.w <= 0 {
            return None;
        }
        Some(self.bbox.h as f64 / self.bbox.w as f64)
    }
}

/// Denormalized, indexable record of one dataset member
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssetRecord {
    pub asset_id: String,
    pub metadata: AssetMetadata,
    /// Sorted union of class ids across both annotation layers
    pub class_ids: Vec<i32>,
    pub gt: Vec<ObjectAnnotation>,
    pub pred: Vec<ObjectAnnotation>,
    /// Free-form asset-level key/value tags
    pub cks: BTreeMap<String, String>,
    /// Asset quality, `NO_QUALITY` when absent
    pub quality: f32,
}

impl AssetRecord {
    /// Annotations of one layer
    pub fn layer(&self, layer: AnnotationLayer) -> &[ObjectAnnotation] {
        match layer {
            AnnotationLayer::GroundTruth => &self.gt,
            AnnotationLayer::Prediction => &self.pred,
        }
    }

    pub fn has_quality(&self) -> bool {
        self.quality >= 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_polygon_area() {
        let square = [
            Point { x: 0, y: 0 },
            Point { x: 10, y: 0 },
            Point { x: 10, y: 10 },
            Point { x: 0, y: 10 },
        ];
        assert_eq!(polygon_area(&square), 100.0);
        assert_eq!(polygon_area(&square[..2]), 0.0);
    }

    #[test]
    fn test_confusion_matrix_codes() {
        for cm in [
            ConfusionMatrix::NotSet,
            ConfusionMatrix::Tp,
            ConfusionMatrix::Fp,
            ConfusionMatrix::Fn,
            ConfusionMatrix::Tn,
            ConfusionMatrix::Unknown,
            ConfusionMatrix::Mtp,
            ConfusionMatrix::Ignored,
        ] {
            assert_eq!(ConfusionMatrix::from_code(cm.code()), Some(cm));
        }
        assert_eq!(ConfusionMatrix::from_code(7), None);

        let json = serde_json::to_string(&ConfusionMatrix::Tp).unwrap();
        assert_eq!(json, "\"TP\"");
    }

    #[test]
    fn test_layer_names() {
        assert_eq!(AnnotationLayer::from_str("GT"), Some(AnnotationLayer::GroundTruth));
        assert_eq!(AnnotationLayer::from_str("pred"), Some(AnnotationLayer::Prediction));
        assert_eq!(AnnotationLayer::from_str("mask"), None);
        assert_eq!(
            serde_json::to_string(&AnnotationLayer::Prediction).unwrap(),
            "\"pred\""
        );
    }

    #[test]
    fn test_metadata_ratios() {
        let meta = AssetMetadata {
            width: 200,
            height: 100,
            ..Default::default()
        };
        assert_eq!(meta.area(), 20_000);
        assert_eq!(meta.hw_ratio(), Some(0.5));
        assert_eq!(AssetMetadata::default().hw_ratio(), None);
    }
}
