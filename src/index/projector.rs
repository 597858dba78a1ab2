//! Asset Projector
//!
//! Joins the decoded snapshot parts (metadata, ground truth, predictions,
//! cks tags, class names) into one denormalized `AssetRecord` per asset.
//!
//! Snapshot decoding already rejects zero-sized images. Sources assembled in
//! memory skip decoding, so projection checks again and fails the build.

use crate::index::error::{IndexError, IndexResult};
use crate::model::{
    polygon_area, AssetRecord, AssetType, ObjectAnnotation, NO_QUALITY,
};
use crate::snapshot::{IndexSource, SnapshotObject, TaskAnnotations};
use std::collections::{BTreeMap, BTreeSet};

/// Builds index documents from an `IndexSource`
pub struct AssetProjector<'a> {
    source: &'a IndexSource,
}

impl<'a> AssetProjector<'a> {
    pub fn new(source: &'a IndexSource) -> Self {
        Self { source }
    }

    /// Asset ids in insertion order (lexicographic)
    pub fn asset_ids(&self) -> Vec<&'a str> {
        self.source.sorted_asset_ids()
    }

    /// Project one asset
    pub fn project(&self, asset_id: &str) -> IndexResult<AssetRecord> {
        let metadata = self
            .source
            .metadatas
            .attributes
            .get(asset_id)
            .ok_or_else(|| IndexError::InvalidAsset {
                asset_id: asset_id.to_string(),
                reason: "no metadata".to_string(),
            })?;

        if metadata.asset_type == AssetType::Image && (metadata.width == 0 || metadata.height == 0)
        {
            return Err(IndexError::InvalidAsset {
                asset_id: asset_id.to_string(),
                reason: format!(
                    "non-positive image size {}x{}",
                    metadata.width, metadata.height
                ),
            });
        }

        let annotations = &self.source.annotations;
        let gt = self.project_layer(&annotations.ground_truth, asset_id);
        let pred = self.project_layer(&annotations.prediction, asset_id);

        let class_ids: Vec<i32> = gt
            .iter()
            .chain(pred.iter())
            .map(|a| a.class_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let (cks, quality) = match annotations.image_cks.get(asset_id) {
            Some(image_cks) => (
                image_cks
                    .cks
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
                image_cks.image_quality,
            ),
            None => (BTreeMap::new(), NO_QUALITY),
        };

        Ok(AssetRecord {
            asset_id: asset_id.to_string(),
            metadata: metadata.clone(),
            class_ids,
            gt,
            pred,
            cks,
            quality,
        })
    }

    /// Project every asset, in insertion order
    pub fn project_all(&self) -> IndexResult<Vec<AssetRecord>> {
        self.asset_ids()
            .into_iter()
            .map(|id| self.project(id))
            .collect()
    }

    fn project_layer(&self, layer: &TaskAnnotations, asset_id: &str) -> Vec<ObjectAnnotation> {
        layer
            .image_annotations
            .get(asset_id)
            .map(|image| {
                image
                    .boxes
                    .iter()
                    .map(|object| self.project_object(object))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn project_object(&self, object: &SnapshotObject) -> ObjectAnnotation {
        let area = match object.mask_area {
            Some(mask) => mask as f64,
            None if object.polygon.len() >= 3 => polygon_area(&object.polygon),
            None => object.bbox.w.max(0) as f64 * object.bbox.h.max(0) as f64,
        };

        ObjectAnnotation {
            index: object.index,
            bbox: object.bbox,
            polygon: object.polygon.clone(),
            class_id: object.class_id,
            class_name: self
                .source
                .context
                .class_names
                .get(&object.class_id)
                .cloned()
                .unwrap_or_default(),
            score: object.score,
            anno_quality: object.anno_quality,
            tags: object
                .tags
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            cm: object.cm,
            det_link_id: object.det_link_id,
            mask_area: object.mask_area,
            area,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AssetMetadata, BoundingBox, ConfusionMatrix, Point};
    use crate::snapshot::{ImageAnnotations, ImageCks};

    fn object(class_id: i32, w: i32, h: i32) -> SnapshotObject {
        SnapshotObject {
            bbox: BoundingBox {
                x: 0,
                y: 0,
                w,
                h,
                rotate_angle: 0.0,
            },
            class_id,
            cm: ConfusionMatrix::Tp,
            ..Default::default()
        }
    }

    fn source() -> IndexSource {
        let mut source = IndexSource::default();
        for id in ["b", "a"] {
            source.metadatas.attributes.insert(
                id.to_string(),
                AssetMetadata {
                    width: 100,
                    height: 50,
                    ..Default::default()
                },
            );
        }
        source.context.class_names.insert(1, "cat".to_string());
        source.annotations.ground_truth.image_annotations.insert(
            "a".to_string(),
            ImageAnnotations {
                boxes: vec![object(3, 10, 10), object(1, 4, 5)],
            },
        );
        source.annotations.prediction.image_annotations.insert(
            "a".to_string(),
            ImageAnnotations {
                boxes: vec![object(1, 2, 2)],
            },
        );
        let mut cks = ImageCks {
            image_quality: 0.7,
            ..Default::default()
        };
        cks.cks.insert("city".to_string(), "paris".to_string());
        source.annotations.image_cks.insert("a".to_string(), cks);
        source
    }

    #[test]
    fn test_project_joins_layers() {
        let source = source();
        let projector = AssetProjector::new(&source);
        let record = projector.project("a").unwrap();

        assert_eq!(record.class_ids, vec![1, 3]);
        assert_eq!(record.gt.len(), 2);
        assert_eq!(record.pred.len(), 1);
        assert_eq!(record.gt[1].class_name, "cat");
        assert_eq!(record.gt[0].class_name, "");
        assert_eq!(record.gt[1].area, 20.0);
        assert_eq!(record.cks.get("city").map(String::as_str), Some("paris"));
        assert_eq!(record.quality, 0.7);
    }

    #[test]
    fn test_missing_cks_means_no_quality() {
        let source = source();
        let record = AssetProjector::new(&source).project("b").unwrap();
        assert!(record.gt.is_empty());
        assert!(record.class_ids.is_empty());
        assert_eq!(record.quality, NO_QUALITY);
        assert!(!record.has_quality());
    }

    #[test]
    fn test_project_all_is_sorted() {
        let source = source();
        let records = AssetProjector::new(&source).project_all().unwrap();
        let ids: Vec<&str> = records.iter().map(|r| r.asset_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_zero_size_image_rejected() {
        let mut source = source();
        source
            .metadatas
            .attributes
            .get_mut("b")
            .unwrap()
            .height = 0;
        let result = AssetProjector::new(&source).project("b");
        assert!(matches!(result, Err(IndexError::InvalidAsset { asset_id, .. }) if asset_id == "b"));
    }

    #[test]
    fn test_polygon_and_mask_area() {
        let mut source = source();
        let mut poly = object(1, 100, 100);
        poly.polygon = vec![
            Point { x: 0, y: 0 },
            Point { x: 4, y: 0 },
            Point { x: 0, y: 3 },
        ];
        let mut mask = object(1, 100, 100);
        mask.mask_area = Some(42);
        source.annotations.prediction.image_annotations.insert(
            "b".to_string(),
            ImageAnnotations {
                boxes: vec![poly, mask],
            },
        );

        let record = AssetProjector::new(&source).project("b").unwrap();
        assert_eq!(record.pred[0].area, 6.0);
        assert_eq!(record.pred[1].area, 42.0);
    }
}
