//! Fixture builders shared by unit tests

use crate::model::{AssetMetadata, BoundingBox, ConfusionMatrix, DatasetRevision};
use crate::snapshot::{
    write_snapshot_file, ImageAnnotations, ImageCks, IndexSource, LayerContext, ModelMeta, Task,
    TaskSnapshot, SnapshotObject,
};
use std::collections::HashMap;
use std::path::Path;

pub(crate) fn object(class_id: i32, cm: ConfusionMatrix, tags: &[(&str, &str)]) -> SnapshotObject {
    SnapshotObject {
        bbox: BoundingBox {
            x: 1,
            y: 1,
            w: 20,
            h: 10,
            rotate_angle: 0.0,
        },
        class_id,
        score: 0.9,
        anno_quality: 0.5,
        tags: tags
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        cm,
        ..Default::default()
    }
}

pub(crate) fn metadata(width: u32, height: u32, byte_size: u64) -> AssetMetadata {
    AssetMetadata {
        width,
        height,
        image_channels: 3,
        byte_size,
        ..Default::default()
    }
}

fn cks(pairs: &[(&str, &str)], quality: f32) -> ImageCks {
    ImageCks {
        cks: pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        image_quality: quality,
    }
}

/// Five assets covering every filter dimension:
///
/// | id | gt                     | pred                    | cks                 |
/// |----|------------------------|-------------------------|---------------------|
/// | a1 | 1 TP color=red         | 1 MTP                   | city=paris          |
/// | a2 | 2 FN                   |                         | city=london         |
/// | a3 |                        | 2 FP color=blue         | weather=rain        |
/// | a4 |                        |                         | (none)              |
/// | a5 | 3 TP                   | 3 MTP color=red         | city=paris, weather=sun |
pub(crate) fn sample_source() -> IndexSource {
    let mut source = IndexSource::default();
    for (i, id) in ["a1", "a2", "a3", "a4", "a5"].iter().enumerate() {
        source.metadatas.attributes.insert(
            id.to_string(),
            metadata(640, 480, (i as u64 + 1) * 1024 * 1024),
        );
    }

    let gt = &mut source.annotations.ground_truth;
    gt.task_id = "t1".to_string();
    gt.image_annotations.insert(
        "a1".to_string(),
        ImageAnnotations {
            boxes: vec![object(1, ConfusionMatrix::Tp, &[("color", "red")])],
        },
    );
    gt.image_annotations.insert(
        "a2".to_string(),
        ImageAnnotations {
            boxes: vec![object(2, ConfusionMatrix::Fn, &[])],
        },
    );
    gt.image_annotations.insert(
        "a5".to_string(),
        ImageAnnotations {
            boxes: vec![object(3, ConfusionMatrix::Tp, &[])],
        },
    );

    let pred = &mut source.annotations.prediction;
    pred.task_id = "t1".to_string();
    pred.image_annotations.insert(
        "a1".to_string(),
        ImageAnnotations {
            boxes: vec![object(1, ConfusionMatrix::Mtp, &[])],
        },
    );
    pred.image_annotations.insert(
        "a3".to_string(),
        ImageAnnotations {
            boxes: vec![object(2, ConfusionMatrix::Fp, &[("color", "blue")])],
        },
    );
    pred.image_annotations.insert(
        "a5".to_string(),
        ImageAnnotations {
            boxes: vec![object(3, ConfusionMatrix::Mtp, &[("color", "red")])],
        },
    );

    let image_cks = &mut source.annotations.image_cks;
    image_cks.insert("a1".to_string(), cks(&[("city", "paris")], 0.8));
    image_cks.insert("a2".to_string(), cks(&[("city", "london")], 0.3));
    image_cks.insert("a3".to_string(), cks(&[("weather", "rain")], 0.5));
    image_cks.insert(
        "a5".to_string(),
        cks(&[("city", "paris"), ("weather", "sun")], 0.95),
    );

    let context = &mut source.context;
    context.images_count = 5;
    context.total_asset_mbytes = 15;
    context.class_names = [(1, "cat"), (2, "dog"), (3, "bird")]
        .into_iter()
        .map(|(id, name)| (id, name.to_string()))
        .collect();
    context.gt = LayerContext {
        annos_count: 3,
        positive_assets_count: 3,
        negative_assets_count: 2,
        class_ids_count: [(1, 1), (2, 1), (3, 1)].into_iter().collect(),
        ..Default::default()
    };
    context.pred = LayerContext {
        annos_count: 3,
        positive_assets_count: 3,
        negative_assets_count: 2,
        class_ids_count: [(1, 1), (2, 1), (3, 1)].into_iter().collect(),
        ..Default::default()
    };

    source
}

/// `n` assets named `asset00000`.., each with one gt object of class `i % 3`
pub(crate) fn numbered_source(n: usize) -> IndexSource {
    let mut source = IndexSource::default();
    for i in 0..n {
        let id = format!("asset{:05}", i);
        source
            .metadatas
            .attributes
            .insert(id.clone(), metadata(100, 100, 1024));
        source.annotations.ground_truth.image_annotations.insert(
            id,
            ImageAnnotations {
                boxes: vec![object((i % 3) as i32, ConfusionMatrix::Tp, &[])],
            },
        );
    }
    source.context.images_count = n as u64;
    source
}

/// Task history whose head task carries a model
pub(crate) fn sample_tasks(task_id: &str) -> TaskSnapshot {
    let mut tasks = HashMap::new();
    tasks.insert(
        task_id.to_string(),
        Task {
            task_id: task_id.to_string(),
            name: "training".to_string(),
            task_type: "training".to_string(),
            timestamp: 1_700_000_000,
            model: Some(ModelMeta {
                model_hash: "m-hash".to_string(),
                mean_average_precision: 0.62,
                best_stage_name: "epoch_10".to_string(),
                ..Default::default()
            }),
        },
    );
    TaskSnapshot {
        tasks,
        head_task_id: task_id.to_string(),
    }
}

/// Write every snapshot file of a revision under `root`
pub(crate) fn write_revision(
    root: &Path,
    branch: &str,
    task: &str,
    source: &IndexSource,
) -> DatasetRevision {
    let revision = DatasetRevision::new(root, "u", "repo", branch, task);
    write_snapshot_file(&revision.file_path("metadatas"), &source.metadatas).unwrap();
    write_snapshot_file(&revision.file_path("annotations"), &source.annotations).unwrap();
    write_snapshot_file(&revision.file_path("context"), &source.context).unwrap();
    write_snapshot_file(&revision.file_path("tasks"), &sample_tasks(task)).unwrap();
    revision
}

/// Revision whose metadatas list exactly `ids`
pub(crate) fn write_ids(root: &Path, branch: &str, ids: &[&str]) -> DatasetRevision {
    let mut source = IndexSource::default();
    for id in ids {
        source
            .metadatas
            .attributes
            .insert(id.to_string(), metadata(10, 10, 10));
    }
    write_revision(root, branch, "t", &source)
}
