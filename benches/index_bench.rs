//! Benchmarks for snapshot decoding, projection, index building and queries
//!
//! Run with: cargo bench

use chrono::{TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use datalens::index::{AssetProjector, IndexStore, IndexStoreConfig};
use datalens::metrics::bucket::{boundaries, bucketize};
use datalens::model::{AssetMetadata, BoundingBox, ConfusionMatrix, DatasetRevision};
use datalens::query::{AssetFilter, QueryExecutor};
use datalens::snapshot::{
    decode_snapshot, encode_snapshot, ImageAnnotations, ImageCks, IndexSource, MetadataSnapshot,
    SnapshotObject,
};
use datalens::TimeUnit;
use tempfile::tempdir;

fn create_source(count: usize) -> IndexSource {
    let mut source = IndexSource::default();
    for i in 0..count {
        let id = format!("asset{:06}", i);
        source.metadatas.attributes.insert(
            id.clone(),
            AssetMetadata {
                width: 640 + (i % 7) as u32 * 64,
                height: 480,
                image_channels: 3,
                byte_size: 200_000 + i as u64 * 17,
                ..Default::default()
            },
        );

        let object = |class_id: i32, cm: ConfusionMatrix| SnapshotObject {
            bbox: BoundingBox {
                x: 10,
                y: 10,
                w: 32 + (i % 50) as i32,
                h: 24,
                rotate_angle: 0.0,
            },
            class_id,
            score: 0.8,
            anno_quality: 0.5,
            cm,
            ..Default::default()
        };

        source.annotations.ground_truth.image_annotations.insert(
            id.clone(),
            ImageAnnotations {
                boxes: vec![object((i % 5) as i32, ConfusionMatrix::Tp)],
            },
        );
        source.annotations.prediction.image_annotations.insert(
            id.clone(),
            ImageAnnotations {
                boxes: vec![
                    object((i % 5) as i32, ConfusionMatrix::Mtp),
                    object(((i + 1) % 5) as i32, ConfusionMatrix::Fp),
                ],
            },
        );
        source.annotations.image_cks.insert(
            id,
            ImageCks {
                cks: [("camera".to_string(), format!("cam{}", i % 4))].into_iter().collect(),
                image_quality: (i % 10) as f32 / 10.0,
            },
        );
    }
    source
}

fn bench_snapshot_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshot");

    for size in [1_000, 10_000] {
        let source = create_source(size);
        let bytes = encode_snapshot(&source.metadatas).unwrap();

        group.throughput(Throughput::Elements(size as u64));
        group.bench_function(format!("decode_metadatas_{}", size), |b| {
            b.iter(|| decode_snapshot::<MetadataSnapshot>(black_box(&bytes)).unwrap())
        });
    }

    group.finish();
}

fn bench_projection(c: &mut Criterion) {
    let mut group = c.benchmark_group("projection");

    let source = create_source(10_000);
    group.throughput(Throughput::Elements(10_000));
    group.bench_function("project_all_10000", |b| {
        b.iter(|| AssetProjector::new(black_box(&source)).project_all().unwrap())
    });

    group.finish();
}

fn bench_build_and_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("index");
    group.sample_size(10);

    let source = create_source(5_000);
    group.bench_function("build_index_5000", |b| {
        b.iter(|| {
            let dir = tempdir().unwrap();
            let store = IndexStore::open(IndexStoreConfig::new(dir.path().join("index.db"))).unwrap();
            let revision = DatasetRevision::new(dir.path(), "u", "r", "b", "t");
            store.build_index(&revision, &source).unwrap()
        })
    });

    let dir = tempdir().unwrap();
    let store = IndexStore::open(IndexStoreConfig::new(dir.path().join("index.db"))).unwrap();
    let revision = DatasetRevision::new(dir.path(), "u", "r", "b", "t");
    store.build_index(&revision, &source).unwrap();
    let executor = QueryExecutor::new(store);

    let filter = AssetFilter::builder()
        .class_ids([1, 3])
        .cks(["camera:cam2"])
        .anchor("asset002500")
        .limit(100)
        .build()
        .unwrap();
    group.bench_function("query_assets_5000", |b| {
        b.iter(|| executor.execute(&revision, black_box(&filter)).unwrap())
    });
    group.bench_function("dataset_stats_5000", |b| {
        b.iter(|| executor.dataset_stats(&revision, &[1, 2], true, true).unwrap())
    });

    group.finish();
}

fn bench_time_buckets(c: &mut Criterion) {
    let now = Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap();
    let bounds = boundaries(TimeUnit::Day, 30, now);
    let start = bounds[0].timestamp_millis();
    let timestamps: Vec<i64> = (0..100_000).map(|i| start + i * 25_000).collect();

    c.bench_function("bucketize_100000", |b| {
        b.iter(|| bucketize(&bounds, black_box(timestamps.iter().copied())))
    });
}

criterion_group!(
    benches,
    bench_snapshot_decode,
    bench_projection,
    bench_build_and_query,
    bench_time_buckets
);
criterion_main!(benches);
