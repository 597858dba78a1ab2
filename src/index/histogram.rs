//! Histogram Engine
//!
//! Fixed bucket schemas evaluated against a revision's collection at build
//! time. Bucketing happens inside SQLite: every value is mapped to the index
//! of the boundary it falls in (`b[i] <= v < b[i+1]`), with a synthetic
//! upper bound appended so the last declared boundary is an open bucket.
//! The sparse `(bucket, count)` rows are then densified against the schema.

use crate::index::collection::Collection;
use crate::index::error::IndexResult;
use crate::model::AnnotationLayer;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Upper bound appended after the last declared boundary
pub const OPEN_UPPER_BOUND: f64 = 1e18;

/// One `(boundary, count)` pair of a computed histogram
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistogramBucket {
    pub x: f64,
    pub y: u64,
}

/// Computed histograms of one schema set, by schema name
pub type HistogramMap = BTreeMap<String, Vec<HistogramBucket>>;

/// The three histogram sets persisted with a ready index
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexHistograms {
    pub asset: HistogramMap,
    pub gt: HistogramMap,
    pub pred: HistogramMap,
}

/// A named bucket schema
#[derive(Debug, Clone)]
pub struct HistogramSchema {
    pub name: &'static str,
    /// SQL expression; `a.doc` is the asset document, `item.value` the
    /// flattened element when `flatten` is set
    pub expr: &'static str,
    /// Ascending lower bucket boundaries
    pub boundaries: Vec<f64>,
    /// Source field is multi-valued and must be flattened first
    pub flatten: bool,
}

impl HistogramSchema {
    fn new(name: &'static str, expr: &'static str, boundaries: Vec<f64>, flatten: bool) -> Self {
        Self {
            name,
            expr,
            boundaries,
            flatten,
        }
    }

    /// `CASE` expression mapping a value to its bucket index
    fn bucket_case(&self, value: &str) -> String {
        let mut bounds = self.boundaries.clone();
        bounds.push(OPEN_UPPER_BOUND);

        let arms: Vec<String> = bounds
            .windows(2)
            .enumerate()
            .map(|(i, w)| format!("WHEN {v} >= {:?} AND {v} < {:?} THEN {i}", w[0], w[1], v = value))
            .collect();
        format!("CASE {} END", arms.join(" "))
    }
}

fn steps(start: f64, step: f64, count: usize) -> Vec<f64> {
    // Rounded to keep labels like 0.3 instead of 0.30000000000000004
    (0..count)
        .map(|i| ((start + step * i as f64) * 1e6).round() / 1e6)
        .collect()
}

/// Asset-level schemas
pub fn asset_schemas() -> Vec<HistogramSchema> {
    let mut counts = steps(0.0, 1.0, 11);
    counts.extend([15.0, 20.0, 50.0]);

    vec![
        HistogramSchema::new(
            "quality",
            "json_extract(a.doc, '$.quality')",
            steps(0.0, 0.1, 11),
            false,
        ),
        HistogramSchema::new(
            "bytes",
            "json_extract(a.doc, '$.metadata.byte_size') / 1048576.0",
            vec![0.0, 0.5, 1.0, 2.0, 4.0, 8.0, 16.0],
            false,
        ),
        HistogramSchema::new(
            "area",
            "json_extract(a.doc, '$.metadata.width') * json_extract(a.doc, '$.metadata.height')",
            vec![0.0, 1e5, 2e5, 5e5, 1e6, 2e6, 5e6],
            false,
        ),
        HistogramSchema::new(
            "hw_ratio",
            "CAST(json_extract(a.doc, '$.metadata.height') AS REAL) / json_extract(a.doc, '$.metadata.width')",
            steps(0.0, 0.5, 7),
            false,
        ),
        HistogramSchema::new(
            "gt_count",
            "json_array_length(a.doc, '$.gt')",
            counts.clone(),
            false,
        ),
        HistogramSchema::new(
            "pred_count",
            "json_array_length(a.doc, '$.pred')",
            counts,
            false,
        ),
    ]
}

/// Annotation-level schemas, applied to each layer independently
pub fn annotation_schemas() -> Vec<HistogramSchema> {
    let mut areas = vec![0.0];
    areas.extend((1..=10).map(|p| 4f64.powi(p)));

    vec![
        HistogramSchema::new(
            "quality",
            "json_extract(item.value, '$.anno_quality')",
            steps(0.0, 0.1, 11),
            true,
        ),
        HistogramSchema::new("area", "json_extract(item.value, '$.area')", areas, true),
        HistogramSchema::new(
            "area_ratio",
            "CAST(json_extract(item.value, '$.bbox.w') * json_extract(item.value, '$.bbox.h') AS REAL) \
             / (json_extract(a.doc, '$.metadata.width') * json_extract(a.doc, '$.metadata.height'))",
            steps(0.0, 0.1, 11),
            true,
        ),
        HistogramSchema::new(
            "hw_ratio",
            "CAST(json_extract(item.value, '$.bbox.h') AS REAL) / json_extract(item.value, '$.bbox.w')",
            steps(0.0, 0.5, 7),
            true,
        ),
    ]
}

/// Fill a sparse `bucket -> count` map into one pair per declared boundary
pub fn densify(schema: &HistogramSchema, sparse: &HashMap<usize, u64>) -> Vec<HistogramBucket> {
    schema
        .boundaries
        .iter()
        .enumerate()
        .map(|(i, &x)| HistogramBucket {
            x,
            y: sparse.get(&i).copied().unwrap_or(0),
        })
        .collect()
}

/// Evaluate one schema against a collection
///
/// `layer` selects the array flattened for annotation schemas.
pub fn compute(
    conn: &Connection,
    collection: &Collection,
    schema: &HistogramSchema,
    layer: Option<AnnotationLayer>,
) -> IndexResult<Vec<HistogramBucket>> {
    let source = match (schema.flatten, layer) {
        (true, Some(layer)) => format!(
            "{} AS a, json_each(a.doc, {}) AS item",
            collection.assets_table(),
            quote_literal(&format!("$.{}", layer.as_str()))
        ),
        _ => format!("{} AS a", collection.assets_table()),
    };

    let sql = format!(
        "SELECT bucket, COUNT(*) FROM (
             SELECT {case} AS bucket FROM (SELECT {expr} AS v FROM {source})
         ) WHERE bucket IS NOT NULL GROUP BY bucket",
        case = schema.bucket_case("v"),
        expr = schema.expr,
        source = source,
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, i64>(0)? as usize, row.get::<_, i64>(1)? as u64))
    })?;

    let mut sparse = HashMap::new();
    for row in rows {
        let (bucket, count) = row?;
        sparse.insert(bucket, count);
    }

    Ok(densify(schema, &sparse))
}

fn compute_set(
    conn: &Connection,
    collection: &Collection,
    schemas: &[HistogramSchema],
    layer: Option<AnnotationLayer>,
) -> IndexResult<HistogramMap> {
    schemas
        .iter()
        .map(|schema| Ok((schema.name.to_string(), compute(conn, collection, schema, layer)?)))
        .collect()
}

/// Compute all three histogram sets of a collection
pub fn compute_all(conn: &Connection, collection: &Collection) -> IndexResult<IndexHistograms> {
    let annotation = annotation_schemas();
    Ok(IndexHistograms {
        asset: compute_set(conn, collection, &asset_schemas(), None)?,
        gt: compute_set(conn, collection, &annotation, Some(AnnotationLayer::GroundTruth))?,
        pred: compute_set(conn, collection, &annotation, Some(AnnotationLayer::Prediction))?,
    })
}

fn quote_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}
