//! Query Executor
//!
//! Runs compiled filters and statistics against a ready collection.
//!
//! # Execution Pipeline
//!
//! ```text
//! AssetFilter → compile → Predicate → SQL fragment
//!                             │
//!          ┌──────────────────┴──────────────────┐
//!          ▼                                     ▼
//!   fused count (total, at-or-after anchor)   page (ORDER BY asset_id)
//! ```

use crate::index::collection::{Collection, CKS_LAYER};
use crate::index::IndexStore;
use crate::model::{AnnotationLayer, AssetRecord, DatasetRevision};
use crate::query::compiler::{compile, compile_page};
use crate::query::error::QueryResult;
use crate::query::filter::AssetFilter;
use crate::query::results::{AnnotationStats, QueryAssetsResult, QueryDatasetStatsResult, TagCounts};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection};
use std::collections::BTreeMap;
use std::time::Instant;

/// Query executor over the index store
#[derive(Debug, Clone)]
pub struct QueryExecutor {
    store: IndexStore,
}

impl QueryExecutor {
    pub fn new(store: IndexStore) -> Self {
        Self { store }
    }

    /// Filtered, anchored page of assets
    ///
    /// Fails with `NotReady` unless the revision's index is ready.
    pub fn execute(
        &self,
        revision: &DatasetRevision,
        filter: &AssetFilter,
    ) -> QueryResult<QueryAssetsResult> {
        let start = Instant::now();
        self.store.require_ready(revision)?;

        let collection = Collection::for_revision(revision);
        let conn = self.store.connect()?;

        let (total, at_or_after) = count(&conn, &collection, filter)?;
        let assets = if filter.limit == 0 {
            Vec::new()
        } else {
            page(&conn, &collection, filter)?
        };

        tracing::debug!(
            revision = %revision,
            total,
            returned = assets.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Executed asset query"
        );

        Ok(QueryAssetsResult {
            assets,
            anchor: total - at_or_after,
            total_assets_count: total,
        })
    }

    /// Counts, per-layer statistics and (optionally) stored histograms
    pub fn dataset_stats(
        &self,
        revision: &DatasetRevision,
        class_ids: &[i32],
        want_asset_hist: bool,
        want_anno_hist: bool,
    ) -> QueryResult<QueryDatasetStatsResult> {
        let meta = self.store.require_ready(revision)?;
        let collection = Collection::for_revision(revision);
        let conn = self.store.connect()?;

        let (total, bytes): (i64, i64) = conn.query_row(
            &format!(
                "SELECT COUNT(*), COALESCE(SUM(json_extract(doc, '$.metadata.byte_size')), 0) FROM {}",
                collection.assets_table()
            ),
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        let total = total as u64;

        let gt = layer_stats(&conn, &collection, AnnotationLayer::GroundTruth, class_ids, total)?;
        let pred = layer_stats(&conn, &collection, AnnotationLayer::Prediction, class_ids, total)?;
        let cks_count = tag_counts(&conn, &collection, CKS_LAYER)?;

        let index_status = meta.status();
        let histograms = meta.histograms;
        Ok(QueryDatasetStatsResult {
            total_assets_count: total,
            total_assets_bytes: bytes as u64,
            gt,
            pred,
            cks_count,
            asset_histograms: want_asset_hist.then_some(histograms.asset),
            gt_histograms: want_anno_hist.then_some(histograms.gt),
            pred_histograms: want_anno_hist.then_some(histograms.pred),
            index_status,
        })
    }
}

/// Total matches and matches at or after the anchor, in one statement
fn count(conn: &Connection, collection: &Collection, filter: &AssetFilter) -> QueryResult<(u64, u64)> {
    let fragment = compile(filter).to_sql(collection);
    let sql = format!(
        "SELECT COUNT(*), COALESCE(SUM(asset_id >= ?), 0) FROM {} WHERE {}",
        collection.assets_table(),
        fragment.sql
    );

    let anchor = Value::Text(filter.anchor_asset_id.clone().unwrap_or_default());
    let params = std::iter::once(anchor).chain(fragment.params);

    let mut stmt = conn.prepare_cached(&sql)?;
    let (total, at_or_after): (i64, i64) =
        stmt.query_row(params_from_iter(params), |row| Ok((row.get(0)?, row.get(1)?)))?;
    Ok((total as u64, at_or_after as u64))
}

fn page(conn: &Connection, collection: &Collection, filter: &AssetFilter) -> QueryResult<Vec<AssetRecord>> {
    let mut fragment = compile_page(filter).to_sql(collection);
    let sql = format!(
        "SELECT doc FROM {} WHERE {} ORDER BY asset_id LIMIT ? OFFSET ?",
        collection.assets_table(),
        fragment.sql
    );
    // offsets past i64::MAX saturate; a negative OFFSET would restart at 0
    fragment.params.push(Value::Integer(i64::try_from(filter.limit).unwrap_or(i64::MAX)));
    fragment.params.push(Value::Integer(i64::try_from(filter.offset).unwrap_or(i64::MAX)));

    let mut stmt = conn.prepare_cached(&sql)?;
    let docs = stmt.query_map(params_from_iter(fragment.params), |row| row.get::<_, String>(0))?;

    let mut assets = Vec::new();
    for doc in docs {
        assets.push(serde_json::from_str(&doc?)?);
    }
    Ok(assets)
}

fn class_clause(class_ids: &[i32], column: &str, params: &mut Vec<Value>) -> String {
    if class_ids.is_empty() {
        return String::new();
    }
    let marks: Vec<&str> = class_ids
        .iter()
        .map(|id| {
            params.push(Value::Integer(*id as i64));
            "?"
        })
        .collect();
    format!(" AND {} IN ({})", column, marks.join(", "))
}

fn layer_stats(
    conn: &Connection,
    collection: &Collection,
    layer: AnnotationLayer,
    class_ids: &[i32],
    total: u64,
) -> QueryResult<AnnotationStats> {
    let mut params = vec![Value::Text(layer.as_str().to_string())];
    let filter = class_clause(class_ids, "class_id", &mut params);

    let mut class_ids_count = BTreeMap::new();
    {
        let mut stmt = conn.prepare(&format!(
            "SELECT class_id, COUNT(DISTINCT asset_id) FROM {} WHERE layer = ?{} GROUP BY class_id",
            collection.classes_table(),
            filter
        ))?;
        let rows = stmt.query_map(params_from_iter(params.iter()), |row| {
            Ok((row.get::<_, i32>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (class_id, n) = row?;
            class_ids_count.insert(class_id, n as u64);
        }
    }

    let positive: i64 = conn.query_row(
        &format!(
            "SELECT COUNT(DISTINCT asset_id) FROM {} WHERE layer = ?{}",
            collection.classes_table(),
            filter
        ),
        params_from_iter(params.iter()),
        |row| row.get(0),
    )?;

    let mut anno_params = Vec::new();
    let anno_filter = class_clause(class_ids, "json_extract(item.value, '$.class_id')", &mut anno_params);
    let annos: i64 = conn.query_row(
        &format!(
            "SELECT COUNT(*) FROM {} AS a, json_each(a.doc, '$.{}') AS item WHERE 1{}",
            collection.assets_table(),
            layer.as_str(),
            anno_filter
        ),
        params_from_iter(anno_params),
        |row| row.get(0),
    )?;

    let positive = positive as u64;
    Ok(AnnotationStats {
        class_ids_count,
        positive_assets_count: positive,
        negative_assets_count: total.saturating_sub(positive),
        annos_count: annos as u64,
        tags_count: tag_counts(conn, collection, layer.as_str())?,
    })
}

fn tag_counts(conn: &Connection, collection: &Collection, layer: &str) -> QueryResult<TagCounts> {
    let mut stmt = conn.prepare(&format!(
        "SELECT key, value, COUNT(DISTINCT asset_id) FROM {} WHERE layer = ? GROUP BY key, value",
        collection.tags_table()
    ))?;
    let rows = stmt.query_map(params![layer], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, i64>(2)?,
        ))
    })?;

    let mut counts = TagCounts::new();
    for row in rows {
        let (key, value, n) = row?;
        counts.entry(key).or_default().insert(value, n as u64);
    }
    Ok(counts)
}
