//! Metrics Store
//!
//! One append-only table per metrics group, keyed by the caller's event id:
//!
//! ```text
//! "metrics/<group>"   id PK, user_id, project_id, create_time (unix ms), doc (JSON)
//! ```
//!
//! Queries are always scoped to one user and optionally to events whose
//! `class_ids` intersect a requested set.

use crate::index::collection::quote_ident;
use crate::index::IndexStore;
use crate::metrics::bucket::{self, TimeUnit};
use crate::metrics::error::{MetricsError, MetricsResult};
use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// Top-N size of count-bucketed queries when the caller gives none
pub const DEFAULT_TOP_N: usize = 5;

/// Window length of time-bucketed queries when the caller gives none
pub const DEFAULT_TIME_WINDOW: usize = 7;

/// How query results are bucketed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BucketMode {
    /// Group by distinct field value, top N by count
    Count,
    /// Calendar buckets over a timestamp field
    Time,
}

/// A metrics query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsQuery {
    pub user_id: String,
    #[serde(default)]
    pub class_ids: Vec<i32>,
    pub field: String,
    pub mode: BucketMode,
    /// Required in time mode: `day`, `week` or `month`
    #[serde(default)]
    pub unit: Option<String>,
    /// Top N (count mode) or window length (time mode)
    #[serde(default)]
    pub limit: Option<usize>,
}

/// One `(legend, count)` point of a metrics query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsPoint {
    pub legend: String,
    pub count: u64,
}

/// Metrics recorded in the index database
#[derive(Debug, Clone)]
pub struct MetricsStore {
    store: IndexStore,
    default_top_n: usize,
}

impl MetricsStore {
    pub fn new(store: IndexStore) -> Self {
        Self {
            store,
            default_top_n: DEFAULT_TOP_N,
        }
    }

    pub fn with_default_top_n(mut self, n: usize) -> Self {
        self.default_top_n = n;
        self
    }

    /// Upsert one event; returns its id
    ///
    /// Re-recording an id overwrites the previous event.
    pub fn record(&self, group: &str, event: JsonValue) -> MetricsResult<String> {
        let table = group_table(group)?;
        let JsonValue::Object(mut event) = event else {
            return Err(MetricsError::InvalidEvent("event must be a JSON object".to_string()));
        };

        let id = required_key(&event, "id")?;
        let user_id = required_key(&event, "user_id")?;
        let project_id = match event.get("project_id") {
            Some(v) => Some(key_string(v, "project_id")?),
            None => None,
        };
        if let Some(class_ids) = event.get("class_ids") {
            let valid = class_ids
                .as_array()
                .map(|ids| ids.iter().all(JsonValue::is_i64))
                .unwrap_or(false);
            if !valid {
                return Err(MetricsError::InvalidEvent(
                    "class_ids must be a list of integers".to_string(),
                ));
            }
        }

        let create_time = match event.get("create_time") {
            Some(value) => normalize_time(value)?,
            None => Utc::now().timestamp_millis(),
        };
        event.insert("create_time".to_string(), JsonValue::from(create_time));

        let doc = serde_json::to_string(&event)?;
        let conn = self.store.connect()?;
        ensure_table(&conn, &table)?;
        conn.execute(
            &format!(
                "INSERT INTO {} (id, user_id, project_id, create_time, doc) VALUES (?, ?, ?, ?, ?)
                 ON CONFLICT(id) DO UPDATE SET
                     user_id = excluded.user_id,
                     project_id = excluded.project_id,
                     create_time = excluded.create_time,
                     doc = excluded.doc",
                table
            ),
            params![id, user_id, project_id, create_time, doc],
        )?;

        tracing::debug!(group, id = %id, "Recorded metric");
        Ok(id)
    }

    /// Run a query relative to the current time
    pub fn query(&self, group: &str, query: &MetricsQuery) -> MetricsResult<Vec<MetricsPoint>> {
        self.query_at(group, query, Utc::now())
    }

    /// Run a query relative to `now`
    pub fn query_at(
        &self,
        group: &str,
        query: &MetricsQuery,
        now: DateTime<Utc>,
    ) -> MetricsResult<Vec<MetricsPoint>> {
        let table = group_table(group)?;
        validate_field(&query.field)?;

        let unit = match query.mode {
            BucketMode::Time => Some(
                query
                    .unit
                    .as_deref()
                    .unwrap_or_default()
                    .parse::<TimeUnit>()?,
            ),
            BucketMode::Count => None,
        };

        let conn = self.store.connect()?;
        let exists = table_exists(&conn, &table)?;

        match unit {
            Some(unit) => {
                let window = query.limit.unwrap_or(DEFAULT_TIME_WINDOW);
                let bounds = bucket::boundaries(unit, window, now);
                let timestamps = if exists && !bounds.is_empty() {
                    self.timestamps(&conn, &table, query, bounds[0].timestamp_millis())?
                } else {
                    Vec::new()
                };
                let counts = bucket::bucketize(&bounds, timestamps);
                Ok(bounds
                    .iter()
                    .zip(counts)
                    .map(|(b, count)| MetricsPoint {
                        legend: unit.label(*b),
                        count,
                    })
                    .collect())
            }
            None if !exists => Ok(Vec::new()),
            None => {
                let limit = query.limit.unwrap_or(self.default_top_n);
                self.top_values(&conn, &table, query, limit)
            }
        }
    }

    fn top_values(
        &self,
        conn: &Connection,
        table: &str,
        query: &MetricsQuery,
        limit: usize,
    ) -> MetricsResult<Vec<MetricsPoint>> {
        let mut params = vec![Value::Text(query.user_id.clone())];
        let class_filter = class_clause(&query.class_ids, &mut params);
        params.push(Value::Integer(limit as i64));

        let sql = format!(
            "SELECT e.value, COUNT(*) AS n
             FROM {table} AS m, json_each(m.doc, '$.{field}') AS e
             WHERE m.user_id = ?{class_filter}
             GROUP BY e.value
             ORDER BY n DESC, e.value
             LIMIT ?",
            table = table,
            field = query.field,
            class_filter = class_filter,
        );

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(params), |row| {
            Ok((row.get::<_, Value>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut points = Vec::new();
        for row in rows {
            let (value, n) = row?;
            points.push(MetricsPoint {
                legend: legend(value),
                count: n as u64,
            });
        }
        Ok(points)
    }

    fn timestamps(
        &self,
        conn: &Connection,
        table: &str,
        query: &MetricsQuery,
        since_ms: i64,
    ) -> MetricsResult<Vec<i64>> {
        let mut params = vec![Value::Text(query.user_id.clone())];
        let class_filter = class_clause(&query.class_ids, &mut params);
        params.push(Value::Integer(since_ms));

        let sql = format!(
            "SELECT CAST(json_extract(m.doc, '$.{field}') AS INTEGER)
             FROM {table} AS m
             WHERE m.user_id = ?{class_filter}
               AND json_type(m.doc, '$.{field}') IN ('integer', 'real')
               AND json_extract(m.doc, '$.{field}') >= ?",
            table = table,
            field = query.field,
            class_filter = class_filter,
        );

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(params), |row| row.get::<_, i64>(0))?;
        Ok(rows.collect::<Result<_, _>>()?)
    }
}

/// Quoted table name of a group, validating the name
fn group_table(group: &str) -> MetricsResult<String> {
    let valid = !group.is_empty()
        && group
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if !valid {
        return Err(MetricsError::InvalidGroup(group.to_string()));
    }
    Ok(quote_ident(&format!("metrics/{}", group)))
}

fn validate_field(field: &str) -> MetricsResult<()> {
    let valid = !field.is_empty() && field.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(MetricsError::InvalidField(field.to_string()))
    }
}

fn ensure_table(conn: &Connection, table: &str) -> MetricsResult<()> {
    let index = quote_ident(&format!("{}/idx_user_time", table.trim_matches('"')));
    conn.execute_batch(&format!(
        "
        CREATE TABLE IF NOT EXISTS {table} (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            project_id TEXT,
            create_time INTEGER NOT NULL,
            doc TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS {index} ON {table} (user_id, create_time);
        ",
        table = table,
        index = index,
    ))?;
    Ok(())
}

fn table_exists(conn: &Connection, quoted: &str) -> MetricsResult<bool> {
    let name = quoted.trim_matches('"').replace("\"\"", "\"");
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?",
            params![name],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

fn class_clause(class_ids: &[i32], params: &mut Vec<Value>) -> String {
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
    format!(
        " AND EXISTS (SELECT 1 FROM json_each(m.doc, '$.class_ids') AS c WHERE c.value IN ({}))",
        marks.join(", ")
    )
}

fn key_string(value: &JsonValue, field: &str) -> MetricsResult<String> {
    match value {
        JsonValue::String(s) if !s.is_empty() => Ok(s.clone()),
        JsonValue::Number(n) => Ok(n.to_string()),
        _ => Err(MetricsError::InvalidEvent(format!(
            "{} must be a non-empty string or a number",
            field
        ))),
    }
}

fn required_key(event: &Map<String, JsonValue>, field: &str) -> MetricsResult<String> {
    match event.get(field) {
        Some(value) => key_string(value, field),
        None => Err(MetricsError::InvalidEvent(format!("missing {}", field))),
    }
}

/// Unix ms from an integer (ms), a float (seconds) or an RFC 3339 string
fn normalize_time(value: &JsonValue) -> MetricsResult<i64> {
    if let Some(ms) = value.as_i64() {
        return Ok(ms);
    }
    if let Some(secs) = value.as_f64() {
        return Ok((secs * 1000.0).round() as i64);
    }
    if let Some(s) = value.as_str() {
        return DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.timestamp_millis())
            .map_err(|e| MetricsError::InvalidEvent(format!("create_time '{}': {}", s, e)));
    }
    Err(MetricsError::InvalidEvent(
        "create_time must be a number or an RFC 3339 string".to_string(),
    ))
}

fn legend(value: Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Real(f) => f.to_string(),
        Value::Text(s) => s,
        Value::Blob(b) => String::from_utf8_lossy(&b).into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexStoreConfig;
    use chrono::{Duration, TimeZone};
    use serde_json::json;
    use tempfile::{tempdir, TempDir};

    fn metrics() -> (TempDir, MetricsStore) {
        let dir = tempdir().unwrap();
        let store = IndexStore::open(IndexStoreConfig::new(dir.path().join("index.db"))).unwrap();
        (dir, MetricsStore::new(store))
    }

    fn count_query(field: &str) -> MetricsQuery {
        MetricsQuery {
            user_id: "u1".to_string(),
            class_ids: vec![],
            field: field.to_string(),
            mode: BucketMode::Count,
            unit: None,
            limit: None,
        }
    }

    fn time_query(unit: &str, limit: usize) -> MetricsQuery {
        MetricsQuery {
            mode: BucketMode::Time,
            unit: Some(unit.to_string()),
            limit: Some(limit),
            ..count_query("create_time")
        }
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let (_dir, metrics) = metrics();
        let event = json!({"id": "e1", "user_id": "u1", "class_ids": [1, 2], "kind": "train"});
        metrics.record("tasks", event.clone()).unwrap();
        metrics.record("tasks", event).unwrap();
        metrics
            .record("tasks", json!({"id": "e1", "user_id": "u1", "class_ids": [3], "kind": "mine"}))
            .unwrap();

        let points = metrics.query("tasks", &count_query("kind")).unwrap();
        assert_eq!(points, vec![MetricsPoint { legend: "mine".into(), count: 1 }]);
    }

    #[test]
    fn test_top_n_flattens_lists() {
        let (_dir, metrics) = metrics();
        let events = [
            json!({"id": 1, "user_id": "u1", "class_ids": [1, 2]}),
            json!({"id": 2, "user_id": "u1", "class_ids": [2, 3]}),
            json!({"id": 3, "user_id": "u1", "class_ids": [2]}),
            json!({"id": 4, "user_id": "u1", "class_ids": [3]}),
            json!({"id": 5, "user_id": "u2", "class_ids": [9, 9, 9]}),
        ];
        for event in events {
            metrics.record("models", event).unwrap();
        }

        let mut query = count_query("class_ids");
        query.limit = Some(2);
        let points = metrics.query("models", &query).unwrap();
        assert_eq!(
            points,
            vec![
                MetricsPoint { legend: "2".into(), count: 3 },
                MetricsPoint { legend: "3".into(), count: 2 },
            ]
        );

        let mut query = count_query("class_ids");
        query.class_ids = vec![1];
        let points = metrics.query("models", &query).unwrap();
        assert_eq!(points.len(), 2);
        assert!(points.iter().all(|p| p.count == 1));
    }

    #[test]
    fn test_time_buckets_are_complete() {
        let (_dir, metrics) = metrics();
        let now = Utc.with_ymd_and_hms(2024, 3, 7, 12, 0, 0).unwrap();
        for (i, days_ago) in [0i64, 0, 2, 6, 30].iter().enumerate() {
            let at = now - Duration::days(*days_ago);
            metrics
                .record(
                    "tasks",
                    json!({"id": i, "user_id": "u1", "create_time": at.to_rfc3339()}),
                )
                .unwrap();
        }

        let points = metrics.query_at("tasks", &time_query("day", 7), now).unwrap();
        assert_eq!(points.len(), 7);
        assert_eq!(points[0].legend, "2024-03-01");
        assert_eq!(points[6].legend, "2024-03-07");
        let counts: Vec<u64> = points.iter().map(|p| p.count).collect();
        assert_eq!(counts, vec![1, 0, 0, 0, 1, 0, 2]);
    }

    #[test]
    fn test_time_formats_normalize() {
        let (_dir, metrics) = metrics();
        let now = Utc.with_ymd_and_hms(2024, 3, 7, 12, 0, 0).unwrap();
        metrics
            .record("g", json!({"id": "a", "user_id": "u1", "create_time": now.timestamp_millis()}))
            .unwrap();
        metrics
            .record("g", json!({"id": "b", "user_id": "u1", "create_time": now.timestamp() as f64 + 0.5}))
            .unwrap();

        let points = metrics.query_at("g", &time_query("week", 2), now).unwrap();
        assert_eq!(points[0].legend, "2024-02-26");
        assert_eq!(points[1].legend, "2024-03-04");
        assert_eq!(points[1].count, 2);
    }

    #[test]
    fn test_invalid_unit_and_names() {
        let (_dir, metrics) = metrics();
        let result = metrics.query("tasks", &time_query("year", 3));
        assert!(matches!(result, Err(MetricsError::InvalidUnit(_))));

        let result = metrics.query("bad group", &count_query("kind"));
        assert!(matches!(result, Err(MetricsError::InvalidGroup(_))));

        let result = metrics.query("tasks", &count_query("kind') --"));
        assert!(matches!(result, Err(MetricsError::InvalidField(_))));

        let result = metrics.record("tasks", json!({"user_id": "u1"}));
        assert!(matches!(result, Err(MetricsError::InvalidEvent(_))));
    }

    #[test]
    fn test_missing_group_is_empty() {
        let (_dir, metrics) = metrics();
        assert!(metrics.query("nothing", &count_query("kind")).unwrap().is_empty());

        let points = metrics.query("nothing", &time_query("month", 4)).unwrap();
        assert_eq!(points.len(), 4);
        assert!(points.iter().all(|p| p.count == 0));
    }
}
