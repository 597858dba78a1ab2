//! Physical layout of one revision's index collection
//!
//! A collection is a document table keyed by asset id plus three secondary
//! tables that make the multi-valued fields indexable:
//!
//! ```text
//! "<branch>@<task>"          asset_id PK, doc (JSON AssetRecord)
//! "<branch>@<task>/classes"  (asset_id, layer, class_id)        gt / pred
//! "<branch>@<task>/cm"       (asset_id, layer, cm)              gt / pred
//! "<branch>@<task>/tags"     (asset_id, layer, key, value)      cks / gt / pred
//! ```

use crate::model::{AnnotationLayer, AssetRecord, DatasetRevision};
use rusqlite::{params, Connection, OptionalExtension};

/// Layer name used for asset-level cks rows in the tags table
pub const CKS_LAYER: &str = "cks";

/// Quote an identifier for SQLite
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Table names of one revision's collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collection {
    name: String,
}

impl Collection {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn for_revision(revision: &DatasetRevision) -> Self {
        Self::new(revision.revision_key())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn assets_table(&self) -> String {
        quote_ident(&self.name)
    }

    pub fn classes_table(&self) -> String {
        self.child("classes")
    }

    pub fn cm_table(&self) -> String {
        self.child("cm")
    }

    pub fn tags_table(&self) -> String {
        self.child("tags")
    }

    fn child(&self, suffix: &str) -> String {
        quote_ident(&format!("{}/{}", self.name, suffix))
    }

    /// Create the document and secondary tables (no indexes yet)
    pub fn create(&self, conn: &Connection) -> rusqlite::Result<()> {
        conn.execute_batch(&format!(
            "
            CREATE TABLE IF NOT EXISTS {assets} (
                asset_id TEXT PRIMARY KEY,
                doc TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS {classes} (
                asset_id TEXT NOT NULL,
                layer TEXT NOT NULL,
                class_id INTEGER NOT NULL,
                PRIMARY KEY (asset_id, layer, class_id)
            );
            CREATE TABLE IF NOT EXISTS {cm} (
                asset_id TEXT NOT NULL,
                layer TEXT NOT NULL,
                cm INTEGER NOT NULL,
                PRIMARY KEY (asset_id, layer, cm)
            );
            CREATE TABLE IF NOT EXISTS {tags} (
                asset_id TEXT NOT NULL,
                layer TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                PRIMARY KEY (asset_id, layer, key, value)
            );
            ",
            assets = self.assets_table(),
            classes = self.classes_table(),
            cm = self.cm_table(),
            tags = self.tags_table(),
        ))
    }

    /// Build the secondary indexes used by filter queries
    pub fn create_indexes(&self, conn: &Connection) -> rusqlite::Result<()> {
        conn.execute_batch(&format!(
            "
            CREATE INDEX IF NOT EXISTS {idx_class} ON {classes} (class_id, layer);
            CREATE INDEX IF NOT EXISTS {idx_cm} ON {cm} (cm, layer);
            CREATE INDEX IF NOT EXISTS {idx_tags} ON {tags} (layer, key, value);
            ",
            idx_class = quote_ident(&format!("{}/idx_class", self.name)),
            idx_cm = quote_ident(&format!("{}/idx_cm", self.name)),
            idx_tags = quote_ident(&format!("{}/idx_tags", self.name)),
            classes = self.classes_table(),
            cm = self.cm_table(),
            tags = self.tags_table(),
        ))
    }

    /// Drop every table of the collection
    pub fn drop_all(&self, conn: &Connection) -> rusqlite::Result<()> {
        conn.execute_batch(&format!(
            "
            DROP TABLE IF EXISTS {assets};
            DROP TABLE IF EXISTS {classes};
            DROP TABLE IF EXISTS {cm};
            DROP TABLE IF EXISTS {tags};
            ",
            assets = self.assets_table(),
            classes = self.classes_table(),
            cm = self.cm_table(),
            tags = self.tags_table(),
        ))
    }

    /// Whether the document table physically exists
    pub fn exists(&self, conn: &Connection) -> rusqlite::Result<bool> {
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?",
                params![self.name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Insert one asset document and its secondary rows
    pub fn insert(&self, conn: &Connection, record: &AssetRecord, doc: &str) -> rusqlite::Result<()> {
        let mut stmt = conn.prepare_cached(&format!(
            "INSERT INTO {} (asset_id, doc) VALUES (?, ?)",
            self.assets_table()
        ))?;
        stmt.execute(params![record.asset_id, doc])?;

        let mut class_stmt = conn.prepare_cached(&format!(
            "INSERT OR IGNORE INTO {} (asset_id, layer, class_id) VALUES (?, ?, ?)",
            self.classes_table()
        ))?;
        let mut cm_stmt = conn.prepare_cached(&format!(
            "INSERT OR IGNORE INTO {} (asset_id, layer, cm) VALUES (?, ?, ?)",
            self.cm_table()
        ))?;
        let mut tag_stmt = conn.prepare_cached(&format!(
            "INSERT OR IGNORE INTO {} (asset_id, layer, key, value) VALUES (?, ?, ?, ?)",
            self.tags_table()
        ))?;

        for layer in AnnotationLayer::all() {
            for anno in record.layer(*layer) {
                class_stmt.execute(params![record.asset_id, layer.as_str(), anno.class_id])?;
                cm_stmt.execute(params![record.asset_id, layer.as_str(), anno.cm.code()])?;
                for (key, value) in &anno.tags {
                    tag_stmt.execute(params![record.asset_id, layer.as_str(), key, value])?;
                }
            }
        }

        for (key, value) in &record.cks {
            tag_stmt.execute(params![record.asset_id, CKS_LAYER, key, value])?;
        }

        Ok(())
    }
}
