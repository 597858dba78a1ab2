//! Index Store
//!
//! One SQLite database holds every revision's collection plus the shared
//! `index_metadata` table, which is the single authority for the
//! existence/readiness state machine:
//!
//! ```text
//!   absent ──claim──▶ building (exist=1, ready=0) ──mark ready──▶ ready (exist=1, ready=1)
//!      ▲                    │
//!      └──── rollback ──────┘   (any failure, timeout, drop_unready sweep)
//! ```
//!
//! Every call opens its own connection, so no lock is held across
//! revisions and nothing about the state is cached in-process.
//!
//! A claim stores a fresh token in the metadata row. Marking ready and
//! rolling back a failed build both match on that token, so a builder can
//! only ever finish or undo its own claim.

use crate::index::collection::Collection;
use crate::index::error::{IndexError, IndexResult};
use crate::index::histogram::{self, IndexHistograms};
use crate::index::projector::AssetProjector;
use crate::model::DatasetRevision;
use crate::snapshot::IndexSource;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Assets inserted per transaction during a build
pub const BUILD_BATCH_SIZE: usize = 1000;

/// VM instructions between deadline checks
const PROGRESS_CHECK_OPS: i32 = 64;

/// Index store configuration
#[derive(Debug, Clone)]
pub struct IndexStoreConfig {
    /// SQLite database file
    pub db_path: PathBuf,
    /// How long a connection waits on a locked database
    pub busy_timeout: Duration,
}

impl IndexStoreConfig {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            busy_timeout: Duration::from_millis(5000),
        }
    }
}

/// State of a revision's index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexStatus {
    Absent,
    Building,
    Ready,
}

impl IndexStatus {
    pub fn exist(&self) -> bool {
        !matches!(self, IndexStatus::Absent)
    }

    pub fn ready(&self) -> bool {
        matches!(self, IndexStatus::Ready)
    }
}

/// Persisted metadata record of one revision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMetadata {
    pub name: String,
    pub exist: bool,
    pub ready: bool,
    pub histograms: IndexHistograms,
    /// Last transition, unix ms
    pub updated_at: i64,
}

impl IndexMetadata {
    pub fn status(&self) -> IndexStatus {
        match (self.exist, self.ready) {
            (true, true) => IndexStatus::Ready,
            (true, false) => IndexStatus::Building,
            _ => IndexStatus::Absent,
        }
    }
}

/// Result of a `build_index` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildOutcome {
    /// This call claimed the revision and built it
    Built { assets: usize },
    /// Another build already exists (building or ready); nothing was written
    AlreadyExists,
}

/// Handle to the index database
///
/// Cheap to clone. A handle may carry a deadline, in which case every
/// statement it runs is interrupted once the deadline passes.
#[derive(Debug, Clone)]
pub struct IndexStore {
    config: Arc<IndexStoreConfig>,
    deadline: Option<Instant>,
}

impl IndexStore {
    /// Open (or create) the database and its metadata table
    pub fn open(config: IndexStoreConfig) -> IndexResult<Self> {
        if let Some(parent) = config.db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let store = Self {
            config: Arc::new(config),
            deadline: None,
        };

        let conn = store.connect_unbounded()?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS index_metadata (
                name TEXT PRIMARY KEY,
                exist INTEGER NOT NULL DEFAULT 0,
                ready INTEGER NOT NULL DEFAULT 0,
                asset_hist TEXT,
                gt_hist TEXT,
                pred_hist TEXT,
                claim TEXT,
                updated_at INTEGER NOT NULL
            );
            ",
        )?;
        add_claim_column(&conn)?;

        tracing::info!(path = %store.config.db_path.display(), "Opened index store");
        Ok(store)
    }

    /// Same store, with every statement bounded by `deadline`
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        Self {
            config: Arc::clone(&self.config),
            deadline: Some(deadline),
        }
    }

    pub fn config(&self) -> &IndexStoreConfig {
        &self.config
    }

    /// New connection honoring this handle's deadline
    pub(crate) fn connect(&self) -> IndexResult<Connection> {
        let conn = self.connect_unbounded()?;
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(IndexError::Timeout);
            }
            conn.progress_handler(
                PROGRESS_CHECK_OPS,
                Some(move || Instant::now() >= deadline),
            );
        }
        Ok(conn)
    }

    /// New connection without a deadline (rollback must always finish)
    fn connect_unbounded(&self) -> IndexResult<Connection> {
        let conn = Connection::open_with_flags(
            &self.config.db_path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(self.config.busy_timeout)?;
        conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
        Ok(conn)
    }

    /// Metadata record of a revision, if any
    pub fn metadata(&self, revision: &DatasetRevision) -> IndexResult<Option<IndexMetadata>> {
        let conn = self.connect()?;
        read_metadata(&conn, &revision.revision_key())
    }

    /// Current state of a revision's index
    pub fn index_status(&self, revision: &DatasetRevision) -> IndexResult<IndexStatus> {
        Ok(self
            .metadata(revision)?
            .map(|m| m.status())
            .unwrap_or(IndexStatus::Absent))
    }

    /// Readiness probe: read failures collapse into `Absent`
    pub fn check_index(&self, revision: &DatasetRevision) -> IndexStatus {
        match self.index_status(revision) {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!(revision = %revision, error = %e, "Index check failed, treating as absent");
                IndexStatus::Absent
            }
        }
    }

    /// Metadata of a ready index, `NotReady` otherwise
    pub fn require_ready(&self, revision: &DatasetRevision) -> IndexResult<IndexMetadata> {
        match self.metadata(revision)? {
            Some(meta) if meta.ready => Ok(meta),
            _ => Err(IndexError::NotReady(revision.revision_key())),
        }
    }

    /// Build a revision's index from its snapshot
    ///
    /// Exactly one concurrent caller claims the revision; everyone else gets
    /// `AlreadyExists`. On any failure the collection is dropped and the
    /// revision returns to absent before the error is returned.
    pub fn build_index(
        &self,
        revision: &DatasetRevision,
        source: &IndexSource,
    ) -> IndexResult<BuildOutcome> {
        self.build_with(revision, source.metadatas.attributes.len(), |conn, collection| {
            populate(conn, collection, source)
        })
    }

    /// Claim a revision, run `fill`, then mark the claim ready
    ///
    /// A panic inside `fill` is caught and treated as a failed build.
    fn build_with<F>(
        &self,
        revision: &DatasetRevision,
        assets: usize,
        fill: F,
    ) -> IndexResult<BuildOutcome>
    where
        F: FnOnce(&mut Connection, &Collection) -> IndexResult<(usize, IndexHistograms)>,
    {
        let collection = Collection::for_revision(revision);
        let mut conn = self.connect()?;

        let claim = uuid::Uuid::new_v4().to_string();
        if !try_claim(&conn, collection.name(), &claim)? {
            tracing::debug!(revision = %revision, "Index already exists, skipping build");
            return Ok(BuildOutcome::AlreadyExists);
        }

        tracing::info!(revision = %revision, assets, "Building index");
        let started = Instant::now();

        let filled = panic::catch_unwind(AssertUnwindSafe(|| fill(&mut conn, &collection)))
            .unwrap_or_else(|payload| Err(IndexError::BuildPanicked(panic_message(&*payload))));
        let result = filled.and_then(|(assets, histograms)| {
            mark_ready(&conn, collection.name(), &claim, &histograms)?;
            Ok(assets)
        });

        match result {
            Ok(assets) => {
                tracing::info!(
                    revision = %revision,
                    assets,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Index ready"
                );
                Ok(BuildOutcome::Built { assets })
            }
            Err(IndexError::ClaimLost(name)) => {
                tracing::warn!(revision = %revision, "Index build lost its claim");
                Err(IndexError::ClaimLost(name))
            }
            Err(e) => {
                tracing::error!(revision = %revision, error = %e, "Index build failed, rolling back");
                drop(conn);
                match self.rollback_claim(&collection, &claim) {
                    Ok(true) => {}
                    Ok(false) => {
                        tracing::warn!(revision = %revision, "Claim gone before rollback, left untouched")
                    }
                    Err(rollback_err) => tracing::error!(
                        revision = %revision,
                        error = %rollback_err,
                        "Rollback of failed index build failed"
                    ),
                }
                Err(e)
            }
        }
    }

    /// Undo a failed build, only while `claim` still owns the revision
    ///
    /// Returns whether anything was rolled back.
    fn rollback_claim(&self, collection: &Collection, claim: &str) -> IndexResult<bool> {
        let mut conn = self.connect_unbounded()?;
        let tx = conn.transaction()?;
        let owned = tx.execute(
            "DELETE FROM index_metadata WHERE name = ? AND claim = ? AND ready = 0",
            params![collection.name(), claim],
        )? == 1;
        if owned {
            collection.drop_all(&tx)?;
        }
        tx.commit()?;
        Ok(owned)
    }

    /// Drop the collection and forget the revision's metadata
    fn rollback(&self, collection: &Collection) -> IndexResult<()> {
        let mut conn = self.connect_unbounded()?;
        let tx = conn.transaction()?;
        collection.drop_all(&tx)?;
        tx.execute(
            "DELETE FROM index_metadata WHERE name = ?",
            params![collection.name()],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Explicitly drop a revision's index; returns whether it existed
    pub fn drop_index(&self, revision: &DatasetRevision) -> IndexResult<bool> {
        let collection = Collection::for_revision(revision);
        let existed = self.metadata(revision)?.is_some();
        self.rollback(&collection)?;
        if existed {
            tracing::info!(revision = %revision, "Dropped index");
        }
        Ok(existed)
    }

    /// Force every revision stuck in building back to absent
    ///
    /// Returns the collection names that were swept.
    pub fn drop_unready(&self) -> IndexResult<Vec<String>> {
        let names: Vec<String> = {
            let conn = self.connect()?;
            let mut stmt =
                conn.prepare("SELECT name FROM index_metadata WHERE exist = 1 AND ready = 0")?;
            let rows = stmt.query_map([], |row| row.get(0))?;
            rows.collect::<Result<_, _>>()?
        };

        for name in &names {
            self.rollback(&Collection::new(name.clone()))?;
            tracing::info!(collection = %name, "Dropped unready index");
        }

        Ok(names)
    }

    /// Number of documents in a revision's collection (0 if absent)
    pub fn document_count(&self, revision: &DatasetRevision) -> IndexResult<u64> {
        let collection = Collection::for_revision(revision);
        let conn = self.connect()?;
        if !collection.exists(&conn)? {
            return Ok(0);
        }
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", collection.assets_table()),
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Whether the revision's collection physically exists
    pub fn collection_exists(&self, revision: &DatasetRevision) -> IndexResult<bool> {
        let conn = self.connect()?;
        Ok(Collection::for_revision(revision).exists(&conn)?)
    }

    /// Number of known indexes; doubles as a connectivity check
    pub fn index_count(&self) -> IndexResult<u64> {
        let conn = self.connect()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM index_metadata", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Atomic upsert-or-noop on the metadata row; true if this caller won
fn try_claim(conn: &Connection, name: &str, claim: &str) -> IndexResult<bool> {
    let changed = conn.execute(
        "INSERT INTO index_metadata (name, exist, ready, claim, updated_at) VALUES (?, 1, 0, ?, ?)
         ON CONFLICT(name) DO NOTHING",
        params![name, claim, now_ms()],
    )?;
    Ok(changed == 1)
}

/// Databases created before claims were tracked lack the column
fn add_claim_column(conn: &Connection) -> IndexResult<()> {
    let present: i64 = conn.query_row(
        "SELECT COUNT(*) FROM pragma_table_info('index_metadata') WHERE name = 'claim'",
        [],
        |row| row.get(0),
    )?;
    if present == 0 {
        conn.execute_batch("ALTER TABLE index_metadata ADD COLUMN claim TEXT;")?;
    }
    Ok(())
}

/// Publish histograms and flip the revision to ready, if `claim` still owns it
fn mark_ready(
    conn: &Connection,
    name: &str,
    claim: &str,
    histograms: &IndexHistograms,
) -> IndexResult<()> {
    let changed = conn.execute(
        "UPDATE index_metadata
         SET ready = 1, asset_hist = ?, gt_hist = ?, pred_hist = ?, updated_at = ?
         WHERE name = ? AND claim = ? AND exist = 1 AND ready = 0",
        params![
            serde_json::to_string(&histograms.asset)?,
            serde_json::to_string(&histograms.gt)?,
            serde_json::to_string(&histograms.pred)?,
            now_ms(),
            name,
            claim,
        ],
    )?;
    if changed != 1 {
        return Err(IndexError::ClaimLost(name.to_string()));
    }
    Ok(())
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Create, fill and index the collection, then compute its histograms
fn populate(
    conn: &mut Connection,
    collection: &Collection,
    source: &IndexSource,
) -> IndexResult<(usize, IndexHistograms)> {
    collection.create(conn)?;

    let projector = AssetProjector::new(source);
    let ids = projector.asset_ids();

    for batch in ids.chunks(BUILD_BATCH_SIZE) {
        let tx = conn.transaction()?;
        for id in batch {
            let record = projector.project(id)?;
            let doc = serde_json::to_string(&record)?;
            collection.insert(&tx, &record, &doc)?;
        }
        tx.commit()?;
    }

    collection.create_indexes(conn)?;
    let histograms = histogram::compute_all(conn, collection)?;

    Ok((ids.len(), histograms))
}

fn read_metadata(conn: &Connection, name: &str) -> IndexResult<Option<IndexMetadata>> {
    let row = conn
        .query_row(
            "SELECT exist, ready, asset_hist, gt_hist, pred_hist, updated_at
             FROM index_metadata WHERE name = ?",
            params![name],
            |row| {
                Ok((
                    row.get::<_, bool>(0)?,
                    row.get::<_, bool>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, i64>(5)?,
                ))
            },
        )
        .optional()?;

    let Some((exist, ready, asset, gt, pred, updated_at)) = row else {
        return Ok(None);
    };

    let parse = |json: Option<String>| -> IndexResult<histogram::HistogramMap> {
        match json {
            Some(s) => Ok(serde_json::from_str(&s)?),
            None => Ok(Default::default()),
        }
    };

    Ok(Some(IndexMetadata {
        name: name.to_string(),
        exist,
        ready,
        histograms: IndexHistograms {
            asset: parse(asset)?,
            gt: parse(gt)?,
            pred: parse(pred)?,
        },
        updated_at,
    }))
}
