//! Snapshot Loader
//!
//! Reads named snapshot files of one revision from the versioned object
//! store and decodes them. Stateless: nothing is cached, so every failure is
//! safe to retry.

use crate::model::DatasetRevision;
use crate::snapshot::error::{SnapshotError, SnapshotResult};
use crate::snapshot::format::decode_snapshot;
use crate::snapshot::types::{
    AnnotationSnapshot, ContextSnapshot, DatasetSnapshot, IndexSource, MetadataSnapshot,
    SnapshotKind, SnapshotPayload, TaskSnapshot,
};
use std::collections::HashSet;
use std::sync::Arc;

/// Read access to the versioned object store
pub trait ObjectStore: Send + Sync {
    /// Raw bytes of a named file in a revision
    ///
    /// Must distinguish a missing revision (`RevisionNotFound`) from a
    /// missing file inside an existing revision (`FileNotFound`).
    fn read_file(&self, revision: &DatasetRevision, name: &str) -> SnapshotResult<Vec<u8>>;
}

/// Object store laid out on the local filesystem:
/// `<root>/<user>/<repo>/<branch>@<task>/<name>.mir`
#[derive(Debug, Clone, Copy, Default)]
pub struct FsObjectStore;

impl ObjectStore for FsObjectStore {
    fn read_file(&self, revision: &DatasetRevision, name: &str) -> SnapshotResult<Vec<u8>> {
        if !revision.revision_dir().is_dir() {
            return Err(SnapshotError::RevisionNotFound(revision.to_string()));
        }

        match std::fs::read(revision.file_path(name)) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(SnapshotError::FileNotFound {
                    revision: revision.to_string(),
                    file: name.to_string(),
                })
            }
            Err(e) => Err(SnapshotError::Io(e)),
        }
    }
}

/// Decodes snapshot files of a revision
#[derive(Clone)]
pub struct SnapshotLoader {
    store: Arc<dyn ObjectStore>,
}

impl SnapshotLoader {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Loader over the local filesystem layout
    pub fn filesystem() -> Self {
        Self::new(Arc::new(FsObjectStore))
    }

    /// Read and decode one typed file
    pub fn read<T: SnapshotPayload>(&self, revision: &DatasetRevision) -> SnapshotResult<T> {
        let name = T::KIND.file_name();
        let bytes = self.store.read_file(revision, name)?;
        decode_snapshot(&bytes).map_err(|e| match e {
            SnapshotError::Decode(reason) => {
                SnapshotError::Decode(format!("{} ({}): {}", name, revision, reason))
            }
            other => other,
        })
    }

    /// Read and decode a set of named files
    pub fn load(
        &self,
        revision: &DatasetRevision,
        kinds: &[SnapshotKind],
    ) -> SnapshotResult<DatasetSnapshot> {
        let mut snapshot = DatasetSnapshot::default();
        let wanted: HashSet<SnapshotKind> = kinds.iter().copied().collect();

        for kind in wanted {
            match kind {
                SnapshotKind::Metadatas => snapshot.metadatas = Some(self.read(revision)?),
                SnapshotKind::Annotations => snapshot.annotations = Some(self.read(revision)?),
                SnapshotKind::Context => snapshot.context = Some(self.read(revision)?),
                SnapshotKind::Tasks => snapshot.tasks = Some(self.read(revision)?),
            }
        }

        tracing::debug!(revision = %revision, files = kinds.len(), "Loaded snapshot");
        Ok(snapshot)
    }

    /// Load everything the index build needs
    pub fn load_index_source(&self, revision: &DatasetRevision) -> SnapshotResult<IndexSource> {
        Ok(IndexSource {
            metadatas: self.read::<MetadataSnapshot>(revision)?,
            annotations: self.read::<AnnotationSnapshot>(revision)?,
            context: self.read::<ContextSnapshot>(revision)?,
        })
    }

    /// Asset ids of a revision, straight from its metadata file
    pub fn asset_ids(&self, revision: &DatasetRevision) -> SnapshotResult<Vec<String>> {
        let metadatas: MetadataSnapshot = self.read(revision)?;
        Ok(metadatas.attributes.into_keys().collect())
    }

    pub fn tasks(&self, revision: &DatasetRevision) -> SnapshotResult<TaskSnapshot> {
        self.read(revision)
    }

    pub fn context(&self, revision: &DatasetRevision) -> SnapshotResult<ContextSnapshot> {
        self.read(revision)
    }
}

impl Default for SnapshotLoader {
    fn default() -> Self {
        Self::filesystem()
    }
}
