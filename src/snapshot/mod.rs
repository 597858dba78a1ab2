//! Snapshot Loader
//!
//! Decodes the binary files of an immutable dataset revision:
//!
//! - **types**: typed payload per file kind (metadatas, annotations, context, tasks)
//! - **format**: header + checksummed, LZ4-compressed bincode payload
//! - **loader**: object-store access and per-file decoding
//! - **error**: not-found vs. undecodable failures
//!
//! ```text
//! <root>/<user>/<repo>/<branch>@<task>/
//!     metadatas.mir  annotations.mir  context.mir  tasks.mir
//! ```

pub mod error;
pub mod format;
pub mod loader;
pub mod types;

pub use error::{SnapshotError, SnapshotResult};
pub use format::{decode_snapshot, encode_snapshot, write_snapshot_file, SnapshotHeader};
pub use loader::{FsObjectStore, ObjectStore, SnapshotLoader};
pub use types::{
    AnnotationSnapshot, ContextSnapshot, DatasetSnapshot, ImageAnnotations, ImageCks,
    IndexSource, LayerContext, MetadataSnapshot, ModelInfo, ModelMeta, ModelStage,
    SnapshotKind, SnapshotObject, SnapshotPayload, Task, TaskAnnotations, TaskSnapshot,
};
