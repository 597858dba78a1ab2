//! Binary snapshot file format
//!
//! Layout:
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ HEADER (32 bytes)                       │
//! │   magic: [u8; 4] = "MIRS"               │
//! │   version: u16                          │
//! │   kind: u8                              │
//! │   compression: u8                       │
//! │   payload_len: u32                      │
//! │   payload_checksum: u32                 │
//! │   reserved: [u8; 12]                    │
//! │   header_checksum: u32                  │
//! ├─────────────────────────────────────────┤
//! │ PAYLOAD (payload_len bytes)             │
//! │   bincode record, LZ4 size-prepended    │
//! └─────────────────────────────────────────┘
//! ```

use crate::snapshot::error::{SnapshotError, SnapshotResult};
use crate::snapshot::types::{SnapshotKind, SnapshotPayload};
use std::path::Path;

/// Magic bytes for snapshot file identification
const SNAPSHOT_MAGIC: [u8; 4] = *b"MIRS";

/// Current snapshot format version
const SNAPSHOT_VERSION: u16 = 1;

/// Header size in bytes
pub const HEADER_SIZE: usize = 32;

/// Payload compression
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CompressionType {
    None = 0,
    Lz4 = 1,
}

impl TryFrom<u8> for CompressionType {
    type Error = SnapshotError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(CompressionType::None),
            1 => Ok(CompressionType::Lz4),
            _ => Err(SnapshotError::Decode(format!(
                "Unknown compression type: {}",
                value
            ))),
        }
    }
}

/// Snapshot file header
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotHeader {
    pub version: u16,
    pub kind: SnapshotKind,
    pub compression: CompressionType,
    pub payload_len: u32,
    pub payload_checksum: u32,
}

impl SnapshotHeader {
    /// Serialize header to bytes
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];

        buf[0..4].copy_from_slice(&SNAPSHOT_MAGIC);
        buf[4..6].copy_from_slice(&self.version.to_le_bytes());
        buf[6] = self.kind as u8;
        buf[7] = self.compression as u8;
        buf[8..12].copy_from_slice(&self.payload_len.to_le_bytes());
        buf[12..16].copy_from_slice(&self.payload_checksum.to_le_bytes());
        // bytes 16-27 reserved

        let checksum = crc32fast::hash(&buf[0..28]);
        buf[28..32].copy_from_slice(&checksum.to_le_bytes());

        buf
    }

    /// Parse header from bytes
    pub fn from_bytes(buf: &[u8]) -> SnapshotResult<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(SnapshotError::Decode(format!(
                "Truncated header: {} bytes",
                buf.len()
            )));
        }

        if buf[0..4] != SNAPSHOT_MAGIC {
            return Err(SnapshotError::Decode(format!(
                "Invalid magic: {:?}",
                &buf[0..4]
            )));
        }

        let stored_checksum = u32::from_le_bytes([buf[28], buf[29], buf[30], buf[31]]);
        let computed_checksum = crc32fast::hash(&buf[0..28]);
        if stored_checksum != computed_checksum {
            return Err(SnapshotError::Decode(format!(
                "Header checksum mismatch: stored={}, computed={}",
                stored_checksum, computed_checksum
            )));
        }

        let version = u16::from_le_bytes([buf[4], buf[5]]);
        if version > SNAPSHOT_VERSION {
            return Err(SnapshotError::Decode(format!(
                "Unsupported version: {}",
                version
            )));
        }

        let kind = SnapshotKind::try_from(buf[6])
            .map_err(|k| SnapshotError::Decode(format!("Unknown snapshot kind: {}", k)))?;
        let compression = CompressionType::try_from(buf[7])?;

        Ok(Self {
            version,
            kind,
            compression,
            payload_len: u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]),
            payload_checksum: u32::from_le_bytes([buf[12], buf[13], buf[14], buf[15]]),
        })
    }
}

/// Encode a payload into snapshot file bytes
pub fn encode_snapshot<T: SnapshotPayload>(payload: &T) -> SnapshotResult<Vec<u8>> {
    let serialized = bincode::serialize(payload)?;
    let compressed = lz4_flex::compress_prepend_size(&serialized);

    let header = SnapshotHeader {
        version: SNAPSHOT_VERSION,
        kind: T::KIND,
        compression: CompressionType::Lz4,
        payload_len: compressed.len() as u32,
        payload_checksum: crc32fast::hash(&compressed),
    };

    let mut bytes = Vec::with_capacity(HEADER_SIZE + compressed.len());
    bytes.extend_from_slice(&header.to_bytes());
    bytes.extend_from_slice(&compressed);
    Ok(bytes)
}

/// Decode snapshot file bytes into the expected payload type
pub fn decode_snapshot<T: SnapshotPayload>(bytes: &[u8]) -> SnapshotResult<T> {
    let header = SnapshotHeader::from_bytes(bytes)?;

    if header.kind != T::KIND {
        return Err(SnapshotError::Decode(format!(
            "Expected {} snapshot, found {}",
            T::KIND,
            header.kind
        )));
    }

    let payload = &bytes[HEADER_SIZE..];
    if payload.len() != header.payload_len as usize {
        return Err(SnapshotError::Decode(format!(
            "Payload length mismatch: header={}, actual={}",
            header.payload_len,
            payload.len()
        )));
    }

    let computed = crc32fast::hash(payload);
    if computed != header.payload_checksum {
        return Err(SnapshotError::Decode(format!(
            "Payload checksum mismatch: stored={}, computed={}",
            header.payload_checksum, computed
        )));
    }

    let record: T = match header.compression {
        CompressionType::Lz4 => {
            let decompressed = lz4_flex::decompress_size_prepended(payload)?;
            bincode::deserialize(&decompressed)?
        }
        CompressionType::None => bincode::deserialize(payload)?,
    };

    record.validate().map_err(SnapshotError::Decode)?;
    Ok(record)
}

/// Write a payload as a snapshot file, creating parent directories
pub fn write_snapshot_file<T: SnapshotPayload>(path: &Path, payload: &T) -> SnapshotResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, encode_snapshot(payload)?)?;
    Ok(())
}
