//! JSON sidecar mapping product id to metadata.
//!
//! The sidecar is read independently of `index.bin`, so an index rebuild can reuse
//! metadata without re-deriving it from the source catalog.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{write_atomic, StorageError};
use crate::catalog::{ProductId, ProductMetadata};

pub const METADATA_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMetadata {
    pub version: u32,
    #[serde(default)]
    pub metadata: ProductMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataFile {
    pub format_version: u32,
    pub snapshot_version: u64,
    pub saved_at: DateTime<Utc>,
    pub dimensions: usize,
    /// Fingerprint of the encoder that produced the catalog embeddings, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoder_fingerprint: Option<String>,
    #[serde(default)]
    pub products: BTreeMap<ProductId, StoredMetadata>,
}

impl MetadataFile {
    pub fn new(snapshot_version: u64, dimensions: usize) -> Self {
        Self {
            format_version: METADATA_FORMAT_VERSION,
            snapshot_version,
            saved_at: Utc::now(),
            dimensions,
            encoder_fingerprint: None,
            products: BTreeMap::new(),
        }
    }
}

pub fn write_metadata(path: &Path, file: &MetadataFile) -> Result<(), StorageError> {
    let data = serde_json::to_vec_pretty(file)?;
    write_atomic(path, &data)?;
    Ok(())
}

pub fn read_metadata(path: &Path) -> Result<MetadataFile, StorageError> {
    let data = std::fs::read(path)?;
    let file: MetadataFile = serde_json::from_slice(&data)?;
    if file.format_version > METADATA_FORMAT_VERSION {
        return Err(StorageError::VersionMismatch(
            u8::try_from(file.format_version).unwrap_or(u8::MAX),
            METADATA_FORMAT_VERSION as u8,
        ));
    }
    Ok(file)
}
