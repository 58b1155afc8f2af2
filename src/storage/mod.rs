//! On-disk catalog layout and binary persistence.
//!
//! A catalog directory holds:
//! - `index.bin`: HNSW graph and raw vectors (see [`index_file`])
//! - `metadata.json`: per-product metadata sidecar (see [`metadata_file`])
//! - `config.yaml`: engine configuration
//! - `shopsense.lock`: advisory writer lock

pub mod index_file;
pub mod matrix_file;
pub mod metadata_file;

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::ann::IndexError;

pub const INDEX_FILE_NAME: &str = "index.bin";
pub const METADATA_FILE_NAME: &str = "metadata.json";
pub const CONFIG_FILE_NAME: &str = "config.yaml";

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid file format: {0}")]
    InvalidFormat(String),

    #[error("Version mismatch: file version {0}, supported version {1}")]
    VersionMismatch(u8, u8),

    #[error("Checksum mismatch: file may be corrupted")]
    ChecksumMismatch,

    #[error("Dimension mismatch: expected {expected}, file has {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Metadata sidecar error: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("Index rejected on load: {0}")]
    Index(#[from] IndexError),
}

/// A catalog directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct CatalogDir {
    base_dir: PathBuf,
}

impl CatalogDir {
    /// Open `base_dir`, creating it if missing.
    pub fn new(base_dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let base_dir = base_dir.into();
        std::fs::create_dir_all(&base_dir)?;
        Ok(CatalogDir { base_dir })
    }

    pub fn path(&self) -> &Path {
        &self.base_dir
    }

    pub fn join(&self, ident: &str) -> PathBuf {
        self.base_dir.join(ident)
    }

    pub fn index_path(&self) -> PathBuf {
        self.join(INDEX_FILE_NAME)
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.join(METADATA_FILE_NAME)
    }

    pub fn exists(&self, ident: &str) -> bool {
        std::fs::metadata(self.join(ident)).is_ok()
    }

    pub fn read(&self, ident: &str) -> std::io::Result<Vec<u8>> {
        std::fs::read(self.join(ident))
    }

    pub fn write(&self, ident: &str, data: &[u8]) -> std::io::Result<()> {
        write_atomic(&self.join(ident), data)
    }
}

/// Atomic write: temp file -> fsync -> rename. The temp file is removed on failure.
pub fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("data");
    let temp_path = path.with_file_name(format!(".{file_name}.{}.tmp", std::process::id()));

    let result = (|| {
        let mut file = File::create(&temp_path)?;
        file.write_all(data)?;
        file.flush()?;
        file.sync_all()?;
        std::fs::rename(&temp_path, path)
    })();

    if result.is_err() {
        let _ = std::fs::remove_file(&temp_path);
    }
    result
}

/// Little-endian cursor over an in-memory file body.
pub(crate) struct ByteReader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> ByteReader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    pub(crate) fn take(&mut self, len: usize) -> Result<&'a [u8], StorageError> {
        if self.remaining() < len {
            return Err(StorageError::InvalidFormat(format!(
                "unexpected end of data at offset {} (need {len} bytes)",
                self.offset
            )));
        }
        let slice = &self.data[self.offset..self.offset + len];
        self.offset += len;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], StorageError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub(crate) fn u8(&mut self) -> Result<u8, StorageError> {
        Ok(self.array::<1>()?[0])
    }

    pub(crate) fn u16(&mut self) -> Result<u16, StorageError> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    pub(crate) fn u32(&mut self) -> Result<u32, StorageError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    pub(crate) fn u64(&mut self) -> Result<u64, StorageError> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    pub(crate) fn f32(&mut self) -> Result<f32, StorageError> {
        Ok(f32::from_le_bytes(self.array()?))
    }
}

/// Split `data` into body and trailing CRC32, verifying the checksum.
pub(crate) fn split_checked(data: &[u8]) -> Result<&[u8], StorageError> {
    if data.len() < 4 {
        return Err(StorageError::InvalidFormat("file too short".to_string()));
    }
    let (body, trailer) = data.split_at(data.len() - 4);
    let stored = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
    if crc32fast::hash(body) != stored {
        return Err(StorageError::ChecksumMismatch);
    }
    Ok(body)
}
