//! Binary storage for fixed projection matrices.
//!
//! File format (little-endian):
//! - magic: [u8; 4] (`SSMX`)
//! - rows: u32
//! - cols: u32
//! - data: [f32; rows * cols], row-major
//! - checksum: u32 (CRC32 of everything before it)

use std::path::Path;

use super::{split_checked, write_atomic, ByteReader, StorageError};
use crate::linalg::Matrix;

const MAGIC: &[u8; 4] = b"SSMX";

pub fn encode(matrix: &Matrix) -> Vec<u8> {
    let mut out = Vec::with_capacity(16 + matrix.data().len() * 4);
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&(matrix.rows() as u32).to_le_bytes());
    out.extend_from_slice(&(matrix.cols() as u32).to_le_bytes());
    for &value in matrix.data() {
        out.extend_from_slice(&value.to_le_bytes());
    }
    let checksum = crc32fast::hash(&out);
    out.extend_from_slice(&checksum.to_le_bytes());
    out
}

pub fn decode(data: &[u8]) -> Result<Matrix, StorageError> {
    let body = split_checked(data)?;
    let mut reader = ByteReader::new(body);
    if reader.take(4)? != MAGIC {
        return Err(StorageError::InvalidFormat("bad matrix magic".to_string()));
    }
    let rows = reader.u32()? as usize;
    let cols = reader.u32()? as usize;
    let len = rows
        .checked_mul(cols)
        .filter(|n| n.saturating_mul(4) == reader.remaining())
        .ok_or_else(|| {
            StorageError::InvalidFormat(format!("matrix {rows}x{cols} does not match file size"))
        })?;

    let mut values = Vec::with_capacity(len);
    for _ in 0..len {
        let value = reader.f32()?;
        if !value.is_finite() {
            return Err(StorageError::InvalidFormat("matrix has non-finite entries".to_string()));
        }
        values.push(value);
    }
    Matrix::new(rows, cols, values).map_err(|e| StorageError::InvalidFormat(e.to_string()))
}

pub fn write_matrix(path: &Path, matrix: &Matrix) -> Result<(), StorageError> {
    write_atomic(path, &encode(matrix))?;
    Ok(())
}

pub fn read_matrix(path: &Path) -> Result<Matrix, StorageError> {
    let data = std::fs::read(path)?;
    decode(&data)
}
