//! Binary storage for the HNSW index.
//!
//! File format: index.bin (little-endian)
//!
//! Header (29 bytes):
//! - magic: [u8; 4] (`SSHN`)
//! - version: u8 (1)
//! - dimensions: u32
//! - m: u16
//! - ef_construction: u32
//! - node_count: u64
//! - entry_point: u32 (`u32::MAX` when the index is empty)
//! - max_level: u8
//! - checksum: u32 (CRC32 of the header fields before it)
//!
//! Body:
//! - vectors: [f32; node_count * dimensions]
//! - nodes (repeated node_count times):
//!   - product_id: u16 length + UTF-8 bytes
//!   - product_version: u32
//!   - tombstone: u8
//!   - level: u8
//!   - per layer 0..=level: neighbor_count u16, then [u32; neighbor_count]
//!
//! Trailer:
//! - checksum: u32 (CRC32 of the body)

use std::path::Path;

use super::{split_checked, write_atomic, ByteReader, StorageError};
use crate::ann::{HnswConfig, HnswIndex, Node, NodeId};
use crate::catalog::ProductId;

const MAGIC: &[u8; 4] = b"SSHN";

/// Current file format version
const FORMAT_VERSION: u8 = 1;

/// magic(4) + version(1) + dimensions(4) + m(2) + ef_construction(4) + node_count(8)
/// + entry_point(4) + max_level(1)
const HEADER_FIELDS: usize = 28;

const NO_ENTRY: u32 = u32::MAX;

/// Serialize `index` into its file representation.
pub fn encode(index: &HnswIndex) -> Result<Vec<u8>, StorageError> {
    let config = index.config();
    let mut out = Vec::with_capacity(HEADER_FIELDS + 4 + index.vectors().len() * 4);

    out.extend_from_slice(MAGIC);
    out.push(FORMAT_VERSION);
    out.extend_from_slice(&to_u32(config.dimensions, "dimensions")?.to_le_bytes());
    out.extend_from_slice(&(config.m as u16).to_le_bytes());
    out.extend_from_slice(&to_u32(config.ef_construction, "ef_construction")?.to_le_bytes());
    out.extend_from_slice(&(index.node_count() as u64).to_le_bytes());
    out.extend_from_slice(&index.entry_point().unwrap_or(NO_ENTRY).to_le_bytes());
    out.push(index.max_level());
    let header_checksum = crc32fast::hash(&out);
    out.extend_from_slice(&header_checksum.to_le_bytes());

    let body_start = out.len();
    for &value in index.vectors() {
        out.extend_from_slice(&value.to_le_bytes());
    }
    for node in index.nodes() {
        let id = node.product_id().as_bytes();
        let id_len = u16::try_from(id.len()).map_err(|_| {
            StorageError::InvalidFormat(format!("product id longer than {} bytes", u16::MAX))
        })?;
        out.extend_from_slice(&id_len.to_le_bytes());
        out.extend_from_slice(id);
        out.extend_from_slice(&node.version().to_le_bytes());
        out.push(node.is_tombstone() as u8);
        out.push(node.level());
        for layer in 0..=node.level() as usize {
            let neighbors = node.neighbors(layer);
            out.extend_from_slice(&(neighbors.len() as u16).to_le_bytes());
            for &neighbor in neighbors {
                out.extend_from_slice(&neighbor.to_le_bytes());
            }
        }
    }
    let body_checksum = crc32fast::hash(&out[body_start..]);
    out.extend_from_slice(&body_checksum.to_le_bytes());

    Ok(out)
}

/// Parse a file representation back into an index.
///
/// Graph parameters (dimensions, M, efConstruction) come from the file; `expected`
/// supplies the dimensions the caller requires plus efSearch and the RNG seed.
pub fn decode(data: &[u8], expected: &HnswConfig) -> Result<HnswIndex, StorageError> {
    if data.len() < HEADER_FIELDS + 4 {
        return Err(StorageError::InvalidFormat("file too short for header".to_string()));
    }
    let (header_bytes, body_bytes) = data.split_at(HEADER_FIELDS + 4);
    if &header_bytes[0..4] != MAGIC {
        return Err(StorageError::InvalidFormat("bad magic".to_string()));
    }
    let version = header_bytes[4];
    if version > FORMAT_VERSION {
        return Err(StorageError::VersionMismatch(version, FORMAT_VERSION));
    }
    let header_fields = split_checked(header_bytes)?;

    let mut header = ByteReader::new(&header_fields[5..]);
    let dimensions = header.u32()? as usize;
    let m = header.u16()? as usize;
    let ef_construction = header.u32()? as usize;
    let node_count = header.u64()? as usize;
    let entry_point = header.u32()?;
    let max_level = header.u8()?;

    if dimensions != expected.dimensions {
        return Err(StorageError::DimensionMismatch {
            expected: expected.dimensions,
            got: dimensions,
        });
    }
    if m != expected.m || ef_construction != expected.ef_construction {
        log::warn!(
            "index_file: file built with m={m} ef_construction={ef_construction}, config has m={} ef_construction={}; using file values",
            expected.m,
            expected.ef_construction
        );
    }

    let body = split_checked(body_bytes)?;
    let mut reader = ByteReader::new(body);

    let vector_floats = node_count
        .checked_mul(dimensions)
        .filter(|n| n.saturating_mul(4) <= reader.remaining())
        .ok_or_else(|| StorageError::InvalidFormat("vector block exceeds file size".to_string()))?;
    let mut vectors = Vec::with_capacity(vector_floats);
    for _ in 0..vector_floats {
        vectors.push(reader.f32()?);
    }

    let mut nodes = Vec::with_capacity(node_count.min(reader.remaining()));
    for _ in 0..node_count {
        nodes.push(read_node(&mut reader)?);
    }
    if reader.remaining() != 0 {
        return Err(StorageError::InvalidFormat(format!(
            "{} trailing bytes after node table",
            reader.remaining()
        )));
    }

    let config = HnswConfig {
        dimensions,
        m,
        ef_construction,
        ef_search: expected.ef_search,
        seed: expected.seed,
    };
    let entry_point = (entry_point != NO_ENTRY).then_some(entry_point);
    Ok(HnswIndex::from_parts(config, vectors, nodes, entry_point, max_level)?)
}

fn read_node(reader: &mut ByteReader<'_>) -> Result<Node, StorageError> {
    let id_len = reader.u16()? as usize;
    let id = std::str::from_utf8(reader.take(id_len)?)
        .map_err(|e| StorageError::InvalidFormat(format!("product id is not UTF-8: {e}")))?;
    let version = reader.u32()?;
    let tombstone = match reader.u8()? {
        0 => false,
        1 => true,
        other => {
            return Err(StorageError::InvalidFormat(format!("bad tombstone flag {other}")))
        }
    };
    let level = reader.u8()? as usize;

    let mut neighbors = Vec::with_capacity(level + 1);
    for _ in 0..=level {
        let count = reader.u16()? as usize;
        let mut layer: Vec<NodeId> = Vec::with_capacity(count);
        for _ in 0..count {
            layer.push(reader.u32()?);
        }
        neighbors.push(layer);
    }

    Ok(Node::from_parts(ProductId::from(id), version, tombstone, neighbors))
}

/// Save `index` to `path` atomically.
pub fn write_index(path: &Path, index: &HnswIndex) -> Result<(), StorageError> {
    let data = encode(index)?;
    write_atomic(path, &data)?;
    log::debug!(
        "index_file: wrote {} nodes ({} bytes) to {}",
        index.node_count(),
        data.len(),
        path.display()
    );
    Ok(())
}

/// Load an index from `path`.
pub fn read_index(path: &Path, expected: &HnswConfig) -> Result<HnswIndex, StorageError> {
    let data = std::fs::read(path)?;
    decode(&data, expected)
}

fn to_u32(value: usize, field: &str) -> Result<u32, StorageError> {
    u32::try_from(value)
        .map_err(|_| StorageError::InvalidFormat(format!("{field} {value} does not fit in u32")))
}
