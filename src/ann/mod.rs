//! Hierarchical Navigable Small World (HNSW) approximate nearest-neighbor index.
//!
//! Nodes live in an arena addressed by [`NodeId`]; each node keeps one adjacency list
//! per layer it participates in. Similarity is the inner product of unit vectors.
//! Removing or replacing a product tombstones its node: the node keeps routing
//! searches but is never returned as a hit.

pub mod graph;
pub mod insert;
pub mod search;
mod visited;

pub use graph::{HnswConfig, HnswIndex, IndexStats, Node};
pub use search::SearchHit;

use crate::embedding::EmbeddingError;

/// Dense node identifier inside one index.
pub type NodeId = u32;

/// Hard cap on sampled node levels.
pub const MAX_LEVEL: u8 = 16;

/// Errors that can occur during index operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Invalid embedding: {0}")]
    InvalidEmbedding(#[from] EmbeddingError),

    #[error("Invalid index configuration: {0}")]
    InvalidConfig(String),

    #[error("Corrupt index: {0}")]
    Corrupt(String),
}
