//! Cross-modal product retrieval and ranking.
//!
//! Text and image query embeddings are fused into one vector, matched against an HNSW
//! index over the catalog, scored against the shopper's context, refined by a
//! lightweight cross-attention pass and diversified with MMR.

pub mod ann;
pub mod candidate;
pub mod catalog;
pub mod config;
pub mod embedding;
pub mod encoder;
pub mod error;
pub mod fusion;
pub mod linalg;
pub mod lock;
pub mod pipeline;
pub mod request_id;
pub mod rerank;
pub mod scoring;
pub mod storage;

#[cfg(test)]
mod tests;

pub use catalog::{Catalog, ProductId, ProductInput, ProductMetadata};
pub use config::Config;
pub use embedding::Embedding;
pub use error::{ErrorKind, RetrievalError};
pub use pipeline::{QueryContext, RawQuery, SearchPipeline, SearchResponse};
pub use scoring::ContextProfile;
