//! Pluggable text/image encoders.
//!
//! The retrieval core only depends on the [`Encoder`] trait. `ClipEncoder` (behind the
//! `clip` feature) wraps fastembed's CLIP ViT-B/32 models; [`BoundedEncoder`] puts a
//! deadline on any encoder.

mod bounded;
#[cfg(feature = "clip")]
mod clip;

pub use bounded::BoundedEncoder;
#[cfg(feature = "clip")]
pub use clip::{ClipEncoder, CLIP_DIMENSIONS, DEFAULT_CLIP_MODEL};

use std::time::Duration;

use crate::embedding::{Embedding, EmbeddingError};

/// Error type for encoder operations
#[derive(Debug, thiserror::Error)]
pub enum EncoderError {
    #[error("Model initialization failed: {0}")]
    InitFailed(String),

    #[error("Encoding failed: {0}")]
    EncodingFailed(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Encoder did not answer within {0:?}")]
    Timeout(Duration),

    #[error("Encoder returned an unusable embedding: {0}")]
    BadEmbedding(#[from] EmbeddingError),

    #[error("No encoder is configured")]
    Unavailable,

    #[error("{0} encoder calls are still running")]
    Busy(usize),
}

/// Turns raw query or catalog inputs into unit-normalized embeddings.
pub trait Encoder: Send + Sync {
    fn encode_text(&self, text: &str) -> Result<Embedding, EncoderError>;

    /// Encode an image from its encoded file bytes (JPEG, PNG, WebP, ...).
    fn encode_image(&self, image: &[u8]) -> Result<Embedding, EncoderError>;

    fn dimensions(&self) -> usize;

    fn model_name(&self) -> String;

    /// Stable identifier of the model, stored next to catalog embeddings.
    fn fingerprint(&self) -> String {
        fingerprint(&self.model_name(), self.dimensions())
    }
}

/// Hex SHA256 of the model name and output dimensions.
pub fn fingerprint(model_name: &str, dimensions: usize) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(model_name.as_bytes());
    hasher.update((dimensions as u64).to_le_bytes());
    let digest: [u8; 32] = hasher.finalize().into();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Normalize raw model output and check its size.
pub(crate) fn finish(raw: Vec<f32>, dimensions: usize) -> Result<Embedding, EncoderError> {
    let embedding = Embedding::normalized(raw)?;
    embedding.check_dimensions(dimensions)?;
    Ok(embedding)
}
