//! Unit-normalized embedding vectors and the vector math shared by every stage.
//!
//! Similarity everywhere in the crate is the inner product, which equals cosine
//! similarity as long as both operands are unit vectors. [`Embedding`] keeps that
//! invariant checkable at the boundaries (insert, fuse, search).

use serde::{Deserialize, Serialize};

/// Maximum allowed deviation of the L2 norm from 1.0 for a vector to count as normalized.
pub const NORM_TOLERANCE: f32 = 1e-3;

/// Errors raised when a vector cannot be used as an embedding.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EmbeddingError {
    #[error("embedding is empty")]
    Empty,

    #[error("embedding has a non-finite component at position {0}")]
    NonFinite(usize),

    #[error("embedding has zero norm")]
    ZeroNorm,

    #[error("embedding is not unit-normalized (norm {0})")]
    NotNormalized(f32),

    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// A dense embedding vector.
///
/// Construction through [`Embedding::new`] does not normalize; use
/// [`Embedding::normalized`] or [`Embedding::unit`] when the invariant matters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding(Vec<f32>);

impl Embedding {
    /// Wrap raw values without checking them.
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    /// Normalize `values` to unit length.
    pub fn normalized(values: Vec<f32>) -> Result<Self, EmbeddingError> {
        Self(values).normalize()
    }

    /// Wrap values that must already be unit-normalized.
    pub fn unit(values: Vec<f32>) -> Result<Self, EmbeddingError> {
        let embedding = Self(values);
        embedding.check_unit()?;
        Ok(embedding)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<f32> {
        self.0
    }

    pub fn dimensions(&self) -> usize {
        self.0.len()
    }

    pub fn norm(&self) -> f32 {
        l2_norm(&self.0)
    }

    /// True when every component is finite and the norm is within [`NORM_TOLERANCE`] of 1.
    pub fn is_unit(&self) -> bool {
        self.check_unit().is_ok()
    }

    /// Inner product with another embedding.
    pub fn dot(&self, other: &Embedding) -> f32 {
        dot(&self.0, &other.0)
    }

    /// Return the unit-length version of this embedding.
    ///
    /// A vector that is already unit-normalized is returned untouched, so callers can
    /// rely on bit-for-bit passthrough of encoder output.
    pub fn normalize(self) -> Result<Self, EmbeddingError> {
        self.check_finite()?;
        let norm = self.norm();
        if norm < f32::EPSILON {
            return Err(EmbeddingError::ZeroNorm);
        }
        if (norm - 1.0).abs() <= NORM_TOLERANCE {
            return Ok(self);
        }
        Ok(Self(self.0.into_iter().map(|x| x / norm).collect()))
    }

    /// Check the embedding has exactly `dimensions` components.
    pub fn check_dimensions(&self, dimensions: usize) -> Result<(), EmbeddingError> {
        if self.0.len() != dimensions {
            return Err(EmbeddingError::DimensionMismatch {
                expected: dimensions,
                got: self.0.len(),
            });
        }
        Ok(())
    }

    /// Check the embedding is non-empty, finite and unit-normalized.
    pub fn check_unit(&self) -> Result<(), EmbeddingError> {
        self.check_finite()?;
        let norm = self.norm();
        if norm < f32::EPSILON {
            return Err(EmbeddingError::ZeroNorm);
        }
        if (norm - 1.0).abs() > NORM_TOLERANCE {
            return Err(EmbeddingError::NotNormalized(norm));
        }
        Ok(())
    }

    fn check_finite(&self) -> Result<(), EmbeddingError> {
        if self.0.is_empty() {
            return Err(EmbeddingError::Empty);
        }
        match self.0.iter().position(|x| !x.is_finite()) {
            Some(position) => Err(EmbeddingError::NonFinite(position)),
            None => Ok(()),
        }
    }
}

impl From<Embedding> for Vec<f32> {
    fn from(embedding: Embedding) -> Self {
        embedding.0
    }
}

impl AsRef<[f32]> for Embedding {
    fn as_ref(&self) -> &[f32] {
        &self.0
    }
}

/// Compute L2 norm of a vector.
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Inner product of two equally sized vectors.
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Cosine similarity that tolerates non-normalized input. Zero vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let norm_a = l2_norm(a);
    let norm_b = l2_norm(b);
    if norm_a < f32::EPSILON || norm_b < f32::EPSILON {
        return 0.0;
    }
    dot(a, b) / (norm_a * norm_b)
}
