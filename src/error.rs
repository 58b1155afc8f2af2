//! Crate-level error taxonomy.
//!
//! Module errors (`IndexError`, `StorageError`, `EncoderError`, `ConfigError`) convert
//! into [`RetrievalError`], which is what the pipeline hands back to callers.

use serde::Serialize;

use crate::ann::IndexError;
use crate::config::ConfigError;
use crate::embedding::EmbeddingError;
use crate::encoder::EncoderError;
use crate::pipeline::Stage;
use crate::storage::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("invalid embedding: {0}")]
    InvalidEmbedding(String),

    #[error("index is not loaded")]
    IndexNotLoaded,

    #[error("encoding failed: {0}")]
    EncodingFailed(#[from] EncoderError),

    #[error("latency budget exceeded after {stage} stage ({elapsed_ms}ms > {budget_ms}ms)")]
    Timeout {
        stage: Stage,
        elapsed_ms: u64,
        budget_ms: u64,
    },

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Discriminant of [`RetrievalError`] exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidQuery,
    DimensionMismatch,
    InvalidEmbedding,
    IndexNotLoaded,
    EncodingFailed,
    Timeout,
    Storage,
    Config,
    Internal,
}

/// Structured error handed to the surrounding application.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub message: String,
}

impl RetrievalError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RetrievalError::InvalidQuery(_) => ErrorKind::InvalidQuery,
            RetrievalError::DimensionMismatch { .. } => ErrorKind::DimensionMismatch,
            RetrievalError::InvalidEmbedding(_) => ErrorKind::InvalidEmbedding,
            RetrievalError::IndexNotLoaded => ErrorKind::IndexNotLoaded,
            RetrievalError::EncodingFailed(_) => ErrorKind::EncodingFailed,
            RetrievalError::Timeout { .. } => ErrorKind::Timeout,
            RetrievalError::Storage(_) => ErrorKind::Storage,
            RetrievalError::Config(_) => ErrorKind::Config,
            RetrievalError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            kind: self.kind(),
            message: self.to_string(),
        }
    }
}

impl From<EmbeddingError> for RetrievalError {
    fn from(err: EmbeddingError) -> Self {
        match err {
            EmbeddingError::DimensionMismatch { expected, got } => {
                RetrievalError::DimensionMismatch { expected, got }
            }
            other => RetrievalError::InvalidEmbedding(other.to_string()),
        }
    }
}

impl From<IndexError> for RetrievalError {
    fn from(err: IndexError) -> Self {
        match err {
            IndexError::DimensionMismatch { expected, got } => {
                RetrievalError::DimensionMismatch { expected, got }
            }
            IndexError::InvalidEmbedding(inner) => {
                RetrievalError::InvalidEmbedding(inner.to_string())
            }
            IndexError::InvalidConfig(msg) => RetrievalError::Config(ConfigError::Invalid(msg)),
            IndexError::Corrupt(msg) => RetrievalError::Internal(format!("corrupt index: {msg}")),
        }
    }
}
