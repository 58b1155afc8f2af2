//! Multi-modal fusion of text and image embeddings into one query vector.
//!
//! The image weight α controls the balance for the weighted strategy:
//! - α=0.0: text only
//! - α=0.5: equal weight
//! - α=1.0: image only
//!
//! A request carrying a single modality bypasses fusion entirely and gets that
//! embedding back unchanged.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, FusionConfig};
use crate::embedding::{Embedding, EmbeddingError};
use crate::error::RetrievalError;
use crate::linalg::Matrix;
use crate::storage::matrix_file;

/// Default image weight for query fusion.
pub const DEFAULT_ALPHA: f32 = 0.5;

/// Image weight used when combining a product's own image and text embeddings at ingest.
pub const DEFAULT_CATALOG_ALPHA: f32 = 0.7;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FusionStrategy {
    #[default]
    WeightedAverage,
    Concatenation,
    Hadamard,
}

/// Combines text and image embeddings according to one configured strategy.
#[derive(Debug, Clone)]
pub struct FusionEngine {
    strategy: FusionStrategy,
    dimensions: usize,
    /// D×2D projection applied to `[image ⊕ text]`, present only for concatenation.
    projection: Option<Arc<Matrix>>,
}

impl FusionEngine {
    pub fn weighted_average(dimensions: usize) -> Self {
        Self {
            strategy: FusionStrategy::WeightedAverage,
            dimensions,
            projection: None,
        }
    }

    pub fn hadamard(dimensions: usize) -> Self {
        Self {
            strategy: FusionStrategy::Hadamard,
            dimensions,
            projection: None,
        }
    }

    /// Concatenation-then-projection with a fixed D×2D matrix.
    pub fn concatenation(dimensions: usize, projection: Matrix) -> Result<Self, RetrievalError> {
        if projection.rows() != dimensions || projection.cols() != 2 * dimensions {
            return Err(RetrievalError::DimensionMismatch {
                expected: dimensions * 2 * dimensions,
                got: projection.rows() * projection.cols(),
            });
        }
        Ok(Self {
            strategy: FusionStrategy::Concatenation,
            dimensions,
            projection: Some(Arc::new(projection)),
        })
    }

    /// Build the engine described by `config`, resolving a relative projection path
    /// against `base_path`.
    pub fn from_config(
        config: &FusionConfig,
        dimensions: usize,
        base_path: &Path,
    ) -> Result<Self, RetrievalError> {
        match config.strategy {
            FusionStrategy::WeightedAverage => Ok(Self::weighted_average(dimensions)),
            FusionStrategy::Hadamard => Ok(Self::hadamard(dimensions)),
            FusionStrategy::Concatenation => {
                let path = config.projection_path.as_ref().ok_or_else(|| {
                    ConfigError::Invalid(
                        "fusion.strategy is concatenation but fusion.projection_path is not set"
                            .to_string(),
                    )
                })?;
                let matrix = matrix_file::read_matrix(&base_path.join(path))?;
                Self::concatenation(dimensions, matrix)
            }
        }
    }

    pub fn strategy(&self) -> FusionStrategy {
        self.strategy
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Fuse an optional text and an optional image embedding.
    ///
    /// `alpha` is the image weight; values outside [0,1] are clamped.
    pub fn fuse(
        &self,
        text: Option<&Embedding>,
        image: Option<&Embedding>,
        alpha: f32,
    ) -> Result<Embedding, RetrievalError> {
        let (text, image) = match (text, image) {
            (None, None) => {
                return Err(RetrievalError::InvalidQuery(
                    "query has neither a text nor an image embedding".to_string(),
                ))
            }
            (Some(single), None) | (None, Some(single)) => {
                single.check_dimensions(self.dimensions)?;
                return Ok(single.clone().normalize()?);
            }
            (Some(text), Some(image)) => (text, image),
        };

        if text.dimensions() != image.dimensions() {
            return Err(RetrievalError::DimensionMismatch {
                expected: text.dimensions(),
                got: image.dimensions(),
            });
        }
        text.check_dimensions(self.dimensions)?;

        if alpha.is_nan() {
            return Err(RetrievalError::InvalidQuery("fusion weight is NaN".to_string()));
        }
        let alpha = if (0.0..=1.0).contains(&alpha) {
            alpha
        } else {
            let clamped = alpha.clamp(0.0, 1.0);
            log::warn!("fusion: alpha={alpha} outside [0,1], clamped to {clamped}");
            clamped
        };

        let raw = match self.strategy {
            FusionStrategy::WeightedAverage => image
                .as_slice()
                .iter()
                .zip(text.as_slice())
                .map(|(i, t)| alpha * i + (1.0 - alpha) * t)
                .collect::<Vec<f32>>(),
            FusionStrategy::Hadamard => image
                .as_slice()
                .iter()
                .zip(text.as_slice())
                .map(|(i, t)| i * t)
                .collect(),
            FusionStrategy::Concatenation => {
                let projection = self.projection.as_ref().ok_or_else(|| {
                    RetrievalError::Internal("concatenation fusion without projection".to_string())
                })?;
                let mut stacked = Vec::with_capacity(2 * self.dimensions);
                stacked.extend_from_slice(image.as_slice());
                stacked.extend_from_slice(text.as_slice());
                projection.matvec(&stacked)?
            }
        };

        match Embedding::normalized(raw) {
            Ok(fused) => Ok(fused),
            Err(EmbeddingError::ZeroNorm) => Err(RetrievalError::InvalidQuery(format!(
                "{:?} fusion produced a zero vector",
                self.strategy
            ))),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn unit(values: &[f32]) -> Embedding {
        Embedding::normalized(values.to_vec()).unwrap()
    }

    fn assert_close(a: &Embedding, b: &Embedding) {
        for (x, y) in a.as_slice().iter().zip(b.as_slice()) {
            assert!((x - y).abs() < 1e-5, "{:?} != {:?}", a, b);
        }
    }

    #[test]
    fn test_alpha_extremes_select_one_modality() {
        let engine = FusionEngine::weighted_average(3);
        let text = unit(&[1.0, 0.0, 0.0]);
        let image = unit(&[0.0, 1.0, 1.0]);

        let fused = engine.fuse(Some(&text), Some(&image), 1.0).unwrap();
        assert_close(&fused, &image);

        let fused = engine.fuse(Some(&text), Some(&image), 0.0).unwrap();
        assert_close(&fused, &text);
    }

    #[test]
    fn test_weighted_result_is_unit() {
        let engine = FusionEngine::weighted_average(3);
        let text = unit(&[1.0, 2.0, 0.5]);
        let image = unit(&[-0.3, 1.0, 4.0]);
        for step in 0..=10 {
            let alpha = step as f32 / 10.0;
            let fused = engine.fuse(Some(&text), Some(&image), alpha).unwrap();
            assert!(fused.is_unit(), "alpha={alpha} norm={}", fused.norm());
        }
    }

    #[test]
    fn test_text_only_is_returned_unchanged() {
        let engine = FusionEngine::weighted_average(3);
        let text = unit(&[0.2, 0.4, 0.9]);
        let fused = engine.fuse(Some(&text), None, 0.7).unwrap();
        assert_eq!(fused, text);
    }

    #[test]
    fn test_single_modality_ignores_alpha() {
        let engine = FusionEngine::weighted_average(3);
        let text = unit(&[0.2, 0.4, 0.9]);
        assert_eq!(engine.fuse(Some(&text), None, f32::NAN).unwrap(), text);
        assert_eq!(engine.fuse(None, Some(&text), -4.0).unwrap(), text);
    }

    #[test]
    fn test_single_modality_normalized_when_needed() {
        let engine = FusionEngine::weighted_average(2);
        let image = Embedding::new(vec![3.0, 4.0]);
        let fused = engine.fuse(None, Some(&image), 0.2).unwrap();
        assert!(fused.is_unit());
    }

    #[test]
    fn test_no_modality_is_invalid_query() {
        let engine = FusionEngine::weighted_average(3);
        let err = engine.fuse(None, None, 0.5).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidQuery);
    }

    #[test]
    fn test_dimension_mismatch() {
        let engine = FusionEngine::weighted_average(3);
        let text = unit(&[1.0, 0.0, 0.0]);
        let image = unit(&[1.0, 0.0]);
        let err = engine.fuse(Some(&text), Some(&image), 0.5).unwrap_err();
        assert!(matches!(
            err,
            RetrievalError::DimensionMismatch { expected: 3, got: 2 }
        ));
    }

    #[test]
    fn test_alpha_out_of_range_is_clamped() {
        let engine = FusionEngine::weighted_average(2);
        let text = unit(&[1.0, 0.0]);
        let image = unit(&[0.0, 1.0]);
        let fused = engine.fuse(Some(&text), Some(&image), 3.5).unwrap();
        assert_close(&fused, &image);

        let err = engine.fuse(Some(&text), Some(&image), f32::NAN).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidQuery);
    }

    #[test]
    fn test_hadamard_zero_product_is_rejected() {
        let engine = FusionEngine::hadamard(2);
        let text = unit(&[1.0, 0.0]);
        let image = unit(&[0.0, 1.0]);
        let err = engine.fuse(Some(&text), Some(&image), 0.5).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidQuery);

        let image = unit(&[1.0, 1.0]);
        let fused = engine.fuse(Some(&text), Some(&image), 0.5).unwrap();
        assert_close(&fused, &unit(&[1.0, 0.0]));
    }

    #[test]
    fn test_concatenation_projection() {
        // W = [I | I] so the result is normalize(image + text).
        let mut data = Vec::new();
        for r in 0..2 {
            for c in 0..4 {
                data.push(if c % 2 == r { 1.0 } else { 0.0 });
            }
        }
        let engine = FusionEngine::concatenation(2, Matrix::new(2, 4, data).unwrap()).unwrap();
        let text = unit(&[1.0, 0.0]);
        let image = unit(&[0.0, 1.0]);
        let fused = engine.fuse(Some(&text), Some(&image), 0.5).unwrap();
        assert_close(&fused, &unit(&[1.0, 1.0]));
    }

    #[test]
    fn test_concatenation_rejects_bad_shape() {
        let result = FusionEngine::concatenation(2, Matrix::identity(2));
        assert!(matches!(result, Err(RetrievalError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_strategy_names() {
        let strategy: FusionStrategy = serde_json::from_str("\"hadamard\"").unwrap();
        assert_eq!(strategy, FusionStrategy::Hadamard);
        assert_eq!(
            serde_json::to_string(&FusionStrategy::WeightedAverage).unwrap(),
            "\"weighted_average\""
        );
    }
}
