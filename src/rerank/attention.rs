//! Lightweight cross-attention between the query and one candidate embedding.
//!
//! Both vectors are projected (Wq for the query, Wk/Wv for the candidate) and split into
//! `tokens` slices of width `D / tokens`. The token-level attention output is reduced
//! to a scalar `scale · tanh(Σ_t ⟨Z_t, Q_t⟩)` that is added to the base similarity.

use crate::embedding::{dot, EmbeddingError};
use crate::linalg::{softmax_in_place, Projection};

pub const DEFAULT_ATTENTION_TOKENS: usize = 8;
pub const DEFAULT_ATTENTION_SCALE: f32 = 0.1;

#[derive(Debug, Clone)]
pub struct CrossAttention {
    dimensions: usize,
    tokens: usize,
    scale: f32,
    query: Projection,
    key: Projection,
    value: Projection,
}

/// Query side of the attention, projected once per request.
#[derive(Debug, Clone)]
pub struct ProjectedQuery(Vec<f32>);

impl CrossAttention {
    pub fn new(
        dimensions: usize,
        tokens: usize,
        scale: f32,
        query: Projection,
        key: Projection,
        value: Projection,
    ) -> Result<Self, String> {
        if tokens == 0 || dimensions % tokens != 0 {
            return Err(format!(
                "attention_tokens ({tokens}) must divide the embedding dimensions ({dimensions})"
            ));
        }
        if !scale.is_finite() || scale < 0.0 {
            return Err(format!("attention_scale must be non-negative, got {scale}"));
        }
        for (name, projection) in [("query", &query), ("key", &key), ("value", &value)] {
            projection
                .check_square(dimensions)
                .map_err(|e| format!("attention {name} projection: {e}"))?;
        }
        Ok(Self {
            dimensions,
            tokens,
            scale,
            query,
            key,
            value,
        })
    }

    /// Identity projections.
    pub fn identity(dimensions: usize, tokens: usize, scale: f32) -> Result<Self, String> {
        Self::new(
            dimensions,
            tokens,
            scale,
            Projection::Identity,
            Projection::Identity,
            Projection::Identity,
        )
    }

    pub fn tokens(&self) -> usize {
        self.tokens
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn project_query(&self, query: &[f32]) -> Result<ProjectedQuery, EmbeddingError> {
        self.check(query)?;
        Ok(ProjectedQuery(self.query.apply(query)?))
    }

    /// Scalar refinement for one candidate, in `[-scale, scale]`.
    pub fn score(&self, query: &ProjectedQuery, candidate: &[f32]) -> Result<f32, EmbeddingError> {
        self.check(candidate)?;
        let keys = self.key.apply(candidate)?;
        let values = self.value.apply(candidate)?;

        let width = self.dimensions / self.tokens;
        let temperature = (width as f32).sqrt();
        let q_tokens: Vec<&[f32]> = query.0.chunks(width).collect();
        let k_tokens: Vec<&[f32]> = keys.chunks(width).collect();
        let v_tokens: Vec<&[f32]> = values.chunks(width).collect();

        let mut weights = vec![0.0f32; self.tokens];
        let mut total = 0.0f32;
        for q in &q_tokens {
            for (weight, k) in weights.iter_mut().zip(&k_tokens) {
                *weight = dot(q, k) / temperature;
            }
            softmax_in_place(&mut weights);

            // ⟨Z_t, Q_t⟩ with Z_t = Σ_j A_tj · V_j
            total += weights
                .iter()
                .zip(&v_tokens)
                .map(|(weight, v)| weight * dot(v, q))
                .sum::<f32>();
        }

        let refinement = self.scale * total.tanh();
        Ok(if refinement.is_finite() { refinement } else { 0.0 })
    }

    fn check(&self, v: &[f32]) -> Result<(), EmbeddingError> {
        if v.len() != self.dimensions {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dimensions,
                got: v.len(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::Matrix;
    use std::sync::Arc;

    #[test]
    fn test_tokens_must_divide_dimensions() {
        assert!(CrossAttention::identity(512, 8, 0.1).is_ok());
        assert!(CrossAttention::identity(10, 4, 0.1).is_err());
        assert!(CrossAttention::identity(8, 0, 0.1).is_err());
        assert!(CrossAttention::identity(8, 2, -1.0).is_err());
    }

    #[test]
    fn test_rejects_non_square_projection() {
        let matrix = Matrix::new(2, 4, vec![0.0; 8]).unwrap();
        let result = CrossAttention::new(
            4,
            2,
            0.1,
            Projection::Dense(Arc::new(matrix)),
            Projection::Identity,
            Projection::Identity,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_refinement_is_bounded_and_prefers_aligned_candidates() {
        let attention = CrossAttention::identity(4, 2, 0.1).unwrap();
        let query = attention.project_query(&[1.0, 0.0, 0.0, 0.0]).unwrap();

        let aligned = attention.score(&query, &[1.0, 0.0, 0.0, 0.0]).unwrap();
        let opposed = attention.score(&query, &[-1.0, 0.0, 0.0, 0.0]).unwrap();
        assert!(aligned > opposed);
        assert!(aligned.abs() <= 0.1 && opposed.abs() <= 0.1);
    }

    #[test]
    fn test_zero_scale_disables_refinement() {
        let attention = CrossAttention::identity(4, 2, 0.0).unwrap();
        let query = attention.project_query(&[0.5, 0.5, 0.5, 0.5]).unwrap();
        assert_eq!(attention.score(&query, &[0.5, 0.5, 0.5, 0.5]).unwrap(), 0.0);
    }

    #[test]
    fn test_candidate_dimension_checked() {
        let attention = CrossAttention::identity(4, 2, 0.1).unwrap();
        let query = attention.project_query(&[1.0, 0.0, 0.0, 0.0]).unwrap();
        assert!(attention.score(&query, &[1.0, 0.0]).is_err());
        assert!(attention.project_query(&[1.0]).is_err());
    }
}
