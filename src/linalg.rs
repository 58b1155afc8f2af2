//! Small dense-matrix helpers for the fixed projections used by fusion and attention.

use std::sync::Arc;

use crate::embedding::EmbeddingError;

/// Row-major dense matrix of `f32`.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl Matrix {
    pub fn new(rows: usize, cols: usize, data: Vec<f32>) -> Result<Self, EmbeddingError> {
        if data.len() != rows * cols {
            return Err(EmbeddingError::DimensionMismatch {
                expected: rows * cols,
                got: data.len(),
            });
        }
        Ok(Self { rows, cols, data })
    }

    pub fn identity(size: usize) -> Self {
        let mut data = vec![0.0; size * size];
        for i in 0..size {
            data[i * size + i] = 1.0;
        }
        Self {
            rows: size,
            cols: size,
            data,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn row(&self, index: usize) -> &[f32] {
        &self.data[index * self.cols..(index + 1) * self.cols]
    }

    /// Multiply the matrix by a column vector.
    pub fn matvec(&self, v: &[f32]) -> Result<Vec<f32>, EmbeddingError> {
        if v.len() != self.cols {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.cols,
                got: v.len(),
            });
        }
        Ok((0..self.rows)
            .map(|r| crate::embedding::dot(self.row(r), v))
            .collect())
    }
}

/// A linear map applied to an embedding before attention.
///
/// `Identity` is used when no parameter file is configured.
#[derive(Debug, Clone)]
pub enum Projection {
    Identity,
    Dense(Arc<Matrix>),
}

impl Projection {
    pub fn apply(&self, v: &[f32]) -> Result<Vec<f32>, EmbeddingError> {
        match self {
            Projection::Identity => Ok(v.to_vec()),
            Projection::Dense(matrix) => matrix.matvec(v),
        }
    }

    /// Check the projection maps `dimensions` to `dimensions`.
    pub fn check_square(&self, dimensions: usize) -> Result<(), EmbeddingError> {
        match self {
            Projection::Identity => Ok(()),
            Projection::Dense(matrix) => {
                if matrix.rows() != dimensions || matrix.cols() != dimensions {
                    return Err(EmbeddingError::DimensionMismatch {
                        expected: dimensions * dimensions,
                        got: matrix.rows() * matrix.cols(),
                    });
                }
                Ok(())
            }
        }
    }
}

/// Numerically stable softmax, in place.
pub fn softmax_in_place(values: &mut [f32]) {
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    if !max.is_finite() {
        let uniform = 1.0 / values.len().max(1) as f32;
        values.iter_mut().for_each(|v| *v = uniform);
        return;
    }
    let mut sum = 0.0;
    for v in values.iter_mut() {
        *v = (*v - max).exp();
        sum += *v;
    }
    for v in values.iter_mut() {
        *v /= sum;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_matvec() {
        let m = Matrix::identity(3);
        assert_eq!(m.matvec(&[1.0, 2.0, 3.0]).unwrap(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_rectangular_matvec() {
        // [[1, 0, 1, 0], [0, 1, 0, 1]]
        let m = Matrix::new(2, 4, vec![1.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 1.0]).unwrap();
        assert_eq!(m.matvec(&[1.0, 2.0, 3.0, 4.0]).unwrap(), vec![4.0, 6.0]);
        assert!(m.matvec(&[1.0, 2.0]).is_err());
    }

    #[test]
    fn test_new_rejects_wrong_length() {
        let result = Matrix::new(2, 2, vec![1.0; 3]);
        assert_eq!(
            result,
            Err(EmbeddingError::DimensionMismatch { expected: 4, got: 3 })
        );
    }

    #[test]
    fn test_softmax_sums_to_one() {
        let mut values = vec![1.0, 2.0, 3.0];
        softmax_in_place(&mut values);
        let sum: f32 = values.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
        assert!(values[2] > values[1] && values[1] > values[0]);
    }

    #[test]
    fn test_projection_square_check() {
        let projection = Projection::Dense(Arc::new(Matrix::identity(4)));
        assert!(projection.check_square(4).is_ok());
        assert!(projection.check_square(8).is_err());
        assert!(Projection::Identity.check_square(8).is_ok());
    }
}
