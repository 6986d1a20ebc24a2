//! Elementary vector helpers shared by the algebra and quality modules.

use crate::constants::EPSILON;
use crate::error::{MathError, Result};

pub fn l2_norm(vector: &[f64]) -> f64 {
    coherence(vector).sqrt()
}

/// Sum of squared components. A scalar summary, not a probability.
pub fn coherence(vector: &[f64]) -> f64 {
    vector.iter().map(|v| v * v).sum()
}

/// Divide every component by the L2 norm.
/// Fails with [`MathError::ZeroNorm`] rather than producing NaN.
pub fn normalize(vector: &[f64]) -> Result<Vec<f64>> {
    if vector.is_empty() {
        return Err(MathError::Empty);
    }
    let norm = l2_norm(vector);
    if norm < EPSILON || !norm.is_finite() {
        return Err(MathError::ZeroNorm);
    }
    Ok(vector.iter().map(|v| v / norm).collect())
}

pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Cosine similarity in [-1, 1]; zero when either side has no magnitude.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    let denom = l2_norm(a) * l2_norm(b);
    if denom < EPSILON {
        return 0.0;
    }
    dot(a, b) / denom
}

/// Euclidean distance between two equal-length vectors.
pub fn l2_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

pub fn check_dimension(vector: &[f64], expected: usize) -> Result<()> {
    if vector.len() != expected {
        return Err(MathError::DimensionMismatch {
            expected,
            actual: vector.len(),
        });
    }
    Ok(())
}

pub(crate) fn check_same_len(a: &[f64], b: &[f64]) -> Result<()> {
    check_dimension(b, a.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_normalize_unit_norm() {
        let v = normalize(&[3.0, 4.0]).unwrap();
        assert_abs_diff_eq!(v[0], 0.6, epsilon = 1e-12);
        assert_abs_diff_eq!(v[1], 0.8, epsilon = 1e-12);
        assert_abs_diff_eq!(l2_norm(&v), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_normalize_zero_vector_fails() {
        assert_eq!(normalize(&[0.0; 16]), Err(MathError::ZeroNorm));
    }

    #[test]
    fn test_normalize_empty_fails() {
        assert_eq!(normalize(&[]), Err(MathError::Empty));
    }

    #[test]
    fn test_coherence_is_raw_sum_of_squares() {
        assert_abs_diff_eq!(coherence(&[1.0, 2.0, 2.0]), 9.0, epsilon = 1e-12);
    }

    #[test]
    fn test_cosine_similarity_bounds() {
        assert_abs_diff_eq!(cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]), -1.0, epsilon = 1e-12);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_check_dimension() {
        assert!(check_dimension(&[0.0; 4], 4).is_ok());
        assert_eq!(
            check_dimension(&[0.0; 3], 4),
            Err(MathError::DimensionMismatch {
                expected: 4,
                actual: 3
            })
        );
    }
}
