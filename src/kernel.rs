//! Similarity Kernel: cosine, Euclidean, and angular metrics over
//! equal-length float vectors.
use crate::error::{VectorStoreError, VectorStoreResult};
use serde::{Deserialize, Serialize};

/// Norms below this are treated as zero to avoid dividing by noise.
const EPSILON: f64 = 1e-10;

/// The configured distance/similarity metric for a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimilarityMetric {
    Cosine,
    Euclidean,
    Angular,
}

impl SimilarityMetric {
    /// Whether lower scores are better (a distance) rather than higher
    /// scores being better (a similarity). The Search Pipeline uses this
    /// to pick sort order and threshold direction.
    pub fn is_distance(self) -> bool {
        matches!(self, SimilarityMetric::Euclidean | SimilarityMetric::Angular)
    }

    /// Compute the score between two equal-length vectors.
    ///
    /// Fails with `InvalidVector` if either vector contains a non-finite
    /// element, or if the lengths differ.
    pub fn calculate(self, a: &[f64], b: &[f64]) -> VectorStoreResult<f64> {
        if a.len() != b.len() {
            return Err(VectorStoreError::DimensionMismatch {
                expected: a.len(),
                actual: b.len(),
            });
        }
        validate_finite(a)?;
        validate_finite(b)?;

        Ok(match self {
            SimilarityMetric::Cosine => cosine(a, b),
            SimilarityMetric::Euclidean => euclidean(a, b),
            SimilarityMetric::Angular => angular(a, b),
        })
    }
}

fn validate_finite(v: &[f64]) -> VectorStoreResult<()> {
    if v.iter().any(|x| !x.is_finite()) {
        return Err(VectorStoreError::InvalidVector {
            reason: "vector contains NaN or infinite element".to_string(),
        });
    }
    Ok(())
}

fn norm(v: &[f64]) -> f64 {
    v.iter().map(|x| x * x).sum::<f64>().sqrt()
}

fn raw_cosine(a: &[f64], b: &[f64]) -> f64 {
    let na = norm(a);
    let nb = norm(b);
    if na < EPSILON || nb < EPSILON {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    (dot / (na * nb)).clamp(-1.0, 1.0)
}

fn cosine(a: &[f64], b: &[f64]) -> f64 {
    raw_cosine(a, b)
}

fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum::<f64>().sqrt()
}

fn angular(a: &[f64], b: &[f64]) -> f64 {
    raw_cosine(a, b).clamp(-1.0, 1.0).acos()
}

/// Validate that a vector has the expected dimension and contains only
/// finite elements. Used by `store`/`search` before touching any state.
pub fn validate_vector(vector: &[f64], expected_dim: usize) -> VectorStoreResult<()> {
    if vector.len() != expected_dim {
        return Err(VectorStoreError::InvalidVector {
            reason: format!(
                "Wrong dimension: expected {expected_dim}, got {}",
                vector.len()
            ),
        });
    }
    validate_finite(vector)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_identical_is_one() {
        let s = SimilarityMetric::Cosine.calculate(&[1.0, 0.0, 0.0], &[1.0, 0.0, 0.0]).unwrap();
        assert!((s - 1.0).abs() < 1e-9);
    }

    #[test]
    fn cosine_orthogonal_is_zero() {
        let s = SimilarityMetric::Cosine.calculate(&[1.0, 0.0], &[0.0, 1.0]).unwrap();
        assert!(s.abs() < 1e-9);
    }

    #[test]
    fn cosine_zero_vector_is_zero() {
        let s = SimilarityMetric::Cosine.calculate(&[0.0, 0.0], &[1.0, 0.0]).unwrap();
        assert_eq!(s, 0.0);
    }

    #[test]
    fn euclidean_distance_3_4_5_triangle() {
        let d = SimilarityMetric::Euclidean.calculate(&[0.0, 0.0], &[3.0, 4.0]).unwrap();
        assert!((d - 5.0).abs() < 1e-9);
    }

    #[test]
    fn angular_orthogonal_is_half_pi() {
        let d = SimilarityMetric::Angular.calculate(&[1.0, 0.0], &[0.0, 1.0]).unwrap();
        assert!((d - std::f64::consts::FRAC_PI_2).abs() < 1e-6);
    }

    #[test]
    fn non_finite_element_is_invalid() {
        let err = SimilarityMetric::Cosine.calculate(&[f64::NAN, 0.0], &[1.0, 0.0]);
        assert!(matches!(err, Err(VectorStoreError::InvalidVector { .. })));
    }

    #[test]
    fn mismatched_length_is_dimension_mismatch() {
        let err = SimilarityMetric::Cosine.calculate(&[1.0], &[1.0, 0.0]);
        assert!(matches!(err, Err(VectorStoreError::DimensionMismatch { .. })));
    }

    #[test]
    fn is_distance_flags_are_correct() {
        assert!(!SimilarityMetric::Cosine.is_distance());
        assert!(SimilarityMetric::Euclidean.is_distance());
        assert!(SimilarityMetric::Angular.is_distance());
    }
}
