//! Vector encoding and the vector math used by similarity search.
//!
//! The backend stores vectors as BLOBs of little-endian `f32`. A bracketed
//! text literal (`[0.1,-0.2,0.3]`) is also supported for logs, fixtures, and
//! tools that exchange vectors as text.

use crate::errors::ValidationError;

const F32_BYTES: usize = std::mem::size_of::<f32>();

/// Converts between in-memory vectors and the backend's vector value for a
/// fixed dimension.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VectorCodec {
    dimensions: usize,
}

impl VectorCodec {
    /// Codec for vectors of exactly `dimensions` components.
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    /// The configured dimension D.
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Check length and finiteness.
    pub fn validate(&self, v: &[f32]) -> Result<(), ValidationError> {
        if v.len() != self.dimensions {
            return Err(ValidationError::DimensionMismatch {
                expected: self.dimensions,
                actual: v.len(),
            });
        }
        if let Some(index) = v.iter().position(|x| !x.is_finite()) {
            return Err(ValidationError::NonFiniteComponent { index });
        }
        Ok(())
    }

    /// Encode a validated vector into the backend representation.
    pub fn encode(&self, v: &[f32]) -> Result<Vec<u8>, ValidationError> {
        self.validate(v)?;
        Ok(to_blob(v))
    }

    /// Decode a backend value, checking it holds exactly D components.
    pub fn decode(&self, blob: &[u8]) -> Result<Vec<f32>, ValidationError> {
        let v = from_blob(blob)?;
        if v.len() != self.dimensions {
            return Err(ValidationError::DimensionMismatch {
                expected: self.dimensions,
                actual: v.len(),
            });
        }
        Ok(v)
    }

    /// Cosine similarity of two vectors of equal length.
    ///
    /// Works without the backend, e.g. in dry runs. Mismatched lengths are a
    /// [`ValidationError::DimensionMismatch`].
    #[allow(clippy::cast_possible_truncation)]
    pub fn similarity(&self, a: &[f32], b: &[f32]) -> Result<f32, ValidationError> {
        cosine_similarity(a, b)
            .map(|s| s as f32)
            .ok_or(ValidationError::DimensionMismatch {
                expected: a.len(),
                actual: b.len(),
            })
    }
}

/// Encode a vector as little-endian `f32` bytes.
pub fn to_blob(v: &[f32]) -> Vec<u8> {
    v.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Decode little-endian `f32` bytes of any length.
pub fn from_blob(blob: &[u8]) -> Result<Vec<f32>, ValidationError> {
    if blob.len() % F32_BYTES != 0 {
        return Err(ValidationError::MalformedVector(format!(
            "blob of {} bytes is not a whole number of f32 components",
            blob.len()
        )));
    }
    Ok(blob
        .chunks_exact(F32_BYTES)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// Number of components held by an encoded vector.
pub fn dimension(blob: &[u8]) -> usize {
    blob.len() / F32_BYTES
}

/// Render a vector as `[v1,v2,...]`.
///
/// Components use the shortest representation that parses back to the same
/// `f32`, so [`parse_literal`] recovers the vector exactly.
pub fn to_literal(v: &[f32]) -> String {
    let parts: Vec<String> = v.iter().map(ToString::to_string).collect();
    format!("[{}]", parts.join(","))
}

/// Parse a `[v1,v2,...]` literal. Whitespace around components is allowed.
pub fn parse_literal(s: &str) -> Result<Vec<f32>, ValidationError> {
    let inner = s
        .trim()
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .ok_or_else(|| ValidationError::MalformedVector(format!("expected [..], got {s:?}")))?;

    if inner.trim().is_empty() {
        return Ok(Vec::new());
    }

    inner
        .split(',')
        .enumerate()
        .map(|(i, part)| {
            let part = part.trim();
            let value: f32 = part.parse().map_err(|_| {
                ValidationError::MalformedVector(format!("component {i} is not a number: {part:?}"))
            })?;
            if value.is_finite() {
                Ok(value)
            } else {
                Err(ValidationError::NonFiniteComponent { index: i })
            }
        })
        .collect()
}

/// L2 (Euclidean) norm.
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// L2-normalize in place. Zero vectors stay zero.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = l2_norm(v);
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Cosine similarity in `[-1, 1]`, accumulated in `f64`.
///
/// Returns `None` when the lengths differ. A zero vector has similarity 0
/// with everything.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f64> {
    if a.len() != b.len() {
        return None;
    }
    let (mut dot, mut na, mut nb) = (0.0_f64, 0.0_f64, 0.0_f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return Some(0.0);
    }
    Some((dot / (na.sqrt() * nb.sqrt())).clamp(-1.0, 1.0))
}

/// Cosine distance, `1 - cosine_similarity`, in `[0, 2]`.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> Option<f64> {
    cosine_similarity(a, b).map(|s| 1.0 - s)
}

/// Euclidean distance. Returns `None` when the lengths differ.
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() {
        return None;
    }
    let sum: f32 = a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum();
    Some(sum.sqrt())
}

#[cfg(test)]
#[allow(clippy::cast_precision_loss)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    const EPSILON: f64 = 1e-6;

    #[test]
    fn blob_layout_is_little_endian() {
        let blob = to_blob(&[1.0, -2.5]);
        assert_eq!(blob.len(), 8);
        assert_eq!(&blob[..4], &1.0_f32.to_le_bytes());
        assert_eq!(&blob[4..], &(-2.5_f32).to_le_bytes());
        assert_eq!(dimension(&blob), 2);
    }

    #[test]
    fn codec_round_trip() {
        let codec = VectorCodec::new(3);
        let v = vec![0.1, -0.2, 0.3];
        let blob = codec.encode(&v).unwrap();
        assert_eq!(codec.decode(&blob).unwrap(), v);
    }

    #[test]
    fn encode_rejects_wrong_dimension() {
        let codec = VectorCodec::new(4);
        assert_matches!(
            codec.encode(&[1.0, 2.0]),
            Err(ValidationError::DimensionMismatch {
                expected: 4,
                actual: 2
            })
        );
    }

    #[test]
    fn encode_rejects_non_finite() {
        let codec = VectorCodec::new(3);
        assert_matches!(
            codec.encode(&[0.0, f32::NAN, 1.0]),
            Err(ValidationError::NonFiniteComponent { index: 1 })
        );
        assert_matches!(
            codec.encode(&[f32::INFINITY, 0.0, 1.0]),
            Err(ValidationError::NonFiniteComponent { index: 0 })
        );
    }

    #[test]
    fn decode_rejects_ragged_blob() {
        assert_matches!(
            from_blob(&[0, 0, 0]),
            Err(ValidationError::MalformedVector(_))
        );
    }

    #[test]
    fn decode_rejects_other_dimension() {
        let codec = VectorCodec::new(3);
        let blob = to_blob(&[1.0, 2.0]);
        assert_matches!(
            codec.decode(&blob),
            Err(ValidationError::DimensionMismatch { .. })
        );
    }

    #[test]
    fn literal_format() {
        assert_eq!(to_literal(&[0.5, -1.0, 2.25]), "[0.5,-1,2.25]");
        assert_eq!(to_literal(&[]), "[]");
    }

    #[test]
    fn literal_parse() {
        assert_eq!(
            parse_literal(" [0.5, -1 ,2.25] ").unwrap(),
            vec![0.5, -1.0, 2.25]
        );
        assert_eq!(parse_literal("[]").unwrap(), Vec::<f32>::new());
    }

    #[test]
    fn literal_parse_errors() {
        for bad in ["0.5,1", "[0.5,abc]", "[1,,2]"] {
            assert_matches!(parse_literal(bad), Err(ValidationError::MalformedVector(_)));
        }
        assert_matches!(
            parse_literal("[1,NaN]"),
            Err(ValidationError::NonFiniteComponent { index: 1 })
        );
    }

    #[test]
    fn l2_normalize_known_vector() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn l2_normalize_zero_vector() {
        let mut v = vec![0.0; 3];
        l2_normalize(&mut v);
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn cosine_known_values() {
        let a = [1.0, 0.0];
        assert!((cosine_similarity(&a, &[1.0, 0.0]).unwrap() - 1.0).abs() < EPSILON);
        assert!(cosine_similarity(&a, &[0.0, 1.0]).unwrap().abs() < EPSILON);
        assert!((cosine_similarity(&a, &[-1.0, 0.0]).unwrap() + 1.0).abs() < EPSILON);
        assert!((cosine_distance(&a, &[-1.0, 0.0]).unwrap() - 2.0).abs() < EPSILON);
    }

    #[test]
    fn cosine_is_scale_invariant() {
        let s1 = cosine_similarity(&[1.0, 2.0, 3.0], &[2.0, 1.0, 0.5]).unwrap();
        let s2 = cosine_similarity(&[10.0, 20.0, 30.0], &[2.0, 1.0, 0.5]).unwrap();
        assert!((s1 - s2).abs() < EPSILON);
    }

    #[test]
    fn cosine_zero_vector_and_mismatch() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), Some(0.0));
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), None);
    }

    #[test]
    fn codec_similarity_rejects_mismatch() {
        let codec = VectorCodec::new(2);
        assert!((codec.similarity(&[1.0, 0.0], &[1.0, 0.0]).unwrap() - 1.0).abs() < 1e-6);
        assert_matches!(
            codec.similarity(&[1.0], &[1.0, 0.0]),
            Err(ValidationError::DimensionMismatch {
                expected: 1,
                actual: 2
            })
        );
    }

    #[test]
    fn euclidean_known() {
        assert!((euclidean_distance(&[0.0, 0.0], &[3.0, 4.0]).unwrap() - 5.0).abs() < 1e-6);
        assert_eq!(euclidean_distance(&[0.0], &[3.0, 4.0]), None);
    }

    mod proptests {
        use proptest::prelude::*;

        use super::super::*;

        fn finite_vec() -> impl Strategy<Value = Vec<f32>> {
            prop::collection::vec(-1.0e6_f32..1.0e6_f32, 1..64)
        }

        proptest! {
            #[test]
            fn blob_round_trip_is_exact(v in finite_vec()) {
                let codec = VectorCodec::new(v.len());
                let decoded = codec.decode(&codec.encode(&v).unwrap()).unwrap();
                prop_assert_eq!(decoded, v);
            }

            #[test]
            fn literal_round_trip_is_exact(v in finite_vec()) {
                prop_assert_eq!(parse_literal(&to_literal(&v)).unwrap(), v);
            }

            #[test]
            fn similarity_is_bounded_and_symmetric(a in finite_vec(), seed in any::<u64>()) {
                let b: Vec<f32> = a
                    .iter()
                    .enumerate()
                    .map(|(i, x)| {
                        let flip = (seed >> (i % 64)) & 1 == 1;
                        if flip { x * -0.5 } else { x * 1.5 }
                    })
                    .collect();
                let ab = cosine_similarity(&a, &b).unwrap();
                let ba = cosine_similarity(&b, &a).unwrap();
                prop_assert!((-1.0..=1.0).contains(&ab));
                prop_assert!((ab - ba).abs() < 1e-9);
            }

            #[test]
            fn normalized_has_unit_norm(v in finite_vec()) {
                let mut n = v.clone();
                l2_normalize(&mut n);
                if l2_norm(&v) > 1e-3 {
                    prop_assert!((l2_norm(&n) - 1.0).abs() < 1e-4);
                }
            }
        }
    }
}
