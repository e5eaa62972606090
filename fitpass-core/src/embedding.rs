//! Face embedding validation and L2 normalization.
//!
//! Checks always run in the same order: shape, dimension, finiteness, then
//! normalization. Nothing is clamped or dropped; a vector either passes
//! every check or is rejected.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::EnrollmentError;

/// Tolerance used when asserting that a stored vector has unit norm.
pub const UNIT_NORM_TOLERANCE: f64 = 1e-6;

// ============================================================================
// Raw input
// ============================================================================

/// Embedding values exactly as the client sent them.
///
/// Deserialization never fails on a bad shape: the problem is kept as
/// [`RawVector::Malformed`] and reported by [`validate`], so the error surfaces
/// at its fixed position in the enrollment sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum RawVector {
    Numeric(Vec<f64>),
    Malformed(String),
}

impl RawVector {
    pub fn from_json(value: &serde_json::Value) -> Self {
        match parse_values(value) {
            Ok(values) => Self::Numeric(values),
            Err(EnrollmentError::InvalidEmbeddingShape(detail)) => Self::Malformed(detail),
            Err(other) => Self::Malformed(other.to_string()),
        }
    }
}

impl From<Vec<f64>> for RawVector {
    fn from(values: Vec<f64>) -> Self {
        Self::Numeric(values)
    }
}

impl<'de> Deserialize<'de> for RawVector {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        Ok(Self::from_json(&value))
    }
}

impl Serialize for RawVector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Numeric(values) => values.serialize(serializer),
            Self::Malformed(_) => serializer.serialize_none(),
        }
    }
}

/// Embedding block of an enrollment request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingPayload {
    /// Width the client claims the vector has.
    pub dims: usize,
    pub values: RawVector,
}

impl EmbeddingPayload {
    pub fn new(values: Vec<f64>) -> Self {
        Self {
            dims: values.len(),
            values: RawVector::Numeric(values),
        }
    }
}

// ============================================================================
// Validation
// ============================================================================

/// Accept only a flat JSON array whose elements are all numbers.
pub fn parse_values(value: &serde_json::Value) -> Result<Vec<f64>, EnrollmentError> {
    let items = value.as_array().ok_or_else(|| {
        EnrollmentError::InvalidEmbeddingShape(format!(
            "expected an array, found {}",
            json_type(value)
        ))
    })?;

    items
        .iter()
        .enumerate()
        .map(|(idx, item)| {
            item.as_f64().ok_or_else(|| {
                EnrollmentError::InvalidEmbeddingShape(format!(
                    "element {idx} is {}, expected a number",
                    json_type(item)
                ))
            })
        })
        .collect()
}

/// Check shape, width and finiteness of a raw vector.
pub fn validate(raw: &RawVector, expected_dims: usize) -> Result<&[f64], EnrollmentError> {
    let values = match raw {
        RawVector::Numeric(values) => values.as_slice(),
        RawVector::Malformed(detail) => {
            return Err(EnrollmentError::InvalidEmbeddingShape(detail.clone()))
        }
    };

    if values.len() != expected_dims {
        return Err(EnrollmentError::InvalidEmbeddingDimension {
            expected: expected_dims,
            found: values.len(),
        });
    }

    if let Some(index) = values.iter().position(|v| !v.is_finite()) {
        return Err(EnrollmentError::InvalidEmbeddingValue { index });
    }

    Ok(values)
}

/// Divide every element by the vector's L2 norm.
pub fn normalize(values: &[f64]) -> Result<Vec<f64>, EnrollmentError> {
    let norm = l2_norm(values);
    if !norm.is_finite() || norm == 0.0 {
        return Err(EnrollmentError::ZeroNormEmbedding);
    }
    Ok(values.iter().map(|v| v / norm).collect())
}

pub fn l2_norm(values: &[f64]) -> f64 {
    values.iter().map(|v| v * v).sum::<f64>().sqrt()
}

fn json_type(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

// ============================================================================
// Normalized embedding
// ============================================================================

/// A validated, unit-norm embedding ready to be stored.
///
/// Values are kept as `f32`, the width of a typical vector column.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    values: Vec<f32>,
}

impl Embedding {
    /// Validate then normalize.
    pub fn from_raw(raw: &RawVector, expected_dims: usize) -> Result<Self, EnrollmentError> {
        let values = validate(raw, expected_dims)?;
        let normalized = normalize(values)?;
        Ok(Self {
            values: normalized.into_iter().map(|v| v as f32).collect(),
        })
    }

    pub fn dims(&self) -> usize {
        self.values.len()
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn norm(&self) -> f64 {
        self.values
            .iter()
            .map(|v| f64::from(*v) * f64::from(*v))
            .sum::<f64>()
            .sqrt()
    }

    /// Cosine similarity with another unit-norm embedding of the same width.
    pub fn similarity(&self, other: &Embedding) -> Option<f64> {
        if self.dims() != other.dims() {
            return None;
        }
        Some(
            self.values
                .iter()
                .zip(other.values.iter())
                .map(|(a, b)| f64::from(*a) * f64::from(*b))
                .sum(),
        )
    }

    /// Little-endian `f32` encoding, `4 * dims` bytes.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.values.len() * 4);
        for v in &self.values {
            out.extend_from_slice(&v.to_le_bytes());
        }
        out
    }

    /// Decode a stored vector, checking width and norm.
    pub fn from_le_bytes(bytes: &[u8], dims: usize) -> Result<Self, DecodeError> {
        let expected = dims
            .checked_mul(4)
            .ok_or_else(|| DecodeError::InvalidDims(dims.to_string()))?;
        if bytes.len() != expected {
            return Err(DecodeError::Length {
                expected,
                found: bytes.len(),
            });
        }
        let values: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();

        let embedding = Self { values };
        let norm = embedding.norm();
        if (norm - 1.0).abs() > UNIT_NORM_TOLERANCE {
            return Err(DecodeError::NotUnitNorm(norm));
        }
        Ok(embedding)
    }
}

/// A stored vector that cannot be decoded back into an [`Embedding`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeError {
    #[error("vector blob has {found} bytes, expected {expected}")]
    Length { expected: usize, found: usize },
    #[error("stored vector has norm {0}, expected 1")]
    NotUnitNorm(f64),
    #[error("stored width {0} is not a valid dimension count")]
    InvalidDims(String),
}
