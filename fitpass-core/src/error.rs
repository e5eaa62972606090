//! Enrollment error taxonomy.
//!
//! Every variant maps to a distinct client-visible outcome. Only
//! [`EnrollmentError::Persistence`] is worth retrying, and retrying it is
//! always safe because a failed attempt commits nothing.

use serde::{Deserialize, Serialize};

use crate::person::PersonId;

/// Errors that can end an enrollment attempt.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EnrollmentError {
    /// The request is malformed (missing field, wrong type, out of range).
    #[error("invalid request: {0}")]
    InvalidRequestShape(String),

    /// The person has an active ban.
    #[error("person {0} is blocked from enrollment")]
    PersonBlocked(PersonId),

    /// The consent flag was absent or false.
    #[error("consent to policy '{policy_version}' was not given")]
    ConsentNotGiven { policy_version: String },

    #[error("embedding is required")]
    EmbeddingMissing,

    /// The embedding is not a flat sequence of numbers.
    #[error("embedding must be a flat array of numbers: {0}")]
    InvalidEmbeddingShape(String),

    #[error("embedding dimension mismatch: expected {expected}, found {found}")]
    InvalidEmbeddingDimension { expected: usize, found: usize },

    #[error("embedding value at index {index} is not finite")]
    InvalidEmbeddingValue { index: usize },

    #[error("embedding norm is zero or not finite")]
    ZeroNormEmbedding,

    #[error("liveness score {score} is below threshold {threshold}")]
    LivenessTooLow { score: f64, threshold: f64 },

    #[error("quality score {score} is below threshold {threshold}")]
    QualityTooLow { score: f64, threshold: f64 },

    /// Storage or transaction failure. Nothing was committed.
    #[error("persistence error: {0}")]
    Persistence(String),
}

impl EnrollmentError {
    /// Stable machine-readable code.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidRequestShape(_) => "invalid_request_shape",
            Self::PersonBlocked(_) => "person_blocked",
            Self::ConsentNotGiven { .. } => "consent_not_given",
            Self::EmbeddingMissing => "embedding_missing",
            Self::InvalidEmbeddingShape(_) => "invalid_embedding_shape",
            Self::InvalidEmbeddingDimension { .. } => "invalid_embedding_dimension",
            Self::InvalidEmbeddingValue { .. } => "invalid_embedding_value",
            Self::ZeroNormEmbedding => "zero_norm_embedding",
            Self::LivenessTooLow { .. } => "liveness_too_low",
            Self::QualityTooLow { .. } => "quality_too_low",
            Self::Persistence(_) => "persistence_error",
        }
    }

    /// HTTP status an outer request layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidRequestShape(_)
            | Self::ConsentNotGiven { .. }
            | Self::EmbeddingMissing
            | Self::InvalidEmbeddingShape(_)
            | Self::InvalidEmbeddingDimension { .. }
            | Self::InvalidEmbeddingValue { .. }
            | Self::ZeroNormEmbedding => 400,
            Self::LivenessTooLow { .. } | Self::QualityTooLow { .. } => 412,
            Self::PersonBlocked(_) => 423,
            Self::Persistence(_) => 500,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Persistence(_))
    }

    /// Whether the client should capture a new sample before trying again.
    pub fn requires_recapture(&self) -> bool {
        matches!(
            self,
            Self::EmbeddingMissing
                | Self::InvalidEmbeddingShape(_)
                | Self::InvalidEmbeddingDimension { .. }
                | Self::InvalidEmbeddingValue { .. }
                | Self::ZeroNormEmbedding
                | Self::LivenessTooLow { .. }
                | Self::QualityTooLow { .. }
        )
    }

    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            error: self.kind().to_string(),
            message: self.to_string(),
            status: self.status_code(),
            retryable: self.is_retryable(),
        }
    }
}

/// Serializable error body for outer layers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub error: String,
    pub message: String,
    pub status: u16,
    pub retryable: bool,
}
