//! Acceptance thresholds for captured samples.

use serde::{Deserialize, Serialize};

use crate::error::EnrollmentError;

/// Thresholds reported back to clients for display.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Minimum cosine similarity for a match. Enforced by matching, not here.
    pub similarity: f64,
    pub liveness: f64,
    pub quality: f64,
}

/// Read-only enrollment configuration, fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnrollmentPolicy {
    /// Required embedding width.
    pub embedding_dims: usize,
    pub thresholds: Thresholds,
}

impl EnrollmentPolicy {
    pub const DEFAULT_EMBEDDING_DIMS: usize = 512;
    pub const DEFAULT_SIMILARITY: f64 = 0.9;
    pub const DEFAULT_LIVENESS: f64 = 0.8;
    pub const DEFAULT_QUALITY: f64 = 0.85;

    /// Reject scores below their thresholds, liveness first.
    ///
    /// An absent score is not checked.
    pub fn check_scores(
        &self,
        liveness: Option<f64>,
        quality: Option<f64>,
    ) -> Result<(), EnrollmentError> {
        if let Some(score) = liveness {
            if score < self.thresholds.liveness {
                return Err(EnrollmentError::LivenessTooLow {
                    score,
                    threshold: self.thresholds.liveness,
                });
            }
        }
        if let Some(score) = quality {
            if score < self.thresholds.quality {
                return Err(EnrollmentError::QualityTooLow {
                    score,
                    threshold: self.thresholds.quality,
                });
            }
        }
        Ok(())
    }
}

impl Default for EnrollmentPolicy {
    fn default() -> Self {
        Self {
            embedding_dims: Self::DEFAULT_EMBEDDING_DIMS,
            thresholds: Thresholds {
                similarity: Self::DEFAULT_SIMILARITY,
                liveness: Self::DEFAULT_LIVENESS,
                quality: Self::DEFAULT_QUALITY,
            },
        }
    }
}
