//! Biometric credential (enrollment) records and their lifecycle.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::person::PersonId;

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier for an enrollment credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnrollmentId(pub i64);

impl EnrollmentId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn get(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for EnrollmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Lifecycle
// ============================================================================

/// Lifecycle state of a credential.
///
/// A person has at most one `Current` credential. Enrolling again demotes the
/// previous one to `Superseded` in the same transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CredentialState {
    Current,
    Superseded,
    /// Set by an administrative revocation flow that lives outside this crate.
    Revoked,
}

impl CredentialState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Current => "current",
            Self::Superseded => "superseded",
            Self::Revoked => "revoked",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "current" => Some(Self::Current),
            "superseded" => Some(Self::Superseded),
            "revoked" => Some(Self::Revoked),
            _ => None,
        }
    }
}

/// Where the biometric capture was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CaptureSource {
    Kiosk,
    Tablet,
    Operator,
    Other,
}

impl CaptureSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Kiosk => "kiosk",
            Self::Tablet => "tablet",
            Self::Operator => "operator",
            Self::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "kiosk" => Some(Self::Kiosk),
            "tablet" => Some(Self::Tablet),
            "operator" => Some(Self::Operator),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

// ============================================================================
// Enrollment
// ============================================================================

/// A stored credential binding a person to one embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Enrollment {
    pub id: EnrollmentId,
    pub person_id: PersonId,
    pub state: CredentialState,
    pub source: CaptureSource,
    /// Liveness confidence in `[0, 1]`, if the capture reported one.
    pub liveness_score: Option<f64>,
    /// Capture quality in `[0, 1]`, if the capture reported one.
    pub quality_score: Option<f64>,
    pub created_at: DateTime<Utc>,
    /// When a later enrollment demoted this one.
    pub superseded_at: Option<DateTime<Utc>>,
}

impl Enrollment {
    pub fn is_current(&self) -> bool {
        self.state == CredentialState::Current
    }
}
