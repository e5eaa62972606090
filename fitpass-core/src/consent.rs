//! Biometric-processing consent.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::person::PersonId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConsentId(pub i64);

impl ConsentId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn get(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for ConsentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Consent as submitted by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentGrant {
    pub policy_version: String,
    /// Must be explicitly `true`; absence counts as refusal.
    #[serde(default)]
    pub accepted: bool,
    /// Where the consent was given from, usually the client IP.
    #[serde(default)]
    pub origin: Option<String>,
}

/// One recorded acceptance of a policy version. Unique per (person, version).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Consent {
    pub id: ConsentId,
    pub person_id: PersonId,
    pub policy_version: String,
    pub origin: Option<String>,
    pub created_at: DateTime<Utc>,
}
