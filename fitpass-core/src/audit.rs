//! Audit trail entries for enrollment and ban administration.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::credential::EnrollmentId;
use crate::person::PersonId;

/// Action being audited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// A new current credential was created.
    EnrollmentCreated,
    /// A ban was placed on a person.
    BlockPlaced,
    /// Active bans on a person were lifted.
    BlockLifted,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EnrollmentCreated => "enrollment_created",
            Self::BlockPlaced => "block_placed",
            Self::BlockLifted => "block_lifted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "enrollment_created" => Some(Self::EnrollmentCreated),
            "block_placed" => Some(Self::BlockPlaced),
            "block_lifted" => Some(Self::BlockLifted),
            _ => None,
        }
    }
}

/// Object an audited action applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "id")]
pub enum AuditSubject {
    Enrollment(EnrollmentId),
    Person(PersonId),
}

impl AuditSubject {
    pub fn subject_type(&self) -> &'static str {
        match self {
            Self::Enrollment(_) => "enrollment",
            Self::Person(_) => "person",
        }
    }

    pub fn subject_id(&self) -> String {
        match self {
            Self::Enrollment(id) => id.to_string(),
            Self::Person(id) => id.to_string(),
        }
    }
}

/// One immutable audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// When the event occurred.
    pub ts: DateTime<Utc>,

    /// Person who performed the action (None for unauthenticated kiosks).
    pub actor: Option<PersonId>,

    pub action: AuditAction,

    pub subject: AuditSubject,

    /// Structured context. BTreeMap keeps serialization order deterministic.
    pub detail: BTreeMap<String, serde_json::Value>,
}

impl AuditEntry {
    /// Create a new entry with the current timestamp.
    pub fn new(actor: Option<PersonId>, action: AuditAction, subject: AuditSubject) -> Self {
        Self::with_timestamp(Utc::now(), actor, action, subject)
    }

    pub fn with_timestamp(
        ts: DateTime<Utc>,
        actor: Option<PersonId>,
        action: AuditAction,
        subject: AuditSubject,
    ) -> Self {
        Self {
            ts,
            actor,
            action,
            subject,
            detail: BTreeMap::new(),
        }
    }

    /// Add a detail field (builder pattern).
    pub fn with_detail(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.detail.insert(key.into(), value.into());
        self
    }
}
