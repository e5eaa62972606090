//! Person identity types.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Internal identifier of a person record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PersonId(pub i64);

impl PersonId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn get(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for PersonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whether the person is a gym member or staff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PersonKind {
    Member,
    Worker,
}

impl PersonKind {
    /// Column representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Member => "member",
            Self::Worker => "worker",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "member" => Some(Self::Member),
            "worker" => Some(Self::Worker),
            _ => None,
        }
    }
}

/// Identity and contact fields supplied with an enrollment request.
///
/// National id and email are the lookup keys; at least one of them must be
/// present for a returning person to be found again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonProfile {
    pub kind: PersonKind,
    #[serde(default)]
    pub national_id: Option<String>,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

impl PersonProfile {
    /// Canonicalize identifiers so lookups are insensitive to formatting.
    pub fn normalized(&self) -> Self {
        Self {
            kind: self.kind,
            national_id: self.national_id.as_deref().and_then(normalize_national_id),
            first_name: self.first_name.trim().to_string(),
            last_name: self.last_name.trim().to_string(),
            email: self.email.as_deref().and_then(normalize_email),
            phone: self
                .phone
                .as_deref()
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string),
        }
    }
}

/// A stored person record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    pub id: PersonId,
    pub kind: PersonKind,
    pub national_id: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Strip thousands separators and whitespace, upper-case the check digit.
///
/// `"11.111.111-k "` becomes `"11111111-K"`. Returns `None` when nothing is left.
pub fn normalize_national_id(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .chars()
        .filter(|c| *c != '.' && !c.is_whitespace())
        .map(|c| c.to_ascii_uppercase())
        .collect();
    (!cleaned.is_empty()).then_some(cleaned)
}

pub fn normalize_email(raw: &str) -> Option<String> {
    let cleaned = raw.trim().to_ascii_lowercase();
    (!cleaned.is_empty()).then_some(cleaned)
}
