//! Enrollment bans.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::person::PersonId;

/// A ban preventing a person from enrolling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockRecord {
    pub id: i64,
    pub person_id: PersonId,
    pub active: bool,
    pub reason: Option<String>,
    /// `None` means the ban never expires.
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl BlockRecord {
    /// Active, and either permanent or expiring strictly after `now`.
    pub fn is_effective(&self, now: DateTime<Utc>) -> bool {
        self.active && self.expires_at.map_or(true, |until| until > now)
    }
}
