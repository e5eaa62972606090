//! SQLite-backed repositories for the enrollment transaction.
//!
//! Every function takes a `&mut SqliteConnection` so callers decide the
//! transaction boundary. Inside an enrollment that connection comes from
//! [`crate::db::UnitOfWork::conn`].

pub mod audit;
pub mod blocks;
pub mod consents;
pub mod enrollments;
pub mod persons;

use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use fitpass_core::EnrollmentError;

/// Errors that can occur during store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("transaction deadline of {}ms exceeded", .0.as_millis())]
    DeadlineExceeded(Duration),
}

impl From<StoreError> for EnrollmentError {
    fn from(err: StoreError) -> Self {
        EnrollmentError::Persistence(err.to_string())
    }
}

pub(crate) fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

pub(crate) fn from_millis(ms: i64) -> Result<DateTime<Utc>, sqlx::Error> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| sqlx::Error::Decode(format!("Invalid timestamp: {}", ms).into()))
}

pub(crate) fn from_millis_opt(ms: Option<i64>) -> Result<Option<DateTime<Utc>>, sqlx::Error> {
    ms.map(from_millis).transpose()
}
