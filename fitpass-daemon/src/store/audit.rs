//! Append-only audit trail.
//!
//! The schema rejects UPDATE and DELETE on `audit_log` with triggers, so
//! this module only ever inserts and reads.

use std::collections::BTreeMap;

use fitpass_core::{AuditAction, AuditEntry, AuditSubject, EnrollmentId, PersonId};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use super::{from_millis, to_millis, StoreError};

/// Append an entry. Returns its row id.
pub async fn record(conn: &mut SqliteConnection, entry: &AuditEntry) -> Result<i64, StoreError> {
    let detail =
        serde_json::to_string(&entry.detail).map_err(|e| sqlx::Error::Encode(Box::new(e)))?;

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO audit_log
            (actor_person_id, action, subject_type, subject_id, detail, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        RETURNING audit_id
        "#,
    )
    .bind(entry.actor.map(|p| p.get()))
    .bind(entry.action.as_str())
    .bind(entry.subject.subject_type())
    .bind(entry.subject.subject_id())
    .bind(detail)
    .bind(to_millis(entry.ts))
    .fetch_one(conn)
    .await?;

    tracing::debug!(
        audit_id = id,
        action = entry.action.as_str(),
        subject = %entry.subject.subject_id(),
        "Audit entry recorded"
    );

    Ok(id)
}

/// Entries about one subject, oldest first.
pub async fn list_for_subject(
    conn: &mut SqliteConnection,
    subject: &AuditSubject,
) -> Result<Vec<AuditEntry>, StoreError> {
    let rows = sqlx::query(
        r#"
        SELECT actor_person_id, action, subject_type, subject_id, detail, created_at
        FROM audit_log
        WHERE subject_type = ?1 AND subject_id = ?2
        ORDER BY audit_id
        "#,
    )
    .bind(subject.subject_type())
    .bind(subject.subject_id())
    .fetch_all(conn)
    .await?;

    rows.iter().map(parse_audit_row).collect()
}

fn parse_audit_row(row: &SqliteRow) -> Result<AuditEntry, StoreError> {
    let action_str: String = row.try_get("action")?;
    let action = AuditAction::parse(&action_str).ok_or_else(|| {
        sqlx::Error::Decode(format!("Invalid audit action: {}", action_str).into())
    })?;

    let subject_type: String = row.try_get("subject_type")?;
    let subject_id: String = row.try_get("subject_id")?;
    let id: i64 = subject_id.parse().map_err(|e| {
        sqlx::Error::Decode(format!("Invalid subject id {}: {}", subject_id, e).into())
    })?;
    let subject = match subject_type.as_str() {
        "enrollment" => AuditSubject::Enrollment(EnrollmentId::new(id)),
        "person" => AuditSubject::Person(PersonId::new(id)),
        other => {
            let msg = format!("Invalid subject type: {}", other);
            return Err(sqlx::Error::Decode(msg.into()).into());
        }
    };

    let detail_json: String = row.try_get("detail")?;
    let detail: BTreeMap<String, serde_json::Value> = serde_json::from_str(&detail_json)
        .map_err(|e| sqlx::Error::Decode(format!("Invalid detail JSON: {}", e).into()))?;

    Ok(AuditEntry {
        ts: from_millis(row.try_get("created_at")?)?,
        actor: row.try_get::<Option<i64>, _>("actor_person_id")?.map(PersonId::new),
        action,
        subject,
        detail,
    })
}
