//! Ban administration. Each change is written together with its audit entry.

use chrono::{DateTime, Utc};
use fitpass_core::{AuditAction, AuditEntry, AuditSubject, BlockRecord, PersonId};
use serde_json::json;

use crate::db::Database;
use crate::store::{audit, blocks, persons, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum BlockAdminError {
    #[error("person {0} not found")]
    PersonNotFound(PersonId),
    #[error("ban must expire in the future")]
    ExpiryInPast,
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone)]
pub struct BlockAdmin {
    db: Database,
}

impl BlockAdmin {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Ban a person from enrolling, optionally until `expires_at`.
    pub async fn place(
        &self,
        actor: Option<PersonId>,
        person_id: PersonId,
        reason: Option<&str>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<BlockRecord, BlockAdminError> {
        let now = Utc::now();
        if matches!(expires_at, Some(until) if until <= now) {
            return Err(BlockAdminError::ExpiryInPast);
        }

        let mut uow = self.db.begin().await?;
        if persons::get(uow.conn(), person_id).await?.is_none() {
            uow.rollback().await?;
            return Err(BlockAdminError::PersonNotFound(person_id));
        }

        let record = blocks::place(uow.conn(), person_id, reason, expires_at, now).await?;
        let entry = AuditEntry::with_timestamp(
            now,
            actor,
            AuditAction::BlockPlaced,
            AuditSubject::Person(person_id),
        )
        .with_detail("block_id", record.id)
        .with_detail("reason", json!(reason))
        .with_detail("expires_at", json!(expires_at));
        audit::record(uow.conn(), &entry).await?;
        uow.commit().await?;

        tracing::info!(
            person_id = %person_id,
            block_id = record.id,
            expires_at = ?expires_at,
            "Enrollment ban placed"
        );
        Ok(record)
    }

    /// Lift every active ban on a person. Returns how many were lifted.
    ///
    /// Nothing is audited when there was nothing to lift.
    pub async fn lift(
        &self,
        actor: Option<PersonId>,
        person_id: PersonId,
    ) -> Result<u64, BlockAdminError> {
        let now = Utc::now();
        let mut uow = self.db.begin().await?;

        let lifted = blocks::lift(uow.conn(), person_id).await?;
        if lifted == 0 {
            uow.rollback().await?;
            return Ok(0);
        }

        let entry = AuditEntry::with_timestamp(
            now,
            actor,
            AuditAction::BlockLifted,
            AuditSubject::Person(person_id),
        )
        .with_detail("lifted", lifted);
        audit::record(uow.conn(), &entry).await?;
        uow.commit().await?;

        tracing::info!(person_id = %person_id, lifted, "Enrollment ban lifted");
        Ok(lifted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::temp_db;
    use chrono::Duration;
    use fitpass_core::{PersonKind, PersonProfile};

    async fn seeded() -> (BlockAdmin, Database, PersonId, tempfile::TempDir) {
        let (db, dir) = temp_db().await;
        let mut uow = db.begin().await.unwrap();
        let profile = PersonProfile {
            kind: PersonKind::Member,
            national_id: Some("44444444-4".into()),
            first_name: "Iván".into(),
            last_name: "Mora".into(),
            email: None,
            phone: None,
        };
        let person = persons::resolve(uow.conn(), &profile, Utc::now()).await.unwrap();
        uow.commit().await.unwrap();
        (BlockAdmin::new(db.clone()), db, person.id, dir)
    }

    #[tokio::test]
    async fn test_place_and_lift_are_audited() {
        let (admin, db, person_id, _dir) = seeded().await;

        let record = admin
            .place(None, person_id, Some("chargeback"), None)
            .await
            .unwrap();
        assert!(record.active);

        let mut conn = db.acquire().await.unwrap();
        assert!(blocks::is_blocked(&mut conn, person_id, Utc::now()).await.unwrap());

        assert_eq!(admin.lift(None, person_id).await.unwrap(), 1);
        assert!(!blocks::is_blocked(&mut conn, person_id, Utc::now()).await.unwrap());

        let trail = audit::list_for_subject(&mut conn, &AuditSubject::Person(person_id))
            .await
            .unwrap();
        let actions: Vec<_> = trail.iter().map(|e| e.action).collect();
        assert_eq!(actions, vec![AuditAction::BlockPlaced, AuditAction::BlockLifted]);
        assert_eq!(trail[0].detail["reason"], "chargeback");
    }

    #[tokio::test]
    async fn test_lift_without_ban_writes_nothing() {
        let (admin, db, person_id, _dir) = seeded().await;

        assert_eq!(admin.lift(None, person_id).await.unwrap(), 0);

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM audit_log")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_place_rejects_unknown_person_and_past_expiry() {
        let (admin, _db, person_id, _dir) = seeded().await;

        assert!(matches!(
            admin.place(None, PersonId::new(999), None, None).await,
            Err(BlockAdminError::PersonNotFound(_))
        ));
        assert!(matches!(
            admin
                .place(None, person_id, None, Some(Utc::now() - Duration::hours(1)))
                .await,
            Err(BlockAdminError::ExpiryInPast)
        ));
    }
}
