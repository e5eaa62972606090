//! Consent ledger. One row per (person, policy version).

use chrono::{DateTime, Utc};
use fitpass_core::{Consent, ConsentId, PersonId};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use super::{from_millis, to_millis, StoreError};

/// Record acceptance of `policy_version` unless already on file.
///
/// Returns the new row, or `None` when the person had accepted this version
/// before. The existing row is left untouched.
pub async fn ensure_recorded(
    conn: &mut SqliteConnection,
    person_id: PersonId,
    policy_version: &str,
    origin: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Option<Consent>, StoreError> {
    let row = sqlx::query(
        r#"
        INSERT INTO consents (person_id, policy_version, origin, created_at)
        VALUES (?1, ?2, ?3, ?4)
        ON CONFLICT (person_id, policy_version) DO NOTHING
        RETURNING consent_id, person_id, policy_version, origin, created_at
        "#,
    )
    .bind(person_id.get())
    .bind(policy_version)
    .bind(origin)
    .bind(to_millis(now))
    .fetch_optional(conn)
    .await?;

    row.as_ref().map(parse_consent_row).transpose()
}

pub async fn list_for_person(
    conn: &mut SqliteConnection,
    person_id: PersonId,
) -> Result<Vec<Consent>, StoreError> {
    let rows = sqlx::query(
        r#"
        SELECT consent_id, person_id, policy_version, origin, created_at
        FROM consents
        WHERE person_id = ?1
        ORDER BY consent_id
        "#,
    )
    .bind(person_id.get())
    .fetch_all(conn)
    .await?;

    rows.iter().map(parse_consent_row).collect()
}

fn parse_consent_row(row: &SqliteRow) -> Result<Consent, StoreError> {
    Ok(Consent {
        id: ConsentId::new(row.try_get("consent_id")?),
        person_id: PersonId::new(row.try_get("person_id")?),
        policy_version: row.try_get("policy_version")?,
        origin: row.try_get("origin")?,
        created_at: from_millis(row.try_get("created_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::persons;
    use crate::store::testing::temp_db;
    use fitpass_core::{PersonKind, PersonProfile};

    async fn person(conn: &mut SqliteConnection) -> PersonId {
        let profile = PersonProfile {
            kind: PersonKind::Member,
            national_id: None,
            first_name: "Eva".into(),
            last_name: "Paz".into(),
            email: Some("eva@example.com".into()),
            phone: None,
        };
        persons::resolve(conn, &profile, Utc::now()).await.unwrap().id
    }

    #[tokio::test]
    async fn test_first_acceptance_is_recorded() {
        let (db, _dir) = temp_db().await;
        let mut conn = db.acquire().await.unwrap();
        let id = person(&mut conn).await;

        let consent = ensure_recorded(&mut conn, id, "1.0", Some("10.0.0.4"), Utc::now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(consent.person_id, id);
        assert_eq!(consent.policy_version, "1.0");
        assert_eq!(consent.origin.as_deref(), Some("10.0.0.4"));
    }

    #[tokio::test]
    async fn test_repeat_acceptance_is_a_no_op() {
        let (db, _dir) = temp_db().await;
        let mut conn = db.acquire().await.unwrap();
        let id = person(&mut conn).await;

        let first = ensure_recorded(&mut conn, id, "1.0", Some("10.0.0.4"), Utc::now())
            .await
            .unwrap()
            .unwrap();
        let again = ensure_recorded(&mut conn, id, "1.0", Some("10.9.9.9"), Utc::now())
            .await
            .unwrap();
        assert!(again.is_none());

        let all = list_for_person(&mut conn, id).await.unwrap();
        assert_eq!(all, vec![first]);
    }

    #[tokio::test]
    async fn test_new_policy_version_gets_its_own_row() {
        let (db, _dir) = temp_db().await;
        let mut conn = db.acquire().await.unwrap();
        let id = person(&mut conn).await;

        ensure_recorded(&mut conn, id, "1.0", None, Utc::now()).await.unwrap();
        let v2 = ensure_recorded(&mut conn, id, "2.0", None, Utc::now())
            .await
            .unwrap();
        assert!(v2.is_some());
        assert_eq!(list_for_person(&mut conn, id).await.unwrap().len(), 2);
    }
}
