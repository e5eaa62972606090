//! Enrollment bans.

use chrono::{DateTime, Utc};
use fitpass_core::{BlockRecord, PersonId};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use super::{from_millis, from_millis_opt, to_millis, StoreError};

/// Whether an effective ban exists: active, and permanent or expiring
/// strictly after `now`.
pub async fn is_blocked(
    conn: &mut SqliteConnection,
    person_id: PersonId,
    now: DateTime<Utc>,
) -> Result<bool, StoreError> {
    let blocked: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM person_blocks
            WHERE person_id = ?1
              AND active = 1
              AND (expires_at IS NULL OR expires_at > ?2)
        )
        "#,
    )
    .bind(person_id.get())
    .bind(to_millis(now))
    .fetch_one(conn)
    .await?;

    Ok(blocked)
}

pub async fn place(
    conn: &mut SqliteConnection,
    person_id: PersonId,
    reason: Option<&str>,
    expires_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<BlockRecord, StoreError> {
    let row = sqlx::query(
        r#"
        INSERT INTO person_blocks (person_id, active, reason, expires_at, created_at)
        VALUES (?1, 1, ?2, ?3, ?4)
        RETURNING block_id, person_id, active, reason, expires_at, created_at
        "#,
    )
    .bind(person_id.get())
    .bind(reason)
    .bind(expires_at.map(to_millis))
    .bind(to_millis(now))
    .fetch_one(conn)
    .await?;

    parse_block_row(&row)
}

/// Deactivate every active ban on a person. Returns how many were lifted.
pub async fn lift(conn: &mut SqliteConnection, person_id: PersonId) -> Result<u64, StoreError> {
    let result =
        sqlx::query("UPDATE person_blocks SET active = 0 WHERE person_id = ?1 AND active = 1")
            .bind(person_id.get())
            .execute(conn)
            .await?;

    Ok(result.rows_affected())
}

/// All bans ever placed on a person, oldest first.
pub async fn list_for_person(
    conn: &mut SqliteConnection,
    person_id: PersonId,
) -> Result<Vec<BlockRecord>, StoreError> {
    let rows = sqlx::query(
        r#"
        SELECT block_id, person_id, active, reason, expires_at, created_at
        FROM person_blocks
        WHERE person_id = ?1
        ORDER BY block_id
        "#,
    )
    .bind(person_id.get())
    .fetch_all(conn)
    .await?;

    rows.iter().map(parse_block_row).collect()
}

fn parse_block_row(row: &SqliteRow) -> Result<BlockRecord, StoreError> {
    Ok(BlockRecord {
        id: row.try_get("block_id")?,
        person_id: PersonId::new(row.try_get("person_id")?),
        active: row.try_get("active")?,
        reason: row.try_get("reason")?,
        expires_at: from_millis_opt(row.try_get("expires_at")?)?,
        created_at: from_millis(row.try_get("created_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::persons;
    use crate::store::testing::temp_db;
    use chrono::Duration;
    use fitpass_core::{PersonKind, PersonProfile};

    async fn person(conn: &mut SqliteConnection) -> PersonId {
        let profile = PersonProfile {
            kind: PersonKind::Member,
            national_id: Some("22222222-2".into()),
            first_name: "Luis".into(),
            last_name: "Soto".into(),
            email: None,
            phone: None,
        };
        persons::resolve(conn, &profile, Utc::now()).await.unwrap().id
    }

    #[tokio::test]
    async fn test_no_bans_means_not_blocked() {
        let (db, _dir) = temp_db().await;
        let mut conn = db.acquire().await.unwrap();
        let id = person(&mut conn).await;

        assert!(!is_blocked(&mut conn, id, Utc::now()).await.unwrap());
    }

    #[tokio::test]
    async fn test_permanent_ban_blocks_until_lifted() {
        let (db, _dir) = temp_db().await;
        let mut conn = db.acquire().await.unwrap();
        let id = person(&mut conn).await;
        let now = Utc::now();

        let record = place(&mut conn, id, Some("unpaid dues"), None, now)
            .await
            .unwrap();
        assert!(record.active);
        assert_eq!(record.reason.as_deref(), Some("unpaid dues"));
        assert!(is_blocked(&mut conn, id, now).await.unwrap());

        assert_eq!(lift(&mut conn, id).await.unwrap(), 1);
        assert!(!is_blocked(&mut conn, id, now).await.unwrap());
        assert_eq!(lift(&mut conn, id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_expiry_is_exclusive() {
        let (db, _dir) = temp_db().await;
        let mut conn = db.acquire().await.unwrap();
        let id = person(&mut conn).await;
        let now = Utc::now();
        let until = now + Duration::hours(1);

        place(&mut conn, id, None, Some(until), now).await.unwrap();

        assert!(is_blocked(&mut conn, id, now).await.unwrap());
        assert!(!is_blocked(&mut conn, id, until).await.unwrap());
        assert!(!is_blocked(&mut conn, id, until + Duration::seconds(1))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_list_matches_effectiveness() {
        let (db, _dir) = temp_db().await;
        let mut conn = db.acquire().await.unwrap();
        let id = person(&mut conn).await;
        let now = Utc::now();

        place(&mut conn, id, None, Some(now - Duration::days(1)), now - Duration::days(2))
            .await
            .unwrap();
        place(&mut conn, id, None, None, now).await.unwrap();

        let records = list_for_person(&mut conn, id).await.unwrap();
        assert_eq!(records.len(), 2);
        assert!(!records[0].is_effective(now));
        assert!(records[1].is_effective(now));
    }
}
