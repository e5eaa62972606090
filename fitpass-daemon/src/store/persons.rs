//! Person directory: lookup and upsert by natural key.

use chrono::{DateTime, Utc};
use fitpass_core::{Person, PersonId, PersonKind, PersonProfile};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use super::{from_millis, to_millis, StoreError};

/// Find the person matching `profile` or create one, returning the stored row.
///
/// Lookup is by national ID first, then by email. On a match, kind and names
/// are overwritten while national ID, email and phone are only filled in,
/// never cleared.
pub async fn resolve(
    conn: &mut SqliteConnection,
    profile: &PersonProfile,
    now: DateTime<Utc>,
) -> Result<Person, StoreError> {
    let profile = profile.normalized();

    let mut existing = None;
    if let Some(national_id) = profile.national_id.as_deref() {
        existing = find_by_national_id(conn, national_id).await?;
    }
    if existing.is_none() {
        if let Some(email) = profile.email.as_deref() {
            existing = find_by_email(conn, email).await?;
        }
    }

    match existing {
        Some(person) => update(conn, person.id, &profile, now).await,
        None => insert(conn, &profile, now).await,
    }
}

pub async fn get(conn: &mut SqliteConnection, id: PersonId) -> Result<Option<Person>, StoreError> {
    let row = sqlx::query(
        r#"
        SELECT person_id, kind, national_id, first_name, last_name, email, phone,
               created_at, updated_at
        FROM persons
        WHERE person_id = ?1
        "#,
    )
    .bind(id.get())
    .fetch_optional(conn)
    .await?;

    row.as_ref().map(parse_person_row).transpose()
}

/// Lookup by an already-normalized national ID.
pub async fn find_by_national_id(
    conn: &mut SqliteConnection,
    national_id: &str,
) -> Result<Option<Person>, StoreError> {
    let row = sqlx::query(
        r#"
        SELECT person_id, kind, national_id, first_name, last_name, email, phone,
               created_at, updated_at
        FROM persons
        WHERE national_id = ?1
        "#,
    )
    .bind(national_id)
    .fetch_optional(conn)
    .await?;

    row.as_ref().map(parse_person_row).transpose()
}

/// Lookup by an already-normalized email.
pub async fn find_by_email(
    conn: &mut SqliteConnection,
    email: &str,
) -> Result<Option<Person>, StoreError> {
    let row = sqlx::query(
        r#"
        SELECT person_id, kind, national_id, first_name, last_name, email, phone,
               created_at, updated_at
        FROM persons
        WHERE email = ?1
        "#,
    )
    .bind(email)
    .fetch_optional(conn)
    .await?;

    row.as_ref().map(parse_person_row).transpose()
}

async fn insert(
    conn: &mut SqliteConnection,
    profile: &PersonProfile,
    now: DateTime<Utc>,
) -> Result<Person, StoreError> {
    let row = sqlx::query(
        r#"
        INSERT INTO persons (
            kind, national_id, first_name, last_name, email, phone, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
        RETURNING person_id, kind, national_id, first_name, last_name, email, phone,
                  created_at, updated_at
        "#,
    )
    .bind(profile.kind.as_str())
    .bind(&profile.national_id)
    .bind(&profile.first_name)
    .bind(&profile.last_name)
    .bind(&profile.email)
    .bind(&profile.phone)
    .bind(to_millis(now))
    .fetch_one(conn)
    .await?;

    let person = parse_person_row(&row)?;
    tracing::debug!(person_id = %person.id, "Person created");
    Ok(person)
}

async fn update(
    conn: &mut SqliteConnection,
    id: PersonId,
    profile: &PersonProfile,
    now: DateTime<Utc>,
) -> Result<Person, StoreError> {
    let row = sqlx::query(
        r#"
        UPDATE persons SET
            kind = ?2,
            national_id = COALESCE(?3, national_id),
            first_name = ?4,
            last_name = ?5,
            email = COALESCE(?6, email),
            phone = COALESCE(?7, phone),
            updated_at = ?8
        WHERE person_id = ?1
        RETURNING person_id, kind, national_id, first_name, last_name, email, phone,
                  created_at, updated_at
        "#,
    )
    .bind(id.get())
    .bind(profile.kind.as_str())
    .bind(&profile.national_id)
    .bind(&profile.first_name)
    .bind(&profile.last_name)
    .bind(&profile.email)
    .bind(&profile.phone)
    .bind(to_millis(now))
    .fetch_one(conn)
    .await?;

    let person = parse_person_row(&row)?;
    tracing::debug!(person_id = %person.id, "Person updated");
    Ok(person)
}

fn parse_person_row(row: &SqliteRow) -> Result<Person, StoreError> {
    let kind_str: String = row.try_get("kind")?;
    let kind = PersonKind::parse(&kind_str)
        .ok_or_else(|| sqlx::Error::Decode(format!("Invalid person kind: {}", kind_str).into()))?;

    Ok(Person {
        id: PersonId::new(row.try_get("person_id")?),
        kind,
        national_id: row.try_get("national_id")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        email: row.try_get("email")?,
        phone: row.try_get("phone")?,
        created_at: from_millis(row.try_get("created_at")?)?,
        updated_at: from_millis(row.try_get("updated_at")?)?,
    })
}
