//! Enrollment ledger: credentials and their embeddings.
//!
//! A person has at most one `current` enrollment. [`supersede_current`] must
//! run before [`create_current`] in the same transaction; the partial unique
//! index `enrollments_one_current` rejects any interleaving that would leave
//! two.

use chrono::{DateTime, Utc};
use fitpass_core::embedding::DecodeError;
use fitpass_core::{
    CaptureSource, CredentialState, Embedding, Enrollment, EnrollmentId, PersonId,
};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use super::{from_millis, from_millis_opt, to_millis, StoreError};

/// Demote the person's current enrollment, if any. Returns rows changed (0 or 1).
pub async fn supersede_current(
    conn: &mut SqliteConnection,
    person_id: PersonId,
    now: DateTime<Utc>,
) -> Result<u64, StoreError> {
    let result = sqlx::query(
        r#"
        UPDATE enrollments
        SET state = 'superseded', superseded_at = ?2
        WHERE person_id = ?1 AND state = 'current'
        "#,
    )
    .bind(person_id.get())
    .bind(to_millis(now))
    .execute(conn)
    .await?;

    Ok(result.rows_affected())
}

pub async fn create_current(
    conn: &mut SqliteConnection,
    person_id: PersonId,
    source: CaptureSource,
    liveness_score: Option<f64>,
    quality_score: Option<f64>,
    now: DateTime<Utc>,
) -> Result<Enrollment, StoreError> {
    let row = sqlx::query(
        r#"
        INSERT INTO enrollments (
            person_id, state, source, liveness_score, quality_score, created_at
        ) VALUES (?1, 'current', ?2, ?3, ?4, ?5)
        RETURNING enrollment_id, person_id, state, source, liveness_score, quality_score,
                  created_at, superseded_at
        "#,
    )
    .bind(person_id.get())
    .bind(source.as_str())
    .bind(liveness_score)
    .bind(quality_score)
    .bind(to_millis(now))
    .fetch_one(conn)
    .await?;

    parse_enrollment_row(&row)
}

/// Store the normalized vector for an enrollment.
pub async fn attach_embedding(
    conn: &mut SqliteConnection,
    enrollment_id: EnrollmentId,
    embedding: &Embedding,
) -> Result<(), StoreError> {
    sqlx::query("INSERT INTO embeddings (enrollment_id, dims, vector) VALUES (?1, ?2, ?3)")
        .bind(enrollment_id.get())
        .bind(embedding.dims() as i64)
        .bind(embedding.to_le_bytes())
        .execute(conn)
        .await?;

    Ok(())
}

pub async fn get(
    conn: &mut SqliteConnection,
    id: EnrollmentId,
) -> Result<Option<Enrollment>, StoreError> {
    let row = sqlx::query(
        r#"
        SELECT enrollment_id, person_id, state, source, liveness_score, quality_score,
               created_at, superseded_at
        FROM enrollments
        WHERE enrollment_id = ?1
        "#,
    )
    .bind(id.get())
    .fetch_optional(conn)
    .await?;

    row.as_ref().map(parse_enrollment_row).transpose()
}

pub async fn current_for_person(
    conn: &mut SqliteConnection,
    person_id: PersonId,
) -> Result<Option<Enrollment>, StoreError> {
    let row = sqlx::query(
        r#"
        SELECT enrollment_id, person_id, state, source, liveness_score, quality_score,
               created_at, superseded_at
        FROM enrollments
        WHERE person_id = ?1 AND state = 'current'
        "#,
    )
    .bind(person_id.get())
    .fetch_optional(conn)
    .await?;

    row.as_ref().map(parse_enrollment_row).transpose()
}

/// Every enrollment of a person, oldest first.
pub async fn history_for_person(
    conn: &mut SqliteConnection,
    person_id: PersonId,
) -> Result<Vec<Enrollment>, StoreError> {
    let rows = sqlx::query(
        r#"
        SELECT enrollment_id, person_id, state, source, liveness_score, quality_score,
               created_at, superseded_at
        FROM enrollments
        WHERE person_id = ?1
        ORDER BY enrollment_id
        "#,
    )
    .bind(person_id.get())
    .fetch_all(conn)
    .await?;

    rows.iter().map(parse_enrollment_row).collect()
}

/// Load and decode a stored vector, checking it is still unit-norm.
pub async fn load_embedding(
    conn: &mut SqliteConnection,
    enrollment_id: EnrollmentId,
) -> Result<Option<Embedding>, StoreError> {
    let row = sqlx::query("SELECT dims, vector FROM embeddings WHERE enrollment_id = ?1")
        .bind(enrollment_id.get())
        .fetch_optional(conn)
        .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let dims: i64 = row.try_get("dims")?;
    let vector: Vec<u8> = row.try_get("vector")?;
    let embedding = usize::try_from(dims)
        .map_err(|_| DecodeError::InvalidDims(dims.to_string()))
        .and_then(|dims| Embedding::from_le_bytes(&vector, dims))
        .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;

    Ok(Some(embedding))
}

fn parse_enrollment_row(row: &SqliteRow) -> Result<Enrollment, StoreError> {
    let state_str: String = row.try_get("state")?;
    let state = CredentialState::parse(&state_str).ok_or_else(|| {
        sqlx::Error::Decode(format!("Invalid credential state: {}", state_str).into())
    })?;

    let source_str: String = row.try_get("source")?;
    let source = CaptureSource::parse(&source_str)
        .ok_or_else(|| sqlx::Error::Decode(format!("Invalid source: {}", source_str).into()))?;

    Ok(Enrollment {
        id: EnrollmentId::new(row.try_get("enrollment_id")?),
        person_id: PersonId::new(row.try_get("person_id")?),
        state,
        source,
        liveness_score: row.try_get("liveness_score")?,
        quality_score: row.try_get("quality_score")?,
        created_at: from_millis(row.try_get("created_at")?)?,
        superseded_at: from_millis_opt(row.try_get("superseded_at")?)?,
    })
}
