//! Database handle and write transactions.
//!
//! Wraps SQLite access via sqlx. Writes go through [`UnitOfWork`], which
//! holds a dedicated pooled connection for the lifetime of one
//! `BEGIN IMMEDIATE` transaction.

use std::path::Path;
use std::time::Duration;

use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Sqlite, SqliteConnection, SqlitePool};

use crate::store::StoreError;

/// How long a connection waits on SQLite's write lock before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// How long to wait for a free pooled connection.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Database handle wrapping a SQLite connection pool.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open or create a database at the given path.
    ///
    /// Runs migrations automatically to ensure schema is up to date.
    pub async fn open(path: impl AsRef<Path>, max_connections: u32) -> Result<Self, StoreError> {
        let path = path.as_ref();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                sqlx::Error::Configuration(format!("Failed to create db directory: {}", e).into())
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            // WAL lets readers proceed while one enrollment holds the write lock
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect_with(options)
            .await?;

        sqlx::migrate!().run(&pool).await?;

        tracing::debug!(path = %path.display(), max_connections, "Database opened");

        Ok(Self { pool })
    }

    /// The underlying connection pool, for read-only queries.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Check out a connection for reads outside any transaction.
    pub async fn acquire(&self) -> Result<PoolConnection<Sqlite>, StoreError> {
        Ok(self.pool.acquire().await?)
    }

    /// Start a write transaction.
    ///
    /// `BEGIN IMMEDIATE` takes SQLite's write lock up front, so concurrent
    /// enrollments queue here instead of failing at their first write.
    pub async fn begin(&self) -> Result<UnitOfWork, StoreError> {
        let conn = self.pool.acquire().await?;
        // Built before BEGIN so a cancelled BEGIN still discards the connection.
        let mut uow = UnitOfWork { conn, open: true };
        if let Err(e) = sqlx::query("BEGIN IMMEDIATE").execute(&mut *uow.conn).await {
            // No transaction was started; the connection goes back to the pool.
            uow.open = false;
            return Err(e.into());
        }
        Ok(uow)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// One write transaction on a dedicated connection.
///
/// Must end in [`commit`](Self::commit) or [`rollback`](Self::rollback). If it
/// is dropped first (an early return, a panic, or a cancelled future) the
/// connection is closed instead of returned to the pool, and SQLite discards
/// the uncommitted transaction.
pub struct UnitOfWork {
    conn: PoolConnection<Sqlite>,
    open: bool,
}

impl UnitOfWork {
    /// The transaction's connection, for repository calls.
    pub fn conn(&mut self) -> &mut SqliteConnection {
        &mut *self.conn
    }

    pub async fn commit(mut self) -> Result<(), StoreError> {
        sqlx::query("COMMIT").execute(&mut *self.conn).await?;
        self.open = false;
        Ok(())
    }

    pub async fn rollback(mut self) -> Result<(), StoreError> {
        sqlx::query("ROLLBACK").execute(&mut *self.conn).await?;
        self.open = false;
        Ok(())
    }
}

impl Drop for UnitOfWork {
    fn drop(&mut self) {
        if self.open {
            tracing::warn!("Unit of work dropped mid-transaction; discarding connection");
            self.conn.close_on_drop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn count(db: &Database, table: &str) -> i64 {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(db.pool())
            .await
            .unwrap()
    }

    async fn insert_person(uow: &mut UnitOfWork) {
        sqlx::query(
            "INSERT INTO persons (kind, first_name, last_name, created_at, updated_at)
             VALUES ('member', 'Ana', 'Rojas', 0, 0)",
        )
        .execute(uow.conn())
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_migrations_create_tables() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("nested/fitpass.db"), 2)
            .await
            .unwrap();

        for table in [
            "persons",
            "person_blocks",
            "consents",
            "enrollments",
            "embeddings",
            "audit_log",
        ] {
            assert_eq!(count(&db, table).await, 0, "{table} should exist and be empty");
        }
    }

    #[tokio::test]
    async fn test_commit_persists() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("fitpass.db"), 2).await.unwrap();

        let mut uow = db.begin().await.unwrap();
        insert_person(&mut uow).await;
        uow.commit().await.unwrap();

        assert_eq!(count(&db, "persons").await, 1);
    }

    #[tokio::test]
    async fn test_rollback_discards() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("fitpass.db"), 2).await.unwrap();

        let mut uow = db.begin().await.unwrap();
        insert_person(&mut uow).await;
        uow.rollback().await.unwrap();

        assert_eq!(count(&db, "persons").await, 0);
    }

    #[tokio::test]
    async fn test_drop_without_commit_discards_and_frees_pool() {
        let dir = tempdir().unwrap();
        // A single connection proves the dropped one was replaced.
        let db = Database::open(dir.path().join("fitpass.db"), 1).await.unwrap();

        {
            let mut uow = db.begin().await.unwrap();
            insert_person(&mut uow).await;
        }

        assert_eq!(count(&db, "persons").await, 0);

        let mut uow = db.begin().await.unwrap();
        insert_person(&mut uow).await;
        uow.commit().await.unwrap();
        assert_eq!(count(&db, "persons").await, 1);
    }

    #[tokio::test]
    async fn test_failed_begin_keeps_connection() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("fitpass.db"), 2).await.unwrap();

        let holder = db.begin().await.unwrap();
        // Waits out the busy timeout on the held write lock.
        assert!(db.begin().await.is_err());
        holder.rollback().await.unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(db.pool().size(), 2);
        assert_eq!(db.pool().num_idle(), 2);
    }
}
