//! Test harness for enrollment E2E tests.
//!
//! Each [`TestStore`] owns a migrated SQLite file in a temporary directory,
//! so concurrent attempts exercise the real write lock.

use std::time::Duration;

use chrono::{DateTime, Utc};
use fitpass_core::{
    CaptureSource, ConsentGrant, Embedding, EmbeddingPayload, Enrollment, EnrollmentError,
    EnrollmentId, EnrollmentPolicy, EnrollmentRequest, EnrollmentResult, PersonId, PersonKind,
    PersonProfile, Thresholds,
};
use fitpass_daemon::store::{blocks, enrollments, persons};
use fitpass_daemon::{Database, EnrollmentContext, EnrollmentOrchestrator};
use tempfile::TempDir;

pub const DIMS: usize = 512;

/// Tables written by an enrollment, in schema order.
pub const TABLES: [&str; 5] = ["persons", "consents", "enrollments", "embeddings", "audit_log"];

pub fn test_policy() -> EnrollmentPolicy {
    EnrollmentPolicy {
        embedding_dims: DIMS,
        thresholds: Thresholds {
            similarity: 0.9,
            liveness: 0.8,
            quality: 0.85,
        },
    }
}

/// Orchestrator over a fresh on-disk database.
pub struct TestStore {
    pub db: Database,
    pub orchestrator: EnrollmentOrchestrator,
    _dir: TempDir,
}

impl TestStore {
    pub async fn new() -> Self {
        Self::with_deadline(Duration::from_secs(10)).await
    }

    pub async fn with_deadline(deadline: Duration) -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let db = Database::open(dir.path().join("fitpass.db"), 4)
            .await
            .expect("Failed to open database");
        let orchestrator = EnrollmentOrchestrator::new(db.clone(), test_policy(), deadline);

        Self {
            db,
            orchestrator,
            _dir: dir,
        }
    }

    /// Another orchestrator on the same database.
    pub fn orchestrator_with_deadline(&self, deadline: Duration) -> EnrollmentOrchestrator {
        EnrollmentOrchestrator::new(self.db.clone(), test_policy(), deadline)
    }

    pub async fn enroll(
        &self,
        request: &EnrollmentRequest,
    ) -> Result<EnrollmentResult, EnrollmentError> {
        self.orchestrator
            .enroll(request, &EnrollmentContext::kiosk())
            .await
    }

    pub async fn count(&self, table: &str) -> i64 {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(self.db.pool())
            .await
            .expect("count query failed")
    }

    /// Row counts of every enrollment table.
    pub async fn counts(&self) -> Vec<(&'static str, i64)> {
        let mut out = Vec::new();
        for table in TABLES {
            out.push((table, self.count(table).await));
        }
        out
    }

    /// Create a person directly, outside any enrollment.
    pub async fn seed_person(&self, profile: &PersonProfile) -> PersonId {
        let mut uow = self.db.begin().await.unwrap();
        let person = persons::resolve(uow.conn(), profile, Utc::now())
            .await
            .unwrap();
        uow.commit().await.unwrap();
        person.id
    }

    pub async fn block(&self, person_id: PersonId, expires_at: Option<DateTime<Utc>>) {
        let mut conn = self.db.acquire().await.unwrap();
        blocks::place(&mut conn, person_id, Some("test"), expires_at, Utc::now())
            .await
            .unwrap();
    }

    pub async fn history(&self, person_id: PersonId) -> Vec<Enrollment> {
        let mut conn = self.db.acquire().await.unwrap();
        enrollments::history_for_person(&mut conn, person_id)
            .await
            .unwrap()
    }

    pub async fn stored_embedding(&self, id: EnrollmentId) -> Embedding {
        let mut conn = self.db.acquire().await.unwrap();
        enrollments::load_embedding(&mut conn, id)
            .await
            .unwrap()
            .expect("embedding row missing")
    }
}

pub fn profile(national_id: &str) -> PersonProfile {
    PersonProfile {
        kind: PersonKind::Member,
        national_id: Some(national_id.to_string()),
        first_name: "Ana".into(),
        last_name: "Rojas".into(),
        email: Some(format!("{}@example.com", national_id.replace(['.', '-'], ""))),
        phone: None,
    }
}

/// Vector with `1.0` at `at` and zeros elsewhere.
pub fn one_hot(dims: usize, at: usize) -> Vec<f64> {
    let mut v = vec![0.0; dims];
    v[at] = 1.0;
    v
}

/// Deterministic non-unit vector with every component non-zero.
pub fn ramp(dims: usize) -> Vec<f64> {
    (0..dims).map(|i| 0.5 + (i % 7) as f64).collect()
}

/// A request that passes every check under [`test_policy`].
pub fn request(national_id: &str) -> EnrollmentRequest {
    EnrollmentRequest {
        person: profile(national_id),
        consent: ConsentGrant {
            policy_version: "1.0".into(),
            accepted: true,
            origin: Some("10.0.0.4".into()),
        },
        source: CaptureSource::Kiosk,
        branch_id: Some(3),
        device_id: Some("kiosk-01".into()),
        request_id: Some(uuid::Uuid::new_v4()),
        embedding: Some(EmbeddingPayload::new(ramp(DIMS))),
        liveness_score: Some(0.95),
        quality_score: Some(0.9),
    }
}
