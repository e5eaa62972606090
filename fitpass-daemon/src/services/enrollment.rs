//! One-shot enrollment orchestrator.
//!
//! Runs the whole enrollment as a single write transaction: resolve the
//! person, check bans, record consent, validate the embedding, replace the
//! current credential, store the vector and audit it. Any failure rolls the
//! transaction back, so a rejected attempt leaves no rows behind.

use std::time::Duration;

use chrono::{DateTime, Utc};
use fitpass_core::attempt::EnrollmentAttempt;
use fitpass_core::{
    AuditAction, AuditEntry, AuditSubject, CredentialState, Embedding, EnrollmentError,
    EnrollmentId, EnrollmentPolicy, EnrollmentRequest, EnrollmentResult, EnrollmentStage,
    PersonId,
};
use serde_json::json;

use crate::db::{Database, UnitOfWork};
use crate::store::{audit, blocks, consents, enrollments, persons, StoreError};

/// Who is performing the enrollment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnrollmentContext {
    /// Staff member operating the device. `None` for self-service kiosks.
    pub actor: Option<PersonId>,
}

impl EnrollmentContext {
    pub fn kiosk() -> Self {
        Self::default()
    }

    pub fn operator(actor: PersonId) -> Self {
        Self { actor: Some(actor) }
    }
}

/// Runs enrollment attempts against one database.
#[derive(Clone)]
pub struct EnrollmentOrchestrator {
    db: Database,
    policy: EnrollmentPolicy,
    /// Upper bound on one attempt, including the wait for the write lock.
    deadline: Duration,
}

impl EnrollmentOrchestrator {
    pub fn new(db: Database, policy: EnrollmentPolicy, deadline: Duration) -> Self {
        Self {
            db,
            policy,
            deadline,
        }
    }

    pub fn policy(&self) -> &EnrollmentPolicy {
        &self.policy
    }

    /// Enroll a person, replacing any current credential.
    ///
    /// Either every write commits or none does. Errors are reported in the
    /// order the steps run: ban, consent, then embedding checks.
    pub async fn enroll(
        &self,
        request: &EnrollmentRequest,
        ctx: &EnrollmentContext,
    ) -> Result<EnrollmentResult, EnrollmentError> {
        let mut attempt = EnrollmentAttempt::new();

        tracing::info!(
            request_id = ?request.request_id,
            source = request.source.as_str(),
            branch_id = ?request.branch_id,
            "Enrollment attempt"
        );

        // The deadline covers everything up to commit. If it fires, the
        // unit of work is dropped mid-transaction and SQLite rolls it back.
        let work = async {
            let mut uow = self.db.begin().await?;
            let outcome = self.run_steps(&mut uow, &mut attempt, request, ctx).await;
            Ok::<_, EnrollmentError>((uow, outcome))
        };
        let timed = tokio::time::timeout(self.deadline, work).await;

        let (uow, outcome) = match timed {
            Ok(Ok(pair)) => pair,
            Ok(Err(err)) => {
                tracing::error!(error = %err, "Could not start enrollment transaction");
                return Err(err);
            }
            Err(_) => {
                tracing::error!(
                    deadline_ms = self.deadline.as_millis() as u64,
                    stage = %attempt.stage(),
                    "Enrollment deadline exceeded; transaction discarded"
                );
                return Err(StoreError::DeadlineExceeded(self.deadline).into());
            }
        };

        match outcome {
            Ok(result) => {
                uow.commit().await?;
                if let Err(e) = attempt.advance(EnrollmentStage::Committed) {
                    tracing::warn!(error = %e, "Committed enrollment left in unexpected stage");
                }
                tracing::info!(
                    person_id = %result.person_id,
                    enrollment_id = %result.enrollment_id,
                    consent_recorded = result.consent_id.is_some(),
                    "Enrollment committed"
                );
                Ok(result)
            }
            Err(err) => {
                let failed_at = attempt.abort().unwrap_or_else(|_| attempt.stage());
                if let Err(rollback_err) = uow.rollback().await {
                    tracing::warn!(error = %rollback_err, "Rollback failed; connection discarded");
                }
                log_abort(&err, failed_at);
                Err(err)
            }
        }
    }

    async fn run_steps(
        &self,
        uow: &mut UnitOfWork,
        attempt: &mut EnrollmentAttempt,
        request: &EnrollmentRequest,
        ctx: &EnrollmentContext,
    ) -> Result<EnrollmentResult, EnrollmentError> {
        let now = Utc::now();

        let person = persons::resolve(uow.conn(), &request.person, now).await?;
        advance(attempt, EnrollmentStage::PersonResolved)?;

        if blocks::is_blocked(uow.conn(), person.id, now).await? {
            return Err(EnrollmentError::PersonBlocked(person.id));
        }
        advance(attempt, EnrollmentStage::BlockChecked)?;

        let policy_version = request.consent.policy_version.trim();
        if !request.consent.accepted {
            return Err(EnrollmentError::ConsentNotGiven {
                policy_version: policy_version.to_string(),
            });
        }
        let consent = consents::ensure_recorded(
            uow.conn(),
            person.id,
            policy_version,
            request.consent.origin.as_deref(),
            now,
        )
        .await?;
        advance(attempt, EnrollmentStage::ConsentRecorded)?;

        let embedding = self.validate_capture(request)?;
        advance(attempt, EnrollmentStage::EmbeddingValidated)?;

        let superseded = enrollments::supersede_current(uow.conn(), person.id, now).await?;
        let enrollment = enrollments::create_current(
            uow.conn(),
            person.id,
            request.source,
            request.liveness_score,
            request.quality_score,
            now,
        )
        .await?;
        advance(attempt, EnrollmentStage::CredentialReplaced)?;

        enrollments::attach_embedding(uow.conn(), enrollment.id, &embedding).await?;
        advance(attempt, EnrollmentStage::EmbeddingStored)?;

        let entry = audit_entry(now, ctx, request, enrollment.id, superseded);
        audit::record(uow.conn(), &entry).await?;
        advance(attempt, EnrollmentStage::Audited)?;

        tracing::debug!(
            person_id = %person.id,
            enrollment_id = %enrollment.id,
            superseded,
            "Enrollment staged"
        );

        Ok(EnrollmentResult {
            person_id: person.id,
            consent_id: consent.map(|c| c.id),
            enrollment_id: enrollment.id,
            state: CredentialState::Current,
            thresholds: self.policy.thresholds,
        })
    }

    /// Dimension, shape, finiteness and norm of the embedding, then the
    /// liveness and quality gates.
    fn validate_capture(&self, request: &EnrollmentRequest) -> Result<Embedding, EnrollmentError> {
        let payload = request
            .embedding
            .as_ref()
            .ok_or(EnrollmentError::EmbeddingMissing)?;

        let expected = self.policy.embedding_dims;
        if payload.dims != expected {
            return Err(EnrollmentError::InvalidEmbeddingDimension {
                expected,
                found: payload.dims,
            });
        }
        let embedding = Embedding::from_raw(&payload.values, expected)?;

        self.policy
            .check_scores(request.liveness_score, request.quality_score)?;

        Ok(embedding)
    }
}

fn advance(attempt: &mut EnrollmentAttempt, to: EnrollmentStage) -> Result<(), EnrollmentError> {
    attempt.advance(to).map_err(|e| {
        tracing::error!(error = %e, "Enrollment steps ran out of order");
        EnrollmentError::Persistence(e.to_string())
    })
}

fn audit_entry(
    now: DateTime<Utc>,
    ctx: &EnrollmentContext,
    request: &EnrollmentRequest,
    enrollment_id: EnrollmentId,
    superseded: u64,
) -> AuditEntry {
    AuditEntry::with_timestamp(
        now,
        ctx.actor,
        AuditAction::EnrollmentCreated,
        AuditSubject::Enrollment(enrollment_id),
    )
    .with_detail("request_id", json!(request.request_id))
    .with_detail("branch_id", json!(request.branch_id))
    .with_detail("device_id", json!(request.device_id))
    .with_detail("source", request.source.as_str())
    .with_detail("liveness_score", json!(request.liveness_score))
    .with_detail("quality_score", json!(request.quality_score))
    .with_detail("superseded", superseded)
}

fn log_abort(err: &EnrollmentError, failed_at: EnrollmentStage) {
    match err {
        EnrollmentError::Persistence(_) => {
            tracing::error!(error = %err, failed_at = %failed_at, "Enrollment aborted")
        }
        EnrollmentError::PersonBlocked(_) => {
            tracing::warn!(error = %err, failed_at = %failed_at, "Enrollment refused")
        }
        _ => tracing::info!(
            error = %err,
            kind = err.kind(),
            failed_at = %failed_at,
            "Enrollment rejected"
        ),
    }
}
