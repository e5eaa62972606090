//! # FitPass Core
//!
//! Pure domain types for the one-shot biometric enrollment transaction.
//!
//! ## Design Principles
//!
//! This crate is intentionally **IO-free**:
//! - No filesystem operations
//! - No network calls
//! - No database interactions
//!
//! Persistence and the transactional orchestrator live in `fitpass-daemon`.
//!
//! ## Modules
//!
//! - [`person`] - Person identity and lookup-key normalization
//! - [`block`] - Enrollment bans
//! - [`consent`] - Policy consent
//! - [`credential`] - Enrollment credentials and their lifecycle
//! - [`embedding`] - Embedding validation and L2 normalization
//! - [`policy`] - Liveness/quality thresholds
//! - [`attempt`] - State machine of one enrollment attempt
//! - [`audit`] - Audit trail entries
//! - [`request`] - Request parsing and the result contract
//! - [`error`] - Client-visible error taxonomy

pub mod attempt;
pub mod audit;
pub mod block;
pub mod consent;
pub mod credential;
pub mod embedding;
pub mod error;
pub mod person;
pub mod policy;
pub mod request;

pub use attempt::{EnrollmentAttempt, EnrollmentStage};
pub use audit::{AuditAction, AuditEntry, AuditSubject};
pub use block::BlockRecord;
pub use consent::{Consent, ConsentGrant, ConsentId};
pub use credential::{CaptureSource, CredentialState, Enrollment, EnrollmentId};
pub use embedding::{Embedding, EmbeddingPayload, RawVector};
pub use error::{EnrollmentError, ErrorReport};
pub use person::{Person, PersonId, PersonKind, PersonProfile};
pub use policy::{EnrollmentPolicy, Thresholds};
pub use request::{parse_request, parse_request_str, EnrollmentRequest, EnrollmentResult};
