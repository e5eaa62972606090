//! State machine of a single enrollment attempt.
//!
//! An attempt walks a fixed sequence of stages. Skipping or reordering a
//! stage is a programming error and is reported as [`InvalidTransition`];
//! any non-terminal stage may abort.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Progress of one enrollment attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentStage {
    Started,
    PersonResolved,
    BlockChecked,
    ConsentRecorded,
    EmbeddingValidated,
    CredentialReplaced,
    EmbeddingStored,
    Audited,
    Committed,
    Aborted,
}

impl EnrollmentStage {
    /// The only stage that may follow this one on the success path.
    pub fn next(&self) -> Option<Self> {
        match self {
            Self::Started => Some(Self::PersonResolved),
            Self::PersonResolved => Some(Self::BlockChecked),
            Self::BlockChecked => Some(Self::ConsentRecorded),
            Self::ConsentRecorded => Some(Self::EmbeddingValidated),
            Self::EmbeddingValidated => Some(Self::CredentialReplaced),
            Self::CredentialReplaced => Some(Self::EmbeddingStored),
            Self::EmbeddingStored => Some(Self::Audited),
            Self::Audited => Some(Self::Committed),
            Self::Committed | Self::Aborted => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Committed | Self::Aborted)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::PersonResolved => "person_resolved",
            Self::BlockChecked => "block_checked",
            Self::ConsentRecorded => "consent_recorded",
            Self::EmbeddingValidated => "embedding_validated",
            Self::CredentialReplaced => "credential_replaced",
            Self::EmbeddingStored => "embedding_stored",
            Self::Audited => "audited",
            Self::Committed => "committed",
            Self::Aborted => "aborted",
        }
    }
}

impl fmt::Display for EnrollmentStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error when a stage transition is invalid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidTransition {
    pub from: EnrollmentStage,
    pub to: EnrollmentStage,
    pub reason: &'static str,
}

impl fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid transition: cannot move attempt from '{}' to '{}': {}",
            self.from, self.to, self.reason
        )
    }
}

impl std::error::Error for InvalidTransition {}

/// Tracks where an attempt is, and where it stopped if it aborted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrollmentAttempt {
    stage: EnrollmentStage,
    aborted_from: Option<EnrollmentStage>,
}

impl EnrollmentAttempt {
    pub fn new() -> Self {
        Self {
            stage: EnrollmentStage::Started,
            aborted_from: None,
        }
    }

    pub fn stage(&self) -> EnrollmentStage {
        self.stage
    }

    /// Stage the attempt was in when it aborted.
    pub fn aborted_from(&self) -> Option<EnrollmentStage> {
        self.aborted_from
    }

    /// Move to `to`, which must be the immediate successor of the current stage.
    pub fn advance(&mut self, to: EnrollmentStage) -> Result<(), InvalidTransition> {
        if to == EnrollmentStage::Aborted {
            return Err(InvalidTransition {
                from: self.stage,
                to,
                reason: "use abort() to abandon an attempt",
            });
        }
        match self.stage.next() {
            Some(expected) if expected == to => {
                self.stage = to;
                Ok(())
            }
            Some(_) => Err(InvalidTransition {
                from: self.stage,
                to,
                reason: "stages must be visited in order",
            }),
            None => Err(InvalidTransition {
                from: self.stage,
                to,
                reason: "attempt already finished",
            }),
        }
    }

    /// Abandon the attempt. Returns the stage it was in.
    pub fn abort(&mut self) -> Result<EnrollmentStage, InvalidTransition> {
        if self.stage.is_terminal() {
            return Err(InvalidTransition {
                from: self.stage,
                to: EnrollmentStage::Aborted,
                reason: "attempt already finished",
            });
        }
        let from = self.stage;
        self.aborted_from = Some(from);
        self.stage = EnrollmentStage::Aborted;
        Ok(from)
    }
}

impl Default for EnrollmentAttempt {
    fn default() -> Self {
        Self::new()
    }
}
