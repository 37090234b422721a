//! Error types for the questgate engine.

use questgate_common::{GoalId, GoalKind};
use thiserror::Error;

// ═══════════════════════════════════════════════════════════════════════════════
// STORE ERRORS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("nullifier db error: {0}")]
    Sled(#[from] sled::Error),

    #[error("nullifier file {path}: {source}")]
    File {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("nullifier document is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("nullifier store lock poisoned")]
    Poisoned,
}

// ═══════════════════════════════════════════════════════════════════════════════
// COLLABORATOR ERRORS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Error)]
pub enum ProverError {
    #[error("proof generation failed: {0}")]
    Failed(String),

    #[error("missing proof material: {0}")]
    MissingMaterial(String),
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("submission rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("submission transport failed: {0}")]
    Transport(String),

    #[error("malformed submission response: {0}")]
    MalformedResponse(String),
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read goal catalog {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse goal catalog: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("duplicate {kind} id {id} in goal catalog")]
    Duplicate { kind: GoalKind, id: GoalId },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid value for {var}: {value}")]
    InvalidEnv { var: &'static str, value: String },
}

// ═══════════════════════════════════════════════════════════════════════════════
// SESSION ERRORS
// ═══════════════════════════════════════════════════════════════════════════════

/// Why a proof session ended in `Failed`.
///
/// Only [`SessionError::NullifierCommit`] is raised after the submission was
/// accepted; every other variant leaves the nullifier store untouched.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no cards collected")]
    NoCards,

    #[error("goal has ended")]
    Expired,

    #[error("no prerequisite card collected")]
    MissingPrerequisite,

    #[error("all collected cards have already been submitted")]
    AlreadySubmitted,

    #[error("proof {index} of {total} failed: {source}")]
    ProofGeneration {
        index: usize,
        total: usize,
        #[source]
        source: ProverError,
    },

    #[error(transparent)]
    Submission(#[from] SubmitError),

    #[error("session cancelled")]
    Cancelled,

    #[error("failed to read spent signatures: {0}")]
    Store(#[from] StoreError),

    #[error("score of {score_delta} was credited but nullifiers were not recorded: {source}")]
    NullifierCommit {
        score_delta: u64,
        #[source]
        source: StoreError,
    },

    #[error("invalid session transition: {0}")]
    InvalidTransition(&'static str),
}

impl SessionError {
    /// Validation failures are safe to retry once the user's inventory changes.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::NoCards | Self::Expired | Self::MissingPrerequisite | Self::AlreadySubmitted
        )
    }

    /// Failures after which the same session may be retried as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ProofGeneration { .. } | Self::Submission(_) | Self::Cancelled | Self::Store(_)
        )
    }
}
