//! Proof policies.
//!
//! Goals arrive with a raw `proofType` string and a free-form `proofParams`
//! object. [`ProofPolicy::from_raw`] turns that pair into a validated variant
//! once, when the goal is loaded; evaluation never looks at the raw params.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use thiserror::Error;

/// Proof type as stored alongside a goal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProofType {
    #[serde(rename = "IN_COLLECTION")]
    InCollection,
    #[serde(rename = "N_UNIQUE_IN_COLLECTION")]
    NUniqueInCollection,
    #[serde(rename = "TEAM_LEADERBOARD")]
    TeamLeaderboard,
    /// Any proof type this build does not know about. Treated as at-least-one.
    #[serde(other, rename = "UNKNOWN")]
    Unknown,
}

impl Default for ProofType {
    fn default() -> Self {
        Self::InCollection
    }
}

/// Rule deciding how many matching cards unlock a goal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProofPolicy {
    /// Unlocked once at least one matching card is owned.
    AtLeastOne,
    /// Unlocked once the number of matching cards reaches `N`.
    NUniqueInCollection(u32),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error("N_UNIQUE_IN_COLLECTION requires proofParams.N")]
    MissingThreshold,
    #[error("proofParams.N must be a positive integer, got {0}")]
    InvalidThreshold(String),
}

impl ProofPolicy {
    /// Validate a raw `(proofType, proofParams)` pair.
    pub fn from_raw(
        proof_type: ProofType,
        params: Option<&JsonValue>,
    ) -> Result<Self, PolicyError> {
        match proof_type {
            ProofType::NUniqueInCollection => {
                let raw = params
                    .and_then(|p| p.get("N"))
                    .filter(|v| !v.is_null())
                    .ok_or(PolicyError::MissingThreshold)?;
                let n = raw
                    .as_u64()
                    .filter(|n| *n > 0)
                    .and_then(|n| u32::try_from(n).ok())
                    .ok_or_else(|| PolicyError::InvalidThreshold(raw.to_string()))?;
                Ok(Self::NUniqueInCollection(n))
            }
            ProofType::InCollection | ProofType::TeamLeaderboard | ProofType::Unknown => {
                Ok(Self::AtLeastOne)
            }
        }
    }

    /// Raw params that [`ProofPolicy::from_raw`] accepts back.
    pub fn to_raw_params(&self) -> JsonValue {
        match self {
            Self::AtLeastOne => json!({}),
            Self::NUniqueInCollection(n) => json!({ "N": n }),
        }
    }

    /// Number of matching cards required to unlock.
    pub fn threshold(&self) -> u32 {
        match self {
            Self::AtLeastOne => 1,
            Self::NUniqueInCollection(n) => *n,
        }
    }
}
