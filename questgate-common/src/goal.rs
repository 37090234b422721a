use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::card::CardIndex;
use crate::policy::{PolicyError, ProofPolicy, ProofType};

pub type GoalId = u64;

/// Quests and powers keep independent nullifier scopes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GoalKind {
    Quest,
    Power,
}

impl GoalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Quest => "quest",
            Self::Power => "power",
        }
    }

    /// Path segment used by the goal API (`/api/quests`, `/api/powers`).
    pub fn collection_name(&self) -> &'static str {
        match self {
            Self::Quest => "quests",
            Self::Power => "powers",
        }
    }
}

impl fmt::Display for GoalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GoalKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "quest" | "quests" => Ok(Self::Quest),
            "power" | "powers" => Ok(Self::Power),
            other => Err(format!("unknown goal kind: {other}")),
        }
    }
}

/// A quest or power whose proof policy has already been validated.
///
/// Deserializing a `Goal` goes through [`RawGoal`], so a goal with malformed
/// `proofParams` fails at load time rather than at evaluation time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawGoal", into = "RawGoal")]
pub struct Goal {
    pub id: GoalId,
    pub kind: GoalKind,
    pub name: String,
    pub description: String,
    /// Cards that count toward the goal's score.
    pub collection_card_indices: BTreeSet<CardIndex>,
    /// Cards that gate participation. Never nullified.
    pub prerequisite_card_indices: BTreeSet<CardIndex>,
    pub proof_type: ProofType,
    pub policy: ProofPolicy,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    /// Powers attached to a quest. Always empty for powers.
    pub powers: Vec<Goal>,
}

impl Goal {
    pub fn new(id: GoalId, kind: GoalKind, name: impl Into<String>, policy: ProofPolicy) -> Self {
        let proof_type = match policy {
            ProofPolicy::AtLeastOne => ProofType::InCollection,
            ProofPolicy::NUniqueInCollection(_) => ProofType::NUniqueInCollection,
        };
        Self {
            id,
            kind,
            name: name.into(),
            description: String::new(),
            collection_card_indices: BTreeSet::new(),
            prerequisite_card_indices: BTreeSet::new(),
            proof_type,
            policy,
            start_time: None,
            end_time: None,
            powers: Vec::new(),
        }
    }

    pub fn with_collection(mut self, indices: impl IntoIterator<Item = CardIndex>) -> Self {
        self.collection_card_indices = indices.into_iter().collect();
        self
    }

    pub fn with_prerequisites(mut self, indices: impl IntoIterator<Item = CardIndex>) -> Self {
        self.prerequisite_card_indices = indices.into_iter().collect();
        self
    }

    pub fn with_proof_type(mut self, proof_type: ProofType) -> Self {
        self.proof_type = proof_type;
        self
    }

    pub fn with_window(
        mut self,
        start_time: Option<DateTime<Utc>>,
        end_time: Option<DateTime<Utc>>,
    ) -> Self {
        self.start_time = start_time;
        self.end_time = end_time;
        self
    }

    pub fn with_powers(mut self, powers: Vec<Goal>) -> Self {
        self.powers = powers;
        self
    }

    /// True once `now` is strictly past the goal's end time.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.end_time.map_or(false, |end| now > end)
    }

    pub fn is_team_leaderboard(&self) -> bool {
        self.proof_type == ProofType::TeamLeaderboard
    }

    pub fn power(&self, id: GoalId) -> Option<&Goal> {
        self.powers.iter().find(|power| power.id == id)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardRef {
    pub index: CardIndex,
}

/// Wire shape of a goal as served by the goal API.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawGoal {
    pub id: GoalId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<GoalKind>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub collection_cards: Vec<CardRef>,
    #[serde(default)]
    pub prerequisite_cards: Vec<CardRef>,
    #[serde(default)]
    pub proof_type: ProofType,
    #[serde(default)]
    pub proof_params: Option<JsonValue>,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub powers: Vec<RawGoal>,
}

impl TryFrom<RawGoal> for Goal {
    type Error = PolicyError;

    fn try_from(raw: RawGoal) -> Result<Self, Self::Error> {
        let policy = ProofPolicy::from_raw(raw.proof_type, raw.proof_params.as_ref())?;
        let powers = raw
            .powers
            .into_iter()
            .map(|power| {
                Goal::try_from(power).map(|mut goal| {
                    goal.kind = GoalKind::Power;
                    goal
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            id: raw.id,
            kind: raw.kind.unwrap_or(GoalKind::Quest),
            name: raw.name,
            description: raw.description,
            collection_card_indices: raw.collection_cards.iter().map(|c| c.index).collect(),
            prerequisite_card_indices: raw.prerequisite_cards.iter().map(|c| c.index).collect(),
            proof_type: raw.proof_type,
            policy,
            start_time: raw.start_time,
            end_time: raw.end_time,
            powers,
        })
    }
}

impl From<Goal> for RawGoal {
    fn from(goal: Goal) -> Self {
        Self {
            id: goal.id,
            kind: Some(goal.kind),
            name: goal.name,
            description: goal.description,
            collection_cards: goal
                .collection_card_indices
                .into_iter()
                .map(|index| CardRef { index })
                .collect(),
            prerequisite_cards: goal
                .prerequisite_card_indices
                .into_iter()
                .map(|index| CardRef { index })
                .collect(),
            proof_type: goal.proof_type,
            proof_params: Some(goal.policy.to_raw_params()),
            start_time: goal.start_time,
            end_time: goal.end_time,
            powers: goal.powers.into_iter().map(RawGoal::from).collect(),
        }
    }
}
