//! Proof session state machine.
//!
//! ```text
//! Idle ─► Validating ─► Proving(0) ─► … ─► Proving(n-1) ─► Submitting ─► Committed
//!             │              │                                  │
//!             └──────────────┴──────────────► Failed ◄──────────┘
//! ```
//!
//! Every transition is a plain synchronous method on [`ProofSession`]; the
//! async [`crate::orchestrator::ProofOrchestrator`] only feeds it prover,
//! submitter and store results. `ProvingState` exists only between entering
//! `Proving(0)` and leaving `Submitting`.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use questgate_common::{
    binding_digest, CardProof, CardRecord, Goal, GoalId, GoalKind, ProofBundle, SignatureBinding,
};
use serde::Serialize;

use crate::error::{ProverError, SessionError, StoreError};
use crate::inventory::CollectionInventory;

/// Progress of the proving loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvingState {
    pub num_proofs_completed: usize,
    pub num_proofs_total: usize,
}

impl ProvingState {
    /// Completed fraction in `[0, 1]`.
    pub fn fraction(&self) -> f64 {
        self.num_proofs_completed as f64 / self.num_proofs_total.max(1) as f64
    }

    pub fn percentage(&self) -> f64 {
        self.fraction() * 100.0
    }

    /// Status line for the step currently running.
    ///
    /// The first proof is always a prerequisite (team) card, so collection
    /// cards are numbered out of `total - 1`.
    pub fn display_text(&self) -> String {
        match self.num_proofs_completed {
            0 => "Proving ownership of a team card Jubmoji...".to_string(),
            n if n == self.num_proofs_total => "Submitting proof to leaderboard...".to_string(),
            n => format!(
                "Proving ownership of Jubmoji {} of {}...",
                n,
                self.num_proofs_total.saturating_sub(1)
            ),
        }
    }
}

/// Coarse failure classification, cheap to compare and log.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    NoCards,
    Expired,
    MissingPrerequisite,
    AlreadySubmitted,
    ProofGeneration,
    Submission,
    Cancelled,
    Store,
    NullifierCommit,
    InvalidTransition,
}

impl SessionError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::NoCards => FailureKind::NoCards,
            Self::Expired => FailureKind::Expired,
            Self::MissingPrerequisite => FailureKind::MissingPrerequisite,
            Self::AlreadySubmitted => FailureKind::AlreadySubmitted,
            Self::ProofGeneration { .. } => FailureKind::ProofGeneration,
            Self::Submission(_) => FailureKind::Submission,
            Self::Cancelled => FailureKind::Cancelled,
            Self::Store(_) => FailureKind::Store,
            Self::NullifierCommit { .. } => FailureKind::NullifierCommit,
            Self::InvalidTransition(_) => FailureKind::InvalidTransition,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", content = "detail", rename_all = "snake_case")]
pub enum SessionPhase {
    Idle,
    Validating,
    Proving(usize),
    Submitting,
    Committed,
    Failed(FailureKind),
}

impl SessionPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Committed | Self::Failed(_))
    }
}

/// Records selected for a session, fixed at validation time.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionPlan {
    pub prerequisite_records: Vec<CardRecord>,
    pub collection_records: Vec<CardRecord>,
}

impl SessionPlan {
    pub fn total(&self) -> usize {
        self.prerequisite_records.len() + self.collection_records.len()
    }

    /// Proving order: prerequisites first, then unspent collection cards.
    pub fn record(&self, index: usize) -> Option<&CardRecord> {
        let prereqs = self.prerequisite_records.len();
        if index < prereqs {
            self.prerequisite_records.get(index)
        } else {
            self.collection_records.get(index - prereqs)
        }
    }

    pub fn collection_signatures(&self) -> Vec<String> {
        self.collection_records
            .iter()
            .map(|record| record.signature.clone())
            .collect()
    }
}

/// One pending proving step.
#[derive(Clone, Debug)]
pub struct ProofStep {
    pub index: usize,
    pub total: usize,
    pub record: CardRecord,
    pub binding: SignatureBinding,
}

/// Validate a session request without starting one.
///
/// `spent` is only consulted once the cheaper checks have passed.
pub fn plan_session<F>(
    goal: &Goal,
    owned: &[CardRecord],
    now: DateTime<Utc>,
    spent: F,
) -> Result<SessionPlan, SessionError>
where
    F: FnOnce() -> Result<BTreeSet<String>, StoreError>,
{
    let inventory = CollectionInventory::new(owned);
    if inventory.is_empty() {
        return Err(SessionError::NoCards);
    }
    if goal.is_expired_at(now) {
        return Err(SessionError::Expired);
    }

    let prerequisite_records = inventory.prerequisite_records(goal);
    if prerequisite_records.is_empty() {
        return Err(SessionError::MissingPrerequisite);
    }

    let spent = spent()?;
    let collection_records = inventory.eligible_for(goal, &spent);
    if collection_records.is_empty() {
        return Err(SessionError::AlreadySubmitted);
    }

    Ok(SessionPlan {
        prerequisite_records,
        collection_records,
    })
}

#[derive(Debug)]
pub struct ProofSession {
    goal_kind: GoalKind,
    goal_id: GoalId,
    phase: SessionPhase,
    plan: Option<SessionPlan>,
    proving: Option<ProvingState>,
    proofs: Vec<CardProof>,
}

impl ProofSession {
    pub fn new(goal: &Goal) -> Self {
        Self {
            goal_kind: goal.kind,
            goal_id: goal.id,
            phase: SessionPhase::Idle,
            plan: None,
            proving: None,
            proofs: Vec::new(),
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn proving_state(&self) -> Option<ProvingState> {
        self.proving
    }

    pub fn plan(&self) -> Option<&SessionPlan> {
        self.plan.as_ref()
    }

    /// `Idle → Validating → Proving(0)`, or `Failed` with the first unmet precondition.
    pub fn validate<F>(
        &mut self,
        goal: &Goal,
        owned: &[CardRecord],
        now: DateTime<Utc>,
        spent: F,
    ) -> Result<ProvingState, SessionError>
    where
        F: FnOnce() -> Result<BTreeSet<String>, StoreError>,
    {
        if self.phase != SessionPhase::Idle {
            return Err(SessionError::InvalidTransition("validate requires an idle session"));
        }
        if (goal.kind, goal.id) != (self.goal_kind, self.goal_id) {
            return Err(self.fail(SessionError::InvalidTransition(
                "goal does not match the session",
            )));
        }
        self.phase = SessionPhase::Validating;

        let plan = plan_session(goal, owned, now, spent).map_err(|err| self.fail(err))?;
        let state = ProvingState {
            num_proofs_completed: 0,
            num_proofs_total: plan.total(),
        };
        self.plan = Some(plan);
        self.proving = Some(state);
        self.phase = SessionPhase::Proving(0);
        Ok(state)
    }

    /// The step to prove next, if the session is in `Proving(i)`.
    pub fn next_step(&self) -> Option<ProofStep> {
        let SessionPhase::Proving(index) = self.phase else {
            return None;
        };
        let plan = self.plan.as_ref()?;
        let record = plan.record(index)?.clone();
        Some(ProofStep {
            index,
            total: plan.total(),
            binding: binding_digest(self.goal_kind, self.goal_id, &record.signature),
            record,
        })
    }

    /// Accept the proof for the current step: `Proving(i) → Proving(i+1) | Submitting`.
    ///
    /// A proof for a different signature or binding fails the session.
    pub fn record_proof(&mut self, proof: CardProof) -> Result<ProvingState, SessionError> {
        let step = self
            .next_step()
            .ok_or(SessionError::InvalidTransition("no proof step is pending"))?;

        if proof.signature != step.record.signature || proof.binding != step.binding {
            return Err(self.fail(SessionError::ProofGeneration {
                index: step.index,
                total: step.total,
                source: ProverError::Failed(format!(
                    "proof is not bound to card {} of this goal",
                    step.record.pub_key_index
                )),
            }));
        }

        self.proofs.push(proof);
        let state = ProvingState {
            num_proofs_completed: step.index + 1,
            num_proofs_total: step.total,
        };
        self.proving = Some(state);
        self.phase = if state.num_proofs_completed == step.total {
            SessionPhase::Submitting
        } else {
            SessionPhase::Proving(step.index + 1)
        };
        Ok(state)
    }

    /// The aggregate bundle. Only available while `Submitting`.
    pub fn bundle(&self) -> Result<ProofBundle, SessionError> {
        if self.phase != SessionPhase::Submitting {
            return Err(SessionError::InvalidTransition("bundle requires a submitting session"));
        }
        let prerequisite_count = self
            .plan
            .as_ref()
            .map_or(0, |plan| plan.prerequisite_records.len());
        Ok(ProofBundle {
            goal_kind: self.goal_kind,
            goal_id: self.goal_id,
            prerequisite_count,
            proofs: self.proofs.clone(),
        })
    }

    /// Signatures to nullify once the submission is confirmed.
    /// Prerequisite signatures are never included.
    pub fn signatures_to_commit(&self) -> Result<Vec<String>, SessionError> {
        if self.phase != SessionPhase::Submitting {
            return Err(SessionError::InvalidTransition(
                "nullifiers can only be committed after submission",
            ));
        }
        Ok(self
            .plan
            .as_ref()
            .map(SessionPlan::collection_signatures)
            .unwrap_or_default())
    }

    /// `Submitting → Committed`.
    pub fn complete(&mut self) -> Result<(), SessionError> {
        if self.phase != SessionPhase::Submitting {
            return Err(SessionError::InvalidTransition("complete requires a submitting session"));
        }
        self.phase = SessionPhase::Committed;
        self.proving = None;
        self.proofs.clear();
        Ok(())
    }

    /// Move to `Failed`, discarding proving state. Returns `err` for propagation.
    pub fn fail(&mut self, err: SessionError) -> SessionError {
        self.phase = SessionPhase::Failed(err.kind());
        self.proving = None;
        self.proofs.clear();
        err
    }
}
