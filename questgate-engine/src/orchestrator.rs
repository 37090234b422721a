//! Async driver for [`ProofSession`].

use questgate_common::{CardRecord, Goal, GoalId, GoalKind};
use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::clock::Clock;
use crate::error::SessionError;
use crate::nullifier::NullifierStore;
use crate::prover::CardProver;
use crate::session::{plan_session, ProofSession, ProvingState, SessionPlan};
use crate::submission::ScoreSubmitter;

// ═══════════════════════════════════════════════════════════════════════════════
// PROGRESS LISTENERS
// ═══════════════════════════════════════════════════════════════════════════════

/// Observer invoked synchronously after every completed proof step.
pub trait ProgressListener: Send + Sync {
    fn on_progress(&self, state: &ProvingState);
}

impl<F> ProgressListener for F
where
    F: Fn(&ProvingState) + Send + Sync,
{
    fn on_progress(&self, state: &ProvingState) {
        self(state)
    }
}

/// Forwards progress events into a channel. A closed receiver is ignored.
#[derive(Clone, Debug)]
pub struct ChannelProgress(pub UnboundedSender<ProvingState>);

impl ProgressListener for ChannelProgress {
    fn on_progress(&self, state: &ProvingState) {
        let _ = self.0.send(*state);
    }
}

/// Listener that discards every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoProgress;

impl ProgressListener for NoProgress {
    fn on_progress(&self, _state: &ProvingState) {}
}

// ═══════════════════════════════════════════════════════════════════════════════
// ORCHESTRATOR
// ═══════════════════════════════════════════════════════════════════════════════

/// Result of a session that reached `Committed`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionOutcome {
    pub goal_kind: GoalKind,
    pub goal_id: GoalId,
    pub score_delta: u64,
    pub proofs_submitted: usize,
    /// Collection signatures recorded as spent by this session.
    pub nullified: Vec<String>,
    /// How many of `nullified` were not already in the store.
    pub newly_nullified: usize,
    pub bundle_digest: String,
}

pub struct ProofOrchestrator<P, S> {
    prover: P,
    submitter: S,
    nullifiers: NullifierStore,
    clock: Clock,
}

impl<P, S> ProofOrchestrator<P, S>
where
    P: CardProver,
    S: ScoreSubmitter,
{
    pub fn new(prover: P, submitter: S, nullifiers: NullifierStore) -> Self {
        Self {
            prover,
            submitter,
            nullifiers,
            clock: Clock::system(),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn nullifiers(&self) -> &NullifierStore {
        &self.nullifiers
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    /// Dry-run validation: the records a session would prove right now.
    pub fn plan(&self, goal: &Goal, owned: &[CardRecord]) -> Result<SessionPlan, SessionError> {
        plan_session(goal, owned, self.clock.now(), || {
            self.nullifiers.query(goal.kind, goal.id)
        })
    }

    /// Run one session to `Committed` or `Failed`.
    pub async fn run(
        &self,
        goal: &Goal,
        owned: &[CardRecord],
        listener: &dyn ProgressListener,
    ) -> Result<SessionOutcome, SessionError> {
        self.run_until_cancelled(goal, owned, listener, &CancellationToken::new())
            .await
    }

    /// Like [`Self::run`], but stops with [`SessionError::Cancelled`] if `cancel`
    /// fires before submission starts.
    pub async fn run_until_cancelled(
        &self,
        goal: &Goal,
        owned: &[CardRecord],
        listener: &dyn ProgressListener,
        cancel: &CancellationToken,
    ) -> Result<SessionOutcome, SessionError> {
        let span = tracing::info_span!("proof_session", kind = %goal.kind, goal_id = goal.id);
        self.drive(goal, owned, listener, cancel)
            .instrument(span)
            .await
    }

    async fn drive(
        &self,
        goal: &Goal,
        owned: &[CardRecord],
        listener: &dyn ProgressListener,
        cancel: &CancellationToken,
    ) -> Result<SessionOutcome, SessionError> {
        let mut session = ProofSession::new(goal);

        let initial = match session.validate(goal, owned, self.clock.now(), || {
            self.nullifiers.query(goal.kind, goal.id)
        }) {
            Ok(state) => state,
            Err(err) => {
                tracing::warn!(reason = %err, "session rejected during validation");
                return Err(err);
            }
        };
        tracing::info!(total = initial.num_proofs_total, "proof session started");

        while let Some(step) = session.next_step() {
            if cancel.is_cancelled() {
                tracing::info!(step = step.index, "proof session cancelled");
                return Err(session.fail(SessionError::Cancelled));
            }

            tracing::debug!(
                step = step.index,
                total = step.total,
                pub_key_index = step.record.pub_key_index,
                "generating ownership proof"
            );
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!(step = step.index, "proof session cancelled mid-proof");
                    return Err(session.fail(SessionError::Cancelled));
                }
                result = self.prover.prove_ownership(&step.record, &step.binding) => result,
            };

            let proof = match result {
                Ok(proof) => proof,
                Err(source) => {
                    tracing::warn!(step = step.index, error = %source, "proof generation failed");
                    return Err(session.fail(SessionError::ProofGeneration {
                        index: step.index,
                        total: step.total,
                        source,
                    }));
                }
            };

            let state = session.record_proof(proof).inspect_err(|err| {
                tracing::warn!(step = step.index, error = %err, "proof rejected");
            })?;
            listener.on_progress(&state);
        }

        let bundle = session.bundle()?;
        let bundle_digest = hex::encode(bundle.digest());
        tracing::info!(
            proofs = bundle.proofs.len(),
            digest = %bundle_digest,
            "submitting proof bundle"
        );

        let score_delta = match self.submitter.submit(&bundle, goal.id).await {
            Ok(score) => score,
            Err(err) => {
                tracing::warn!(error = %err, "submission failed; nullifiers untouched");
                return Err(session.fail(SessionError::Submission(err)));
            }
        };

        let nullified = session.signatures_to_commit()?;
        let newly_nullified = match self
            .nullifiers
            .merge(goal.kind, goal.id, nullified.iter().cloned())
        {
            Ok(added) => added,
            Err(source) => {
                tracing::error!(
                    score_delta,
                    error = %source,
                    "submission credited but nullifier commit failed"
                );
                return Err(session.fail(SessionError::NullifierCommit {
                    score_delta,
                    source,
                }));
            }
        };
        session.complete()?;

        tracing::info!(score_delta, newly_nullified, "proof session committed");
        Ok(SessionOutcome {
            goal_kind: goal.kind,
            goal_id: goal.id,
            score_delta,
            proofs_submitted: bundle.proofs.len(),
            nullified,
            newly_nullified,
            bundle_digest,
        })
    }
}
