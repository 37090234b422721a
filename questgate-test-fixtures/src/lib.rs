//! Deterministic goals, cards and scripted collaborators shared by the
//! questgate integration tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use once_cell::sync::OnceCell;
use questgate_common::{
    binding_digest, CardProof, CardRecord, Goal, GoalId, GoalKind, ProofBundle, ProofPolicy,
    ProofType, RawGoal, SignatureBinding,
};
use questgate_engine::{CardProver, Clock, DigestProver, ProverError, ScoreSubmitter, SubmitError};

/// Unix time every fixture clock is pinned to (2024-03-01T12:00:00Z).
pub const FIXTURE_NOW: i64 = 1_709_294_400;

pub const TEAM_QUEST_ID: GoalId = 1;
pub const ZOO_QUEST_ID: GoalId = 2;
pub const EXPIRED_QUEST_ID: GoalId = 3;
pub const COFFEE_POWER_ID: GoalId = 10;

/// Team cards gating the team leaderboard quest.
pub const TEAM_CARDS: [u32; 2] = [40, 41];

static FIXTURES: OnceCell<QuestFixtures> = OnceCell::new();

pub struct QuestFixtures {
    quests: Vec<Goal>,
    cards: Vec<CardRecord>,
}

impl QuestFixtures {
    pub fn quests(&self) -> &[Goal] {
        &self.quests
    }

    pub fn quest(&self, id: GoalId) -> &Goal {
        self.quests
            .iter()
            .find(|quest| quest.id == id)
            .unwrap_or_else(|| panic!("no fixture quest {id}"))
    }

    pub fn power(&self, id: GoalId) -> &Goal {
        self.quests
            .iter()
            .find_map(|quest| quest.power(id))
            .unwrap_or_else(|| panic!("no fixture power {id}"))
    }

    /// Cards the fixture user holds: one team card plus three collection scans.
    pub fn cards(&self) -> &[CardRecord] {
        &self.cards
    }

    /// Catalog document in the on-disk `{"quests": [..]}` layout.
    pub fn catalog_json(&self) -> Result<String> {
        let quests: Vec<RawGoal> = self.quests.iter().cloned().map(RawGoal::from).collect();
        serde_json::to_string_pretty(&serde_json::json!({ "quests": quests }))
            .context("serialize fixture catalog")
    }
}

pub fn fixtures() -> &'static QuestFixtures {
    FIXTURES.get_or_init(build_fixtures)
}

pub fn fixture_now() -> DateTime<Utc> {
    Utc.timestamp_opt(FIXTURE_NOW, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

pub fn fixture_clock() -> Clock {
    Clock::fixed(fixture_now())
}

fn build_fixtures() -> QuestFixtures {
    let now = fixture_now();

    let coffee = Goal::new(COFFEE_POWER_ID, GoalKind::Power, "Free coffee", ProofPolicy::AtLeastOne)
        .with_collection([3]);

    let team = Goal::new(TEAM_QUEST_ID, GoalKind::Quest, "Team race", ProofPolicy::AtLeastOne)
        .with_proof_type(ProofType::TeamLeaderboard)
        .with_collection([3, 5, 7])
        .with_prerequisites(TEAM_CARDS)
        .with_window(Some(now - chrono::Duration::days(7)), Some(now + chrono::Duration::days(30)));

    let zoo = Goal::new(
        ZOO_QUEST_ID,
        GoalKind::Quest,
        "Zoo collector",
        ProofPolicy::NUniqueInCollection(2),
    )
    .with_proof_type(ProofType::NUniqueInCollection)
    .with_collection([3, 5])
    .with_powers(vec![coffee]);

    let expired = Goal::new(EXPIRED_QUEST_ID, GoalKind::Quest, "Last year", ProofPolicy::AtLeastOne)
        .with_proof_type(ProofType::TeamLeaderboard)
        .with_collection([3])
        .with_prerequisites(TEAM_CARDS)
        .with_window(None, Some(now - chrono::Duration::days(90)));

    let cards = vec![
        CardRecord::new(40, "sig-team-40").with_material("msgHash", serde_json::json!("0x40")),
        CardRecord::new(3, "sig-frog-1").with_material("msgHash", serde_json::json!("0x03a")),
        CardRecord::new(3, "sig-frog-2").with_material("msgHash", serde_json::json!("0x03b")),
        CardRecord::new(5, "sig-fox-1").with_material("msgHash", serde_json::json!("0x05a")),
    ];

    QuestFixtures {
        quests: vec![team, zoo, expired],
        cards,
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SCRIPTED PROVER
// ═══════════════════════════════════════════════════════════════════════════════

/// Prover that behaves honestly except where scripted otherwise.
#[derive(Debug, Default)]
pub struct ScriptedProver {
    fail_at: Option<usize>,
    forge_at: Option<usize>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    proved: Mutex<Vec<String>>,
}

impl ScriptedProver {
    pub fn honest() -> Self {
        Self::default()
    }

    /// Fail the `step`-th call (0-based).
    pub fn failing_at(mut self, step: usize) -> Self {
        self.fail_at = Some(step);
        self
    }

    /// Return a proof bound to a different signature on the `step`-th call.
    pub fn forging_at(mut self, step: usize) -> Self {
        self.forge_at = Some(step);
        self
    }

    /// Sleep before every proof, so tests can cancel mid-flight.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Signatures proved so far, in call order.
    pub fn proved(&self) -> Vec<String> {
        self.proved.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl CardProver for ScriptedProver {
    async fn prove_ownership(
        &self,
        record: &CardRecord,
        binding: &SignatureBinding,
    ) -> Result<CardProof, ProverError> {
        let step = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_at == Some(step) {
            return Err(ProverError::Failed(format!("scripted failure at step {step}")));
        }
        if let Ok(mut proved) = self.proved.lock() {
            proved.push(record.signature.clone());
        }

        let mut proof = DigestProver.prove_ownership(record, binding).await?;
        if self.forge_at == Some(step) {
            proof.binding = binding_digest(GoalKind::Quest, GoalId::MAX, "forged");
        }
        Ok(proof)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RECORDING SUBMITTER
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug)]
enum Verdict {
    Accept(u64),
    Reject { status: u16, message: String },
}

/// Submitter that records every bundle it receives.
#[derive(Debug)]
pub struct RecordingSubmitter {
    verdict: Verdict,
    bundles: Mutex<Vec<(GoalId, ProofBundle)>>,
}

impl RecordingSubmitter {
    pub fn accepting(score: u64) -> Self {
        Self {
            verdict: Verdict::Accept(score),
            bundles: Mutex::new(Vec::new()),
        }
    }

    pub fn rejecting(status: u16, message: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::Reject {
                status,
                message: message.into(),
            },
            bundles: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.bundles.lock().map(|b| b.len()).unwrap_or_default()
    }

    pub fn bundles(&self) -> Vec<(GoalId, ProofBundle)> {
        self.bundles.lock().map(|b| b.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ScoreSubmitter for RecordingSubmitter {
    async fn submit(&self, bundle: &ProofBundle, goal_id: GoalId) -> Result<u64, SubmitError> {
        if let Ok(mut bundles) = self.bundles.lock() {
            bundles.push((goal_id, bundle.clone()));
        }
        match &self.verdict {
            Verdict::Accept(score) => Ok(*score),
            Verdict::Reject { status, message } => Err(SubmitError::Rejected {
                status: *status,
                message: message.clone(),
            }),
        }
    }
}
