//! Card-gated quest engine.
//!
//! Decides whether a quest or power is unlocked for the cards a user holds,
//! and runs the proof sessions that score those cards exactly once.
//!
//! # Session Model
//!
//! ```text
//! owned cards ──► CollectionInventory ──► UnlockEvaluator          (read path)
//!                        │
//!                        ▼
//!                 ProofOrchestrator ──► CardProver (one proof per card)
//!                        │          ──► ScoreSubmitter (once per session)
//!                        ▼
//!                  NullifierStore::merge   (only after confirmed submission)
//! ```
//!
//! A signature becomes nullified if and only if its proof was part of a
//! session that reached `Committed`.

pub mod catalog;
pub mod clock;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod inventory;
pub mod nullifier;
pub mod orchestrator;
pub mod prover;
pub mod qr;
pub mod registry;
pub mod session;
pub mod submission;

pub use catalog::{GoalSource, JsonGoalCatalog};
pub use clock::Clock;
pub use config::{EngineConfig, NullifierBackendKind};
pub use error::{CatalogError, ConfigError, ProverError, SessionError, StoreError, SubmitError};
pub use evaluator::{evaluate, evaluate_goal, powers_completed, quest_lock_status, UnlockStatus};
pub use inventory::CollectionInventory;
pub use nullifier::NullifierStore;
pub use orchestrator::{
    ChannelProgress, NoProgress, ProgressListener, ProofOrchestrator, SessionOutcome,
};
pub use prover::{CardProver, DigestProver};
pub use qr::{resolve_power, QrBinding, QrResolver, StaticQrResolver};
pub use registry::{CardEntry, CardRegistry, CollectionGlyph, MASKED_GLYPH};
pub use session::{
    plan_session, FailureKind, ProofSession, ProofStep, ProvingState, SessionPhase, SessionPlan,
};
pub use submission::ScoreSubmitter;

#[cfg(feature = "http")]
pub use catalog::HttpGoalCatalog;
#[cfg(feature = "http")]
pub use submission::HttpScoreSubmitter;
