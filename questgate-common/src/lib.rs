//! Shared data model for questgate.
//!
//! Everything the engine, tools and fixtures exchange lives here:
//!
//! - [`CardRecord`]: one scanned physical card ("Jubmoji") and its opaque proof material.
//! - [`Goal`]: a quest or power, with its collection/prerequisite card sets and a
//!   validated [`ProofPolicy`].
//! - [`NullifierSet`]: the two-group document of spent signatures.
//! - [`CardProof`] / [`ProofBundle`]: what the prover produces and the submitter sends.

pub mod card;
pub mod goal;
pub mod nullifier;
pub mod policy;
pub mod proof;

pub use card::{CardIndex, CardRecord};
pub use goal::{CardRef, Goal, GoalId, GoalKind, RawGoal};
pub use nullifier::NullifierSet;
pub use policy::{PolicyError, ProofPolicy, ProofType};
pub use proof::{binding_digest, CardProof, ProofBundle, SignatureBinding};

