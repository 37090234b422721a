//! Proof generation seam.
//!
//! The zero-knowledge circuit itself lives outside this crate. The
//! orchestrator only needs a pass/fail primitive that returns a proof bound to
//! the requested signature.

use async_trait::async_trait;
use questgate_common::{CardProof, CardRecord, SignatureBinding};

use crate::error::ProverError;

/// Produces an ownership proof for one card record.
#[async_trait]
pub trait CardProver: Send + Sync {
    /// Prove ownership of `record`. The returned proof must carry `binding`
    /// and the record's signature, otherwise the session rejects it.
    async fn prove_ownership(
        &self,
        record: &CardRecord,
        binding: &SignatureBinding,
    ) -> Result<CardProof, ProverError>;
}

#[async_trait]
impl<P: CardProver + ?Sized> CardProver for std::sync::Arc<P> {
    async fn prove_ownership(
        &self,
        record: &CardRecord,
        binding: &SignatureBinding,
    ) -> Result<CardProof, ProverError> {
        (**self).prove_ownership(record, binding).await
    }
}

/// Development prover that commits to the record's proof material with blake3.
///
/// It exercises the whole session flow without a circuit; the output is not
/// zero-knowledge and must not be accepted by a production leaderboard.
#[derive(Clone, Debug, Default)]
pub struct DigestProver;

const DIGEST_PROVER_DOMAIN: &[u8] = b"questgate_digest_prover_v1";

#[async_trait]
impl CardProver for DigestProver {
    async fn prove_ownership(
        &self,
        record: &CardRecord,
        binding: &SignatureBinding,
    ) -> Result<CardProof, ProverError> {
        if record.signature.is_empty() {
            return Err(ProverError::MissingMaterial(format!(
                "card {} has an empty signature",
                record.pub_key_index
            )));
        }

        let material = serde_json::to_vec(&record.material)
            .map_err(|err| ProverError::Failed(err.to_string()))?;

        let mut hasher = blake3::Hasher::new();
        hasher.update(DIGEST_PROVER_DOMAIN);
        hasher.update(binding.as_bytes());
        hasher.update(&record.pub_key_index.to_be_bytes());
        hasher.update(&material);

        Ok(CardProof {
            pub_key_index: record.pub_key_index,
            signature: record.signature.clone(),
            binding: *binding,
            proof: hasher.finalize().as_bytes().to_vec(),
        })
    }
}
