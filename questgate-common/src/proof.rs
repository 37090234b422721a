use serde::{Deserialize, Serialize};

use crate::card::CardIndex;
use crate::goal::{GoalId, GoalKind};

const BINDING_DOMAIN: &[u8] = b"questgate_signature_binding_v1";
const BUNDLE_DOMAIN: &[u8] = b"questgate_proof_bundle_v1";

/// Digest tying one proof to a goal scope and a single card signature.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SignatureBinding(#[serde(with = "hex::serde")] pub [u8; 32]);

impl SignatureBinding {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

/// Compute the binding a proof for `signature` must carry when it is used
/// toward `(kind, goal_id)`.
pub fn binding_digest(kind: GoalKind, goal_id: GoalId, signature: &str) -> SignatureBinding {
    let mut hasher = blake3::Hasher::new();
    hasher.update(BINDING_DOMAIN);
    hasher.update(kind.as_str().as_bytes());
    hasher.update(&goal_id.to_be_bytes());
    hasher.update(&(signature.len() as u64).to_be_bytes());
    hasher.update(signature.as_bytes());
    SignatureBinding(*hasher.finalize().as_bytes())
}

/// Ownership proof for one card record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardProof {
    pub pub_key_index: CardIndex,
    pub signature: String,
    pub binding: SignatureBinding,
    #[serde(with = "hex::serde")]
    pub proof: Vec<u8>,
}

/// Everything sent to the score submission interface for one session.
///
/// `proofs` holds the prerequisite proofs first, then the collection proofs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofBundle {
    pub goal_kind: GoalKind,
    pub goal_id: GoalId,
    pub prerequisite_count: usize,
    pub proofs: Vec<CardProof>,
}

impl ProofBundle {
    pub fn prerequisite_proofs(&self) -> &[CardProof] {
        &self.proofs[..self.prerequisite_count.min(self.proofs.len())]
    }

    pub fn collection_proofs(&self) -> &[CardProof] {
        &self.proofs[self.prerequisite_count.min(self.proofs.len())..]
    }

    pub fn collection_signatures(&self) -> Vec<String> {
        self.collection_proofs()
            .iter()
            .map(|proof| proof.signature.clone())
            .collect()
    }

    /// Fingerprint of the bundle, for logs and receipts.
    pub fn digest(&self) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        hasher.update(BUNDLE_DOMAIN);
        hasher.update(self.goal_kind.as_str().as_bytes());
        hasher.update(&self.goal_id.to_be_bytes());
        for proof in &self.proofs {
            hasher.update(proof.binding.as_bytes());
            hasher.update(&proof.proof);
        }
        *hasher.finalize().as_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binding_depends_on_scope_and_signature() {
        let base = binding_digest(GoalKind::Quest, 1, "a");
        assert_eq!(base, binding_digest(GoalKind::Quest, 1, "a"));
        assert_ne!(base, binding_digest(GoalKind::Power, 1, "a"));
        assert_ne!(base, binding_digest(GoalKind::Quest, 2, "a"));
        assert_ne!(base, binding_digest(GoalKind::Quest, 1, "b"));
    }

    #[test]
    fn bundle_splits_prerequisites_from_collection() {
        let proof = |idx: CardIndex, sig: &str| CardProof {
            pub_key_index: idx,
            signature: sig.to_string(),
            binding: binding_digest(GoalKind::Quest, 4, sig),
            proof: vec![1, 2, 3],
        };
        let bundle = ProofBundle {
            goal_kind: GoalKind::Quest,
            goal_id: 4,
            prerequisite_count: 1,
            proofs: vec![proof(40, "team"), proof(3, "a"), proof(5, "b")],
        };

        assert_eq!(bundle.prerequisite_proofs().len(), 1);
        assert_eq!(bundle.collection_signatures(), vec!["a", "b"]);

        let json = serde_json::to_value(&bundle).unwrap();
        assert_eq!(json["proofs"][0]["proof"], "010203");
        assert_eq!(json["goalKind"], "quest");
    }
}
