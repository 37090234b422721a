use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// Index of a card type in the card registry. Many signatures share one index.
pub type CardIndex = u32;

/// A single scanned card ("Jubmoji").
///
/// The JSON shape matches what the collector app stores: `pubKeyIndex` and
/// `sig` are interpreted, every other field is kept verbatim as proof material
/// for the prover.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardRecord {
    pub pub_key_index: CardIndex,
    /// Signature produced by the card for this scan. Unique per scan event.
    #[serde(rename = "sig", alias = "signature")]
    pub signature: String,
    #[serde(flatten)]
    pub material: Map<String, JsonValue>,
}

impl CardRecord {
    pub fn new(pub_key_index: CardIndex, signature: impl Into<String>) -> Self {
        Self {
            pub_key_index,
            signature: signature.into(),
            material: Map::new(),
        }
    }

    pub fn with_material(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        self.material.insert(key.into(), value);
        self
    }
}
