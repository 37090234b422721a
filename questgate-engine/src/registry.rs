//! Read-only card registry: `pubKeyIndex -> { displayGlyph, metadata }`.

use std::collections::BTreeMap;
use std::path::Path;

use questgate_common::{CardIndex, CardRecord, Goal};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::error::CatalogError;
use crate::inventory::CollectionInventory;

/// Shown in place of a card glyph that is hidden or unknown.
pub const MASKED_GLYPH: &str = "❓";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardEntry {
    pub index: CardIndex,
    #[serde(rename = "emoji", alias = "displayGlyph")]
    pub display_glyph: String,
    #[serde(flatten)]
    pub metadata: Map<String, JsonValue>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionGlyph {
    pub index: CardIndex,
    pub glyph: String,
    pub collected: bool,
}

#[derive(Clone, Debug, Default)]
pub struct CardRegistry {
    cards: BTreeMap<CardIndex, CardEntry>,
}

impl CardRegistry {
    pub fn new(entries: impl IntoIterator<Item = CardEntry>) -> Self {
        Self {
            cards: entries.into_iter().map(|entry| (entry.index, entry)).collect(),
        }
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| CatalogError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let entries: Vec<CardEntry> = serde_json::from_str(&raw)?;
        Ok(Self::new(entries))
    }

    pub fn get(&self, index: CardIndex) -> Option<&CardEntry> {
        self.cards.get(&index)
    }

    pub fn glyph(&self, index: CardIndex) -> &str {
        self.get(index)
            .map_or(MASKED_GLYPH, |entry| entry.display_glyph.as_str())
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    /// Glyph for every collection card of `goal`, in index order.
    ///
    /// Team leaderboard goals hide the cards the user has not collected yet.
    pub fn collection_glyphs(&self, goal: &Goal, owned: &[CardRecord]) -> Vec<CollectionGlyph> {
        let inventory = CollectionInventory::new(owned);
        let mask_uncollected = goal.is_team_leaderboard();
        goal.collection_card_indices
            .iter()
            .map(|&index| {
                let collected = inventory.is_collected(index);
                let glyph = if mask_uncollected && !collected {
                    MASKED_GLYPH
                } else {
                    self.glyph(index)
                };
                CollectionGlyph {
                    index,
                    glyph: glyph.to_string(),
                    collected,
                }
            })
            .collect()
    }
}
