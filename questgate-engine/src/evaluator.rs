//! Lock-status evaluation.
//!
//! Pure functions over a policy, a collection set and the owned records. They
//! are called on every render of a quest page, so nothing here touches storage.

use std::collections::BTreeSet;

use questgate_common::{CardIndex, CardRecord, Goal, ProofPolicy};
use serde::Serialize;

use crate::inventory::CollectionInventory;

/// Lock status and progress counts for one goal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnlockStatus {
    pub locked: bool,
    pub num_cards_collected: u32,
    pub num_cards_total: u32,
}

/// Evaluate `policy` against the records whose card index is in `collection`.
///
/// Records are counted individually: two scans of the same card type both count.
pub fn evaluate(
    policy: &ProofPolicy,
    collection: &BTreeSet<CardIndex>,
    owned: &[CardRecord],
) -> UnlockStatus {
    let matched = CollectionInventory::new(owned).match_count(collection);
    let matched = u32::try_from(matched).unwrap_or(u32::MAX);

    match *policy {
        ProofPolicy::AtLeastOne => UnlockStatus {
            locked: !collection.is_empty() && matched == 0,
            num_cards_collected: matched.min(1),
            num_cards_total: 1,
        },
        ProofPolicy::NUniqueInCollection(n) => UnlockStatus {
            locked: matched < n,
            num_cards_collected: matched.min(n),
            num_cards_total: n,
        },
    }
}

/// Evaluate a goal against its own policy and collection set.
pub fn evaluate_goal(goal: &Goal, owned: &[CardRecord]) -> UnlockStatus {
    evaluate(&goal.policy, &goal.collection_card_indices, owned)
}

/// Lock status for a quest that may not have loaded. A missing quest is locked.
pub fn quest_lock_status(quest: Option<&Goal>, owned: &[CardRecord]) -> bool {
    quest.map_or(true, |quest| evaluate_goal(quest, owned).locked)
}

/// Number of the quest's powers the owned records unlock.
pub fn powers_completed(quest: &Goal, owned: &[CardRecord]) -> usize {
    quest
        .powers
        .iter()
        .filter(|power| !evaluate_goal(power, owned).locked)
        .count()
}
