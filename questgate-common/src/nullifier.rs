use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::goal::{GoalId, GoalKind};

/// Spent signatures, grouped by goal kind and goal id.
///
/// Serializes to the two-group document the collector app persists:
/// `{"quests": {"7": ["sig", ...]}, "powers": {...}}`.
///
/// The set only grows: there is no removal API, and [`NullifierSet::merge`]
/// and [`NullifierSet::union`] are plain set unions.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NullifierSet {
    #[serde(default)]
    quests: BTreeMap<GoalId, BTreeSet<String>>,
    #[serde(default)]
    powers: BTreeMap<GoalId, BTreeSet<String>>,
}

impl NullifierSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn group(&self, kind: GoalKind) -> &BTreeMap<GoalId, BTreeSet<String>> {
        match kind {
            GoalKind::Quest => &self.quests,
            GoalKind::Power => &self.powers,
        }
    }

    fn group_mut(&mut self, kind: GoalKind) -> &mut BTreeMap<GoalId, BTreeSet<String>> {
        match kind {
            GoalKind::Quest => &mut self.quests,
            GoalKind::Power => &mut self.powers,
        }
    }

    /// Spent signatures for one goal; empty when the goal has none.
    pub fn spent(&self, kind: GoalKind, goal_id: GoalId) -> BTreeSet<String> {
        self.group(kind).get(&goal_id).cloned().unwrap_or_default()
    }

    pub fn contains(&self, kind: GoalKind, goal_id: GoalId, signature: &str) -> bool {
        self.group(kind)
            .get(&goal_id)
            .map_or(false, |sigs| sigs.contains(signature))
    }

    /// Add signatures to one goal. Returns how many were not already present.
    pub fn merge<I, S>(&mut self, kind: GoalKind, goal_id: GoalId, signatures: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entry = self.group_mut(kind).entry(goal_id).or_default();
        let mut added = 0;
        for sig in signatures {
            if entry.insert(sig.into()) {
                added += 1;
            }
        }
        added
    }

    /// Union every goal of `other` into `self`. Returns the number of new signatures.
    pub fn union(&mut self, other: &NullifierSet) -> usize {
        let mut added = 0;
        for kind in [GoalKind::Quest, GoalKind::Power] {
            for (goal_id, sigs) in other.group(kind) {
                added += self.merge(kind, *goal_id, sigs.iter().cloned());
            }
        }
        added
    }

    /// True when every signature in `other` is also in `self`.
    pub fn is_superset_of(&self, other: &NullifierSet) -> bool {
        [GoalKind::Quest, GoalKind::Power].into_iter().all(|kind| {
            other.group(kind).iter().all(|(goal_id, sigs)| {
                self.group(kind)
                    .get(goal_id)
                    .map_or(sigs.is_empty(), |mine| mine.is_superset(sigs))
            })
        })
    }

    pub fn len(&self) -> usize {
        self.quests.values().chain(self.powers.values()).map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
