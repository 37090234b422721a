use std::collections::BTreeSet;

use questgate_common::{CardIndex, CardRecord, Goal};

/// Read-only view over the records a user owns.
#[derive(Clone, Copy, Debug)]
pub struct CollectionInventory<'a> {
    records: &'a [CardRecord],
}

impl<'a> CollectionInventory<'a> {
    pub fn new(records: &'a [CardRecord]) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &'a [CardRecord] {
        self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records whose card index is in `indices`, in inventory order.
    pub fn matching<'s>(
        &self,
        indices: &'s BTreeSet<CardIndex>,
    ) -> impl Iterator<Item = &'a CardRecord> + 's
    where
        'a: 's,
    {
        self.records
            .iter()
            .filter(move |record| indices.contains(&record.pub_key_index))
    }

    pub fn match_count(&self, indices: &BTreeSet<CardIndex>) -> usize {
        self.matching(indices).count()
    }

    pub fn is_collected(&self, index: CardIndex) -> bool {
        self.records.iter().any(|record| record.pub_key_index == index)
    }

    /// Collection records for `goal` whose signature has not been spent.
    pub fn eligible_for(&self, goal: &Goal, spent: &BTreeSet<String>) -> Vec<CardRecord> {
        self.matching(&goal.collection_card_indices)
            .filter(|record| !spent.contains(&record.signature))
            .cloned()
            .collect()
    }

    /// Prerequisite records for `goal`. Never filtered by spent status.
    pub fn prerequisite_records(&self, goal: &Goal) -> Vec<CardRecord> {
        self.matching(&goal.prerequisite_card_indices)
            .cloned()
            .collect()
    }
}
