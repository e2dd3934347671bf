// ➕ Association Merger - Union existing and discovered associations
//
// Association membership only grows: an association missing from this
// run's sources is never removed, because other sources may have put it
// there. Running the same merge twice reports no change the second time.

use crate::entities::EntityId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// ============================================================================
// MERGE OUTCOME
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeOutcome {
    pub entity_id: EntityId,
    pub existing: BTreeSet<EntityId>,
    pub added: BTreeSet<EntityId>,
    pub resulting: BTreeSet<EntityId>,
    pub changed: bool,
}

impl MergeOutcome {
    /// Resulting set as the ordered list the write-back layer sends.
    pub fn resulting_list(&self) -> Vec<EntityId> {
        self.resulting.iter().copied().collect()
    }
}

/// `resulting = existing ∪ discovered`, `added = discovered − existing`.
pub fn merge(
    entity_id: EntityId,
    existing: &BTreeSet<EntityId>,
    discovered: &BTreeSet<EntityId>,
) -> MergeOutcome {
    let added: BTreeSet<EntityId> = discovered.difference(existing).copied().collect();
    let resulting: BTreeSet<EntityId> = existing.union(discovered).copied().collect();

    MergeOutcome {
        entity_id,
        existing: existing.clone(),
        changed: !added.is_empty(),
        added,
        resulting,
    }
}

// ============================================================================
// ACCUMULATOR
// ============================================================================

/// Collects discovered associations per entity across many records.
///
/// Two rows resolving to the same entity contribute the union of their
/// discoveries; neither overwrites the other.
#[derive(Debug, Clone, Default)]
pub struct AssociationAccumulator {
    discovered: BTreeMap<EntityId, BTreeSet<EntityId>>,
}

impl AssociationAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record discoveries for an entity. An empty set still registers the
    /// entity, so it shows up as unchanged rather than missing.
    pub fn add(&mut self, entity_id: EntityId, associations: impl IntoIterator<Item = EntityId>) {
        self.discovered
            .entry(entity_id)
            .or_default()
            .extend(associations);
    }

    /// Fold another accumulator in (union per entity).
    pub fn absorb(&mut self, other: AssociationAccumulator) {
        for (entity_id, associations) in other.discovered {
            self.add(entity_id, associations);
        }
    }

    pub fn discovered(&self, entity_id: EntityId) -> Option<&BTreeSet<EntityId>> {
        self.discovered.get(&entity_id)
    }

    pub fn len(&self) -> usize {
        self.discovered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.discovered.is_empty()
    }

    /// Merge every entity's discoveries against its existing set, in
    /// ascending entity ID order.
    pub fn merge_all<F>(&self, mut existing_for: F) -> Vec<MergeOutcome>
    where
        F: FnMut(EntityId) -> BTreeSet<EntityId>,
    {
        self.discovered
            .iter()
            .map(|(&entity_id, discovered)| merge(entity_id, &existing_for(entity_id), discovered))
            .collect()
    }
}

// ============================================================================
// TESTS
// ============================================================================
