// 🗂️ Entity Index - Key → entity lookup tables over one snapshot
//
// Three maps (email, username, first|last name). A key shared by several
// entities keeps all of them; callers get an explicit Single/Ambiguous
// answer and have to deal with both.
//
// Ambiguous candidate lists are ordered by ascending entity ID, so the
// resolver's tie-break never depends on snapshot order.

use crate::entities::{CanonicalEntity, EntityId};
use crate::normalize::NameKey;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::hash::Hash;
use tracing::{info, warn};

// ============================================================================
// LOOKUP RESULT
// ============================================================================

/// Answer of a key lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<'a> {
    /// Exactly one entity holds this key
    Single(&'a CanonicalEntity),

    /// Several entities hold this key, ordered by ascending ID
    Ambiguous(Vec<&'a CanonicalEntity>),
}

impl<'a> Lookup<'a> {
    /// Deterministic pick: the only entity, or the lowest ID.
    pub fn first(&self) -> &'a CanonicalEntity {
        match self {
            Lookup::Single(entity) => *entity,
            Lookup::Ambiguous(entities) => entities[0],
        }
    }

    pub fn is_ambiguous(&self) -> bool {
        matches!(self, Lookup::Ambiguous(_))
    }

    pub fn len(&self) -> usize {
        match self {
            Lookup::Single(_) => 1,
            Lookup::Ambiguous(entities) => entities.len(),
        }
    }

    pub fn ids(&self) -> Vec<EntityId> {
        match self {
            Lookup::Single(entity) => vec![entity.id],
            Lookup::Ambiguous(entities) => entities.iter().map(|e| e.id).collect(),
        }
    }

    pub fn contains(&self, id: EntityId) -> bool {
        match self {
            Lookup::Single(entity) => entity.id == id,
            Lookup::Ambiguous(entities) => entities.iter().any(|e| e.id == id),
        }
    }
}

// ============================================================================
// COLLISIONS (audit)
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyKind {
    Email,
    Username,
    Name,
}

/// A key held by more than one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyCollision {
    pub kind: KeyKind,
    pub key: String,
    pub entity_ids: Vec<EntityId>,
}

// ============================================================================
// ENTITY INDEX
// ============================================================================

/// Positions into `entities`; Ambiguous lists stay sorted by entity ID.
#[derive(Debug, Clone)]
enum Slot {
    Single(usize),
    Ambiguous(Vec<usize>),
}

#[derive(Debug, Clone, Default)]
pub struct EntityIndex {
    entities: Vec<CanonicalEntity>,
    by_id: HashMap<EntityId, usize>,
    by_email: HashMap<String, Slot>,
    by_username: HashMap<String, Slot>,
    by_name: HashMap<NameKey, Slot>,
}

impl EntityIndex {
    /// Build the index in a single pass over the snapshot.
    ///
    /// An ID seen twice (overlapping pages) keeps its first record.
    pub fn build(entities: impl IntoIterator<Item = CanonicalEntity>) -> Self {
        let mut index = EntityIndex::default();

        for entity in entities {
            if index.by_id.contains_key(&entity.id) {
                warn!(id = entity.id, "Duplicate entity ID in snapshot, keeping first record");
                continue;
            }

            let position = index.entities.len();
            index.by_id.insert(entity.id, position);

            if let Some(email) = entity.email_key() {
                insert_slot(&mut index.by_email, email, position);
            }
            if let Some(username) = entity.username_key() {
                insert_slot(&mut index.by_username, username, position);
            }
            if let Some(name) = entity.name_key() {
                insert_slot(&mut index.by_name, name, position);
            }

            index.entities.push(entity);
        }

        sort_ambiguous(&mut index.by_email, &index.entities);
        sort_ambiguous(&mut index.by_username, &index.entities);
        sort_ambiguous(&mut index.by_name, &index.entities);

        info!(
            entities = index.entities.len(),
            emails = index.by_email.len(),
            usernames = index.by_username.len(),
            names = index.by_name.len(),
            "Built entity index"
        );

        index
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn entities(&self) -> &[CanonicalEntity] {
        &self.entities
    }

    pub fn get(&self, id: EntityId) -> Option<&CanonicalEntity> {
        self.by_id.get(&id).map(|&position| &self.entities[position])
    }

    /// Look up an already-normalized email.
    pub fn by_email(&self, email: &str) -> Option<Lookup<'_>> {
        self.by_email.get(email).map(|slot| self.lookup(slot))
    }

    /// Look up an already-normalized username.
    pub fn by_username(&self, username: &str) -> Option<Lookup<'_>> {
        self.by_username.get(username).map(|slot| self.lookup(slot))
    }

    pub fn by_name(&self, name: &NameKey) -> Option<Lookup<'_>> {
        self.by_name.get(name).map(|slot| self.lookup(slot))
    }

    /// Every key held by more than one entity, sorted by kind then key.
    pub fn collisions(&self) -> Vec<KeyCollision> {
        let mut collisions = Vec::new();

        let mut collect = |kind: KeyKind, key: String, slot: &Slot| {
            if let Slot::Ambiguous(positions) = slot {
                collisions.push(KeyCollision {
                    kind,
                    key,
                    entity_ids: positions.iter().map(|&p| self.entities[p].id).collect(),
                });
            }
        };

        for (key, slot) in &self.by_email {
            collect(KeyKind::Email, key.clone(), slot);
        }
        for (key, slot) in &self.by_username {
            collect(KeyKind::Username, key.clone(), slot);
        }
        for (key, slot) in &self.by_name {
            collect(KeyKind::Name, key.to_string(), slot);
        }

        collisions.sort_by(|a, b| a.kind.cmp(&b.kind).then_with(|| a.key.cmp(&b.key)));
        collisions
    }

    fn lookup(&self, slot: &Slot) -> Lookup<'_> {
        match slot {
            Slot::Single(position) => Lookup::Single(&self.entities[*position]),
            Slot::Ambiguous(positions) => {
                Lookup::Ambiguous(positions.iter().map(|&p| &self.entities[p]).collect())
            }
        }
    }
}

/// Insert `position` under `key`, promoting a Single slot to Ambiguous.
/// Ambiguous lists are left in insertion order until `sort_ambiguous`.
fn insert_slot<K: Eq + Hash>(map: &mut HashMap<K, Slot>, key: K, position: usize) {
    match map.entry(key) {
        Entry::Vacant(vacant) => {
            vacant.insert(Slot::Single(position));
        }
        Entry::Occupied(mut occupied) => {
            let slot = occupied.get_mut();
            match slot {
                Slot::Single(existing) => {
                    let existing = *existing;
                    *slot = Slot::Ambiguous(vec![existing, position]);
                }
                Slot::Ambiguous(positions) => positions.push(position),
            }
        }
    }
}

/// Order every Ambiguous list by ascending entity ID, once per build.
fn sort_ambiguous<K>(map: &mut HashMap<K, Slot>, entities: &[CanonicalEntity]) {
    for slot in map.values_mut() {
        if let Slot::Ambiguous(positions) = slot {
            positions.sort_unstable_by_key(|&p| entities[p].id);
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
