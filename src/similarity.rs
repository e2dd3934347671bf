// 🧩 Name Similarity - Approximate suggestions for a human to confirm
//
// Typos and nicknames ("Jon" / "John") defeat the exact name key. This module
// scores near misses so an operator can be pointed at likely candidates
// (a PI name against account names, an unresolved row against the snapshot).
// The resolver never consults it: a suggestion is not a match.

use crate::entities::EntityId;
use crate::index::EntityIndex;
use crate::normalize::{normalize_text, NameKey};
use serde::{Deserialize, Serialize};

/// Scores at or above this count as similar.
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.8;

/// Normalized Levenshtein similarity of two names after key normalization,
/// in `0.0..=1.0`. Absent names score 0.
pub fn name_similarity(a: &str, b: &str) -> f64 {
    match (normalize_text(Some(a)), normalize_text(Some(b))) {
        (Some(a), Some(b)) => strsim::normalized_levenshtein(&a, &b),
        _ => 0.0,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarName {
    pub candidate: String,

    /// Position of `candidate` in the list searched
    pub position: usize,

    pub score: f64,

    /// False only when the normalized names are identical
    pub approximate: bool,
}

/// Best candidate for `name`, or None below `threshold`.
///
/// An identical normalized name wins immediately; otherwise the highest
/// score wins and ties keep the earlier candidate.
pub fn find_best_match<S: AsRef<str>>(
    name: &str,
    candidates: &[S],
    threshold: f64,
) -> Option<SimilarName> {
    let target = normalize_text(Some(name))?;
    let mut best: Option<(usize, f64)> = None;

    for (position, candidate) in candidates.iter().enumerate() {
        let Some(normalized) = normalize_text(Some(candidate.as_ref())) else {
            continue;
        };
        if normalized == target {
            return Some(SimilarName {
                candidate: candidate.as_ref().to_string(),
                position,
                score: 1.0,
                approximate: false,
            });
        }

        let score = strsim::normalized_levenshtein(&target, &normalized);
        if best.map_or(true, |(_, top)| score > top) {
            best = Some((position, score));
        }
    }

    let (position, score) = best.filter(|&(_, score)| score >= threshold)?;
    Some(SimilarName {
        candidate: candidates[position].as_ref().to_string(),
        position,
        score,
        approximate: true,
    })
}

/// An entity whose name is close to a row's name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySuggestion {
    pub entity_id: EntityId,
    pub name: String,
    pub score: f64,
}

/// Entities whose name key scores at least `threshold` against `name`,
/// best first (ties by ascending ID), at most `limit` of them.
pub fn suggest_entities(
    index: &EntityIndex,
    name: &NameKey,
    threshold: f64,
    limit: usize,
) -> Vec<EntitySuggestion> {
    let target = name.to_string();

    let mut suggestions: Vec<EntitySuggestion> = index
        .entities()
        .iter()
        .filter_map(|entity| {
            let candidate = entity.name_key()?.to_string();
            let score = strsim::normalized_levenshtein(&target, &candidate);
            (score >= threshold).then(|| EntitySuggestion {
                entity_id: entity.id,
                name: candidate,
                score,
            })
        })
        .collect();

    suggestions.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.entity_id.cmp(&b.entity_id))
    });
    suggestions.truncate(limit);
    suggestions
}

// ============================================================================
// TESTS
// ============================================================================
