// 🔍 Duplicate Analysis - Rows, identifiers and sources that overlap
//
// Three questions operators ask before a bulk update:
//   - Which source rows describe the same person twice?
//   - Which PTAs are attached to more than one project?
//   - Which PTAs appear in both of two funding sources?

use crate::entities::{EntityId, ProjectRecord};
use crate::normalize::{normalize_email, normalize_name_pair, normalize_text};
use crate::record::{SourceRecord, SourceRef};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

// ============================================================================
// MATCH STRATEGY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchStrategy {
    /// Every field identical (provenance aside)
    IdenticalRow,

    /// Same normalized email, other fields differ
    SameEmail,

    /// Same first + last name, neither row has an email
    SameName,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateMatch {
    /// Earlier row (input order)
    pub first: SourceRef,

    /// Later row repeating it
    pub second: SourceRef,

    pub strategy: MatchStrategy,

    /// Human-readable reason
    pub reason: String,
}

// ============================================================================
// DEDUPLICATION ENGINE
// ============================================================================

#[derive(Debug, Clone)]
pub struct DeduplicationEngine {
    /// Also pair rows sharing only a name (default: true)
    pub match_names: bool,
}

impl DeduplicationEngine {
    pub fn new() -> Self {
        DeduplicationEngine { match_names: true }
    }

    /// Find rows repeating an earlier row.
    ///
    /// Each later row is paired with the first row it repeats, using the
    /// strongest strategy that applies.
    pub fn find_duplicates(&self, records: &[SourceRecord]) -> Vec<DuplicateMatch> {
        let mut matches = Vec::new();

        let mut by_hash: HashMap<String, usize> = HashMap::new();
        let mut by_email: HashMap<String, usize> = HashMap::new();
        let mut by_name: HashMap<String, usize> = HashMap::new();

        for (i, record) in records.iter().enumerate() {
            let hash = record.content_hash();
            let email = normalize_email(record.email.as_deref());
            let name = normalize_name_pair(record.first_name.as_deref(), record.last_name.as_deref())
                .map(|n| n.to_string());

            // Strategy 1: identical content
            if let Some(&j) = by_hash.get(&hash) {
                matches.push(self.pair(records, j, i, MatchStrategy::IdenticalRow, "identical values".to_string()));
            }
            // Strategy 2: same email
            else if let Some(&j) = email.as_ref().and_then(|e| by_email.get(e)) {
                let reason = format!("same email {}", email.as_deref().unwrap_or_default());
                matches.push(self.pair(records, j, i, MatchStrategy::SameEmail, reason));
            }
            // Strategy 3: same name, no email on either side
            else if self.match_names && email.is_none() {
                if let Some(&j) = name.as_ref().and_then(|n| by_name.get(n)) {
                    let reason = format!("same name {}", name.as_deref().unwrap_or_default());
                    matches.push(self.pair(records, j, i, MatchStrategy::SameName, reason));
                }
            }

            by_hash.entry(hash).or_insert(i);
            if let Some(email) = email {
                by_email.entry(email).or_insert(i);
            } else if let Some(name) = name {
                by_name.entry(name).or_insert(i);
            }
        }

        matches
    }

    fn pair(
        &self,
        records: &[SourceRecord],
        first: usize,
        second: usize,
        strategy: MatchStrategy,
        reason: String,
    ) -> DuplicateMatch {
        DuplicateMatch {
            first: records[first].source_ref(),
            second: records[second].source_ref(),
            strategy,
            reason,
        }
    }
}

impl Default for DeduplicationEngine {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// SHARED IDENTIFIERS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSummary {
    pub id: EntityId,
    pub name: String,
    pub active: Option<bool>,
    pub account: Option<EntityId>,
}

/// A PTA carried by more than one project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedIdentifier {
    pub identifier: String,
    pub projects: Vec<ProjectSummary>,
}

/// PTAs used by several projects, most-shared first, then by PTA.
pub fn find_shared_identifiers(projects: &[ProjectRecord]) -> Vec<SharedIdentifier> {
    let mut by_identifier: BTreeMap<String, Vec<ProjectSummary>> = BTreeMap::new();

    for project in projects {
        if let Some(identifier) = project.identifier() {
            by_identifier.entry(identifier).or_default().push(ProjectSummary {
                id: project.id,
                name: project.name.clone(),
                active: project.active,
                account: project.account,
            });
        }
    }

    let mut shared: Vec<SharedIdentifier> = by_identifier
        .into_iter()
        .filter(|(_, projects)| projects.len() > 1)
        .map(|(identifier, projects)| SharedIdentifier { identifier, projects })
        .collect();

    // Stable sort keeps the BTreeMap's identifier order among equal counts
    shared.sort_by(|a, b| b.projects.len().cmp(&a.projects.len()));
    shared
}

/// PTAs present in both sources, canonicalized and sorted.
pub fn find_overlaps<L, R>(left: &[L], right: &[R]) -> Vec<String>
where
    L: AsRef<str>,
    R: AsRef<str>,
{
    let canonical = |raw: &str| normalize_text(Some(raw)).map(|_| raw.trim().to_uppercase());

    let left: BTreeSet<String> = left.iter().filter_map(|s| canonical(s.as_ref())).collect();
    let right: BTreeSet<String> = right.iter().filter_map(|s| canonical(s.as_ref())).collect();

    left.intersection(&right).cloned().collect()
}

// ============================================================================
// TESTS
// ============================================================================
