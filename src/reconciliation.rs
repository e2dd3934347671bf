// ⚖️ Reconciliation Engine - Records in, desired state + audit report out
//
// Pipeline for one run:
//   records → resolve → extract identifiers → map to associations
//           → accumulate per entity → merge against snapshot → report
//
// Nothing here writes to the target system. `MergeOutcome.changed` only
// says the desired state differs from the snapshot; the write-back layer
// decides what to do with it.

use crate::config::ReconcileConfig;
use crate::deduplication::{DeduplicationEngine, DuplicateMatch};
use crate::entities::EntityId;
use crate::extractor::IdentifierExtractor;
use crate::index::{EntityIndex, KeyCollision};
use crate::lookup::{IdentifierTable, MissingMapping, TableConflict};
use crate::merger::{AssociationAccumulator, MergeOutcome};
use crate::normalize::NameKey;
use crate::record::{input_digest, OriginalFields, SourceRecord, SourceRef};
use crate::resolver::{MatchMethod, ResolutionResult, Resolver, ResolverOptions};
use crate::similarity::{suggest_entities, EntitySuggestion, DEFAULT_SIMILARITY_THRESHOLD};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::path::Path;
use tracing::{info, warn};

// ============================================================================
// RECORD STATUS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    /// Resolved, and its entity gains at least one association
    ResolvedChanged,

    /// Resolved, entity already holds everything discovered
    ResolvedUnchanged,

    /// Resolved by tie-break among several candidates
    Ambiguous,

    /// No key matched
    Unresolved,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::ResolvedChanged => "resolved_changed",
            RecordStatus::ResolvedUnchanged => "resolved_unchanged",
            RecordStatus::Ambiguous => "ambiguous",
            RecordStatus::Unresolved => "unresolved",
        }
    }
}

/// What an operator needs to find and fix a row by hand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordDetail {
    pub source: SourceRef,
    pub status: RecordStatus,
    pub method: MatchMethod,

    /// Cells as the row had them, malformed values included
    pub original: OriginalFields,

    /// Normalized keys the resolver tried
    pub email_key: Option<String>,
    pub username_key: Option<String>,
    pub name_key: Option<NameKey>,

    pub entity_id: Option<EntityId>,
    pub candidate_ids: Vec<EntityId>,

    /// Entities with a similar name (unresolved rows only). Never applied.
    #[serde(default)]
    pub suggestions: Vec<EntitySuggestion>,
}

impl RecordDetail {
    fn from_result(result: &ResolutionResult, status: RecordStatus) -> Self {
        RecordDetail {
            source: result.source.clone(),
            status,
            method: result.method,
            original: result.original.clone(),
            email_key: result.keys.email.clone(),
            username_key: result.keys.username.clone(),
            name_key: result.keys.name.clone(),
            entity_id: result.entity_id(),
            candidate_ids: result.candidate_ids.clone(),
            suggestions: Vec::new(),
        }
    }
}

/// Identifiers of a resolved record that mapped to nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnmappedIdentifiers {
    pub source: SourceRef,
    pub entity_id: EntityId,
    pub missing: Vec<MissingMapping>,
}

// ============================================================================
// RECONCILIATION REPORT
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationCounts {
    pub total_records: usize,
    pub resolved_changed: usize,
    pub resolved_unchanged: usize,
    pub ambiguous: usize,
    pub unresolved: usize,
    pub entities_changed: usize,
    pub entities_unchanged: usize,
    pub associations_added: usize,
    #[serde(default)]
    pub duplicate_rows: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub run_id: String,
    pub generated_at: DateTime<Utc>,

    /// SHA-256 over the input records, when the engine produced the report
    pub input_digest: Option<String>,

    pub counts: ReconciliationCounts,
    pub by_method: BTreeMap<String, usize>,

    pub ambiguous: Vec<RecordDetail>,
    pub unresolved: Vec<RecordDetail>,
    pub outcomes: Vec<MergeOutcome>,

    pub unmapped: Vec<UnmappedIdentifiers>,
    pub collisions: Vec<KeyCollision>,
    pub table_conflicts: Vec<TableConflict>,

    /// Rows repeating an earlier row of the input
    #[serde(default)]
    pub duplicates: Vec<DuplicateMatch>,
}

impl ReconciliationReport {
    pub fn summary(&self) -> String {
        format!(
            "Reconciliation of {} records: {} changed, {} unchanged, {} ambiguous, {} unresolved; {} entities gain {} associations",
            self.counts.total_records,
            self.counts.resolved_changed,
            self.counts.resolved_unchanged,
            self.counts.ambiguous,
            self.counts.unresolved,
            self.counts.entities_changed,
            self.counts.associations_added,
        )
    }

    /// Rows an operator has to look at.
    pub fn needs_review(&self) -> bool {
        !self.ambiguous.is_empty() || !self.unresolved.is_empty()
    }

    /// Outcomes the write-back layer should apply.
    pub fn changes(&self) -> impl Iterator<Item = &MergeOutcome> {
        self.outcomes.iter().filter(|outcome| outcome.changed)
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let file = File::create(path)
            .with_context(|| format!("Failed to create report file: {}", path.display()))?;
        serde_json::to_writer_pretty(file, self)
            .with_context(|| format!("Failed to write report: {}", path.display()))?;
        Ok(())
    }

    /// Ambiguous and unresolved rows, one CSV line each.
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)
            .with_context(|| format!("Failed to create review file: {}", path.display()))?;

        for detail in self.ambiguous.iter().chain(self.unresolved.iter()) {
            writer.serialize(ReviewRow::from(detail))?;
        }

        writer
            .flush()
            .with_context(|| format!("Failed to write review file: {}", path.display()))?;
        Ok(())
    }

    /// Changed entities with their existing, added and resulting sets.
    pub fn write_changes_csv(&self, path: &Path) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)
            .with_context(|| format!("Failed to create changes file: {}", path.display()))?;

        for outcome in self.changes() {
            writer.serialize(ChangeRow::from(outcome))?;
        }

        writer
            .flush()
            .with_context(|| format!("Failed to write changes file: {}", path.display()))?;
        Ok(())
    }
}

// Flat CSV shapes
#[derive(Serialize)]
struct ReviewRow {
    status: &'static str,
    source: String,
    row: usize,
    method: &'static str,
    email: String,
    username: String,
    first_name: String,
    last_name: String,
    email_key: String,
    username_key: String,
    name_key: String,
    entity_id: String,
    candidate_ids: String,
    suggestions: String,
}

impl From<&RecordDetail> for ReviewRow {
    fn from(detail: &RecordDetail) -> Self {
        ReviewRow {
            status: detail.status.as_str(),
            source: detail.source.source_name.clone(),
            row: detail.source.row_number,
            method: detail.method.as_str(),
            email: detail.original.email.clone().unwrap_or_default(),
            username: detail.original.username.clone().unwrap_or_default(),
            first_name: detail.original.first_name.clone().unwrap_or_default(),
            last_name: detail.original.last_name.clone().unwrap_or_default(),
            email_key: detail.email_key.clone().unwrap_or_default(),
            username_key: detail.username_key.clone().unwrap_or_default(),
            name_key: detail.name_key.as_ref().map(|key| key.to_string()).unwrap_or_default(),
            entity_id: detail.entity_id.map(|id| id.to_string()).unwrap_or_default(),
            candidate_ids: join_ids(detail.candidate_ids.iter()),
            suggestions: join_ids(detail.suggestions.iter().map(|s| &s.entity_id)),
        }
    }
}

#[derive(Serialize)]
struct ChangeRow {
    entity_id: EntityId,
    existing: String,
    added: String,
    resulting: String,
}

impl From<&MergeOutcome> for ChangeRow {
    fn from(outcome: &MergeOutcome) -> Self {
        ChangeRow {
            entity_id: outcome.entity_id,
            existing: join_ids(outcome.existing.iter()),
            added: join_ids(outcome.added.iter()),
            resulting: join_ids(outcome.resulting.iter()),
        }
    }
}

fn join_ids<'a>(ids: impl Iterator<Item = &'a EntityId>) -> String {
    ids.map(|id| id.to_string()).collect::<Vec<_>>().join(";")
}

/// Bucket every resolution result and total up the merge outcomes.
///
/// Ambiguous records land in the ambiguous bucket whether or not their
/// entity changes. A resolved record with no outcome for its entity counts
/// as unchanged.
pub fn summarize(results: &[ResolutionResult], outcomes: &[MergeOutcome]) -> ReconciliationReport {
    let changed_by_entity: HashMap<EntityId, bool> = outcomes
        .iter()
        .map(|outcome| (outcome.entity_id, outcome.changed))
        .collect();

    let mut counts = ReconciliationCounts {
        total_records: results.len(),
        ..ReconciliationCounts::default()
    };
    let mut by_method: BTreeMap<String, usize> = BTreeMap::new();
    let mut ambiguous = Vec::new();
    let mut unresolved = Vec::new();

    for result in results {
        *by_method.entry(result.method.as_str().to_string()).or_default() += 1;

        match result.entity_id() {
            None => {
                counts.unresolved += 1;
                unresolved.push(RecordDetail::from_result(result, RecordStatus::Unresolved));
            }
            Some(_) if result.ambiguous => {
                counts.ambiguous += 1;
                ambiguous.push(RecordDetail::from_result(result, RecordStatus::Ambiguous));
            }
            Some(id) => {
                if changed_by_entity.get(&id).copied().unwrap_or(false) {
                    counts.resolved_changed += 1;
                } else {
                    counts.resolved_unchanged += 1;
                }
            }
        }
    }

    for outcome in outcomes {
        if outcome.changed {
            counts.entities_changed += 1;
            counts.associations_added += outcome.added.len();
        } else {
            counts.entities_unchanged += 1;
        }
    }

    ReconciliationReport {
        run_id: uuid::Uuid::new_v4().to_string(),
        generated_at: Utc::now(),
        input_digest: None,
        counts,
        by_method,
        ambiguous,
        unresolved,
        outcomes: outcomes.to_vec(),
        unmapped: Vec::new(),
        collisions: Vec::new(),
        table_conflicts: Vec::new(),
        duplicates: Vec::new(),
    }
}

// ============================================================================
// RECONCILIATION ENGINE
// ============================================================================

/// Everything one run produced.
#[derive(Debug, Clone)]
pub struct ReconciliationRun {
    pub results: Vec<ResolutionResult>,
    pub outcomes: Vec<MergeOutcome>,
    pub report: ReconciliationReport,
}

#[derive(Debug, Clone)]
pub struct ReconciliationEngine {
    pub resolver: Resolver,
    pub extractor: IdentifierExtractor,

    /// Let tie-broken (ambiguous) matches contribute associations
    /// (default: true). They are reported either way.
    pub apply_ambiguous: bool,

    /// Report rows repeating an earlier row (default: true)
    pub detect_duplicates: bool,

    /// Attach similar-name suggestions to unresolved rows at this score;
    /// None disables them
    pub suggestion_threshold: Option<f64>,
}

const MAX_SUGGESTIONS: usize = 3;

impl ReconciliationEngine {
    pub fn new() -> Self {
        ReconciliationEngine {
            resolver: Resolver::default(),
            extractor: IdentifierExtractor::default(),
            apply_ambiguous: true,
            detect_duplicates: true,
            suggestion_threshold: Some(DEFAULT_SIMILARITY_THRESHOLD),
        }
    }

    pub fn with_options(options: ResolverOptions, extractor: IdentifierExtractor) -> Self {
        ReconciliationEngine {
            resolver: Resolver::new(options),
            extractor,
            ..Self::new()
        }
    }

    pub fn from_config(config: &ReconcileConfig) -> Result<Self> {
        Ok(ReconciliationEngine {
            resolver: Resolver::new(config.resolver_options()),
            extractor: config.extractor()?,
            apply_ambiguous: config.resolver.apply_ambiguous,
            detect_duplicates: config.resolver.detect_duplicates,
            suggestion_threshold: config.suggestion_threshold(),
        })
    }

    /// Run the whole pipeline over one input set.
    pub fn reconcile(
        &self,
        records: &[SourceRecord],
        index: &EntityIndex,
        table: &IdentifierTable,
    ) -> ReconciliationRun {
        let mut accumulator = AssociationAccumulator::new();
        let mut unmapped = Vec::new();
        let mut results = Vec::with_capacity(records.len());

        for record in records {
            let result = self.resolver.resolve(record, index);

            if let Some(entity_id) = result.entity_id() {
                if result.ambiguous && !self.apply_ambiguous {
                    results.push(result);
                    continue;
                }

                let identifiers: Vec<String> = self
                    .extractor
                    .extract_from_record(record)
                    .into_iter()
                    .map(|identifier| identifier.value)
                    .collect();
                let mapping = table.map_identifiers(&identifiers);

                if !mapping.missing.is_empty() {
                    warn!(
                        source = %result.source,
                        entity = entity_id,
                        missing = %mapping.missing.iter().map(|m| m.to_string()).collect::<Vec<_>>().join(", "),
                        "Identifiers could not be mapped"
                    );
                    unmapped.push(UnmappedIdentifiers {
                        source: result.source.clone(),
                        entity_id,
                        missing: mapping.missing,
                    });
                }

                accumulator.add(entity_id, mapping.associations);
            }

            results.push(result);
        }

        let outcomes = accumulator.merge_all(|entity_id| {
            index
                .get(entity_id)
                .map(|entity| entity.associations.clone())
                .unwrap_or_default()
        });

        let mut report = summarize(&results, &outcomes);
        report.input_digest = Some(input_digest(records));
        report.unmapped = unmapped;
        report.collisions = index.collisions();
        report.table_conflicts = table.conflicts().to_vec();

        if let Some(threshold) = self.suggestion_threshold {
            for detail in report.unresolved.iter_mut() {
                if let Some(name) = &detail.name_key {
                    detail.suggestions = suggest_entities(index, name, threshold, MAX_SUGGESTIONS);
                }
            }
        }

        if self.detect_duplicates {
            report.duplicates = DeduplicationEngine::new().find_duplicates(records);
            report.counts.duplicate_rows = report.duplicates.len();
        }

        info!("{}", report.summary());

        ReconciliationRun {
            results,
            outcomes,
            report,
        }
    }
}

impl Default for ReconciliationEngine {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================
