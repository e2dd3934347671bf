// 🎯 Resolver - Match one source record to at most one canonical entity
//
// Fallback chain, most reliable key first:
//   1. exact email
//   2. username (explicit hint, or the email's local part)
//   3. first + last name
// The first key that hits wins. Ties pick the lowest entity ID and are
// always flagged as ambiguous.

use crate::entities::{CanonicalEntity, EntityId};
use crate::index::{EntityIndex, Lookup};
use crate::normalize::{
    email_local_part, institutional_email, normalize_email, normalize_name_pair,
    normalize_username, NameKey,
};
use crate::record::{OriginalFields, SourceRecord, SourceRef};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

// ============================================================================
// MATCH METHOD
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    /// Normalized email found in the email map
    ExactEmail,

    /// Username hint (or email local part) found in the username map
    UsernameFallback,

    /// First + last name found in the name map
    NameFallback,

    /// No key matched
    Unresolved,
}

impl MatchMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchMethod::ExactEmail => "exact_email",
            MatchMethod::UsernameFallback => "username_fallback",
            MatchMethod::NameFallback => "name_fallback",
            MatchMethod::Unresolved => "unresolved",
        }
    }
}

impl std::fmt::Display for MatchMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// RESOLUTION RESULT
// ============================================================================

/// Normalized keys the resolver tried for a record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordKeys {
    pub email: Option<String>,
    pub username: Option<String>,
    pub name: Option<NameKey>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionResult {
    pub source: SourceRef,

    /// Cells as the row had them, for operators fixing the row by hand
    pub original: OriginalFields,

    pub keys: RecordKeys,
    pub matched: Option<CanonicalEntity>,
    pub method: MatchMethod,
    pub ambiguous: bool,

    /// Number of candidates when `ambiguous`, otherwise 0
    pub ambiguity_count: usize,

    /// Every entity that held the matching key, ascending ID
    pub candidate_ids: Vec<EntityId>,
}

impl ResolutionResult {
    fn unresolved(source: SourceRef, original: OriginalFields, keys: RecordKeys) -> Self {
        ResolutionResult {
            source,
            original,
            keys,
            matched: None,
            method: MatchMethod::Unresolved,
            ambiguous: false,
            ambiguity_count: 0,
            candidate_ids: Vec::new(),
        }
    }

    fn from_lookup(
        source: SourceRef,
        original: OriginalFields,
        keys: RecordKeys,
        method: MatchMethod,
        lookup: Lookup<'_>,
    ) -> Self {
        let ambiguous = lookup.is_ambiguous();
        ResolutionResult {
            source,
            original,
            keys,
            matched: Some(lookup.first().clone()),
            method,
            ambiguous,
            ambiguity_count: if ambiguous { lookup.len() } else { 0 },
            candidate_ids: lookup.ids(),
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.matched.is_some()
    }

    pub fn entity_id(&self) -> Option<EntityId> {
        self.matched.as_ref().map(|entity| entity.id)
    }
}

// ============================================================================
// RESOLVER
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolverOptions {
    /// Domain for institutional addresses. When a record has no email but a
    /// username hint, `hint@domain` is tried as its email.
    pub institutional_domain: Option<String>,

    /// Try the email's local part as a username when the email misses.
    pub derive_username_from_email: bool,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        ResolverOptions {
            institutional_domain: None,
            derive_username_from_email: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Resolver {
    pub options: ResolverOptions,
}

impl Resolver {
    pub fn new(options: ResolverOptions) -> Self {
        Resolver { options }
    }

    /// Resolve one record against the index. Pure: no I/O, never fails.
    pub fn resolve(&self, record: &SourceRecord, index: &EntityIndex) -> ResolutionResult {
        let source = record.source_ref();
        let original = record.original_fields();
        let keys = self.record_keys(record);

        let result = match self.check_email(&keys, index) {
            Some(lookup) => {
                ResolutionResult::from_lookup(source, original, keys, MatchMethod::ExactEmail, lookup)
            }
            None => match self.check_username(&keys, index) {
                Some(lookup) => {
                    ResolutionResult::from_lookup(source, original, keys, MatchMethod::UsernameFallback, lookup)
                }
                None => match self.check_name(&keys, index) {
                    Some(lookup) => {
                        ResolutionResult::from_lookup(source, original, keys, MatchMethod::NameFallback, lookup)
                    }
                    None => ResolutionResult::unresolved(source, original, keys),
                },
            },
        };

        if result.ambiguous {
            warn!(
                source = %result.source,
                method = %result.method,
                candidates = ?result.candidate_ids,
                "Ambiguous match, using lowest entity ID"
            );
        } else {
            debug!(
                source = %result.source,
                method = %result.method,
                entity = ?result.entity_id(),
                "Resolved record"
            );
        }

        result
    }

    /// Normalize every key the chain may use.
    fn record_keys(&self, record: &SourceRecord) -> RecordKeys {
        let username_hint = normalize_username(record.username_hint.as_deref());

        let email = normalize_email(record.email.as_deref()).or_else(|| {
            let domain = self.options.institutional_domain.as_deref()?;
            institutional_email(username_hint.as_deref()?, domain)
        });

        let username = username_hint.or_else(|| {
            if !self.options.derive_username_from_email {
                return None;
            }
            email.as_deref().and_then(email_local_part).map(str::to_string)
        });

        RecordKeys {
            email,
            username,
            name: normalize_name_pair(record.first_name.as_deref(), record.last_name.as_deref()),
        }
    }

    /// Step 1: exact email
    fn check_email<'a>(&self, keys: &RecordKeys, index: &'a EntityIndex) -> Option<Lookup<'a>> {
        index.by_email(keys.email.as_deref()?)
    }

    /// Step 2: username
    fn check_username<'a>(&self, keys: &RecordKeys, index: &'a EntityIndex) -> Option<Lookup<'a>> {
        index.by_username(keys.username.as_deref()?)
    }

    /// Step 3: full name, only when both parts are known
    fn check_name<'a>(&self, keys: &RecordKeys, index: &'a EntityIndex) -> Option<Lookup<'a>> {
        index.by_name(keys.name.as_ref()?)
    }
}

/// Resolve with default options.
pub fn resolve(record: &SourceRecord, index: &EntityIndex) -> ResolutionResult {
    Resolver::default().resolve(record, index)
}

// ============================================================================
// TESTS
// ============================================================================
