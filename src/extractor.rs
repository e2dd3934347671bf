// 🔎 Identifier Extractor - Pull PTA codes and emails out of free text
//
// "Other PTAs" cells arrive newline-, space- or comma-separated, and
// sometimes with no separator at all ("1168003-1-DJYBX1277206-10-UBILB").
// Scanning for the token shape handles all of them the same way: the letter
// run of one token stops at the first digit of the next.

use crate::normalize::normalize_text;
use crate::record::{SourceRecord, SourceRef};
use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// PTA shape: digits-digits-letters, e.g. `1262004-000-DDLOT`.
pub const DEFAULT_IDENTIFIER_PATTERN: &str = r"(?i)[0-9]+-[0-9]+-[a-z]+";

static DEFAULT_IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(DEFAULT_IDENTIFIER_PATTERN).expect("default identifier pattern"));

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").expect("email pattern")
});

// ============================================================================
// EXTRACTED IDENTIFIER
// ============================================================================

/// Which cell of the record an identifier came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IdentifierField {
    /// The single-valued "PTA" column
    Primary,
    /// The free-text "Other PTAs" column
    Blob,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedIdentifier {
    pub value: String,
    pub field: IdentifierField,
    pub source: SourceRef,
}

// ============================================================================
// EXTRACTOR
// ============================================================================

/// Token scanner for embedded identifiers.
#[derive(Debug, Clone)]
pub struct IdentifierExtractor {
    pattern: Regex,
}

impl IdentifierExtractor {
    /// Extractor for a custom token shape.
    pub fn new(pattern: &str) -> Result<Self> {
        let pattern = Regex::new(pattern)
            .with_context(|| format!("Invalid identifier pattern: {}", pattern))?;
        Ok(IdentifierExtractor { pattern })
    }

    /// Scan `text` for tokens.
    ///
    /// Output is upper-cased and deduplicated; the first occurrence decides
    /// the position. Text that holds no token yields an empty list.
    pub fn extract(&self, text: &str) -> Vec<String> {
        if normalize_text(Some(text)).is_none() {
            return Vec::new();
        }

        let mut seen = HashSet::new();
        self.pattern
            .find_iter(text)
            .map(|m| m.as_str().to_uppercase())
            .filter(|token| seen.insert(token.clone()))
            .collect()
    }

    /// Every identifier carried by a record, primary column first.
    pub fn extract_from_record(&self, record: &SourceRecord) -> Vec<ExtractedIdentifier> {
        let source = record.source_ref();
        let mut seen = HashSet::new();
        let mut identifiers = Vec::new();

        let cells = [
            (IdentifierField::Primary, record.primary_identifier.as_deref()),
            (IdentifierField::Blob, record.identifier_blob.as_deref()),
        ];

        for (field, cell) in cells {
            let Some(cell) = cell else { continue };
            for value in self.extract(cell) {
                if seen.insert(value.clone()) {
                    identifiers.push(ExtractedIdentifier {
                        value,
                        field,
                        source: source.clone(),
                    });
                }
            }
        }

        identifiers
    }
}

impl Default for IdentifierExtractor {
    fn default() -> Self {
        IdentifierExtractor {
            pattern: DEFAULT_IDENTIFIER_RE.clone(),
        }
    }
}

/// Extract PTA-shaped identifiers with the default pattern.
pub fn extract_identifiers(text: &str) -> Vec<String> {
    IdentifierExtractor::default().extract(text)
}

/// Extract every email address embedded in `text`, lower-cased and
/// deduplicated in first-seen order.
///
/// Used for cells like "University ID Email" that hold `05123456 jdoe@x.edu`.
pub fn extract_emails(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    EMAIL_RE
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .filter(|email| seen.insert(email.clone()))
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn expected() -> Vec<String> {
        vec!["1168003-1-DJYBX".to_string(), "1277206-10-UBILB".to_string()]
    }

    #[test]
    fn test_separator_variants() {
        assert_eq!(extract_identifiers("1168003-1-DJYBX\n1277206-10-UBILB"), expected());
        assert_eq!(extract_identifiers("1168003-1-DJYBX 1277206-10-UBILB"), expected());
        assert_eq!(extract_identifiers("1168003-1-DJYBX,1277206-10-UBILB"), expected());
        assert_eq!(extract_identifiers("1168003-1-DJYBX1277206-10-UBILB"), expected());
    }

    #[test]
    fn test_dedup_keeps_first_occurrence() {
        let found = extract_identifiers("1277206-10-UBILB, 1168003-1-djybx 1277206-10-ubilb");
        assert_eq!(
            found,
            vec!["1277206-10-UBILB".to_string(), "1168003-1-DJYBX".to_string()]
        );
    }

    #[test]
    fn test_missing_and_malformed_input() {
        assert!(extract_identifiers("").is_empty());
        assert!(extract_identifiers("nan").is_empty());
        assert!(extract_identifiers("None").is_empty());
        assert!(extract_identifiers("1168003-DJYBX; TBD; -1-ABC").is_empty());
    }

    #[test]
    fn test_single_identifier() {
        assert_eq!(
            extract_identifiers("1262004-000-DDLOT"),
            vec!["1262004-000-DDLOT".to_string()]
        );
    }

    #[test]
    fn test_custom_pattern() {
        let extractor = IdentifierExtractor::new(r"(?i)AC-[0-9]{4}").unwrap();
        assert_eq!(extractor.extract("ac-1234 / AC-9999"), vec!["AC-1234", "AC-9999"]);
        assert!(IdentifierExtractor::new("([").is_err());
    }

    #[test]
    fn test_extract_from_record_merges_cells() {
        let record = SourceRecord::new("members.csv", 3)
            .with_primary_identifier("1168003-1-djybx")
            .with_identifier_blob("1168003-1-DJYBX\n1277206-10-UBILB");

        let found = IdentifierExtractor::default().extract_from_record(&record);

        assert_eq!(found.len(), 2);
        assert_eq!(found[0].value, "1168003-1-DJYBX");
        assert_eq!(found[0].field, IdentifierField::Primary);
        assert_eq!(found[1].value, "1277206-10-UBILB");
        assert_eq!(found[1].field, IdentifierField::Blob);
        assert_eq!(found[1].source.row_number, 3);
    }

    #[test]
    fn test_extract_emails() {
        assert_eq!(
            extract_emails("05123456 JDoe@Stanford.edu; jdoe@stanford.edu"),
            vec!["jdoe@stanford.edu".to_string()]
        );
        assert!(extract_emails("05123456").is_empty());
    }
}
