// 🧭 Column Map - Figure out which spreadsheet header means what
//
// Exports from different offices name the same column differently
// ("Email", "SUNet ID", "First Name", "PTA", "Other PTAs"). Headers are
// matched case-insensitively after trimming; the first header that fits a
// field claims it.

use crate::extractor::extract_emails;
use crate::parser::{RawRow, RowSet};
use crate::record::SourceRecord;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMap {
    pub email: Option<String>,
    /// Free text holding an email somewhere inside ("University ID Email")
    pub email_blob: Option<String>,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub primary_identifier: Option<String>,
    pub identifier_blob: Option<String>,
}

impl ColumnMap {
    pub fn detect<S: AsRef<str>>(headers: &[S]) -> Self {
        let mut map = ColumnMap::default();

        for header in headers {
            let header = header.as_ref();
            let lower = header.trim().to_lowercase();

            let slot = if matches!(lower.as_str(), "email" | "e-mail" | "email address") {
                &mut map.email
            } else if lower.contains("id email") {
                &mut map.email_blob
            } else if lower.contains("sunet") || lower == "username" || lower == "user name" {
                &mut map.username
            } else if lower.starts_with("pta") && !lower.contains("other") && !lower.contains("name") {
                &mut map.primary_identifier
            } else if lower.contains("other pta") {
                &mut map.identifier_blob
            } else if lower == "first" || lower == "first name" {
                &mut map.first_name
            } else if lower == "last" || lower == "last name" {
                &mut map.last_name
            } else {
                continue;
            };

            if slot.is_none() {
                *slot = Some(header.to_string());
            }
        }

        map
    }

    /// A map can resolve rows only if some identifying key is present.
    pub fn is_usable(&self) -> bool {
        self.email.is_some()
            || self.email_blob.is_some()
            || self.username.is_some()
            || (self.first_name.is_some() && self.last_name.is_some())
    }

    pub fn has_identifiers(&self) -> bool {
        self.primary_identifier.is_some() || self.identifier_blob.is_some()
    }

    /// Build a SourceRecord from one raw row.
    pub fn record(&self, source_name: &str, row: &RawRow) -> SourceRecord {
        let cell = |column: &Option<String>| -> Option<String> {
            let value = row.get(column.as_deref()?)?.trim();
            (!value.is_empty()).then(|| value.to_string())
        };

        // Email cells occasionally carry an ID in front of the address
        let email = cell(&self.email)
            .map(|value| extract_emails(&value).into_iter().next().unwrap_or(value))
            .or_else(|| {
                cell(&self.email_blob).and_then(|value| extract_emails(&value).into_iter().next())
            });

        SourceRecord {
            source_name: source_name.to_string(),
            source_row_number: row.row_number,
            email,
            first_name: cell(&self.first_name),
            last_name: cell(&self.last_name),
            username_hint: cell(&self.username),
            primary_identifier: cell(&self.primary_identifier),
            identifier_blob: cell(&self.identifier_blob),
        }
    }

    /// Detect columns for a whole row set and convert every row.
    pub fn records_from(set: &RowSet) -> (ColumnMap, Vec<SourceRecord>) {
        let map = ColumnMap::detect(set.headers.as_slice());
        let records = set
            .rows
            .iter()
            .map(|row| map.record(&set.source_name, row))
            .collect();
        (map, records)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn row(number: usize, cells: &[(&str, &str)]) -> RawRow {
        RawRow {
            row_number: number,
            cells: cells
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>(),
        }
    }

    #[test]
    fn test_detect_typical_headers() {
        let map = ColumnMap::detect(&[
            "Email", "SUNet ID", "First Name", "Last", "PTA", "PTA Name", "Other PTAs",
        ]);

        assert_eq!(map.email.as_deref(), Some("Email"));
        assert_eq!(map.username.as_deref(), Some("SUNet ID"));
        assert_eq!(map.first_name.as_deref(), Some("First Name"));
        assert_eq!(map.last_name.as_deref(), Some("Last"));
        assert_eq!(map.primary_identifier.as_deref(), Some("PTA"));
        assert_eq!(map.identifier_blob.as_deref(), Some("Other PTAs"));
        assert!(map.is_usable());
        assert!(map.has_identifiers());
    }

    #[test]
    fn test_first_matching_header_wins() {
        let map = ColumnMap::detect(&["PTA 1", "PTA 2"]);
        assert_eq!(map.primary_identifier.as_deref(), Some("PTA 1"));
    }

    #[test]
    fn test_unusable_without_keys() {
        let map = ColumnMap::detect(&["First Name", "PTA"]);
        assert!(!map.is_usable());
    }

    #[test]
    fn test_record_from_row() {
        let map = ColumnMap::detect(&["Email", "First", "Last", "Other PTAs"]);
        let record = map.record(
            "members.csv",
            &row(5, &[
                ("Email", " 05123 Alice@X.edu "),
                ("First", "Alice"),
                ("Last", ""),
                ("Other PTAs", "1168003-1-DJYBX"),
            ]),
        );

        assert_eq!(record.source_row_number, 5);
        assert_eq!(record.email.as_deref(), Some("alice@x.edu"));
        assert_eq!(record.first_name.as_deref(), Some("Alice"));
        assert_eq!(record.last_name, None);
        assert_eq!(record.identifier_blob.as_deref(), Some("1168003-1-DJYBX"));
    }

    #[test]
    fn test_email_blob_fallback() {
        let map = ColumnMap::detect(&["University ID Email", "Email"]);
        assert_eq!(map.email_blob.as_deref(), Some("University ID Email"));

        let record = map.record(
            "internal.csv",
            &row(2, &[("University ID Email", "06001234 jdoe@stanford.edu"), ("Email", "")]),
        );
        assert_eq!(record.email.as_deref(), Some("jdoe@stanford.edu"));
    }
}
