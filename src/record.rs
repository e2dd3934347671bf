// 📄 Source Records - One spreadsheet row with resolved column names
//
// A SourceRecord is what the column map produces from a raw row. Every
// field except provenance is optional: the reader guarantees source name and
// row number, nothing else.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Provenance of a record: which file, which row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceRef {
    pub source_name: String,
    pub row_number: usize,
}

impl std::fmt::Display for SourceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (row {})", self.source_name, self.row_number)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRecord {
    // Provenance (always present)
    pub source_name: String,
    pub source_row_number: usize,

    // Identifying fields (any may be missing)
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub username_hint: Option<String>,

    // Identifier cells: the single "PTA" column and the free-text "Other PTAs"
    pub primary_identifier: Option<String>,
    pub identifier_blob: Option<String>,
}

impl SourceRecord {
    pub fn new(source_name: impl Into<String>, source_row_number: usize) -> Self {
        SourceRecord {
            source_name: source_name.into(),
            source_row_number,
            email: None,
            first_name: None,
            last_name: None,
            username_hint: None,
            primary_identifier: None,
            identifier_blob: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_name(mut self, first: impl Into<String>, last: impl Into<String>) -> Self {
        self.first_name = Some(first.into());
        self.last_name = Some(last.into());
        self
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username_hint = Some(username.into());
        self
    }

    pub fn with_primary_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.primary_identifier = Some(identifier.into());
        self
    }

    pub fn with_identifier_blob(mut self, blob: impl Into<String>) -> Self {
        self.identifier_blob = Some(blob.into());
        self
    }

    pub fn source_ref(&self) -> SourceRef {
        SourceRef {
            source_name: self.source_name.clone(),
            row_number: self.source_row_number,
        }
    }

    /// Identifying cells exactly as the row carried them.
    pub fn original_fields(&self) -> OriginalFields {
        OriginalFields {
            email: self.email.clone(),
            username: self.username_hint.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
        }
    }

    /// Content hash of the record (provenance excluded).
    ///
    /// Two rows carrying the same values hash the same even when they come
    /// from different files.
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        for field in [
            &self.email,
            &self.first_name,
            &self.last_name,
            &self.username_hint,
            &self.primary_identifier,
            &self.identifier_blob,
        ] {
            hasher.update(field.as_deref().unwrap_or(""));
            hasher.update([0x1f]);
        }
        format!("{:x}", hasher.finalize())
    }
}

/// Unnormalized identifying cells of a row. A malformed email or a lone
/// first name survives here even though it yields no lookup key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginalFields {
    pub email: Option<String>,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// SHA-256 over every record's content and provenance, in order.
///
/// Stored in the report so an operator can confirm that a rerun saw exactly
/// the same input as an earlier one.
pub fn input_digest(records: &[SourceRecord]) -> String {
    let mut hasher = Sha256::new();
    for record in records {
        hasher.update(record.source_name.as_bytes());
        hasher.update(record.source_row_number.to_le_bytes());
        hasher.update(record.content_hash().as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_original_fields_keep_malformed_values() {
        let mut record = SourceRecord::new("members.csv", 9).with_email("alice.x.edu");
        record.first_name = Some("Alice".to_string());

        let original = record.original_fields();
        assert_eq!(original.email.as_deref(), Some("alice.x.edu"));
        assert_eq!(original.first_name.as_deref(), Some("Alice"));
        assert_eq!(original.last_name, None);
        assert_eq!(original.username, None);
    }

    #[test]
    fn test_builder_and_source_ref() {
        let record = SourceRecord::new("lab_members.csv", 4)
            .with_email("alice@x.edu")
            .with_name("Alice", "Smith");

        assert_eq!(record.email.as_deref(), Some("alice@x.edu"));
        assert_eq!(record.last_name.as_deref(), Some("Smith"));
        assert_eq!(record.source_ref().to_string(), "lab_members.csv (row 4)");
    }

    #[test]
    fn test_content_hash_ignores_provenance() {
        let a = SourceRecord::new("a.csv", 2).with_email("alice@x.edu");
        let b = SourceRecord::new("b.csv", 9).with_email("alice@x.edu");
        let c = SourceRecord::new("a.csv", 2).with_email("bob@x.edu");

        assert_eq!(a.content_hash(), b.content_hash());
        assert_ne!(a.content_hash(), c.content_hash());
    }

    #[test]
    fn test_input_digest_is_order_sensitive() {
        let a = SourceRecord::new("a.csv", 2).with_email("alice@x.edu");
        let b = SourceRecord::new("a.csv", 3).with_email("bob@x.edu");

        let forward = input_digest(&[a.clone(), b.clone()]);
        assert_eq!(forward, input_digest(&[a.clone(), b.clone()]));
        assert_ne!(forward, input_digest(&[b, a]));
    }
}
