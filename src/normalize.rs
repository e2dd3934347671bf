// 🔑 Key Normalizer - Canonical lookup keys for email, username and names
//
// Spreadsheet cells surface "missing" in many ways: empty strings, "nan"
// from spreadsheet exports, "None"/"null" from JSON dumps. Every normalizer here
// maps those to None so the resolver can simply move on to the next key.

use serde::{Deserialize, Serialize};

/// Cell values that mean "no value" once trimmed and lower-cased.
const ABSENT_MARKERS: [&str; 3] = ["nan", "none", "null"];

// ============================================================================
// NAME KEY
// ============================================================================

/// Normalized `(first, last)` pair used by the name fallback.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NameKey {
    pub first: String,
    pub last: String,
}

impl std::fmt::Display for NameKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.first, self.last)
    }
}

// ============================================================================
// NORMALIZERS
// ============================================================================

/// Lowercase a raw cell and collapse whitespace runs to one space,
/// returning None for absent markers.
pub fn normalize_text(raw: Option<&str>) -> Option<String> {
    let value = raw?
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    if value.is_empty() || ABSENT_MARKERS.contains(&value.as_str()) {
        None
    } else {
        Some(value)
    }
}

/// Normalize an email address.
///
/// Requires an `@` with a non-empty local part; anything else is absent.
pub fn normalize_email(raw: Option<&str>) -> Option<String> {
    let email = normalize_text(raw)?;
    match email.find('@') {
        Some(at) if at > 0 => Some(email),
        _ => None,
    }
}

pub fn normalize_username(raw: Option<&str>) -> Option<String> {
    normalize_text(raw)
}

/// Normalize a first/last name pair. Both parts must be present.
pub fn normalize_name_pair(first: Option<&str>, last: Option<&str>) -> Option<NameKey> {
    let first = normalize_text(first)?;
    let last = normalize_text(last)?;
    Some(NameKey { first, last })
}

/// Local part of an already-normalized email ("alice@x.edu" → "alice").
pub fn email_local_part(email: &str) -> Option<&str> {
    match email.split_once('@') {
        Some((local, _)) if !local.is_empty() => Some(local),
        _ => None,
    }
}

/// Build an institutional address from a username and domain
/// ("jdoe", "stanford.edu" → "jdoe@stanford.edu").
pub fn institutional_email(username: &str, domain: &str) -> Option<String> {
    let domain = domain.trim().trim_start_matches('@');
    if domain.is_empty() {
        return None;
    }
    normalize_email(Some(&format!("{}@{}", username.trim(), domain)))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_markers() {
        for raw in ["", "   ", "nan", "NaN", "None", "NULL", " null "] {
            assert_eq!(normalize_text(Some(raw)), None, "{:?} should be absent", raw);
        }
        assert_eq!(normalize_text(None), None);
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(
            normalize_email(Some("  Alice@X.EDU ")),
            Some("alice@x.edu".to_string())
        );
        assert_eq!(normalize_email(Some("alice")), None);
        assert_eq!(normalize_email(Some("@x.edu")), None);
        assert_eq!(normalize_email(Some("nan")), None);
    }

    #[test]
    fn test_normalize_username() {
        assert_eq!(normalize_username(Some(" JDoe ")), Some("jdoe".to_string()));
        assert_eq!(normalize_username(Some("None")), None);
    }

    #[test]
    fn test_name_pair_requires_both_parts() {
        assert_eq!(
            normalize_name_pair(Some(" Alice "), Some("SMITH")),
            Some(NameKey {
                first: "alice".to_string(),
                last: "smith".to_string(),
            })
        );
        assert_eq!(normalize_name_pair(Some("Alice"), None), None);
        assert_eq!(normalize_name_pair(Some("Alice"), Some("nan")), None);
        assert_eq!(normalize_name_pair(Some(""), Some("Smith")), None);
    }

    #[test]
    fn test_inner_whitespace_collapses() {
        assert_eq!(
            normalize_name_pair(Some("Mary  Ann"), Some(" Smith\t")),
            normalize_name_pair(Some("Mary Ann"), Some("Smith"))
        );
        assert_eq!(
            normalize_name_pair(Some("Mary  Ann"), Some("Smith")).map(|key| key.first),
            Some("mary ann".to_string())
        );
        assert_eq!(
            normalize_text(Some(" Mary \n Ann ")),
            Some("mary ann".to_string())
        );
        assert_eq!(normalize_text(Some(" \t n a n ")), Some("n a n".to_string()));
    }

    #[test]
    fn test_email_local_part() {
        assert_eq!(email_local_part("alice@x.edu"), Some("alice"));
        assert_eq!(email_local_part("alice"), None);
    }

    #[test]
    fn test_institutional_email() {
        assert_eq!(
            institutional_email("JDoe", "@stanford.edu"),
            Some("jdoe@stanford.edu".to_string())
        );
        assert_eq!(institutional_email("jdoe", " "), None);
    }
}
