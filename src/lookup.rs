// 🔗 Identifier Table - Map extracted PTAs to project IDs
//
// Two shapes exist in practice:
//   direct:  PTA → project ID                (pta_lookup.json)
//   chained: PTA → PTA name → project ID     (funding sheet + project_name_lookup.json)
// Both end up in the same table. Conflicting definitions keep the first
// value and are recorded, never dropped silently.

use crate::entities::{EntityId, ProjectRecord};
use crate::normalize::normalize_text;
use crate::parser::RowSet;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tracing::warn;

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum Entry {
    Direct(EntityId),
    Named(String),
}

/// Why an identifier produced no association.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum MissingReason {
    /// The identifier is not in the table at all
    UnknownIdentifier,

    /// The identifier has a name, but no project carries that name
    UnknownName { name: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingMapping {
    pub identifier: String,
    #[serde(flatten)]
    pub reason: MissingReason,
}

impl std::fmt::Display for MissingMapping {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.reason {
            MissingReason::UnknownIdentifier => write!(f, "{} (not in table)", self.identifier),
            MissingReason::UnknownName { name } => {
                write!(f, "{} -> '{}' (no project with that name)", self.identifier, name)
            }
        }
    }
}

/// Two definitions for the same identifier; the first one was kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableConflict {
    pub identifier: String,
    pub kept: String,
    pub rejected: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifierMapping {
    pub associations: BTreeSet<EntityId>,
    pub missing: Vec<MissingMapping>,
}

// ============================================================================
// IDENTIFIER TABLE
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct IdentifierTable {
    entries: HashMap<String, Entry>,
    name_to_id: HashMap<String, EntityId>,
    conflicts: Vec<TableConflict>,
}

/// Identifiers are compared trimmed and upper-cased.
fn canonical_identifier(raw: &str) -> Option<String> {
    normalize_text(Some(raw))?;
    Some(raw.trim().to_uppercase())
}

impl IdentifierTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table from `identifier → project ID` pairs.
    pub fn direct<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, EntityId)>,
        S: AsRef<str>,
    {
        let mut table = IdentifierTable::new();
        for (identifier, id) in pairs {
            table.insert(identifier.as_ref(), Entry::Direct(id));
        }
        table
    }

    /// Table from `identifier → name` pairs plus a `name → project ID` lookup.
    pub fn chained<I, S, T>(names: I, name_to_id: HashMap<String, EntityId>) -> Self
    where
        I: IntoIterator<Item = (S, T)>,
        S: AsRef<str>,
        T: AsRef<str>,
    {
        let mut table = IdentifierTable {
            name_to_id,
            ..IdentifierTable::default()
        };
        for (identifier, name) in names {
            let name = name.as_ref().trim();
            if normalize_text(Some(name)).is_none() {
                continue;
            }
            table.insert(identifier.as_ref(), Entry::Named(name.to_string()));
        }
        table
    }

    /// Table from a project snapshot. An identifier carried by several
    /// projects maps to none of them and is recorded as a conflict.
    pub fn from_projects(projects: &[ProjectRecord]) -> Self {
        let mut by_identifier: HashMap<String, Vec<EntityId>> = HashMap::new();
        for project in projects {
            if let Some(identifier) = project.identifier() {
                by_identifier.entry(identifier).or_default().push(project.id);
            }
        }

        let mut table = IdentifierTable::new();
        for (identifier, ids) in by_identifier {
            match ids.as_slice() {
                [id] => {
                    table.entries.insert(identifier, Entry::Direct(*id));
                }
                [] => {}
                _ => {
                    warn!(identifier = %identifier, projects = ?ids, "Identifier shared by several projects, not mapped");
                    let listed: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
                    table.conflicts.push(TableConflict {
                        identifier,
                        kept: "unmapped".to_string(),
                        rejected: format!("projects {}", listed.join(", ")),
                    });
                }
            }
        }
        table.conflicts.sort_by(|a, b| a.identifier.cmp(&b.identifier));
        table
    }

    /// Read `identifier → name` pairs from a funding sheet.
    ///
    /// The identifier column is the first header starting with "pta" that
    /// is not a name column; the name column contains "pta name" (or is
    /// plain "name" after the identifier column).
    pub fn name_pairs_from_rows(set: &RowSet) -> Vec<(String, String)> {
        let mut identifier_col: Option<&str> = None;
        let mut name_col: Option<&str> = None;

        for header in &set.headers {
            let lower = header.trim().to_lowercase();
            if lower.starts_with("pta") && !lower.contains("name") && identifier_col.is_none() {
                identifier_col = Some(header.as_str());
            } else if name_col.is_none()
                && (lower.contains("pta name") || (lower == "name" && identifier_col.is_some()))
            {
                name_col = Some(header.as_str());
            }
        }

        let (Some(identifier_col), Some(name_col)) = (identifier_col, name_col) else {
            warn!(source = %set.source_name, "No PTA / PTA name columns found");
            return Vec::new();
        };

        set.rows
            .iter()
            .filter_map(|row| {
                let identifier = row.get(identifier_col)?;
                let name = row.get(name_col).filter(|n| normalize_text(Some(*n)).is_some());
                // A missing name falls back to the identifier itself
                let name = name.unwrap_or(identifier);
                Some((identifier.to_string(), name.to_string()))
            })
            .collect()
    }

    fn insert(&mut self, raw_identifier: &str, entry: Entry) {
        let Some(identifier) = canonical_identifier(raw_identifier) else {
            return;
        };

        match self.entries.get(&identifier) {
            None => {
                self.entries.insert(identifier, entry);
            }
            Some(existing) if *existing == entry => {}
            Some(existing) => {
                let conflict = TableConflict {
                    identifier: identifier.clone(),
                    kept: describe(existing),
                    rejected: describe(&entry),
                };
                warn!(
                    identifier = %identifier,
                    kept = %conflict.kept,
                    rejected = %conflict.rejected,
                    "Identifier defined twice, keeping first"
                );
                self.conflicts.push(conflict);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn conflicts(&self) -> &[TableConflict] {
        &self.conflicts
    }

    /// Map one identifier.
    pub fn map_identifier(&self, identifier: &str) -> Result<EntityId, MissingMapping> {
        let canonical = canonical_identifier(identifier).unwrap_or_default();
        let missing = |reason: MissingReason| MissingMapping {
            identifier: canonical.clone(),
            reason,
        };

        match self.entries.get(&canonical) {
            Some(Entry::Direct(id)) => Ok(*id),
            Some(Entry::Named(name)) => self
                .name_to_id
                .get(name)
                .copied()
                .ok_or_else(|| missing(MissingReason::UnknownName { name: name.clone() })),
            None => Err(missing(MissingReason::UnknownIdentifier)),
        }
    }

    /// Map many identifiers; unknown ones are listed, not fatal.
    pub fn map_identifiers<S: AsRef<str>>(&self, identifiers: &[S]) -> IdentifierMapping {
        let mut mapping = IdentifierMapping::default();
        for identifier in identifiers {
            match self.map_identifier(identifier.as_ref()) {
                Ok(id) => {
                    mapping.associations.insert(id);
                }
                Err(missing) => mapping.missing.push(missing),
            }
        }
        mapping
    }
}

fn describe(entry: &Entry) -> String {
    match entry {
        Entry::Direct(id) => format!("project {}", id),
        Entry::Named(name) => format!("'{}'", name),
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::RawRow;

    #[test]
    fn test_direct_table() {
        let table = IdentifierTable::direct([("1262004-000-ddlot", 11), ("1168003-1-DJYBX", 12)]);

        assert_eq!(table.len(), 2);
        assert_eq!(table.map_identifier("1262004-000-DDLOT"), Ok(11));

        let mapping = table.map_identifiers(&["1168003-1-DJYBX", "9999999-9-ZZZZZ"]);
        assert_eq!(mapping.associations, BTreeSet::from([12]));
        assert_eq!(mapping.missing.len(), 1);
        assert_eq!(mapping.missing[0].reason, MissingReason::UnknownIdentifier);
        assert_eq!(mapping.missing[0].to_string(), "9999999-9-ZZZZZ (not in table)");
    }

    #[test]
    fn test_direct_conflict_keeps_first() {
        let table = IdentifierTable::direct([("1262004-000-DDLOT", 11), ("1262004-000-DDLOT", 99)]);

        assert_eq!(table.map_identifier("1262004-000-DDLOT"), Ok(11));
        assert_eq!(table.conflicts().len(), 1);
        assert_eq!(table.conflicts()[0].rejected, "project 99");
    }

    #[test]
    fn test_chained_table() {
        let names = HashMap::from([("Optics Lab".to_string(), 21)]);
        let table = IdentifierTable::chained(
            [("1262004-000-DDLOT", "Optics Lab"), ("1168003-1-DJYBX", "Retired Grant")],
            names,
        );

        assert_eq!(table.map_identifier("1262004-000-ddlot"), Ok(21));

        let missing = table.map_identifier("1168003-1-DJYBX").unwrap_err();
        assert_eq!(
            missing.reason,
            MissingReason::UnknownName {
                name: "Retired Grant".to_string()
            }
        );
        assert!(missing.to_string().contains("'Retired Grant'"));
    }

    #[test]
    fn test_chained_conflicting_names() {
        let table = IdentifierTable::chained(
            [("1262004-000-DDLOT", "Optics Lab"), ("1262004-000-DDLOT", "Optics Lab 2")],
            HashMap::new(),
        );
        assert_eq!(table.conflicts().len(), 1);
        assert_eq!(table.conflicts()[0].kept, "'Optics Lab'");
    }

    #[test]
    fn test_from_projects_skips_shared_identifiers() {
        let projects = vec![
            ProjectRecord::new(1, "A").with_identifier("1262004-000-DDLOT"),
            ProjectRecord::new(2, "B").with_identifier("1262004-000-ddlot"),
            ProjectRecord::new(3, "C").with_identifier("1168003-1-DJYBX"),
            ProjectRecord::new(4, "D"),
        ];
        let table = IdentifierTable::from_projects(&projects);

        assert_eq!(table.map_identifier("1168003-1-DJYBX"), Ok(3));
        assert!(table.map_identifier("1262004-000-DDLOT").is_err());
        assert_eq!(table.conflicts().len(), 1);
    }

    #[test]
    fn test_name_pairs_from_rows() {
        let set = RowSet {
            source_name: "funding.csv".to_string(),
            headers: vec!["PTA".to_string(), "PTA Name".to_string()],
            rows: vec![
                RawRow {
                    row_number: 2,
                    cells: HashMap::from([
                        ("PTA".to_string(), "1262004-000-DDLOT".to_string()),
                        ("PTA Name".to_string(), "Optics Lab".to_string()),
                    ]),
                },
                RawRow {
                    row_number: 3,
                    cells: HashMap::from([
                        ("PTA".to_string(), "1168003-1-DJYBX".to_string()),
                        ("PTA Name".to_string(), "nan".to_string()),
                    ]),
                },
            ],
        };

        let pairs = IdentifierTable::name_pairs_from_rows(&set);
        assert_eq!(
            pairs,
            vec![
                ("1262004-000-DDLOT".to_string(), "Optics Lab".to_string()),
                ("1168003-1-DJYBX".to_string(), "1168003-1-DJYBX".to_string()),
            ]
        );
    }
}
