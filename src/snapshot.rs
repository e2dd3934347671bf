// 📸 Snapshot Loaders - JSON dumps of the target system
//
// The target system's API pages its listings as `{"count": N, "results": [...]}`.
// Dumps are saved either as that page or as a bare array; both load the same.

use crate::entities::{CanonicalEntity, EntityId, ProjectRecord};
use crate::lookup::IdentifierTable;
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::info;

#[derive(Deserialize)]
#[serde(untagged)]
enum Listing<T> {
    Page { results: Vec<T> },
    Items(Vec<T>),
}

impl<T> Listing<T> {
    fn into_items(self) -> Vec<T> {
        match self {
            Listing::Page { results } => results,
            Listing::Items(items) => items,
        }
    }
}

fn read_json<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open {} file: {}", what, path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse {} JSON in {}", what, path.display()))
}

/// Load canonical entities (users) from a listing dump.
pub fn load_entities(path: &Path) -> Result<Vec<CanonicalEntity>> {
    let entities = read_json::<Listing<CanonicalEntity>>(path, "entity snapshot")?.into_items();
    info!(count = entities.len(), path = %path.display(), "Loaded entity snapshot");
    Ok(entities)
}

/// Load projects from a listing dump.
pub fn load_projects(path: &Path) -> Result<Vec<ProjectRecord>> {
    let projects = read_json::<Listing<ProjectRecord>>(path, "project snapshot")?.into_items();
    info!(count = projects.len(), path = %path.display(), "Loaded project snapshot");
    Ok(projects)
}

/// Load a direct `{"PTA": project_id}` table.
pub fn load_identifier_table(path: &Path) -> Result<IdentifierTable> {
    let pairs: HashMap<String, EntityId> = read_json(path, "identifier table")?;

    // Sorted so conflicts between case variants resolve the same way every run
    let mut pairs: Vec<(String, EntityId)> = pairs.into_iter().collect();
    pairs.sort();

    let table = IdentifierTable::direct(pairs);
    info!(entries = table.len(), path = %path.display(), "Loaded identifier table");
    Ok(table)
}

/// Load a `{"project name": project_id}` lookup. Names are trimmed.
pub fn load_name_lookup(path: &Path) -> Result<HashMap<String, EntityId>> {
    let lookup: HashMap<String, EntityId> = read_json(path, "project name lookup")?;
    Ok(lookup
        .into_iter()
        .map(|(name, id)| (name.trim().to_string(), id))
        .collect())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &tempfile::TempDir, name: &str, contents: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut file = File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_load_entities_page_and_array() {
        let dir = tempfile::tempdir().unwrap();
        let page = write_file(
            &dir,
            "users_page.json",
            r#"{"count": 1, "next": null, "results": [
                {"id": 7, "email": "alice@x.edu", "username": "alice",
                 "first_name": "Alice", "last_name": "Smith", "projects": [100, 101]}
            ]}"#,
        );
        let array = write_file(
            &dir,
            "users.json",
            r#"[{"id": 8, "email": null, "projects": null}, {"id": 9}]"#,
        );

        let from_page = load_entities(&page).unwrap();
        assert_eq!(from_page.len(), 1);
        assert_eq!(from_page[0].id, 7);
        assert!(from_page[0].associations.contains(&101));

        let from_array = load_entities(&array).unwrap();
        assert_eq!(from_array.len(), 2);
        assert!(from_array[0].email.is_none());
        assert!(from_array[1].associations.is_empty());
    }

    #[test]
    fn test_load_projects() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "projects.json",
            r#"[{"id": 100, "name": "Optics", "application_identifier": "1262004-000-DDLOT", "active": true}]"#,
        );

        let projects = load_projects(&path).unwrap();
        assert_eq!(projects[0].identifier().as_deref(), Some("1262004-000-DDLOT"));
    }

    #[test]
    fn test_load_identifier_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "pta_lookup.json",
            r#"{"1262004-000-DDLOT": 100, "1168003-1-DJYBX": 200}"#,
        );

        let table = load_identifier_table(&path).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.map_identifier("1262004-000-ddlot"), Ok(100));
    }

    #[test]
    fn test_load_name_lookup_trims() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "names.json", r#"{" Optics Lab ": 100}"#);

        let lookup = load_name_lookup(&path).unwrap();
        assert_eq!(lookup.get("Optics Lab"), Some(&100));
    }

    #[test]
    fn test_bad_json_has_context() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "broken.json", "{not json");

        let err = load_entities(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse entity snapshot JSON"));
    }
}
