use lab_reconcile::{
    load_entities, load_identifier_table, read_rows, resolve, CanonicalEntity, ColumnMap,
    EntityIndex, IdentifierExtractor, IdentifierTable, MatchMethod, ReconciliationEngine,
    SourceRecord,
};
use std::fs;

fn alice_record() -> SourceRecord {
    SourceRecord::new("members.csv", 2)
        .with_email("alice@x.edu")
        .with_name("Alice", "Smith")
}

#[test]
fn test_exact_email_match() {
    let index = EntityIndex::build(vec![CanonicalEntity::new(7).with_email("alice@x.edu")]);

    let result = resolve(&alice_record(), &index);

    assert_eq!(result.entity_id(), Some(7));
    assert_eq!(result.method, MatchMethod::ExactEmail);
    assert!(!result.ambiguous);
}

#[test]
fn test_name_fallback_match() {
    let index = EntityIndex::build(vec![CanonicalEntity::new(7).with_name("alice", "smith")]);
    let mut record = alice_record();
    record.email = None;

    let result = resolve(&record, &index);

    assert_eq!(result.entity_id(), Some(7));
    assert_eq!(result.method, MatchMethod::NameFallback);
    assert!(!result.ambiguous);
}

#[test]
fn test_ambiguous_name_match() {
    let index = EntityIndex::build(vec![
        CanonicalEntity::new(12).with_name("Bob", "Jones"),
        CanonicalEntity::new(5).with_name("bob", "JONES"),
    ]);
    let record = SourceRecord::new("members.csv", 3).with_name("Bob", "Jones");

    let result = resolve(&record, &index);

    assert!(result.ambiguous);
    assert_eq!(result.ambiguity_count, 2);
    assert_eq!(result.entity_id(), Some(5));
    assert_eq!(result.candidate_ids, vec![5, 12]);
}

#[test]
fn test_unknown_identifier_changes_nothing() {
    let blob = "1262004-000-DDLOT";
    assert_eq!(
        IdentifierExtractor::default().extract(blob),
        vec!["1262004-000-DDLOT".to_string()]
    );

    let index = EntityIndex::build(vec![CanonicalEntity::new(7)
        .with_email("alice@x.edu")
        .with_associations([100])]);
    let table = IdentifierTable::direct([("1168003-1-DJYBX", 200)]);
    let record = alice_record().with_identifier_blob(blob);

    let run = ReconciliationEngine::new().reconcile(&[record], &index, &table);

    assert_eq!(run.outcomes.len(), 1);
    assert_eq!(run.outcomes[0].entity_id, 7);
    assert!(run.outcomes[0].added.is_empty());
    assert!(!run.outcomes[0].changed);
    assert_eq!(run.report.counts.resolved_unchanged, 1);
    assert_eq!(run.report.unmapped.len(), 1);
}

#[test]
fn test_files_to_report() {
    let dir = tempfile::tempdir().unwrap();
    let rows = dir.path().join("members.csv");
    let users = dir.path().join("users.json");
    let ptas = dir.path().join("pta_lookup.json");

    fs::write(
        &rows,
        "Email,SUNet ID,First Name,Last Name,PTA,Other PTAs\n\
         alice@x.edu,,Alice,Smith,1262004-000-DDLOT,\n\
         ,bob,Bob,Jones,,\"1168003-1-DJYBX\n1277206-10-UBILB\"\n\
         ,,Carol,King,1262004-000-DDLOT,\n",
    )
    .unwrap();
    fs::write(
        &users,
        r#"{"count": 2, "results": [
            {"id": 7, "email": "alice@x.edu", "projects": [100]},
            {"id": 8, "email": "bob@x.edu", "username": "bob", "projects": []}
        ]}"#,
    )
    .unwrap();
    fs::write(
        &ptas,
        r#"{"1262004-000-DDLOT": 100, "1168003-1-DJYBX": 200, "1277206-10-UBILB": 300}"#,
    )
    .unwrap();

    let set = read_rows(&rows).unwrap();
    let (map, records) = ColumnMap::records_from(&set);
    assert!(map.is_usable());
    assert_eq!(records.len(), 3);

    let index = EntityIndex::build(load_entities(&users).unwrap());
    let table = load_identifier_table(&ptas).unwrap();

    let run = ReconciliationEngine::new().reconcile(&records, &index, &table);
    let report = &run.report;

    // Alice already has 100
    let alice = run.outcomes.iter().find(|o| o.entity_id == 7).unwrap();
    assert!(!alice.changed);

    // Bob resolves by username and gains both blob PTAs
    let bob = run.outcomes.iter().find(|o| o.entity_id == 8).unwrap();
    assert_eq!(bob.resulting_list(), vec![200, 300]);
    assert!(bob.changed);

    assert_eq!(report.counts.resolved_unchanged, 1);
    assert_eq!(report.counts.resolved_changed, 1);
    assert_eq!(report.counts.unresolved, 1);
    assert_eq!(
        report.unresolved[0].name_key.as_ref().map(|key| key.to_string()).as_deref(),
        Some("carol king")
    );
    assert_eq!(report.unresolved[0].original.first_name.as_deref(), Some("Carol"));
    assert_eq!(report.unresolved[0].source.row_number, 4);

    let json = dir.path().join("report.json");
    report.write_json(&json).unwrap();
    let written: serde_json::Value = serde_json::from_str(&fs::read_to_string(&json).unwrap()).unwrap();
    assert_eq!(written["counts"]["associations_added"], 2);
}

#[test]
fn test_file_without_key_columns_reports_every_row_unresolved() {
    let dir = tempfile::tempdir().unwrap();
    let rows = dir.path().join("budget.csv");
    fs::write(&rows, "Department,PTA\nChem,1262004-000-DDLOT\nBio,1168003-1-DJYBX\n").unwrap();

    let set = read_rows(&rows).unwrap();
    let (map, records) = ColumnMap::records_from(&set);
    assert!(!map.is_usable());
    assert_eq!(records.len(), 2);

    let index = EntityIndex::build(vec![CanonicalEntity::new(7).with_email("alice@x.edu")]);
    let run = ReconciliationEngine::new().reconcile(&records, &index, &IdentifierTable::new());

    assert_eq!(run.report.counts.unresolved, 2);
    assert_eq!(
        run.report
            .unresolved
            .iter()
            .map(|d| d.source.row_number)
            .collect::<Vec<_>>(),
        vec![2, 3]
    );
    assert!(run.outcomes.is_empty());
}

#[test]
fn test_padded_name_resolves_against_snapshot() {
    let index = EntityIndex::build(vec![CanonicalEntity::new(7).with_name("Mary Ann", "Smith")]);
    let record = SourceRecord::new("members.csv", 2).with_name("Mary  Ann", " Smith");

    let result = resolve(&record, &index);

    assert_eq!(result.entity_id(), Some(7));
    assert_eq!(result.method, MatchMethod::NameFallback);
}
