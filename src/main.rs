use anyhow::{Context, Result};
use std::env;
use std::path::Path;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lab_reconcile::{
    find_shared_identifiers, load_entities, load_identifier_table, load_name_lookup,
    load_projects, read_rows, ColumnMap, EntityIndex, IdentifierTable,
    ReconcileConfig, ReconciliationEngine, SourceRecord, TableSource,
};

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    let Some(config_path) = args.get(1) else {
        eprintln!("Usage: lab-reconcile <config.toml>");
        eprintln!("   Reads the rows, entity snapshot and identifier table named in the config");
        eprintln!("   and writes reconciliation_<timestamp>.json / .csv to the output dir.");
        std::process::exit(2);
    };

    let mut config = ReconcileConfig::from_file(Path::new(config_path))?;
    config.apply_env_overrides();
    config.validate()?;

    // RUST_LOG wins over the configured level
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    run(&config)
}

fn run(config: &ReconcileConfig) -> Result<()> {
    println!("⚖️  Lab Reconcile v{}", lab_reconcile::VERSION);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    // 1. Rows
    println!("\n📂 Loading rows...");
    let records = load_records(&config.inputs.rows)?;
    println!("✓ Loaded {} records", records.len());

    // 2. Snapshot
    println!("\n📸 Loading entity snapshot...");
    let entities_path = config
        .inputs
        .entities
        .as_deref()
        .context("inputs.entities is not set")?;
    let index = EntityIndex::build(load_entities(Path::new(entities_path))?);
    println!("✓ Indexed {} entities", index.len());

    // 3. Identifier table
    println!("\n🔗 Loading identifier table...");
    let table = load_table(config)?;
    println!(
        "✓ {} identifiers ({} conflicts)",
        table.len(),
        table.conflicts().len()
    );

    // 4. Reconcile
    println!("\n🔍 Reconciling...");
    let engine = ReconciliationEngine::from_config(config)?;
    let run = engine.reconcile(&records, &index, &table);
    let report = &run.report;

    for duplicate in &report.duplicates {
        warn!(first = %duplicate.first, second = %duplicate.second, reason = %duplicate.reason, "Duplicate row");
    }

    // 5. Export
    let output_dir = Path::new(&config.output.dir);
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create output dir: {}", output_dir.display()))?;

    let stamp = report.generated_at.format("%Y%m%d_%H%M%S");
    let json_path = output_dir.join(format!("reconciliation_{}.json", stamp));
    let csv_path = output_dir.join(format!("reconciliation_{}.csv", stamp));
    let changes_path = output_dir.join(format!("reconciliation_{}_changes.csv", stamp));

    report.write_json(&json_path)?;
    report.write_csv(&csv_path)?;
    report.write_changes_csv(&changes_path)?;
    info!(run_id = %report.run_id, json = %json_path.display(), "Report written");

    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("{}", report.summary());
    println!("  duplicate rows:      {}", report.counts.duplicate_rows);
    println!("  unmapped identifiers: {}", report.unmapped.len());
    println!("  name collisions:     {}", report.collisions.len());
    println!("\n📄 {}", json_path.display());
    println!("📄 {}", csv_path.display());
    println!("📄 {}", changes_path.display());

    if report.needs_review() {
        println!(
            "\n⚠️  {} ambiguous and {} unresolved rows need review",
            report.counts.ambiguous, report.counts.unresolved
        );
    } else {
        println!("\n✅ Every row resolved to a single entity");
    }

    Ok(())
}

fn load_records(paths: &[String]) -> Result<Vec<SourceRecord>> {
    let mut records = Vec::new();

    for path in paths {
        let set = read_rows(Path::new(path))?;
        let (map, mut rows) = ColumnMap::records_from(&set);

        // Rows still go through, so each one is reported as unresolved
        if !map.is_usable() {
            warn!(source = %set.source_name, headers = ?set.headers, "No email, username or name columns; rows cannot resolve");
        }
        if !map.has_identifiers() {
            warn!(source = %set.source_name, "No PTA columns; rows can resolve but add nothing");
        }

        info!(source = %set.source_name, rows = rows.len(), columns = ?map, "Rows loaded");
        records.append(&mut rows);
    }

    Ok(records)
}

fn load_table(config: &ReconcileConfig) -> Result<IdentifierTable> {
    match config.table_source()? {
        TableSource::Direct(path) => load_identifier_table(Path::new(path)),
        TableSource::Chained {
            pta_names,
            project_names,
        } => {
            let set = read_rows(Path::new(pta_names))?;
            let pairs = IdentifierTable::name_pairs_from_rows(&set);
            let lookup = load_name_lookup(Path::new(project_names))?;
            Ok(IdentifierTable::chained(pairs, lookup))
        }
        TableSource::Projects(path) => {
            let projects = load_projects(Path::new(path))?;
            for shared in find_shared_identifiers(&projects) {
                warn!(
                    identifier = %shared.identifier,
                    projects = shared.projects.len(),
                    "PTA shared by several projects"
                );
            }
            Ok(IdentifierTable::from_projects(&projects))
        }
    }
}
