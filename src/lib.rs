// Lab Reconcile - Core Library
// Spreadsheet rows → canonical entities → desired association state

pub mod normalize;      // Key Normalizer
pub mod record;         // Source records + provenance
pub mod extractor;      // Identifier Extractor
pub mod entities;       // Canonical entities + projects
pub mod index;          // Entity Index
pub mod resolver;       // Resolver: email → username → name
pub mod merger;         // Association Merger
pub mod lookup;         // Identifier Table: PTA → project
pub mod parser;         // CSV / JSON row readers
pub mod columns;        // Header sniffing
pub mod snapshot;       // Target-system JSON dumps
pub mod deduplication;  // Duplicate rows, shared PTAs, overlaps
pub mod similarity;     // Approximate name suggestions
pub mod reconciliation; // Engine + report
pub mod config;         // TOML + env configuration

// Re-export commonly used types
pub use normalize::{
    NameKey, normalize_text, normalize_email, normalize_username, normalize_name_pair,
};
pub use record::{SourceRecord, SourceRef, OriginalFields, input_digest};
pub use extractor::{
    IdentifierExtractor, ExtractedIdentifier, IdentifierField,
    extract_identifiers, extract_emails, DEFAULT_IDENTIFIER_PATTERN,
};
pub use entities::{CanonicalEntity, EntityId, ProjectRecord};
pub use index::{EntityIndex, Lookup, KeyKind, KeyCollision};
pub use resolver::{
    Resolver, ResolverOptions, ResolutionResult, MatchMethod, RecordKeys, resolve,
};
pub use merger::{merge, MergeOutcome, AssociationAccumulator};
pub use lookup::{
    IdentifierTable, IdentifierMapping, MissingMapping, MissingReason, TableConflict,
};
pub use parser::{
    RowReader, RowSet, RawRow, SourceFormat, CsvRowReader, JsonRowReader,
    detect_format, get_reader, read_rows,
};
pub use columns::ColumnMap;
pub use snapshot::{load_entities, load_projects, load_identifier_table, load_name_lookup};
pub use deduplication::{
    DeduplicationEngine, DuplicateMatch, MatchStrategy,
    SharedIdentifier, ProjectSummary, find_shared_identifiers, find_overlaps,
};
pub use similarity::{
    name_similarity, find_best_match, suggest_entities, SimilarName, EntitySuggestion,
    DEFAULT_SIMILARITY_THRESHOLD,
};
pub use reconciliation::{
    ReconciliationEngine, ReconciliationReport, ReconciliationRun, ReconciliationCounts,
    RecordDetail, RecordStatus, UnmappedIdentifiers, summarize,
};
pub use config::{ReconcileConfig, TableSource};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
