// ⚙️ Configuration - TOML file + LAB_RECONCILE_* environment overrides
//
// Example:
//
//   [resolver]
//   institutional_domain = "stanford.edu"
//
//   [inputs]
//   rows = ["exports/members.csv", "exports/internal.csv"]
//   entities = "snapshots/users.json"
//   identifier_table = "snapshots/pta_lookup.json"
//
//   [output]
//   dir = "reports"
//
// Every section is optional; `ReconcileConfig::default()` is usable from code.

use crate::extractor::{IdentifierExtractor, DEFAULT_IDENTIFIER_PATTERN};
use crate::resolver::ResolverOptions;
use crate::similarity::DEFAULT_SIMILARITY_THRESHOLD;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

const ENV_PREFIX: &str = "LAB_RECONCILE_";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReconcileConfig {
    #[serde(default)]
    pub resolver: ResolverConfig,

    #[serde(default)]
    pub extraction: ExtractionConfig,

    #[serde(default)]
    pub inputs: InputsConfig,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolverConfig {
    #[serde(default)]
    pub institutional_domain: Option<String>,

    #[serde(default = "default_true")]
    pub derive_username_from_email: bool,

    /// Let tie-broken matches contribute associations
    #[serde(default = "default_true")]
    pub apply_ambiguous: bool,

    /// Report rows that repeat an earlier row
    #[serde(default = "default_true")]
    pub detect_duplicates: bool,

    /// Attach similar-name suggestions to unresolved rows
    #[serde(default = "default_true")]
    pub suggest_names: bool,

    #[serde(default = "default_suggestion_threshold")]
    pub suggestion_threshold: f64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            institutional_domain: None,
            derive_username_from_email: true,
            apply_ambiguous: true,
            detect_duplicates: true,
            suggest_names: true,
            suggestion_threshold: default_suggestion_threshold(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionConfig {
    #[serde(default = "default_identifier_pattern")]
    pub identifier_pattern: String,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            identifier_pattern: default_identifier_pattern(),
        }
    }
}

/// Input files. The identifier table comes from exactly one of:
/// `identifier_table`, `pta_names` + `project_names`, or `projects`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputsConfig {
    #[serde(default)]
    pub rows: Vec<String>,

    #[serde(default)]
    pub entities: Option<String>,

    /// Direct `{"PTA": project_id}` JSON
    #[serde(default)]
    pub identifier_table: Option<String>,

    /// Funding sheet with PTA and PTA name columns
    #[serde(default)]
    pub pta_names: Option<String>,

    /// `{"project name": project_id}` JSON
    #[serde(default)]
    pub project_names: Option<String>,

    /// Project snapshot carrying `application_identifier`
    #[serde(default)]
    pub projects: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_suggestion_threshold() -> f64 {
    DEFAULT_SIMILARITY_THRESHOLD
}
fn default_identifier_pattern() -> String {
    DEFAULT_IDENTIFIER_PATTERN.to_string()
}
fn default_output_dir() -> String {
    ".".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}

/// Where the identifier table comes from, after validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableSource<'a> {
    Direct(&'a str),
    Chained { pta_names: &'a str, project_names: &'a str },
    Projects(&'a str),
}

// ============================================================================
// LOADING
// ============================================================================

impl ReconcileConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse_toml(&contents)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    pub fn parse_toml(contents: &str) -> Result<Self> {
        let config: ReconcileConfig = toml::from_str(contents).context("Failed to parse TOML")?;
        Ok(config)
    }

    /// Override fields from `LAB_RECONCILE_*` variables.
    /// `LAB_RECONCILE_ROWS` is a comma-separated list.
    pub fn apply_env_overrides(&mut self) {
        let var = |name: &str| std::env::var(format!("{}{}", ENV_PREFIX, name)).ok();

        if let Some(v) = var("INSTITUTIONAL_DOMAIN") {
            self.resolver.institutional_domain = Some(v);
        }
        if let Some(v) = var("DERIVE_USERNAME_FROM_EMAIL") {
            if let Ok(b) = v.parse::<bool>() {
                self.resolver.derive_username_from_email = b;
            }
        }
        if let Some(v) = var("APPLY_AMBIGUOUS") {
            if let Ok(b) = v.parse::<bool>() {
                self.resolver.apply_ambiguous = b;
            }
        }
        if let Some(v) = var("DETECT_DUPLICATES") {
            if let Ok(b) = v.parse::<bool>() {
                self.resolver.detect_duplicates = b;
            }
        }
        if let Some(v) = var("SUGGEST_NAMES") {
            if let Ok(b) = v.parse::<bool>() {
                self.resolver.suggest_names = b;
            }
        }
        if let Some(v) = var("SUGGESTION_THRESHOLD") {
            if let Ok(t) = v.parse::<f64>() {
                self.resolver.suggestion_threshold = t;
            }
        }
        if let Some(v) = var("IDENTIFIER_PATTERN") {
            self.extraction.identifier_pattern = v;
        }
        if let Some(v) = var("ROWS") {
            self.inputs.rows = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(v) = var("ENTITIES") {
            self.inputs.entities = Some(v);
        }
        if let Some(v) = var("IDENTIFIER_TABLE") {
            self.inputs.identifier_table = Some(v);
        }
        if let Some(v) = var("PTA_NAMES") {
            self.inputs.pta_names = Some(v);
        }
        if let Some(v) = var("PROJECT_NAMES") {
            self.inputs.project_names = Some(v);
        }
        if let Some(v) = var("PROJECTS") {
            self.inputs.projects = Some(v);
        }
        if let Some(v) = var("OUTPUT_DIR") {
            self.output.dir = v;
        }
        if let Some(v) = var("LOG_LEVEL") {
            self.logging.level = v;
        }
    }

    /// Check the config describes a runnable batch.
    pub fn validate(&self) -> Result<()> {
        IdentifierExtractor::new(&self.extraction.identifier_pattern)
            .context("extraction.identifier_pattern does not compile")?;

        if !(0.0..=1.0).contains(&self.resolver.suggestion_threshold) {
            anyhow::bail!("resolver.suggestion_threshold must be between 0 and 1");
        }
        if self.inputs.rows.is_empty() {
            anyhow::bail!("inputs.rows must name at least one rows file");
        }
        if self.inputs.entities.is_none() {
            anyhow::bail!("inputs.entities must name the entity snapshot");
        }
        self.table_source()?;

        if self.output.dir.trim().is_empty() {
            anyhow::bail!("output.dir must not be empty");
        }
        Ok(())
    }

    pub fn table_source(&self) -> Result<TableSource<'_>> {
        let inputs = &self.inputs;
        let chained = inputs.pta_names.is_some() || inputs.project_names.is_some();
        let configured = [inputs.identifier_table.is_some(), chained, inputs.projects.is_some()]
            .iter()
            .filter(|set| **set)
            .count();

        if configured != 1 {
            anyhow::bail!(
                "exactly one of inputs.identifier_table, inputs.pta_names + inputs.project_names, or inputs.projects must be set"
            );
        }

        if let Some(path) = &inputs.identifier_table {
            return Ok(TableSource::Direct(path));
        }
        if let Some(path) = &inputs.projects {
            return Ok(TableSource::Projects(path));
        }
        match (&inputs.pta_names, &inputs.project_names) {
            (Some(pta_names), Some(project_names)) => Ok(TableSource::Chained {
                pta_names,
                project_names,
            }),
            _ => anyhow::bail!("inputs.pta_names and inputs.project_names must be set together"),
        }
    }

    pub fn resolver_options(&self) -> ResolverOptions {
        ResolverOptions {
            institutional_domain: self
                .resolver
                .institutional_domain
                .as_deref()
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(|d| d.trim_start_matches('@').to_lowercase()),
            derive_username_from_email: self.resolver.derive_username_from_email,
        }
    }

    pub fn suggestion_threshold(&self) -> Option<f64> {
        self.resolver
            .suggest_names
            .then_some(self.resolver.suggestion_threshold)
    }

    pub fn extractor(&self) -> Result<IdentifierExtractor> {
        IdentifierExtractor::new(&self.extraction.identifier_pattern)
    }
}

// ============================================================================
// TESTS
// ============================================================================
