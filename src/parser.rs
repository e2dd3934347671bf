// 🏗️ Row Readers - CSV / JSON exports into header-keyed rows
//
// Spreadsheets are exported to CSV (or dumped to JSON) before a run; this
// module only turns those exports into rows of `header → cell`. Deciding
// what each header means is the column map's job.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

// ============================================================================
// CORE TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceFormat {
    Csv,
    Json,
}

impl SourceFormat {
    pub fn name(&self) -> &str {
        match self {
            SourceFormat::Csv => "CSV",
            SourceFormat::Json => "JSON",
        }
    }
}

/// One data row. `row_number` counts like a spreadsheet: the header is
/// row 1, so the first data row is row 2.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRow {
    pub row_number: usize,
    pub cells: HashMap<String, String>,
}

impl RawRow {
    pub fn get(&self, header: &str) -> Option<&str> {
        self.cells.get(header).map(String::as_str)
    }
}

/// All rows of one source, with headers in file order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowSet {
    pub source_name: String,
    pub headers: Vec<String>,
    pub rows: Vec<RawRow>,
}

impl RowSet {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

// ============================================================================
// READER TRAIT
// ============================================================================

pub trait RowReader: Send + Sync {
    /// Read every row of the file at `path`.
    fn read(&self, path: &Path) -> Result<RowSet>;

    fn format(&self) -> SourceFormat;
}

/// Detect the export format from the file extension.
pub fn detect_format(path: &Path) -> Result<SourceFormat> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    match extension.as_str() {
        "csv" | "tsv" | "txt" => Ok(SourceFormat::Csv),
        "json" => Ok(SourceFormat::Json),
        _ => Err(anyhow::anyhow!(
            "Could not detect source format from file name: {}",
            path.display()
        )),
    }
}

pub fn get_reader(format: SourceFormat) -> Box<dyn RowReader> {
    match format {
        SourceFormat::Csv => Box::new(CsvRowReader::new()),
        SourceFormat::Json => Box::new(JsonRowReader::new()),
    }
}

/// Detect the format and read the file.
pub fn read_rows(path: &Path) -> Result<RowSet> {
    let format = detect_format(path)?;
    get_reader(format).read(path)
}

fn source_name(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown")
        .to_string()
}

// ============================================================================
// CSV
// ============================================================================

pub struct CsvRowReader {
    delimiter: u8,
}

impl CsvRowReader {
    pub fn new() -> Self {
        CsvRowReader { delimiter: b',' }
    }

    pub fn with_delimiter(delimiter: u8) -> Self {
        CsvRowReader { delimiter }
    }
}

impl Default for CsvRowReader {
    fn default() -> Self {
        Self::new()
    }
}

impl RowReader for CsvRowReader {
    fn read(&self, path: &Path) -> Result<RowSet> {
        use csv::ReaderBuilder;

        let file = File::open(path)
            .with_context(|| format!("Failed to open file: {}", path.display()))?;

        let delimiter = match path.extension().and_then(|e| e.to_str()) {
            Some("tsv") => b'\t',
            _ => self.delimiter,
        };

        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .delimiter(delimiter)
            .from_reader(file);

        let source_name = source_name(path);

        let headers: Vec<String> = reader
            .headers()
            .with_context(|| format!("Failed to read CSV headers in {}", source_name))?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
            .collect();

        let mut rows = Vec::new();
        for (line_num, result) in reader.records().enumerate() {
            let record = result.with_context(|| {
                format!("Failed to parse CSV line {} in {}", line_num + 2, source_name)
            })?;

            let cells = headers
                .iter()
                .zip(record.iter())
                .filter(|(header, _)| !header.is_empty())
                .map(|(header, value)| (header.clone(), value.to_string()))
                .collect();

            rows.push(RawRow {
                row_number: line_num + 2, // +2: 1-indexed + header row
                cells,
            });
        }

        Ok(RowSet {
            source_name,
            headers,
            rows,
        })
    }

    fn format(&self) -> SourceFormat {
        SourceFormat::Csv
    }
}

// ============================================================================
// JSON
// ============================================================================

/// Reads a JSON array of flat objects (or a `{"results": [...]}` page).
pub struct JsonRowReader;

impl JsonRowReader {
    pub fn new() -> Self {
        JsonRowReader
    }
}

impl Default for JsonRowReader {
    fn default() -> Self {
        Self::new()
    }
}

impl RowReader for JsonRowReader {
    fn read(&self, path: &Path) -> Result<RowSet> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open file: {}", path.display()))?;
        let value: serde_json::Value = serde_json::from_reader(std::io::BufReader::new(file))
            .with_context(|| format!("Failed to parse JSON in {}", path.display()))?;

        let items = match value {
            serde_json::Value::Array(items) => items,
            serde_json::Value::Object(mut page) => match page.remove("results") {
                Some(serde_json::Value::Array(items)) => items,
                _ => anyhow::bail!("Expected an array or a results page in {}", path.display()),
            },
            _ => anyhow::bail!("Expected an array or a results page in {}", path.display()),
        };

        let mut headers: Vec<String> = Vec::new();
        let mut rows = Vec::with_capacity(items.len());

        for (position, item) in items.into_iter().enumerate() {
            let serde_json::Value::Object(object) = item else {
                anyhow::bail!("Row {} in {} is not an object", position + 1, path.display());
            };

            let mut cells = HashMap::new();
            for (key, value) in object {
                let cell = match value {
                    serde_json::Value::Null => continue,
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                };
                if !headers.contains(&key) {
                    headers.push(key.clone());
                }
                cells.insert(key, cell);
            }

            rows.push(RawRow {
                row_number: position + 2,
                cells,
            });
        }

        Ok(RowSet {
            source_name: source_name(path),
            headers,
            rows,
        })
    }

    fn format(&self) -> SourceFormat {
        SourceFormat::Json
    }
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
    fn test_detect_format() {
        assert_eq!(detect_format(Path::new("members.csv")).unwrap(), SourceFormat::Csv);
        assert_eq!(detect_format(Path::new("users.JSON")).unwrap(), SourceFormat::Json);
        assert!(detect_format(Path::new("members.xlsx")).is_err());
    }

    #[test]
    fn test_read_csv_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "members.csv",
            "\u{feff}Email, First Name ,Last Name,PTA\n\
             alice@x.edu,Alice,Smith,1262004-000-DDLOT\n\
             ,Bob,Jones,\n",
        );

        let set = read_rows(&path).unwrap();

        assert_eq!(set.source_name, "members.csv");
        assert_eq!(set.headers, vec!["Email", "First Name", "Last Name", "PTA"]);
        assert_eq!(set.len(), 2);
        assert_eq!(set.rows[0].row_number, 2);
        assert_eq!(set.rows[0].get("First Name"), Some("Alice"));
        assert_eq!(set.rows[1].row_number, 3);
        assert_eq!(set.rows[1].get("Email"), Some(""));
    }

    #[test]
    fn test_read_short_csv_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "short.csv", "Email,PTA\nalice@x.edu\n");

        let set = read_rows(&path).unwrap();
        assert_eq!(set.rows[0].get("Email"), Some("alice@x.edu"));
        assert_eq!(set.rows[0].get("PTA"), None);
    }

    #[test]
    fn test_read_json_page() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "rows.json",
            r#"{"results": [{"email": "alice@x.edu", "id": 7, "note": null}]}"#,
        );

        let set = read_rows(&path).unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.rows[0].get("id"), Some("7"));
        assert_eq!(set.rows[0].get("note"), None);
    }

    #[test]
    fn test_missing_file_has_context() {
        let err = read_rows(Path::new("/nonexistent/members.csv")).unwrap_err();
        assert!(err.to_string().contains("Failed to open file"));
    }
}
