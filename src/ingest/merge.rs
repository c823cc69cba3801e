//! Merging per-file records into one table

use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::discover::DiscoveredFile;
use super::table::{Record, RecordTable};
use super::IngestError;

const MAX_REPORTED_ERRORS: usize = 100;

/// Statistics from a merge
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeStats {
    /// Number of files that contributed records
    pub files_merged: usize,
    /// Number of files skipped because they could not be read or parsed
    pub files_failed: usize,
    /// Number of records merged
    pub records_merged: usize,
    /// Total bytes read
    pub bytes_processed: u64,
    /// Number of errors encountered
    pub errors_count: usize,
    /// List of errors (limited to the first 100)
    pub errors: Vec<String>,
    #[serde(skip)]
    pub duration: Duration,
}

impl MergeStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, error: String) {
        tracing::warn!("{}", error);
        self.errors_count += 1;
        if self.errors.len() < MAX_REPORTED_ERRORS {
            self.errors.push(error);
        }
    }
}

/// Read a file holding exactly one JSON object
pub fn read_json_document(path: &Path) -> Result<Record, IngestError> {
    let content = fs::read_to_string(path)?;

    let value: Value = serde_json::from_str(&content).map_err(|e| IngestError::JsonParse {
        path: path.to_path_buf(),
        record: 0,
        error: e.to_string(),
    })?;

    match value {
        Value::Object(map) => Ok(map),
        _ => Err(IngestError::NotAnObject {
            path: path.to_path_buf(),
            record: 0,
        }),
    }
}

/// Read a newline-delimited JSON file
///
/// The outer result fails only when the file cannot be read; each non-empty
/// line yields its own parse result so one bad line does not discard the
/// rest of the file.
pub fn read_json_lines(path: &Path) -> Result<Vec<Result<Record, IngestError>>, IngestError> {
    let reader = BufReader::new(File::open(path)?);
    let mut records = Vec::new();

    for (index, line) in reader.split(b'\n').enumerate() {
        let line = line?;
        let trimmed = line.trim_ascii();
        if trimmed.is_empty() {
            continue;
        }

        let parsed = match serde_json::from_slice::<Value>(trimmed) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(IngestError::NotAnObject {
                path: path.to_path_buf(),
                record: index,
            }),
            Err(e) => Err(IngestError::JsonParse {
                path: path.to_path_buf(),
                record: index,
                error: e.to_string(),
            }),
        };
        records.push(parsed);
    }

    Ok(records)
}

/// Merge one-document-per-file inputs, preserving file order
pub fn merge_documents(files: &[DiscoveredFile]) -> (RecordTable, MergeStats) {
    let start = Instant::now();
    let mut stats = MergeStats::new();
    let mut table = RecordTable::new();

    for file in files {
        match read_json_document(&file.path) {
            Ok(record) => {
                table.push(record);
                stats.files_merged += 1;
                stats.records_merged += 1;
                stats.bytes_processed += file.size;
            }
            Err(e) => {
                stats.files_failed += 1;
                stats.add_error(format!("Skipping {}: {}", file.path.display(), e));
            }
        }
    }

    stats.duration = start.elapsed();
    (table, stats)
}

/// Merge line-delimited inputs, preserving file order then line order
pub fn merge_lines(files: &[DiscoveredFile]) -> (RecordTable, MergeStats) {
    let start = Instant::now();
    let mut stats = MergeStats::new();
    let mut table = RecordTable::new();

    for file in files {
        let lines = match read_json_lines(&file.path) {
            Ok(lines) => lines,
            Err(e) => {
                stats.files_failed += 1;
                stats.add_error(format!("Skipping {}: {}", file.path.display(), e));
                continue;
            }
        };

        let mut contributed = 0;
        let mut rejected = 0;
        for line in lines {
            match line {
                Ok(record) => {
                    table.push(record);
                    contributed += 1;
                }
                Err(e) => {
                    rejected += 1;
                    stats.add_error(format!("Skipping line: {}", e));
                }
            }
        }

        stats.bytes_processed += file.size;
        stats.records_merged += contributed;
        if contributed > 0 {
            stats.files_merged += 1;
        } else if rejected > 0 {
            stats.files_failed += 1;
        }
    }

    stats.duration = start.elapsed();
    (table, stats)
}
