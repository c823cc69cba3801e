//! Input discovery and record merging
//!
//! Song metadata arrives as one JSON document per file and listening logs as
//! one JSON document per line. Both are collected from a directory tree and
//! merged into a [`RecordTable`] that the projector reads from.
//!
//! ## Example
//!
//! ```rust,ignore
//! use songplay_etl::ingest::{discover_files, merge_lines};
//!
//! let files = discover_files(Path::new("data/log_data"), "json")?;
//! let (events, stats) = merge_lines(&files);
//! println!("{} events from {} files", events.len(), stats.files_merged);
//! ```

mod discover;
mod merge;
mod table;

use std::path::PathBuf;

pub use discover::{DATA_FILE_EXTENSION, DiscoveredFile, discover_files};
pub use merge::{MergeStats, merge_documents, merge_lines, read_json_document, read_json_lines};
pub use table::{Record, RecordTable};

/// Error type for discovery and parsing of input files
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// Glob pattern could not be built from the input root
    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),

    /// File could not be read
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A document or line is not valid JSON
    #[error("Failed to parse {path} (record {record}): {error}")]
    JsonParse {
        path: PathBuf,
        record: usize,
        error: String,
    },

    /// A document or line is valid JSON but not an object
    #[error("Expected a JSON object in {path} (record {record})")]
    NotAnObject { path: PathBuf, record: usize },
}
