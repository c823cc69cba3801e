//! Database backend abstraction for the star schema store
//!
//! This module provides a database abstraction layer that supports:
//! - DuckDB: Embedded database, file-based or in-memory
//! - PostgreSQL: The production warehouse
//!
//! Both backends load staged CSV tables through the same [`LoadPlan`]s, so
//! reconciliation semantics do not depend on the store.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[cfg(feature = "duckdb-backend")]
pub mod duckdb;

#[cfg(feature = "postgres-backend")]
pub mod postgres;

pub mod reconcile;
pub mod schema;

#[cfg(feature = "duckdb-backend")]
pub use self::duckdb::DuckDBBackend;

#[cfg(feature = "postgres-backend")]
pub use self::postgres::PostgresBackend;

pub use reconcile::{ConflictPolicy, JoinEnrichment, LoadPlan, StageColumn};
pub use schema::DatabaseSchema;

use crate::models::Entity;
use crate::staging::StagedTable;

/// Error type for database operations
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Loading one entity failed; its transaction was rolled back
    #[error("Loading {entity} failed: {message}")]
    LoadFailed { entity: Entity, message: String },

    /// Schema creation or removal failed
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Transaction failed
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// The connection was closed
    #[error("Database connection is closed")]
    Closed,

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(String),
}

/// Result type for database operations
pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// Query result row as a JSON value
pub type QueryRow = serde_json::Value;

/// Query result set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    /// Column names
    pub columns: Vec<String>,
    /// Rows of data
    pub rows: Vec<QueryRow>,
    /// Execution time in milliseconds
    pub execution_time_ms: u64,
}

impl QueryResult {
    pub fn new(columns: Vec<String>, rows: Vec<QueryRow>) -> Self {
        Self {
            columns,
            rows,
            execution_time_ms: 0,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new(), Vec::new())
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Integer value of `column` in the first row
    pub fn first_i64(&self, column: &str) -> Option<i64> {
        self.rows.first()?.get(column)?.as_i64()
    }
}

/// Rows moved by one entity load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadOutcome {
    pub entity: Entity,
    /// Rows bulk-loaded into the transient stage table
    pub rows_staged: u64,
    /// Rows inserted or updated in the target table, as reported by the store
    pub rows_affected: u64,
}

impl LoadOutcome {
    /// Outcome of a load that had nothing to do
    pub fn empty(entity: Entity) -> Self {
        Self {
            entity,
            rows_staged: 0,
            rows_affected: 0,
        }
    }
}

/// Keys of a song found by [`DatabaseBackend::find_song`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SongMatch {
    pub song_id: String,
    pub artist_id: String,
}

/// Row count of one persisted table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableCount {
    pub entity: Entity,
    pub rows: u64,
}

/// Database backend trait for schema management and staged loads
///
/// This trait defines the interface for database backends (DuckDB, PostgreSQL).
/// All operations are async; implementations serialize access to their
/// single connection.
#[async_trait(?Send)]
pub trait DatabaseBackend: Send + Sync {
    /// Create all tables and the songplay sequence if they don't exist
    async fn initialize(&self) -> DatabaseResult<()>;

    /// Drop all tables and the songplay sequence
    async fn drop_schema(&self) -> DatabaseResult<()>;

    /// Load a staged table under `plan`
    ///
    /// Runs in one transaction: create a transient stage table, bulk-load
    /// `staged` into it, reconcile into the target table, drop the stage.
    /// Any failure rolls everything back. An empty staged table returns
    /// [`LoadOutcome::empty`] without touching the store.
    async fn load(&self, plan: &LoadPlan, staged: &StagedTable) -> DatabaseResult<LoadOutcome>;

    /// Execute a SQL query and return results
    async fn execute_query(&self, sql: &str) -> DatabaseResult<QueryResult>;

    /// Find a song by exact title, artist name and duration
    async fn find_song(
        &self,
        title: &str,
        artist_name: &str,
        duration: f64,
    ) -> DatabaseResult<Option<SongMatch>>;

    /// Row counts of the five tables, in load order
    async fn table_counts(&self) -> DatabaseResult<Vec<TableCount>> {
        let mut counts = Vec::with_capacity(Entity::ALL.len());
        for entity in Entity::ALL {
            let result = self
                .execute_query(&DatabaseSchema::count_rows_sql(entity))
                .await?;
            let rows = result.first_i64("count").ok_or_else(|| {
                DatabaseError::QueryFailed(format!("No row count returned for {}", entity))
            })?;
            counts.push(TableCount {
                entity,
                rows: rows.max(0) as u64,
            });
        }
        Ok(counts)
    }

    /// Check if database is healthy and accessible
    async fn health_check(&self) -> DatabaseResult<bool>;

    /// Get the database backend type name ("duckdb" or "postgres")
    fn backend_type(&self) -> &'static str;

    /// Close the database connection; later calls fail with [`DatabaseError::Closed`]
    async fn close(&self) -> DatabaseResult<()>;
}

/// Output format for query results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// ASCII table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
    /// CSV format
    Csv,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            "csv" => Ok(OutputFormat::Csv),
            _ => Err(format!("Unknown output format: {}", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Csv => write!(f, "csv"),
        }
    }
}

/// Format query results for display
pub fn format_query_result(result: &QueryResult, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => {
            serde_json::to_string_pretty(&result.rows).unwrap_or_else(|_| "[]".to_string())
        }
        OutputFormat::Csv => format_as_csv(result),
        OutputFormat::Table => format_as_table(result),
    }
}

fn display_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn cells<'a>(result: &'a QueryResult, row: &'a QueryRow) -> impl Iterator<Item = String> + 'a {
    result
        .columns
        .iter()
        .map(move |col| display_value(row.get(col).unwrap_or(&serde_json::Value::Null)))
}

fn format_as_csv(result: &QueryResult) -> String {
    let mut writer = csv::Writer::from_writer(Vec::new());
    let mut write = || -> csv::Result<()> {
        writer.write_record(&result.columns)?;
        for row in &result.rows {
            writer.write_record(cells(result, row))?;
        }
        writer.flush()?;
        Ok(())
    };
    if let Err(e) = write() {
        tracing::warn!("Failed to render CSV output: {}", e);
    }

    writer
        .into_inner()
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

fn format_as_table(result: &QueryResult) -> String {
    if result.is_empty() {
        return "(0 rows)".to_string();
    }

    let rendered: Vec<Vec<String>> = result
        .rows
        .iter()
        .map(|row| cells(result, row).collect())
        .collect();

    let mut widths: Vec<usize> = result.columns.iter().map(|c| c.len()).collect();
    for row in &rendered {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }

    let line = |values: &[String]| -> String {
        values
            .iter()
            .zip(&widths)
            .map(|(v, w)| format!("{:width$}", v, width = *w))
            .collect::<Vec<_>>()
            .join(" | ")
    };

    let mut output = line(result.columns.as_slice());
    output.push('\n');
    let separator: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    output.push_str(&separator.join("-+-"));
    output.push('\n');
    for row in &rendered {
        output.push_str(&line(row.as_slice()));
        output.push('\n');
    }
    output.push_str(&format!("({} rows)", result.row_count()));

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_output_format_from_str() {
        assert_eq!(
            OutputFormat::from_str("table").unwrap(),
            OutputFormat::Table
        );
        assert_eq!(OutputFormat::from_str("json").unwrap(), OutputFormat::Json);
        assert_eq!(OutputFormat::from_str("CSV").unwrap(), OutputFormat::Csv);
        assert!(OutputFormat::from_str("yaml").is_err());
    }

    #[test]
    fn test_query_result_empty() {
        let result = QueryResult::empty();
        assert!(result.is_empty());
        assert_eq!(result.row_count(), 0);
        assert_eq!(result.first_i64("count"), None);
    }

    #[test]
    fn test_first_i64() {
        let result = QueryResult::new(
            vec!["count".to_string()],
            vec![serde_json::json!({"count": 42})],
        );
        assert_eq!(result.first_i64("count"), Some(42));
    }

    #[test]
    fn test_format_as_table() {
        let result = QueryResult::new(
            vec!["table".to_string(), "rows".to_string()],
            vec![
                serde_json::json!({"table": "songs", "rows": 71}),
                serde_json::json!({"table": "songplays", "rows": 6820}),
            ],
        );

        let output = format_as_table(&result);
        assert!(output.starts_with("table     | rows"));
        assert!(output.contains("songplays | 6820"));
        assert!(output.ends_with("(2 rows)"));
    }

    #[test]
    fn test_format_as_csv() {
        let result = QueryResult::new(
            vec!["name".to_string(), "location".to_string()],
            vec![
                serde_json::json!({"name": "Casual", "location": null}),
                serde_json::json!({"name": "Sonora Santanera", "location": "Mexico, DF"}),
            ],
        );

        let output = format_as_csv(&result);
        assert!(output.starts_with("name,location\n"));
        assert!(output.contains("Casual,\n"));
        assert!(output.contains("\"Mexico, DF\""));
    }

    #[test]
    fn test_load_outcome_empty() {
        let outcome = LoadOutcome::empty(Entity::Time);
        assert_eq!(outcome.rows_staged, 0);
        assert_eq!(outcome.rows_affected, 0);
    }
}
