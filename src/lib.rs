//! songplay-etl - Batch ETL from song metadata and listening logs into a star schema
//!
//! Provides:
//! - Input discovery and merging of JSON document and JSON-lines trees
//! - Projection into songs, artists, users, time and songplays
//! - CSV staging and staged bulk loads with per-entity conflict policies
//! - DuckDB and PostgreSQL store backends

pub mod config;
pub mod database;
pub mod ingest;
pub mod models;
pub mod pipeline;
pub mod staging;
pub mod transform;

pub use config::{ConfigError, DatabaseBackendType, EtlConfig};
pub use database::{
    ConflictPolicy, DatabaseBackend, DatabaseError, DatabaseResult, LoadOutcome, LoadPlan,
    QueryResult, SongMatch, TableCount,
};
#[cfg(feature = "duckdb-backend")]
pub use database::DuckDBBackend;
#[cfg(feature = "postgres-backend")]
pub use database::PostgresBackend;
pub use ingest::{IngestError, MergeStats, RecordTable};
pub use models::{ArtistRecord, Entity, SongPlayFact, SongRecord, TimeRecord, UserRecord};
pub use pipeline::{EntityOutcome, Pipeline, RunReport, SourceReport};
pub use staging::{StagedTable, StagingError, StagingRecord};
pub use transform::{DedupPolicy, ProjectionError};
