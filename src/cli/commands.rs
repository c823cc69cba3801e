//! CLI command implementations
//!
//! Every handler is generic over the store so DuckDB and PostgreSQL share
//! the same code path.

use std::path::{Path, PathBuf};

use songplay_etl::database::{OutputFormat, format_query_result};
use songplay_etl::{
    DatabaseBackend, DatabaseBackendType, EtlConfig, Pipeline, QueryResult, RunReport,
};

use crate::error::CliError;

/// Flags that override the config file and environment
#[derive(Debug, Clone, Default)]
pub struct GlobalArgs {
    pub config: Option<PathBuf>,
    pub backend: Option<String>,
    pub database: Option<PathBuf>,
    pub connection_string: Option<String>,
}

/// Run command arguments
#[derive(Debug, Clone, Default)]
pub struct RunArgs {
    pub song_data: Option<PathBuf>,
    pub log_data: Option<PathBuf>,
}

/// Init command arguments
#[derive(Debug, Clone, Default)]
pub struct InitArgs {
    pub write_config: Option<PathBuf>,
}

/// Status command arguments
#[derive(Debug, Clone)]
pub struct StatusArgs {
    pub format: String,
}

/// Load the config file, then apply environment and command-line overrides
pub fn resolve_config(args: &GlobalArgs) -> Result<EtlConfig, CliError> {
    let mut config = EtlConfig::load(args.config.as_deref())?;

    if let Some(backend) = &args.backend {
        config.database.backend = backend
            .parse::<DatabaseBackendType>()
            .map_err(CliError::InvalidArgument)?;
    }
    if let Some(path) = &args.database {
        config.database.path = path.to_string_lossy().into_owned();
    }
    if let Some(conn) = &args.connection_string {
        config.postgres.connection_string = Some(conn.clone());
    }

    Ok(config)
}

/// Create the schema, run both pipelines and print a summary
///
/// Returns whether every entity loaded.
pub async fn handle_run<B: DatabaseBackend>(
    pipeline: &Pipeline<B>,
    config: &EtlConfig,
    args: &RunArgs,
) -> Result<bool, CliError> {
    let song_root = args
        .song_data
        .clone()
        .unwrap_or_else(|| config.input.song_data.clone());
    let log_root = args
        .log_data
        .clone()
        .unwrap_or_else(|| config.input.log_data.clone());

    pipeline.initialize().await?;
    let report = pipeline.run(&song_root, &log_root).await;

    print_run_summary(&report);
    Ok(report.is_success())
}

fn print_run_summary(report: &RunReport) {
    for source in [&report.song_data, &report.log_data] {
        println!(
            "{}: {} files, {} records merged, {} files skipped",
            source.root.display(),
            source.files_discovered,
            source.merge.records_merged,
            source.merge.files_failed
        );
        for error in &source.errors {
            println!("  error: {}", error);
        }
    }
    println!();

    let rows = report
        .outcomes()
        .map(|o| {
            serde_json::json!({
                "entity": o.entity.to_string(),
                "projected": o.rows_projected,
                "affected": o.rows_affected,
                "ms": o.duration_ms,
                "status": o.error.as_deref().unwrap_or("ok"),
            })
        })
        .collect();
    let table = QueryResult::new(
        ["entity", "projected", "affected", "ms", "status"]
            .iter()
            .map(|c| c.to_string())
            .collect(),
        rows,
    );
    println!("{}", format_query_result(&table, OutputFormat::Table));

    let failed = report.failed_entities();
    if !failed.is_empty() {
        let names: Vec<String> = failed.iter().map(|e| e.to_string()).collect();
        eprintln!("\nFailed entities: {}", names.join(", "));
    }
}

/// Create the schema if it does not exist, optionally saving the settings
pub async fn handle_init<B: DatabaseBackend>(
    backend: &B,
    config: &EtlConfig,
    args: &InitArgs,
) -> Result<bool, CliError> {
    backend.initialize().await?;
    println!("Schema ready ({})", backend.backend_type());

    if let Some(path) = &args.write_config {
        write_config(config, path)?;
        println!("Config written to {}", path.display());
    }
    Ok(true)
}

/// Save `config` to `path`, refusing to replace an existing file
pub fn write_config(config: &EtlConfig, path: &Path) -> Result<(), CliError> {
    if path.exists() {
        return Err(CliError::InvalidArgument(format!(
            "{} already exists",
            path.display()
        )));
    }
    config.save(path)?;
    Ok(())
}

/// Drop every table and recreate the schema
pub async fn handle_reset<B: DatabaseBackend>(backend: &B) -> Result<bool, CliError> {
    backend.drop_schema().await?;
    backend.initialize().await?;
    println!("Schema reset ({})", backend.backend_type());
    Ok(true)
}

/// Print backend health and per-table row counts
pub async fn handle_status<B: DatabaseBackend>(
    backend: &B,
    args: &StatusArgs,
) -> Result<bool, CliError> {
    let format: OutputFormat = args.format.parse().map_err(CliError::InvalidArgument)?;

    let healthy = backend.health_check().await?;
    let counts = backend.table_counts().await?;

    let rows = counts
        .iter()
        .map(|c| serde_json::json!({"table": c.entity.table_name(), "rows": c.rows}))
        .collect();
    let result = QueryResult::new(vec!["table".to_string(), "rows".to_string()], rows);

    if format != OutputFormat::Json {
        println!(
            "Backend: {} ({})",
            backend.backend_type(),
            if healthy { "healthy" } else { "unhealthy" }
        );
    }
    println!("{}", format_query_result(&result, format));
    Ok(healthy)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("songplay-etl.toml");
        std::fs::write(&path, "[database]\nbackend = \"duckdb\"\npath = \"file.duckdb\"\n").unwrap();

        let args = GlobalArgs {
            config: Some(path),
            backend: Some("postgres".to_string()),
            database: None,
            connection_string: Some("host=pg".to_string()),
        };
        let config = resolve_config(&args).unwrap();
        assert_eq!(config.database.backend, DatabaseBackendType::Postgres);
        assert_eq!(config.database.path, "file.duckdb");
        assert_eq!(config.postgres_connection_string(), "host=pg");
    }

    #[test]
    fn test_write_config_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("saved.toml");
        let mut config = EtlConfig::default();
        config.database.path = "saved.duckdb".to_string();
        config.input.song_data = PathBuf::from("/srv/songs");

        write_config(&config, &path).unwrap();
        let reloaded = resolve_config(&GlobalArgs {
            config: Some(path.clone()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(reloaded.database.path, "saved.duckdb");
        assert!(reloaded.input.song_data.ends_with("songs"));

        assert!(matches!(
            write_config(&config, &path),
            Err(CliError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_unknown_backend_flag() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("songplay-etl.toml");
        std::fs::write(&path, "").unwrap();

        let args = GlobalArgs {
            config: Some(path),
            backend: Some("mysql".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            resolve_config(&args),
            Err(CliError::InvalidArgument(_))
        ));
    }
}
