//! CLI binary entry point for songplay-etl

mod commands;
mod error;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use songplay_etl::{DatabaseBackend, DatabaseBackendType, EtlConfig, Pipeline};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use commands::{
    GlobalArgs, InitArgs, RunArgs, StatusArgs, handle_init, handle_reset, handle_run, handle_status,
    resolve_config,
};
use error::CliError;

/// `--database` value selecting a throwaway in-memory DuckDB store
#[cfg(feature = "duckdb-backend")]
const IN_MEMORY_PATH: &str = ":memory:";

#[derive(Parser)]
#[command(name = "songplay-etl")]
#[command(about = "Load song metadata and listening logs into a star schema")]
#[command(version)]
struct Cli {
    /// Config file (defaults to ./songplay-etl.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Store backend: duckdb or postgres
    #[arg(short, long, global = true)]
    backend: Option<String>,

    /// DuckDB database file, or ":memory:"
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// PostgreSQL connection string
    #[arg(long, global = true)]
    connection_string: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the schema and load both input trees
    Run {
        /// Root of the song metadata tree
        #[arg(long)]
        song_data: Option<PathBuf>,
        /// Root of the event log tree
        #[arg(long)]
        log_data: Option<PathBuf>,
    },
    /// Create the schema if it does not exist
    Init {
        /// Also save the resolved settings as a config file
        #[arg(
            long,
            value_name = "PATH",
            num_args = 0..=1,
            default_missing_value = songplay_etl::config::CONFIG_FILENAME
        )]
        write_config: Option<PathBuf>,
    },
    /// Drop and recreate every table
    Reset,
    /// Show backend health and table row counts
    Status {
        /// Output format (table, json, csv)
        #[arg(short, long, default_value = "table")]
        format: String,
    },
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if verbose {
            "songplay_etl=debug,info"
        } else {
            "info"
        })
    });
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(verbose);

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<bool> {
    let global = GlobalArgs {
        config: cli.config,
        backend: cli.backend,
        database: cli.database,
        connection_string: cli.connection_string,
    };
    let config = resolve_config(&global)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    let succeeded = runtime.block_on(dispatch(&config, cli.command))?;
    Ok(succeeded)
}

async fn dispatch(config: &EtlConfig, command: Commands) -> Result<bool, CliError> {
    match config.database.backend {
        DatabaseBackendType::DuckDB => {
            #[cfg(feature = "duckdb-backend")]
            {
                let path = config.duckdb_path();
                let backend = if path.as_os_str() == IN_MEMORY_PATH {
                    songplay_etl::DuckDBBackend::in_memory()?
                } else {
                    songplay_etl::DuckDBBackend::new(&path)?
                };
                if backend.is_in_memory() {
                    tracing::warn!("Using an in-memory DuckDB database; nothing will be persisted");
                }
                execute(backend, config, command).await
            }
            #[cfg(not(feature = "duckdb-backend"))]
            {
                let _ = command;
                Err(CliError::BackendDisabled("duckdb"))
            }
        }
        DatabaseBackendType::Postgres => {
            #[cfg(feature = "postgres-backend")]
            {
                let backend =
                    songplay_etl::PostgresBackend::new(&config.postgres_connection_string())
                        .await?;
                tracing::debug!("Connected to {}", backend.connection_string_masked());
                execute(backend, config, command).await
            }
            #[cfg(not(feature = "postgres-backend"))]
            {
                let _ = command;
                Err(CliError::BackendDisabled("postgres"))
            }
        }
    }
}

#[allow(dead_code)]
async fn execute<B: DatabaseBackend>(
    backend: B,
    config: &EtlConfig,
    command: Commands,
) -> Result<bool, CliError> {
    let pipeline = Pipeline::new(backend);

    let result = match command {
        Commands::Run {
            song_data,
            log_data,
        } => {
            let args = RunArgs {
                song_data,
                log_data,
            };
            handle_run(&pipeline, config, &args).await
        }
        Commands::Init { write_config } => {
            let args = InitArgs { write_config };
            handle_init(pipeline.backend(), config, &args).await
        }
        Commands::Reset => handle_reset(pipeline.backend()).await,
        Commands::Status { format } => {
            handle_status(pipeline.backend(), &StatusArgs { format }).await
        }
    };

    let closed = pipeline.backend().close().await;
    let succeeded = result?;
    closed?;
    Ok(succeeded)
}
