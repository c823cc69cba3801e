//! CLI-specific error types

use songplay_etl::{ConfigError, DatabaseError};
use thiserror::Error;

/// CLI-specific error type
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("The {0} backend is not enabled in this build")]
    BackendDisabled(&'static str),
}
