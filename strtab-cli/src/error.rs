//! Error types for the strtab CLI.

use thiserror::Error;

/// Errors raised by strtab subcommands.
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration could not be found, parsed or validated.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Input rejected before any table work started.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The string table reported a failure.
    #[error("String table error: {0}")]
    Table(#[from] strtab::StrtabError),

    /// A stress run found the table in an inconsistent state.
    #[error("Verification failed: {0}")]
    Verification(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CliError>;
