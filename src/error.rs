//! Error types for duewatch.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Malformed status/field combination. Raised before any store mutation.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Mutation against a terminal or already-transitioned item.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("item not found: {0}")]
    NotFound(String),

    /// Timer backend failure. Callers log it; the sweep compensates.
    #[error("scheduling failed: {0}")]
    Scheduling(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
