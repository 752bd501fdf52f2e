//! Error types for the store

use thiserror::Error;

/// Result type for store operations
pub type Result<T> = std::result::Result<T, Error>;

/// Store errors
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Migration error
    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    /// Row not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// A 1:1 linkage guard refused the write
    #[error("Link conflict: {0}")]
    LinkConflict(String),

    /// A stored value could not be decoded into its domain type
    #[error("Invalid stored value: {0}")]
    InvalidRow(String),

    /// Amount out of representable cent range
    #[error("Amount out of range: {0}")]
    AmountRange(String),

    /// IO error (database directory)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
