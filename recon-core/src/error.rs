//! Error types for the core domain

use thiserror::Error;

/// Result type for core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core domain errors
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Amount could not be parsed
    #[error("Invalid amount '{0}'")]
    InvalidAmount(String),

    /// Unknown invoice status code from the invoice source
    #[error("Unknown invoice status code {0}")]
    UnknownInvoiceStatus(i64),

    /// Unknown remittance source key
    #[error("Unknown remittance source '{0}'")]
    UnknownSource(String),
}
