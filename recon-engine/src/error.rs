//! Error types for the engine

use thiserror::Error;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Engine errors
#[derive(Error, Debug)]
pub enum Error {
    /// Store failure; fatal for the current cycle
    #[error("Store error: {0}")]
    Store(#[from] recon_store::Error),

    /// Source adapter failure
    #[error("Source error: {0}")]
    Source(#[from] source_adapters::Error),

    /// Invalid manual mutation (unknown NVC, bad target, bad flag)
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Errors a manual-mutation caller should see as a 4xx
    pub fn is_invalid_input(&self) -> bool {
        match self {
            Error::InvalidInput(_) => true,
            Error::Store(recon_store::Error::NotFound(_)) => true,
            Error::Store(recon_store::Error::LinkConflict(_)) => true,
            _ => false,
        }
    }
}
