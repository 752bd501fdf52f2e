//! Local cache store
//!
//! A single embedded SQLite file holds the per-source caches (`emails`,
//! `invoices`, `payruns`, `received_payments`, `payments`) and the
//! reconciliation table. All access goes through the typed repository
//! functions in this crate; no other component opens connections.
//!
//! # Guarantees
//!
//! - Every repository function acquires a pooled connection scoped to the
//!   call; it is released on every exit path.
//! - Multi-row invariants (email fan-out, funding propagation, 1:1 links)
//!   run inside a transaction.
//! - Schema evolution is additive migrations plus the one-time
//!   `funding_*` -> `payment_*` rename, applied at process start.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

pub mod amount;
pub mod emails;
pub mod error;
pub mod invoices;
pub mod payments;
pub mod queries;
pub mod received;
pub mod records;

pub use error::{Error, Result};

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::time::Duration;
use tracing::info;

/// Handle to the embedded store
///
/// Cheap to clone; all clones share one pool.
#[derive(Debug, Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (or create) the database file and run pending migrations
    pub async fn open(path: &str, connect_timeout: Duration) -> Result<Self> {
        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(connect_timeout)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .acquire_timeout(connect_timeout)
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        info!("Opened reconciliation store at {}", path);
        Ok(Self { pool })
    }

    /// In-memory store for tests
    ///
    /// A single connection keeps the in-memory database alive and serializes
    /// writers the same way the per-operation transaction discipline does.
    pub async fn open_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(":memory:")
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    /// The shared connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn migrations_apply_cleanly() {
        let store = Store::open_in_memory().await.unwrap();

        // The rename migration must have replaced the legacy column names
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM pragma_table_info('reconciliation_records') \
             WHERE name = 'payment_amount_cents'",
        )
        .fetch_one(store.pool())
        .await
        .unwrap();
        assert_eq!(row.0, 1);

        let legacy: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM pragma_table_info('reconciliation_records') \
             WHERE name = 'funding_amount_cents'",
        )
        .fetch_one(store.pool())
        .await
        .unwrap();
        assert_eq!(legacy.0, 0);

        // Compatibility view still answers to the old names
        let view: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM reconciliation_legacy")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(view.0, 0);
    }

    #[tokio::test]
    async fn open_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recon.db");
        let _store = Store::open(path.to_str().unwrap(), Duration::from_secs(10))
            .await
            .unwrap();
        assert!(path.exists());
    }
}
