//! Reconciliation engine
//!
//! Orchestrates the four source adapters against the local store:
//!
//! 1. Each fetched record is projected onto one or more NVC rows (one for
//!    invoices and payments, potentially many for a remittance email).
//! 2. Leg fields are written in a single transaction per NVC (per email for
//!    the fan-out case) and the derived match status is recomputed.
//! 3. Received payments run through the lump-sum matcher; auto-links
//!    propagate funding to every downstream NVC row.
//!
//! All operations are idempotent: replaying a batch converges on the same
//! rows and statuses. Source failures are isolated per source; the engine
//! keeps serving cached data in degraded mode.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

pub mod engine;
pub mod error;
pub mod metrics;
pub mod scheduler;
pub mod sync;

pub use engine::{AssociateTarget, ReconEngine, Sources};
pub use error::{Error, Result};
pub use scheduler::Scheduler;
pub use sync::{SourceSyncStatus, SyncHealth, SyncState};
