//! Core domain model for RemitRail
//!
//! Holds the reconciliation data model (the per-NVC record and the cached
//! source entities), the line-level match classifier, and the engine
//! configuration.
//!
//! # Four legs
//!
//! Every contractor invoice line carries an NVC code that threads four
//! independent views of the same payment:
//!
//! 1. **Remittance** - a line item parsed out of an agency remittance email
//! 2. **Invoice** - the row in the internal operations database
//! 3. **Inbound funding** - the lump-sum wire/ACH received from the agency
//! 4. **Outbound payment** - the processor payment leaving to the contractor
//!
//! The classifier in [`classify`] derives a [`types::MatchStatus`] from
//! whichever legs are present; it is a pure function of the record and the
//! configured tolerances.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

pub mod classify;
pub mod config;
pub mod error;
pub mod types;

// Re-exports
pub use classify::{classify, Classification, MatchFlag};
pub use config::{EngineConfig, Tolerances};
pub use error::{Error, Result};
pub use types::*;
