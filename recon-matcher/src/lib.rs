//! Lump-sum matcher
//!
//! Inbound funding receipts carry no NVC breakdown, so they cannot be joined
//! to reconciliation records directly. This crate links each received payment
//! to at most one remittance email by scoring independent signals:
//!
//! - **Amount** (weight 0.5): receipt amount vs the email's parsed lump-sum
//!   total
//! - **Date** (weight 0.2): proximity of payment date and email date
//! - **Payer** (weight 0.3): fuzzy similarity of the payer name parsed out of
//!   the receipt's free-text info field against the email's agency name,
//!   routed through a configured alias table
//!
//! Scores at or above the auto threshold are applied by the engine; scores in
//! the suggest band are surfaced to operators but never applied.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

pub mod alias;
pub mod payer;
pub mod score;

pub use alias::AliasTable;
pub use payer::{extract_payer, normalize_name};
pub use score::{LumpSumMatcher, MatchDecision, MatchScore};
