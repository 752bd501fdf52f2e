//! Source adapters
//!
//! Four pull-only adapters feed the reconciliation engine:
//!
//! - [`email::EmailAdapter`] - remittance emails plus the attachment parser
//! - [`invoice::InvoiceAdapter`] - invoices and pay-runs from the operations
//!   database
//! - [`inbound::InboundFundingAdapter`] - received payments at the processor
//! - [`outbound::OutboundPaymentAdapter`] - outbound payments, with NVC
//!   extraction from `tenant.NVC_CODE` references
//!
//! Every adapter fetches over a bounded [`types::FetchWindow`], is idempotent
//! (re-fetching a window yields the same records), and attaches a
//! source-stable identifier per record. The transports underneath (mail
//! relay, ops-database gateway, processor API) are trait boundaries; the
//! `Http*` types are the reference clients.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

pub mod email;
pub mod error;
pub mod inbound;
pub mod invoice;
pub mod outbound;
pub mod parser;
pub mod processor;
pub mod retry;
pub mod types;

pub use error::{Error, Result};
pub use retry::RetryPolicy;
pub use types::{FetchWindow, SourceKind};
