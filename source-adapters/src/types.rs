//! Shared types for adapters

use chrono::{DateTime, Duration, Utc};
use recon_core::{CachedEmail, CachedInvoice, CachedPayment, CachedPayrun, ReceivedPayment, RemittanceLine};
use serde::{Deserialize, Serialize};

/// Source kind, used for error attribution and sync state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Remittance email relay
    Email,
    /// Operations database (invoices, pay-runs)
    Invoice,
    /// Inbound funding receipts at the processor
    InboundFunding,
    /// Outbound payments at the processor
    OutboundPayment,
}

impl SourceKind {
    /// Stable key for sync state and metrics labels
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Email => "emails",
            SourceKind::Invoice => "invoices",
            SourceKind::InboundFunding => "received_payments",
            SourceKind::OutboundPayment => "payments",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Bounded lookback window for a fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchWindow {
    /// Window start (inclusive)
    pub start: DateTime<Utc>,

    /// Window end (inclusive)
    pub end: DateTime<Utc>,
}

impl FetchWindow {
    /// Window covering the last `days` days up to `now`
    pub fn lookback(days: i64, now: DateTime<Utc>) -> Self {
        Self {
            start: now - Duration::days(days),
            end: now,
        }
    }
}

/// One parsed remittance email: the cache entity plus its line items
#[derive(Debug, Clone)]
pub struct ParsedEmail {
    /// Email fingerprint ready for the cache
    pub email: CachedEmail,

    /// NVC line items parsed from the decoded attachment
    pub lines: Vec<RemittanceLine>,
}

/// Invoice-source batch
#[derive(Debug, Clone, Default)]
pub struct InvoiceBatch {
    /// Invoice rows
    pub invoices: Vec<CachedInvoice>,

    /// Pay-run headers
    pub payruns: Vec<CachedPayrun>,

    /// Records dropped because they could not be decoded
    pub skipped: u32,
}

/// Inbound-funding batch
#[derive(Debug, Clone, Default)]
pub struct ReceivedBatch {
    /// Received payments
    pub payments: Vec<ReceivedPayment>,

    /// Records dropped because they could not be decoded
    pub skipped: u32,
}

/// Outbound-payment batch
#[derive(Debug, Clone, Default)]
pub struct PaymentBatch {
    /// Outbound payments with a recognized NVC reference
    pub payments: Vec<CachedPayment>,

    /// Records dropped (undecodable or no NVC reference)
    pub skipped: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookback_window_spans_days() {
        let now = Utc::now();
        let window = FetchWindow::lookback(30, now);
        assert_eq!(window.end, now);
        assert_eq!((window.end - window.start).num_days(), 30);
    }
}
