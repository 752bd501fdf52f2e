//! Inbound funding adapter (received payments)
//!
//! Received payments are lump sums with no NVC breakdown; the engine links
//! them to remittance emails downstream. This adapter only normalizes the
//! processor rows and keeps their source-stable ids.

use crate::retry::RetryPolicy;
use crate::types::{FetchWindow, ReceivedBatch, SourceKind};
use crate::Result;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use recon_core::ReceivedPayment;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

/// Received payment as the processor returns it
#[derive(Debug, Clone, Deserialize)]
pub struct WireReceivedPayment {
    /// Opaque processor id
    pub id: String,
    /// Receiving sub-account
    pub sub_account: String,
    /// Amount as a decimal string
    pub amount: String,
    /// Currency
    pub currency: String,
    /// Payment date
    pub payment_date: NaiveDate,
    /// Processor status
    pub status: String,
    /// Free-text payer/info field
    #[serde(default, rename = "infoToAccountOwner")]
    pub info_to_account_owner: String,
}

/// Processor boundary for inbound funding
#[async_trait]
pub trait InboundTransport: Send + Sync {
    /// Received payments across all sub-accounts inside the window
    async fn list_received(&self, window: &FetchWindow) -> Result<Vec<WireReceivedPayment>>;
}

/// Inbound funding adapter
pub struct InboundFundingAdapter {
    transport: Arc<dyn InboundTransport>,
    retry: RetryPolicy,
}

impl InboundFundingAdapter {
    /// New adapter over the given transport
    pub fn new(transport: Arc<dyn InboundTransport>, retry: RetryPolicy) -> Self {
        Self { transport, retry }
    }

    /// Fetch received payments for the window
    pub async fn fetch(&self, window: &FetchWindow) -> Result<ReceivedBatch> {
        let wire = self
            .retry
            .run(SourceKind::InboundFunding, || {
                self.transport.list_received(window)
            })
            .await?;

        let now = Utc::now();
        let mut batch = ReceivedBatch::default();
        for payment in wire {
            match Decimal::from_str(&payment.amount) {
                Ok(amount) => batch.payments.push(ReceivedPayment {
                    id: payment.id,
                    sub_account: payment.sub_account,
                    amount,
                    currency: payment.currency,
                    payment_date: payment.payment_date,
                    status: payment.status,
                    payer_info: payment.info_to_account_owner,
                    linked_email_id: None,
                    fetched_at: now,
                }),
                Err(err) => {
                    warn!(id = %payment.id, amount = %payment.amount, error = %err,
                          "skipping undecodable received payment");
                    batch.skipped += 1;
                }
            }
        }

        debug!(count = batch.payments.len(), skipped = batch.skipped, "fetched received payments");
        Ok(batch)
    }
}
