//! Outbound payment adapter
//!
//! Outbound processor payments carry the NVC code inside a `tenant.NVC_CODE`
//! reference string. Rows whose reference does not parse are skipped with a
//! counter bump; everything else is keyed by the processor payment id.

use crate::retry::RetryPolicy;
use crate::types::{FetchWindow, PaymentBatch, SourceKind};
use crate::Result;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use lazy_static::lazy_static;
use recon_core::CachedPayment;
use regex::Regex;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

lazy_static! {
    /// `tenant.NVC_CODE`, tenant being a lowercase slug
    static ref PAYMENT_REFERENCE: Regex =
        Regex::new(r"^([a-z0-9][a-z0-9_-]*)\.(NVC[A-Z0-9]{3,})$").expect("static regex");
}

/// Outbound payment as the processor returns it
#[derive(Debug, Clone, Deserialize)]
pub struct WirePayment {
    /// Processor payment id
    pub id: String,
    /// Reference string (`tenant.NVC_CODE`)
    pub reference: String,
    /// Amount as a decimal string
    pub amount: String,
    /// Currency (any)
    pub currency: String,
    /// Processor status
    pub status: String,
    /// Recipient name
    #[serde(default)]
    pub recipient: Option<String>,
    /// Recipient country
    #[serde(default)]
    pub recipient_country: Option<String>,
    /// Sub-account the payment left from
    #[serde(default)]
    pub account_id: Option<String>,
    /// Payment date
    #[serde(default)]
    pub payment_date: Option<NaiveDate>,
}

/// Processor boundary for outbound payments
#[async_trait]
pub trait OutboundTransport: Send + Sync {
    /// Outbound payments inside the window
    async fn list_payments(&self, window: &FetchWindow) -> Result<Vec<WirePayment>>;
}

/// Outbound payment adapter
pub struct OutboundPaymentAdapter {
    transport: Arc<dyn OutboundTransport>,
    retry: RetryPolicy,
}

/// Split a `tenant.NVC_CODE` reference
pub fn parse_reference(reference: &str) -> Option<(String, String)> {
    let caps = PAYMENT_REFERENCE.captures(reference.trim())?;
    Some((caps[1].to_string(), caps[2].to_string()))
}

impl OutboundPaymentAdapter {
    /// New adapter over the given transport
    pub fn new(transport: Arc<dyn OutboundTransport>, retry: RetryPolicy) -> Self {
        Self { transport, retry }
    }

    /// Fetch outbound payments for the window
    pub async fn fetch(&self, window: &FetchWindow) -> Result<PaymentBatch> {
        let wire = self
            .retry
            .run(SourceKind::OutboundPayment, || {
                self.transport.list_payments(window)
            })
            .await?;

        let now = Utc::now();
        let mut batch = PaymentBatch::default();
        for payment in wire {
            let Some((tenant, nvc_code)) = parse_reference(&payment.reference) else {
                warn!(id = %payment.id, reference = %payment.reference,
                      "skipping payment without an NVC reference");
                batch.skipped += 1;
                continue;
            };
            let amount = match Decimal::from_str(&payment.amount) {
                Ok(amount) => amount,
                Err(err) => {
                    warn!(id = %payment.id, amount = %payment.amount, error = %err,
                          "skipping undecodable payment");
                    batch.skipped += 1;
                    continue;
                }
            };

            batch.payments.push(CachedPayment {
                id: payment.id,
                nvc_code,
                tenant: Some(tenant),
                amount,
                currency: payment.currency,
                status: payment.status,
                recipient: payment.recipient,
                recipient_country: payment.recipient_country,
                account_id: payment.account_id,
                payment_date: payment.payment_date,
                fetched_at: now,
            });
        }

        debug!(count = batch.payments.len(), skipped = batch.skipped, "fetched outbound payments");
        Ok(batch)
    }
}
