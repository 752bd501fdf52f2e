//! Invoice source adapter
//!
//! Reads invoices and pay-run headers from the operations database gateway.
//! The source reports status as a numeric code; rows with unknown codes or
//! undecodable amounts are skipped (counted) without failing the batch.

use crate::retry::RetryPolicy;
use crate::types::{FetchWindow, InvoiceBatch, SourceKind};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use recon_core::{CachedInvoice, CachedPayrun, InvoiceStatus};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Invoice row as the source returns it
#[derive(Debug, Clone, Deserialize)]
pub struct WireInvoice {
    /// NVC code
    pub nvc_code: String,
    /// Amount as a decimal string
    pub amount: String,
    /// Currency
    pub currency: String,
    /// Numeric status code (canonical table)
    pub status_code: i64,
    /// Operating tenant
    pub tenant: String,
    /// Pay-run reference
    #[serde(default)]
    pub payrun_ref: Option<String>,
    /// Invoice date
    #[serde(default)]
    pub invoice_date: Option<NaiveDate>,
    /// Contractor name
    #[serde(default)]
    pub contractor: Option<String>,
}

/// Pay-run header as the source returns it
#[derive(Debug, Clone, Deserialize)]
pub struct WirePayrun {
    /// Pay-run reference
    pub payrun_ref: String,
    /// Operating tenant
    pub tenant: String,
    /// Status text
    pub status: String,
    /// Scheduled pay date
    #[serde(default)]
    pub pay_date: Option<NaiveDate>,
    /// Total amount as a decimal string
    #[serde(default)]
    pub total_amount: Option<String>,
}

/// Operations-database boundary (the tunnel side is out of scope)
#[async_trait]
pub trait InvoiceBackend: Send + Sync {
    /// Invoice rows updated inside the window
    async fn list_invoices(&self, window: &FetchWindow) -> Result<Vec<WireInvoice>>;

    /// Pay-run headers updated inside the window
    async fn list_payruns(&self, window: &FetchWindow) -> Result<Vec<WirePayrun>>;
}

/// Invoice adapter
pub struct InvoiceAdapter {
    backend: Arc<dyn InvoiceBackend>,
    retry: RetryPolicy,
}

impl InvoiceAdapter {
    /// New adapter over the given backend
    pub fn new(backend: Arc<dyn InvoiceBackend>, retry: RetryPolicy) -> Self {
        Self { backend, retry }
    }

    /// Fetch invoices and pay-runs for the window
    pub async fn fetch(&self, window: &FetchWindow) -> Result<InvoiceBatch> {
        let wire_invoices = self
            .retry
            .run(SourceKind::Invoice, || self.backend.list_invoices(window))
            .await?;
        let wire_payruns = self
            .retry
            .run(SourceKind::Invoice, || self.backend.list_payruns(window))
            .await?;

        let now = Utc::now();
        let mut batch = InvoiceBatch::default();

        for wire in wire_invoices {
            match decode_invoice(&wire, now) {
                Ok(invoice) => batch.invoices.push(invoice),
                Err(err) => {
                    warn!(nvc = %wire.nvc_code, error = %err, "skipping undecodable invoice");
                    batch.skipped += 1;
                }
            }
        }

        for wire in wire_payruns {
            match decode_payrun(&wire, now) {
                Ok(payrun) => batch.payruns.push(payrun),
                Err(err) => {
                    warn!(payrun = %wire.payrun_ref, error = %err, "skipping undecodable pay-run");
                    batch.skipped += 1;
                }
            }
        }

        debug!(
            invoices = batch.invoices.len(),
            payruns = batch.payruns.len(),
            skipped = batch.skipped,
            "fetched invoice batch"
        );
        Ok(batch)
    }
}

fn decode_invoice(wire: &WireInvoice, now: chrono::DateTime<Utc>) -> Result<CachedInvoice> {
    let status = InvoiceStatus::from_code(wire.status_code).ok_or_else(|| Error::Malformed {
        source_kind: SourceKind::Invoice,
        detail: format!("unknown status code {}", wire.status_code),
    })?;
    let amount = Decimal::from_str(&wire.amount).map_err(|e| Error::Malformed {
        source_kind: SourceKind::Invoice,
        detail: format!("amount '{}': {}", wire.amount, e),
    })?;

    Ok(CachedInvoice {
        nvc_code: wire.nvc_code.clone(),
        amount,
        currency: wire.currency.clone(),
        status,
        tenant: wire.tenant.clone(),
        payrun_ref: wire.payrun_ref.clone(),
        invoice_date: wire.invoice_date,
        contractor: wire.contractor.clone(),
        fetched_at: now,
    })
}

fn decode_payrun(wire: &WirePayrun, now: chrono::DateTime<Utc>) -> Result<CachedPayrun> {
    let total_amount = wire
        .total_amount
        .as_deref()
        .map(|raw| {
            Decimal::from_str(raw).map_err(|e| Error::Malformed {
                source_kind: SourceKind::Invoice,
                detail: format!("pay-run total '{}': {}", raw, e),
            })
        })
        .transpose()?;

    Ok(CachedPayrun {
        payrun_ref: wire.payrun_ref.clone(),
        tenant: wire.tenant.clone(),
        status: wire.status.clone(),
        pay_date: wire.pay_date,
        total_amount,
        fetched_at: now,
    })
}

/// HTTP/JSON reference backend against the ops-database gateway
pub struct HttpInvoiceBackend {
    client: Client,
    base_url: String,
    timeout_secs: u64,
}

impl HttpInvoiceBackend {
    /// New backend against the gateway base URL
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let timeout_secs = timeout.as_secs();
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Unavailable {
                source_kind: SourceKind::Invoice,
                reason: e.to_string(),
            })?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            timeout_secs,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        window: &FetchWindow,
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("since", window.start.to_rfc3339()),
                ("until", window.end.to_rfc3339()),
            ])
            .send()
            .await
            .map_err(|e| Error::from_reqwest(SourceKind::Invoice, e, self.timeout_secs))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::from_status(SourceKind::Invoice, status.as_u16(), body));
        }

        response.json().await.map_err(|e| Error::Malformed {
            source_kind: SourceKind::Invoice,
            detail: e.to_string(),
        })
    }
}

#[async_trait]
impl InvoiceBackend for HttpInvoiceBackend {
    async fn list_invoices(&self, window: &FetchWindow) -> Result<Vec<WireInvoice>> {
        self.get_json("/invoices", window).await
    }

    async fn list_payruns(&self, window: &FetchWindow) -> Result<Vec<WirePayrun>> {
        self.get_json("/payruns", window).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    struct FakeBackend {
        invoices: Vec<WireInvoice>,
    }

    #[async_trait]
    impl InvoiceBackend for FakeBackend {
        async fn list_invoices(&self, _window: &FetchWindow) -> Result<Vec<WireInvoice>> {
            Ok(self.invoices.clone())
        }

        async fn list_payruns(&self, _window: &FetchWindow) -> Result<Vec<WirePayrun>> {
            Ok(vec![WirePayrun {
                payrun_ref: "PR-77".to_string(),
                tenant: "mediaco-us".to_string(),
                status: "released".to_string(),
                pay_date: None,
                total_amount: Some("125000.00".to_string()),
            }])
        }
    }

    fn wire(nvc: &str, amount: &str, status_code: i64) -> WireInvoice {
        WireInvoice {
            nvc_code: nvc.to_string(),
            amount: amount.to_string(),
            currency: "USD".to_string(),
            status_code,
            tenant: "mediaco-us".to_string(),
            payrun_ref: Some("PR-77".to_string()),
            invoice_date: None,
            contractor: Some("Jane Doe".to_string()),
        }
    }

    #[tokio::test]
    async fn maps_status_codes_and_amounts() {
        let adapter = InvoiceAdapter::new(
            Arc::new(FakeBackend {
                invoices: vec![wire("NVC7KAAA", "4500.00", 1), wire("NVC7KBBB", "900.00", 5)],
            }),
            RetryPolicy::default(),
        );

        let batch = adapter.fetch(&FetchWindow::lookback(30, Utc::now())).await.unwrap();
        assert_eq!(batch.invoices.len(), 2);
        assert_eq!(batch.invoices[0].status, InvoiceStatus::Approved);
        assert_eq!(batch.invoices[0].amount, dec!(4500.00));
        assert_eq!(batch.invoices[1].status, InvoiceStatus::Rejected);
        assert_eq!(batch.payruns.len(), 1);
        assert_eq!(batch.payruns[0].total_amount, Some(dec!(125000.00)));
        assert_eq!(batch.skipped, 0);
    }

    #[tokio::test]
    async fn bad_rows_are_skipped_not_fatal() {
        let adapter = InvoiceAdapter::new(
            Arc::new(FakeBackend {
                invoices: vec![
                    wire("NVC7KAAA", "4500.00", 1),
                    wire("NVC7KBAD", "4500.00", 99), // unknown status code
                    wire("NVC7KUGH", "not-money", 1),
                ],
            }),
            RetryPolicy::default(),
        );

        let batch = adapter.fetch(&FetchWindow::lookback(30, Utc::now())).await.unwrap();
        assert_eq!(batch.invoices.len(), 1);
        assert_eq!(batch.skipped, 2);
    }
}
