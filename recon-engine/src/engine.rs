//! Upsert-and-reclassify engine

use crate::metrics;
use crate::sync::SyncState;
use crate::{Error, Result};
use chrono::Utc;
use recon_core::{
    classify, EngineConfig, LinkMethod, ManualFlag, MatchStatus, ReconciliationRecord, Tolerances,
};
use recon_matcher::score::MatcherConfig;
use recon_matcher::{AliasTable, LumpSumMatcher, MatchDecision};
use recon_store::queries::SuggestionCandidates;
use recon_store::records::{InvoiceLeg, PaymentLeg, RemittanceLeg};
use recon_store::{emails, invoices, payments, queries, received, records, Store};
use source_adapters::email::EmailAdapter;
use source_adapters::inbound::InboundFundingAdapter;
use source_adapters::invoice::InvoiceAdapter;
use source_adapters::outbound::OutboundPaymentAdapter;
use source_adapters::types::{InvoiceBatch, ParsedEmail, PaymentBatch, ReceivedBatch};
use source_adapters::{FetchWindow, SourceKind};
use sqlx::SqliteConnection;
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

/// The four source adapters the engine drives
pub struct Sources {
    /// Remittance emails
    pub email: EmailAdapter,
    /// Invoices and pay-runs
    pub invoice: InvoiceAdapter,
    /// Received payments
    pub inbound: InboundFundingAdapter,
    /// Outbound payments
    pub outbound: OutboundPaymentAdapter,
}

/// Target of a manual association
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssociateTarget {
    /// Attach a cached email as the remittance leg
    Email(String),
    /// Attach a cached invoice (by NVC code) as the invoice leg
    Invoice(String),
    /// Link a received payment through the record's email
    ReceivedPayment(String),
    /// Attach a cached outbound payment as the payment leg
    Payment(String),
}

impl AssociateTarget {
    /// Parse an API `(source, target_id)` pair
    pub fn parse(source: &str, target_id: &str) -> Option<Self> {
        match source {
            "email" | "remittance" => Some(AssociateTarget::Email(target_id.to_string())),
            "invoice" => Some(AssociateTarget::Invoice(target_id.to_string())),
            "received_payment" => Some(AssociateTarget::ReceivedPayment(target_id.to_string())),
            "payment" => Some(AssociateTarget::Payment(target_id.to_string())),
            _ => None,
        }
    }
}

/// The reconciliation engine
pub struct ReconEngine {
    store: Store,
    tolerances: Tolerances,
    matcher: LumpSumMatcher,
    sources: Sources,
    lookback_days: i64,
    cycle_deadline: Duration,
    sync_state: SyncState,
}

impl ReconEngine {
    /// New engine over the given store and adapters
    pub fn new(store: Store, config: &EngineConfig, aliases: AliasTable, sources: Sources) -> Self {
        let matcher = LumpSumMatcher::new(
            MatcherConfig::from_tolerances(&config.tolerances),
            aliases,
        );
        Self {
            store,
            tolerances: config.tolerances.clone(),
            matcher,
            sources,
            lookback_days: config.lookback_days,
            cycle_deadline: config.sync_interval,
            sync_state: SyncState::new(),
        }
    }

    /// The shared store handle
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// The shared sync state
    pub fn sync_state(&self) -> &SyncState {
        &self.sync_state
    }

    /// Configured tolerances
    pub fn tolerances(&self) -> &Tolerances {
        &self.tolerances
    }

    // ---- batch application ------------------------------------------------

    /// Apply a parsed email batch: cache the email and fan its line items out
    /// to NVC rows, one transaction per email
    pub async fn apply_email_batch(&self, batch: &[ParsedEmail]) -> Result<usize> {
        let mut touched = 0;
        for parsed in batch {
            let now = Utc::now();
            let mut tx = self.store.pool().begin().await.map_err(recon_store::Error::from)?;

            emails::upsert_email(&mut tx, &parsed.email, now).await?;

            for line in &parsed.lines {
                let leg = RemittanceLeg {
                    amount: line.amount,
                    date: parsed.email.email_date.date_naive(),
                    source: parsed.email.source,
                    email_id: parsed.email.id.clone(),
                    contractor: line.contractor.clone(),
                };
                records::upsert_remittance_line(&mut tx, &line.nvc_code, &leg, now).await?;
                reclassify(&mut tx, &self.tolerances, &line.nvc_code).await?;
                metrics::RECORDS_UPSERTED_TOTAL
                    .with_label_values(&["remittance"])
                    .inc();
                touched += 1;
            }

            // An email that was linked in an earlier cycle refreshes its
            // funding copies on replay
            if let Some(rp_id) = &parsed.email.received_payment_id {
                if let Some(rp) = received::get_received_payment(&mut *tx, rp_id).await? {
                    let affected =
                        records::propagate_funding_to_nvcs(&mut tx, &parsed.email.id, &rp, now)
                            .await?;
                    for nvc in &affected {
                        reclassify(&mut tx, &self.tolerances, nvc).await?;
                    }
                }
            }

            tx.commit().await.map_err(recon_store::Error::from)?;
        }
        Ok(touched)
    }

    /// Apply an invoice batch, one transaction per invoice
    pub async fn apply_invoice_batch(&self, batch: &InvoiceBatch) -> Result<usize> {
        let mut touched = 0;
        for invoice in &batch.invoices {
            let now = Utc::now();
            let mut tx = self.store.pool().begin().await.map_err(recon_store::Error::from)?;

            invoices::upsert_invoice(&mut tx, invoice, now).await?;
            let leg = InvoiceLeg {
                amount: invoice.amount,
                status: invoice.status,
                tenant: invoice.tenant.clone(),
                payrun_ref: invoice.payrun_ref.clone(),
                currency: invoice.currency.clone(),
            };
            records::upsert_invoice_leg(&mut tx, &invoice.nvc_code, &leg, now).await?;
            reclassify(&mut tx, &self.tolerances, &invoice.nvc_code).await?;

            tx.commit().await.map_err(recon_store::Error::from)?;
            metrics::RECORDS_UPSERTED_TOTAL
                .with_label_values(&["invoice"])
                .inc();
            touched += 1;
        }

        for payrun in &batch.payruns {
            let now = Utc::now();
            let mut tx = self.store.pool().begin().await.map_err(recon_store::Error::from)?;
            invoices::upsert_payrun(&mut tx, payrun, now).await?;
            tx.commit().await.map_err(recon_store::Error::from)?;
        }

        if batch.skipped > 0 {
            metrics::RECORDS_SKIPPED_TOTAL
                .with_label_values(&[SourceKind::Invoice.as_str()])
                .inc_by(batch.skipped as u64);
        }
        Ok(touched)
    }

    /// Apply a received-payment batch; linking happens in the lump-sum pass
    pub async fn apply_received_batch(&self, batch: &ReceivedBatch) -> Result<usize> {
        let mut touched = 0;
        for payment in &batch.payments {
            let now = Utc::now();
            let mut tx = self.store.pool().begin().await.map_err(recon_store::Error::from)?;

            received::upsert_received_payment(&mut tx, payment, now).await?;

            // Replays of an already-linked receipt refresh the copies on the
            // downstream rows
            if let Some(stored) = received::get_received_payment(&mut *tx, &payment.id).await? {
                if let Some(email_id) = &stored.linked_email_id {
                    let affected =
                        records::propagate_funding_to_nvcs(&mut tx, email_id, &stored, now).await?;
                    for nvc in &affected {
                        reclassify(&mut tx, &self.tolerances, nvc).await?;
                    }
                }
            }

            tx.commit().await.map_err(recon_store::Error::from)?;
            touched += 1;
        }

        if batch.skipped > 0 {
            metrics::RECORDS_SKIPPED_TOTAL
                .with_label_values(&[SourceKind::InboundFunding.as_str()])
                .inc_by(batch.skipped as u64);
        }
        Ok(touched)
    }

    /// Apply an outbound-payment batch, one transaction per payment
    pub async fn apply_payment_batch(&self, batch: &PaymentBatch) -> Result<usize> {
        let mut touched = 0;
        for payment in &batch.payments {
            let now = Utc::now();
            let mut tx = self.store.pool().begin().await.map_err(recon_store::Error::from)?;

            payments::upsert_payment(&mut tx, payment, now).await?;
            let leg = PaymentLeg {
                amount: payment.amount,
                account_id: payment.account_id.clone(),
                date: payment.payment_date,
                currency: payment.currency.clone(),
                status: payment.status.clone(),
                recipient: payment.recipient.clone(),
                recipient_country: payment.recipient_country.clone(),
            };
            records::upsert_payment_leg(&mut tx, &payment.nvc_code, &leg, now).await?;
            reclassify(&mut tx, &self.tolerances, &payment.nvc_code).await?;

            tx.commit().await.map_err(recon_store::Error::from)?;
            metrics::RECORDS_UPSERTED_TOTAL
                .with_label_values(&["payment"])
                .inc();
            touched += 1;
        }

        if batch.skipped > 0 {
            metrics::RECORDS_SKIPPED_TOTAL
                .with_label_values(&[SourceKind::OutboundPayment.as_str()])
                .inc_by(batch.skipped as u64);
        }
        Ok(touched)
    }

    // ---- lump-sum matching ------------------------------------------------

    /// Link unmatched received payments to candidate emails and propagate
    /// funding; returns the number of auto-links applied
    pub async fn lump_sum_pass(&self, window: &FetchWindow) -> Result<u32> {
        let pool = self.store.pool();
        let unlinked = received::unlinked_received_payments(pool).await?;
        let mut candidates =
            emails::unlinked_candidate_emails(pool, window.start, window.end).await?;

        let mut links = 0u32;
        for payment in unlinked {
            let (email_id, total) = match self.matcher.best_match(&payment, &candidates) {
                Some((email, score)) => (email.id.clone(), score.total),
                None => continue,
            };

            match self.matcher.decide(total) {
                MatchDecision::AutoLink => {
                    let now = Utc::now();
                    let mut tx =
                        self.store.pool().begin().await.map_err(recon_store::Error::from)?;
                    emails::link_received_payment(
                        &mut tx,
                        &email_id,
                        &payment.id,
                        total,
                        LinkMethod::Auto,
                    )
                    .await?;
                    let affected =
                        records::propagate_funding_to_nvcs(&mut tx, &email_id, &payment, now)
                            .await?;
                    for nvc in &affected {
                        reclassify(&mut tx, &self.tolerances, nvc).await?;
                    }
                    tx.commit().await.map_err(recon_store::Error::from)?;

                    info!(
                        received_payment = %payment.id,
                        email = %email_id,
                        confidence = total,
                        nvcs = affected.len(),
                        "auto-linked received payment"
                    );
                    metrics::AUTO_LINKS_TOTAL.inc();
                    candidates.retain(|e| e.id != email_id);
                    links += 1;
                }
                MatchDecision::Suggest | MatchDecision::Unmatched => {}
            }
        }
        Ok(links)
    }

    // ---- manual mutations -------------------------------------------------

    /// Manually link a source record into a reconciliation record, then
    /// reclassify
    pub async fn associate(
        &self,
        nvc: &str,
        target: AssociateTarget,
    ) -> Result<ReconciliationRecord> {
        let now = Utc::now();
        let mut tx = self.store.pool().begin().await.map_err(recon_store::Error::from)?;

        let existing = records::get_record(&mut *tx, nvc).await?;

        match &target {
            AssociateTarget::Email(email_id) => {
                let email = emails::get_email(&mut *tx, email_id)
                    .await?
                    .ok_or_else(|| Error::InvalidInput(format!("unknown email {}", email_id)))?;
                let amount = email.remittance_total.ok_or_else(|| {
                    Error::InvalidInput(format!("email {} has no parsed total", email_id))
                })?;
                let leg = RemittanceLeg {
                    amount,
                    date: email.email_date.date_naive(),
                    source: email.source,
                    email_id: email.id.clone(),
                    contractor: None,
                };
                records::upsert_remittance_line(&mut tx, nvc, &leg, now).await?;
            }
            AssociateTarget::Invoice(invoice_nvc) => {
                let invoice = invoices::get_invoice(&mut *tx, invoice_nvc)
                    .await?
                    .ok_or_else(|| {
                        Error::InvalidInput(format!("unknown invoice {}", invoice_nvc))
                    })?;
                let leg = InvoiceLeg {
                    amount: invoice.amount,
                    status: invoice.status,
                    tenant: invoice.tenant.clone(),
                    payrun_ref: invoice.payrun_ref.clone(),
                    currency: invoice.currency.clone(),
                };
                records::upsert_invoice_leg(&mut tx, nvc, &leg, now).await?;
            }
            AssociateTarget::ReceivedPayment(rp_id) => {
                let record = existing.as_ref().ok_or_else(|| {
                    Error::InvalidInput(format!("unknown record {}", nvc))
                })?;
                let email_id = record.remittance_email_id.clone().ok_or_else(|| {
                    Error::InvalidInput(format!(
                        "record {} has no remittance email to link through",
                        nvc
                    ))
                })?;
                let payment = received::get_received_payment(&mut *tx, rp_id)
                    .await?
                    .ok_or_else(|| {
                        Error::InvalidInput(format!("unknown received payment {}", rp_id))
                    })?;
                emails::link_received_payment(&mut tx, &email_id, rp_id, 1.0, LinkMethod::Manual)
                    .await?;
                let affected =
                    records::propagate_funding_to_nvcs(&mut tx, &email_id, &payment, now).await?;
                for affected_nvc in &affected {
                    reclassify(&mut tx, &self.tolerances, affected_nvc).await?;
                }
            }
            AssociateTarget::Payment(payment_id) => {
                let payment = payments::get_payment(&mut *tx, payment_id)
                    .await?
                    .ok_or_else(|| {
                        Error::InvalidInput(format!("unknown payment {}", payment_id))
                    })?;
                let leg = PaymentLeg {
                    amount: payment.amount,
                    account_id: payment.account_id.clone(),
                    date: payment.payment_date,
                    currency: payment.currency.clone(),
                    status: payment.status.clone(),
                    recipient: payment.recipient.clone(),
                    recipient_country: payment.recipient_country.clone(),
                };
                records::upsert_payment_leg(&mut tx, nvc, &leg, now).await?;
            }
        }

        reclassify(&mut tx, &self.tolerances, nvc).await?;
        records::append_note(
            &mut tx,
            nvc,
            &format!("manual association: {:?}", target),
            now,
        )
        .await?;

        let record = records::get_record(&mut *tx, nvc)
            .await?
            .ok_or_else(|| Error::InvalidInput(format!("unknown record {}", nvc)))?;
        tx.commit().await.map_err(recon_store::Error::from)?;
        Ok(record)
    }

    /// Set or clear the manual follow-up flag; `resolved` is sticky
    pub async fn set_flag(
        &self,
        nvc: &str,
        flag: Option<ManualFlag>,
        notes: Option<&str>,
        actor: Option<&str>,
    ) -> Result<ReconciliationRecord> {
        let now = Utc::now();
        let mut tx = self.store.pool().begin().await.map_err(recon_store::Error::from)?;

        let current = records::get_record(&mut *tx, nvc)
            .await?
            .ok_or_else(|| Error::InvalidInput(format!("unknown record {}", nvc)))?;

        records::set_manual_flag(&mut tx, nvc, flag, notes, actor, now).await?;

        if flag == Some(ManualFlag::Resolved) {
            records::set_status(&mut tx, nvc, MatchStatus::Resolved, &current.match_flags, now)
                .await?;
        } else {
            // Clearing a resolved flag (or setting a non-terminal one) drops
            // the record back to its computed status
            reclassify(&mut tx, &self.tolerances, nvc).await?;
        }

        let record = records::get_record(&mut *tx, nvc)
            .await?
            .ok_or_else(|| Error::InvalidInput(format!("unknown record {}", nvc)))?;
        tx.commit().await.map_err(recon_store::Error::from)?;
        Ok(record)
    }

    /// Candidate partners for a record's missing legs
    pub async fn suggestions(&self, nvc: &str) -> Result<SuggestionCandidates> {
        let record = records::get_record(self.store.pool(), nvc)
            .await?
            .ok_or_else(|| Error::InvalidInput(format!("unknown record {}", nvc)))?;
        Ok(queries::suggestion_candidates(self.store.pool(), &record, &self.tolerances).await?)
    }

    // ---- sync cycle -------------------------------------------------------

    /// Run one full sync cycle: emails, invoices, received payments, and
    /// outbound payments (concurrently), then the lump-sum pass
    pub async fn run_cycle(&self) -> Result<()> {
        let now = Utc::now();
        let window = FetchWindow::lookback(self.lookback_days, now);
        self.sync_state.cycle_started().await;

        let (emails_r, invoices_r, received_r, payments_r) = tokio::join!(
            self.timed(SourceKind::Email, self.email_step(&window)),
            self.timed(SourceKind::Invoice, self.invoice_step(&window)),
            self.timed(SourceKind::InboundFunding, self.received_step(&window)),
            self.timed(SourceKind::OutboundPayment, self.payment_step(&window)),
        );
        emails_r?;
        invoices_r?;
        received_r?;
        payments_r?;

        // Step 5: strictly after the email and inbound steps have completed
        self.lump_sum_pass(&window).await?;

        self.sync_state.cycle_completed().await;
        metrics::SYNC_CYCLES_TOTAL.inc();
        Ok(())
    }

    /// Bound one sync step by the cycle deadline
    async fn timed<F>(&self, source: SourceKind, step: F) -> Result<()>
    where
        F: Future<Output = Result<()>>,
    {
        match tokio::time::timeout(self.cycle_deadline, step).await {
            Ok(result) => result,
            Err(_) => {
                warn!(%source, "sync step exceeded the cycle deadline");
                self.sync_state
                    .record_error(source, "cycle deadline exceeded")
                    .await;
                metrics::SYNC_ERRORS_TOTAL
                    .with_label_values(&[source.as_str()])
                    .inc();
                Ok(())
            }
        }
    }

    async fn email_step(&self, window: &FetchWindow) -> Result<()> {
        match self.sources.email.fetch(window).await {
            Ok(batch) => {
                let count = batch.len() as u64;
                self.apply_email_batch(&batch).await?;
                self.sync_state.record_ok(SourceKind::Email, count).await;
                Ok(())
            }
            Err(err) => self.record_source_error(SourceKind::Email, err).await,
        }
    }

    async fn invoice_step(&self, window: &FetchWindow) -> Result<()> {
        match self.sources.invoice.fetch(window).await {
            Ok(batch) => {
                let count = (batch.invoices.len() + batch.payruns.len()) as u64;
                self.apply_invoice_batch(&batch).await?;
                self.sync_state.record_ok(SourceKind::Invoice, count).await;
                Ok(())
            }
            Err(err) => self.record_source_error(SourceKind::Invoice, err).await,
        }
    }

    async fn received_step(&self, window: &FetchWindow) -> Result<()> {
        match self.sources.inbound.fetch(window).await {
            Ok(batch) => {
                let count = batch.payments.len() as u64;
                self.apply_received_batch(&batch).await?;
                self.sync_state
                    .record_ok(SourceKind::InboundFunding, count)
                    .await;
                Ok(())
            }
            Err(err) => {
                self.record_source_error(SourceKind::InboundFunding, err)
                    .await
            }
        }
    }

    async fn payment_step(&self, window: &FetchWindow) -> Result<()> {
        match self.sources.outbound.fetch(window).await {
            Ok(batch) => {
                let count = batch.payments.len() as u64;
                self.apply_payment_batch(&batch).await?;
                self.sync_state
                    .record_ok(SourceKind::OutboundPayment, count)
                    .await;
                Ok(())
            }
            Err(err) => {
                self.record_source_error(SourceKind::OutboundPayment, err)
                    .await
            }
        }
    }

    /// Source failures isolate to their source; the cycle continues degraded
    async fn record_source_error(
        &self,
        source: SourceKind,
        err: source_adapters::Error,
    ) -> Result<()> {
        warn!(%source, error = %err, "source sync failed, continuing degraded");
        self.sync_state.record_error(source, err.to_string()).await;
        metrics::SYNC_ERRORS_TOTAL
            .with_label_values(&[source.as_str()])
            .inc();
        Ok(())
    }
}

/// Recompute and store the match status of one record
///
/// Manually resolved records keep their sticky terminal status.
pub(crate) async fn reclassify(
    conn: &mut SqliteConnection,
    tolerances: &Tolerances,
    nvc: &str,
) -> Result<MatchStatus> {
    let record = records::get_record(&mut *conn, nvc)
        .await?
        .ok_or_else(|| recon_store::Error::NotFound(format!("reconciliation record {}", nvc)))?;

    if record.flag == Some(ManualFlag::Resolved) {
        if record.match_status != MatchStatus::Resolved {
            records::set_status(conn, nvc, MatchStatus::Resolved, &record.match_flags, Utc::now())
                .await?;
        }
        return Ok(MatchStatus::Resolved);
    }

    let classification = classify(&record, tolerances);
    let flags = classification.flags_str();
    if classification.status != record.match_status || flags != record.match_flags {
        records::set_status(conn, nvc, classification.status, &flags, Utc::now()).await?;
    }
    Ok(classification.status)
}
