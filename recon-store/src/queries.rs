//! Read-model queries
//!
//! Pure projections over the store: the reconciliation queue, the status
//! summary, cross-source search, per-record suggestion candidates, and the
//! dashboard overview. Nothing in this module writes.

use crate::amount::{from_cents, to_cents};
use crate::emails::email_from_row;
use crate::invoices::invoice_from_row;
use crate::payments::payment_from_row;
use crate::received::received_from_row;
use crate::records::record_from_row;
use crate::Result;
use chrono::{DateTime, Duration, Utc};
use recon_core::{
    CachedEmail, CachedInvoice, CachedPayment, InvoiceStatus, MatchStatus, ReceivedPayment,
    ReconciliationRecord, Tolerances,
};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{QueryBuilder, Row, Sqlite};
use std::collections::HashMap;

/// Queue sort orders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueueSort {
    /// Most recently updated first
    #[default]
    LastUpdatedDesc,
    /// Most recently discovered first
    FirstSeenDesc,
    /// Largest remittance amount first
    AmountDesc,
    /// NVC code ascending
    NvcAsc,
}

impl QueueSort {
    fn order_clause(&self) -> &'static str {
        match self {
            QueueSort::LastUpdatedDesc => " ORDER BY last_updated_at DESC",
            QueueSort::FirstSeenDesc => " ORDER BY first_seen_at DESC",
            QueueSort::AmountDesc => " ORDER BY remittance_amount_cents DESC",
            QueueSort::NvcAsc => " ORDER BY nvc_code ASC",
        }
    }

    /// Parse a query-string value
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "last_updated" => Some(QueueSort::LastUpdatedDesc),
            "first_seen" => Some(QueueSort::FirstSeenDesc),
            "amount" => Some(QueueSort::AmountDesc),
            "nvc" => Some(QueueSort::NvcAsc),
            _ => None,
        }
    }
}

/// Queue listing filter
#[derive(Debug, Clone, Default)]
pub struct QueueFilter {
    /// Restrict to one match status
    pub match_status: Option<MatchStatus>,
    /// Restrict to one tenant
    pub tenant: Option<String>,
    /// Restrict to one invoice status
    pub invoice_status: Option<InvoiceStatus>,
    /// Free-text search over NVC, contractor, recipient, and notes
    pub q: Option<String>,
    /// Sort order
    pub sort: QueueSort,
    /// Page size (clamped to 500)
    pub limit: u32,
    /// Page offset
    pub offset: u32,
}

/// Paged queue listing
pub async fn queue<'e, E>(exec: E, filter: &QueueFilter) -> Result<Vec<ReconciliationRecord>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let mut builder: QueryBuilder<'_, Sqlite> =
        QueryBuilder::new("SELECT * FROM reconciliation_records WHERE 1=1");

    if let Some(status) = filter.match_status {
        builder.push(" AND match_status = ").push_bind(status.as_str());
    }
    if let Some(tenant) = &filter.tenant {
        builder.push(" AND invoice_tenant = ").push_bind(tenant.clone());
    }
    if let Some(status) = filter.invoice_status {
        builder.push(" AND invoice_status = ").push_bind(status.as_str());
    }
    if let Some(q) = filter.q.as_deref().filter(|q| !q.is_empty()) {
        let pattern = format!("%{}%", q);
        builder
            .push(" AND (nvc_code LIKE ")
            .push_bind(pattern.clone())
            .push(" OR remittance_contractor LIKE ")
            .push_bind(pattern.clone())
            .push(" OR payment_recipient LIKE ")
            .push_bind(pattern.clone())
            .push(" OR notes LIKE ")
            .push_bind(pattern)
            .push(")");
    }

    builder.push(filter.sort.order_clause());
    let limit = if filter.limit == 0 { 50 } else { filter.limit.min(500) };
    builder.push(" LIMIT ").push_bind(limit);
    builder.push(" OFFSET ").push_bind(filter.offset);

    let rows = builder.build().fetch_all(exec).await?;
    rows.iter().map(record_from_row).collect()
}

/// Counts per match status
#[derive(Debug, Clone, Serialize)]
pub struct StatusSummary {
    /// Rows per status (storage keys)
    pub counts: HashMap<String, i64>,
    /// Total reconciliation rows
    pub total: i64,
}

impl StatusSummary {
    /// Count for one status
    pub fn count(&self, status: MatchStatus) -> i64 {
        self.counts.get(status.as_str()).copied().unwrap_or(0)
    }

    /// Rejected/Cancelled override class, reported apart from matched and
    /// mismatched so nothing is double counted
    pub fn status_issues(&self) -> i64 {
        self.count(MatchStatus::StatusIssue)
    }

    /// Rows in any matched class
    pub fn matched(&self) -> i64 {
        self.count(MatchStatus::TwoWayMatched)
            + self.count(MatchStatus::ThreeWayAwaitingPayment)
            + self.count(MatchStatus::ThreeWayNoFunding)
            + self.count(MatchStatus::Full4Way)
    }

    /// Rows with a diverging amount
    pub fn mismatched(&self) -> i64 {
        self.count(MatchStatus::AmountMismatch)
    }
}

/// Counts per `match_status`; the counts partition the table exactly
pub async fn summary<'e, E>(exec: E) -> Result<StatusSummary>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query(
        "SELECT match_status, COUNT(*) AS n FROM reconciliation_records GROUP BY match_status",
    )
    .fetch_all(exec)
    .await?;

    let mut counts = HashMap::new();
    let mut total = 0i64;
    for row in rows {
        let status: String = row.try_get("match_status")?;
        let n: i64 = row.try_get("n")?;
        total += n;
        *counts.entry(status).or_insert(0) += n;
    }
    Ok(StatusSummary { counts, total })
}

/// Which cache a cross-search runs against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchSource {
    /// Remittance emails
    Emails,
    /// Invoices
    Invoices,
    /// Inbound funding receipts
    ReceivedPayments,
    /// Outbound payments
    Payments,
}

impl SearchSource {
    /// Parse a query-string value
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "emails" => Some(SearchSource::Emails),
            "invoices" => Some(SearchSource::Invoices),
            "received_payments" => Some(SearchSource::ReceivedPayments),
            "payments" => Some(SearchSource::Payments),
            _ => None,
        }
    }
}

/// Cross-search filter
#[derive(Debug, Clone)]
pub struct CrossSearchFilter {
    /// Free-text term
    pub q: Option<String>,
    /// Cache to search
    pub source: SearchSource,
    /// Minimum amount
    pub amount_min: Option<Decimal>,
    /// Maximum amount
    pub amount_max: Option<Decimal>,
    /// Tenant gate (invoices and payments)
    pub tenant: Option<String>,
    /// Result cap (clamped to 200)
    pub limit: u32,
}

/// Cross-search results, shaped per source
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "source", content = "rows", rename_all = "snake_case")]
pub enum CrossSearchResults {
    /// Email rows
    Emails(Vec<CachedEmail>),
    /// Invoice rows
    Invoices(Vec<CachedInvoice>),
    /// Received-payment rows
    ReceivedPayments(Vec<ReceivedPayment>),
    /// Outbound-payment rows
    Payments(Vec<CachedPayment>),
}

/// Search one source cache by text and amount window
pub async fn cross_search<'e, E>(exec: E, filter: &CrossSearchFilter) -> Result<CrossSearchResults>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let limit = if filter.limit == 0 { 50 } else { filter.limit.min(200) };
    let pattern = filter
        .q
        .as_deref()
        .filter(|q| !q.is_empty())
        .map(|q| format!("%{}%", q));
    let min_cents = filter.amount_min.map(to_cents).transpose()?;
    let max_cents = filter.amount_max.map(to_cents).transpose()?;

    match filter.source {
        SearchSource::Emails => {
            let mut b: QueryBuilder<'_, Sqlite> =
                QueryBuilder::new("SELECT * FROM emails WHERE 1=1");
            if let Some(p) = &pattern {
                b.push(" AND (subject LIKE ")
                    .push_bind(p.clone())
                    .push(" OR sender LIKE ")
                    .push_bind(p.clone())
                    .push(" OR agency_name LIKE ")
                    .push_bind(p.clone())
                    .push(")");
            }
            if let Some(min) = min_cents {
                b.push(" AND remittance_total_cents >= ").push_bind(min);
            }
            if let Some(max) = max_cents {
                b.push(" AND remittance_total_cents <= ").push_bind(max);
            }
            b.push(" ORDER BY email_date DESC LIMIT ").push_bind(limit);
            let rows = b.build().fetch_all(exec).await?;
            Ok(CrossSearchResults::Emails(
                rows.iter().map(email_from_row).collect::<Result<_>>()?,
            ))
        }
        SearchSource::Invoices => {
            let mut b: QueryBuilder<'_, Sqlite> =
                QueryBuilder::new("SELECT * FROM invoices WHERE 1=1");
            if let Some(p) = &pattern {
                b.push(" AND (nvc_code LIKE ")
                    .push_bind(p.clone())
                    .push(" OR contractor LIKE ")
                    .push_bind(p.clone())
                    .push(")");
            }
            if let Some(tenant) = &filter.tenant {
                b.push(" AND tenant = ").push_bind(tenant.clone());
            }
            if let Some(min) = min_cents {
                b.push(" AND amount_cents >= ").push_bind(min);
            }
            if let Some(max) = max_cents {
                b.push(" AND amount_cents <= ").push_bind(max);
            }
            b.push(" ORDER BY fetched_at DESC LIMIT ").push_bind(limit);
            let rows = b.build().fetch_all(exec).await?;
            Ok(CrossSearchResults::Invoices(
                rows.iter().map(invoice_from_row).collect::<Result<_>>()?,
            ))
        }
        SearchSource::ReceivedPayments => {
            let mut b: QueryBuilder<'_, Sqlite> =
                QueryBuilder::new("SELECT * FROM received_payments WHERE 1=1");
            if let Some(p) = &pattern {
                b.push(" AND (payer_info LIKE ")
                    .push_bind(p.clone())
                    .push(" OR sub_account LIKE ")
                    .push_bind(p.clone())
                    .push(")");
            }
            if let Some(min) = min_cents {
                b.push(" AND amount_cents >= ").push_bind(min);
            }
            if let Some(max) = max_cents {
                b.push(" AND amount_cents <= ").push_bind(max);
            }
            b.push(" ORDER BY payment_date DESC LIMIT ").push_bind(limit);
            let rows = b.build().fetch_all(exec).await?;
            Ok(CrossSearchResults::ReceivedPayments(
                rows.iter().map(received_from_row).collect::<Result<_>>()?,
            ))
        }
        SearchSource::Payments => {
            let mut b: QueryBuilder<'_, Sqlite> =
                QueryBuilder::new("SELECT * FROM payments WHERE 1=1");
            if let Some(p) = &pattern {
                b.push(" AND (nvc_code LIKE ")
                    .push_bind(p.clone())
                    .push(" OR recipient LIKE ")
                    .push_bind(p.clone())
                    .push(")");
            }
            if let Some(tenant) = &filter.tenant {
                b.push(" AND tenant = ").push_bind(tenant.clone());
            }
            if let Some(min) = min_cents {
                b.push(" AND amount_cents >= ").push_bind(min);
            }
            if let Some(max) = max_cents {
                b.push(" AND amount_cents <= ").push_bind(max);
            }
            b.push(" ORDER BY payment_date DESC LIMIT ").push_bind(limit);
            let rows = b.build().fetch_all(exec).await?;
            Ok(CrossSearchResults::Payments(
                rows.iter().map(payment_from_row).collect::<Result<_>>()?,
            ))
        }
    }
}

/// Suggestion candidates for a record's missing legs
#[derive(Debug, Clone, Default, Serialize)]
pub struct SuggestionCandidates {
    /// Unlinked emails whose totals sit in the amount window (missing leg 1)
    pub emails: Vec<CachedEmail>,
    /// Invoices in the amount window and tenant gate (missing leg 2)
    pub invoices: Vec<CachedInvoice>,
    /// Unlinked receipts in the amount window (missing leg 3)
    pub received_payments: Vec<ReceivedPayment>,
    /// Outbound payments carrying this NVC or in the amount window (missing leg 4)
    pub payments: Vec<CachedPayment>,
}

/// Candidate partners for the record's missing legs
///
/// The amount window is +/-5% around the record's best-known amount. The
/// caller ranks received-payment candidates with the lump-sum matcher; the
/// rest are ordered by amount closeness.
pub async fn suggestion_candidates(
    pool: &sqlx::SqlitePool,
    record: &ReconciliationRecord,
    _tol: &Tolerances,
) -> Result<SuggestionCandidates> {
    let mut out = SuggestionCandidates::default();

    let anchor = record
        .remittance_amount
        .or(record.invoice_amount)
        .or(record.payment_amount);
    let anchor = match anchor {
        Some(a) => a,
        None => return Ok(out),
    };
    let window = anchor.abs() * Decimal::new(5, 2);
    let min = to_cents(anchor - window)?;
    let max = to_cents(anchor + window)?;

    if !record.has_remittance() {
        let rows = sqlx::query(
            r#"
            SELECT * FROM emails
            WHERE received_payment_id IS NULL AND manual_review = 0
              AND remittance_total_cents BETWEEN ?1 AND ?2
            ORDER BY ABS(remittance_total_cents - ?3) LIMIT 10
            "#,
        )
        .bind(min)
        .bind(max)
        .bind(to_cents(anchor)?)
        .fetch_all(pool)
        .await?;
        out.emails = rows.iter().map(email_from_row).collect::<Result<_>>()?;
    }

    if !record.has_invoice() {
        let mut b: QueryBuilder<'_, Sqlite> = QueryBuilder::new(
            "SELECT * FROM invoices WHERE amount_cents BETWEEN ",
        );
        b.push_bind(min).push(" AND ").push_bind(max);
        if let Some(tenant) = &record.invoice_tenant {
            b.push(" AND tenant = ").push_bind(tenant.clone());
        }
        b.push(" ORDER BY ABS(amount_cents - ")
            .push_bind(to_cents(anchor)?)
            .push(") LIMIT 10");
        let rows = b.build().fetch_all(pool).await?;
        out.invoices = rows.iter().map(invoice_from_row).collect::<Result<_>>()?;
    }

    if !record.has_funding() {
        let rows = sqlx::query(
            r#"
            SELECT * FROM received_payments
            WHERE linked_email_id IS NULL
              AND amount_cents BETWEEN ?1 AND ?2
            ORDER BY ABS(amount_cents - ?3) LIMIT 10
            "#,
        )
        .bind(min)
        .bind(max)
        .bind(to_cents(anchor)?)
        .fetch_all(pool)
        .await?;
        out.received_payments = rows.iter().map(received_from_row).collect::<Result<_>>()?;
    }

    if !record.has_payment() {
        let rows = sqlx::query(
            r#"
            SELECT * FROM payments
            WHERE nvc_code = ?1 OR amount_cents BETWEEN ?2 AND ?3
            ORDER BY (nvc_code = ?1) DESC, ABS(amount_cents - ?4) LIMIT 10
            "#,
        )
        .bind(&record.nvc_code)
        .bind(min)
        .bind(max)
        .bind(to_cents(anchor)?)
        .fetch_all(pool)
        .await?;
        out.payments = rows.iter().map(payment_from_row).collect::<Result<_>>()?;
    }

    Ok(out)
}

/// Per-tenant roll-up for the overview
#[derive(Debug, Clone, Serialize)]
pub struct TenantRollup {
    /// Tenant name
    pub tenant: String,
    /// Rows in the window
    pub records: i64,
    /// Invoice total
    pub invoice_total: Decimal,
    /// Rows in a matched class
    pub matched: i64,
    /// Rows with diverging amounts
    pub mismatched: i64,
}

/// Dashboard overview aggregates
#[derive(Debug, Clone, Serialize)]
pub struct Overview {
    /// Window length in days
    pub window_days: i64,
    /// Rows updated inside the window
    pub total_records: i64,
    /// Counts per status inside the window
    pub status_counts: HashMap<String, i64>,
    /// Remittance total inside the window
    pub total_remittance: Decimal,
    /// Invoice total inside the window
    pub total_invoice: Decimal,
    /// Outbound-payment total inside the window
    pub total_payment: Decimal,
    /// Per-tenant roll-ups
    pub tenants: Vec<TenantRollup>,
}

/// Aggregated counts and totals over the recent window
pub async fn overview(
    pool: &sqlx::SqlitePool,
    window_days: i64,
    now: DateTime<Utc>,
) -> Result<Overview> {
    let since = now - Duration::days(window_days);

    let rows = sqlx::query(
        r#"
        SELECT match_status, COUNT(*) AS n,
               COALESCE(SUM(remittance_amount_cents), 0) AS remit_cents,
               COALESCE(SUM(invoice_amount_cents), 0) AS invoice_cents,
               COALESCE(SUM(payment_amount_cents), 0) AS payment_cents
        FROM reconciliation_records
        WHERE last_updated_at >= ?1
        GROUP BY match_status
        "#,
    )
    .bind(since)
    .fetch_all(pool)
    .await?;

    let mut status_counts = HashMap::new();
    let mut total_records = 0i64;
    let mut remit_cents = 0i64;
    let mut invoice_cents = 0i64;
    let mut payment_cents = 0i64;
    for row in rows {
        let status: String = row.try_get("match_status")?;
        let n: i64 = row.try_get("n")?;
        total_records += n;
        remit_cents += row.try_get::<i64, _>("remit_cents")?;
        invoice_cents += row.try_get::<i64, _>("invoice_cents")?;
        payment_cents += row.try_get::<i64, _>("payment_cents")?;
        status_counts.insert(status, n);
    }

    let tenant_rows = sqlx::query(
        r#"
        SELECT invoice_tenant AS tenant, COUNT(*) AS n,
               COALESCE(SUM(invoice_amount_cents), 0) AS invoice_cents,
               SUM(CASE WHEN match_status IN
                   ('2way_matched', '3way_awaiting_payment', '3way_no_funding', 'full_4way')
                   THEN 1 ELSE 0 END) AS matched,
               SUM(CASE WHEN match_status = 'amount_mismatch' THEN 1 ELSE 0 END) AS mismatched
        FROM reconciliation_records
        WHERE invoice_tenant IS NOT NULL AND last_updated_at >= ?1
        GROUP BY invoice_tenant
        ORDER BY invoice_cents DESC
        "#,
    )
    .bind(since)
    .fetch_all(pool)
    .await?;

    let tenants = tenant_rows
        .iter()
        .map(|row| -> Result<TenantRollup> {
            Ok(TenantRollup {
                tenant: row.try_get("tenant")?,
                records: row.try_get("n")?,
                invoice_total: from_cents(row.try_get("invoice_cents")?),
                matched: row.try_get("matched")?,
                mismatched: row.try_get("mismatched")?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Overview {
        window_days,
        total_records,
        status_counts,
        total_remittance: from_cents(remit_cents),
        total_invoice: from_cents(invoice_cents),
        total_payment: from_cents(payment_cents),
        tenants,
    })
}
