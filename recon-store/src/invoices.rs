//! Invoice and pay-run cache repositories

use crate::amount::{from_cents, opt_from_cents, opt_to_cents, to_cents};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use recon_core::{CachedInvoice, CachedPayrun, InvoiceStatus};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqliteConnection};

/// Upsert an invoice row
pub async fn upsert_invoice(
    conn: &mut SqliteConnection,
    invoice: &CachedInvoice,
    now: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO invoices (
            nvc_code, amount_cents, currency, status, tenant, payrun_ref,
            invoice_date, contractor, fetched_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        ON CONFLICT(nvc_code) DO UPDATE SET
            amount_cents = excluded.amount_cents,
            currency = excluded.currency,
            status = excluded.status,
            tenant = excluded.tenant,
            payrun_ref = excluded.payrun_ref,
            invoice_date = excluded.invoice_date,
            contractor = excluded.contractor,
            fetched_at = excluded.fetched_at
        "#,
    )
    .bind(&invoice.nvc_code)
    .bind(to_cents(invoice.amount)?)
    .bind(&invoice.currency)
    .bind(invoice.status.as_str())
    .bind(&invoice.tenant)
    .bind(&invoice.payrun_ref)
    .bind(invoice.invoice_date)
    .bind(&invoice.contractor)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Fetch one invoice
pub async fn get_invoice<'e, E>(exec: E, nvc: &str) -> Result<Option<CachedInvoice>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query("SELECT * FROM invoices WHERE nvc_code = ?1")
        .bind(nvc)
        .fetch_optional(exec)
        .await?;
    row.as_ref().map(invoice_from_row).transpose()
}

/// Upsert a pay-run header
pub async fn upsert_payrun(
    conn: &mut SqliteConnection,
    payrun: &CachedPayrun,
    now: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO payruns (
            payrun_ref, tenant, status, pay_date, total_amount_cents, fetched_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        ON CONFLICT(payrun_ref) DO UPDATE SET
            tenant = excluded.tenant,
            status = excluded.status,
            pay_date = excluded.pay_date,
            total_amount_cents = excluded.total_amount_cents,
            fetched_at = excluded.fetched_at
        "#,
    )
    .bind(&payrun.payrun_ref)
    .bind(&payrun.tenant)
    .bind(&payrun.status)
    .bind(payrun.pay_date)
    .bind(opt_to_cents(payrun.total_amount)?)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Fetch one pay-run header
pub async fn get_payrun<'e, E>(exec: E, payrun_ref: &str) -> Result<Option<CachedPayrun>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query("SELECT * FROM payruns WHERE payrun_ref = ?1")
        .bind(payrun_ref)
        .fetch_optional(exec)
        .await?;
    row.as_ref().map(payrun_from_row).transpose()
}

pub(crate) fn invoice_from_row(row: &SqliteRow) -> Result<CachedInvoice> {
    let status_raw: String = row.try_get("status")?;
    let status = InvoiceStatus::parse(&status_raw)
        .ok_or_else(|| Error::InvalidRow(format!("invoice status '{}'", status_raw)))?;
    Ok(CachedInvoice {
        nvc_code: row.try_get("nvc_code")?,
        amount: from_cents(row.try_get("amount_cents")?),
        currency: row.try_get("currency")?,
        status,
        tenant: row.try_get("tenant")?,
        payrun_ref: row.try_get("payrun_ref")?,
        invoice_date: row.try_get("invoice_date")?,
        contractor: row.try_get("contractor")?,
        fetched_at: row.try_get("fetched_at")?,
    })
}

pub(crate) fn payrun_from_row(row: &SqliteRow) -> Result<CachedPayrun> {
    Ok(CachedPayrun {
        payrun_ref: row.try_get("payrun_ref")?,
        tenant: row.try_get("tenant")?,
        status: row.try_get("status")?,
        pay_date: row.try_get("pay_date")?,
        total_amount: opt_from_cents(row.try_get("total_amount_cents")?),
        fetched_at: row.try_get("fetched_at")?,
    })
}
