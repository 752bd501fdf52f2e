//! Outbound-payment cache repository

use crate::amount::{from_cents, to_cents};
use crate::Result;
use chrono::{DateTime, Utc};
use recon_core::CachedPayment;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqliteConnection};

/// Upsert an outbound payment
pub async fn upsert_payment(
    conn: &mut SqliteConnection,
    payment: &CachedPayment,
    now: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO payments (
            id, nvc_code, tenant, amount_cents, currency, status, recipient,
            recipient_country, account_id, payment_date, fetched_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        ON CONFLICT(id) DO UPDATE SET
            nvc_code = excluded.nvc_code,
            tenant = excluded.tenant,
            amount_cents = excluded.amount_cents,
            currency = excluded.currency,
            status = excluded.status,
            recipient = excluded.recipient,
            recipient_country = excluded.recipient_country,
            account_id = excluded.account_id,
            payment_date = excluded.payment_date,
            fetched_at = excluded.fetched_at
        "#,
    )
    .bind(&payment.id)
    .bind(&payment.nvc_code)
    .bind(&payment.tenant)
    .bind(to_cents(payment.amount)?)
    .bind(&payment.currency)
    .bind(&payment.status)
    .bind(&payment.recipient)
    .bind(&payment.recipient_country)
    .bind(&payment.account_id)
    .bind(payment.payment_date)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Fetch one outbound payment by processor reference
pub async fn get_payment<'e, E>(exec: E, id: &str) -> Result<Option<CachedPayment>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query("SELECT * FROM payments WHERE id = ?1")
        .bind(id)
        .fetch_optional(exec)
        .await?;
    row.as_ref().map(payment_from_row).transpose()
}

/// All outbound payments carrying the given NVC code
pub async fn payments_for_nvc<'e, E>(exec: E, nvc: &str) -> Result<Vec<CachedPayment>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query("SELECT * FROM payments WHERE nvc_code = ?1 ORDER BY payment_date")
        .bind(nvc)
        .fetch_all(exec)
        .await?;
    rows.iter().map(payment_from_row).collect()
}

pub(crate) fn payment_from_row(row: &SqliteRow) -> Result<CachedPayment> {
    Ok(CachedPayment {
        id: row.try_get("id")?,
        nvc_code: row.try_get("nvc_code")?,
        tenant: row.try_get("tenant")?,
        amount: from_cents(row.try_get("amount_cents")?),
        currency: row.try_get("currency")?,
        status: row.try_get("status")?,
        recipient: row.try_get("recipient")?,
        recipient_country: row.try_get("recipient_country")?,
        account_id: row.try_get("account_id")?,
        payment_date: row.try_get("payment_date")?,
        fetched_at: row.try_get("fetched_at")?,
    })
}
