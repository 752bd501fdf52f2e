//! Received-payment (inbound funding) cache repository

use crate::amount::{from_cents, to_cents};
use crate::Result;
use chrono::{DateTime, Utc};
use recon_core::ReceivedPayment;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqliteConnection};

/// Upsert a received payment; the link field is owned by the email
/// repository and survives re-fetches
pub async fn upsert_received_payment(
    conn: &mut SqliteConnection,
    payment: &ReceivedPayment,
    now: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO received_payments (
            id, sub_account, amount_cents, currency, payment_date, status,
            payer_info, fetched_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        ON CONFLICT(id) DO UPDATE SET
            sub_account = excluded.sub_account,
            amount_cents = excluded.amount_cents,
            currency = excluded.currency,
            payment_date = excluded.payment_date,
            status = excluded.status,
            payer_info = excluded.payer_info,
            fetched_at = excluded.fetched_at
        "#,
    )
    .bind(&payment.id)
    .bind(&payment.sub_account)
    .bind(to_cents(payment.amount)?)
    .bind(&payment.currency)
    .bind(payment.payment_date)
    .bind(&payment.status)
    .bind(&payment.payer_info)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Fetch one received payment
pub async fn get_received_payment<'e, E>(exec: E, id: &str) -> Result<Option<ReceivedPayment>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query("SELECT * FROM received_payments WHERE id = ?1")
        .bind(id)
        .fetch_optional(exec)
        .await?;
    row.as_ref().map(received_from_row).transpose()
}

/// Received payments not yet linked to any email
pub async fn unlinked_received_payments<'e, E>(exec: E) -> Result<Vec<ReceivedPayment>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query(
        "SELECT * FROM received_payments WHERE linked_email_id IS NULL ORDER BY payment_date",
    )
    .fetch_all(exec)
    .await?;
    rows.iter().map(received_from_row).collect()
}

pub(crate) fn received_from_row(row: &SqliteRow) -> Result<ReceivedPayment> {
    Ok(ReceivedPayment {
        id: row.try_get("id")?,
        sub_account: row.try_get("sub_account")?,
        amount: from_cents(row.try_get("amount_cents")?),
        currency: row.try_get("currency")?,
        payment_date: row.try_get("payment_date")?,
        status: row.try_get("status")?,
        payer_info: row.try_get("payer_info")?,
        linked_email_id: row.try_get("linked_email_id")?,
        fetched_at: row.try_get("fetched_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Store;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn received(id: &str, cents: i64) -> ReceivedPayment {
        ReceivedPayment {
            id: id.to_string(),
            sub_account: "ACCT-01".to_string(),
            amount: rust_decimal::Decimal::new(cents, 2),
            currency: "USD".to_string(),
            payment_date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            status: "booked".to_string(),
            payer_info: "AGENCY DES:ACH".to_string(),
            linked_email_id: None,
            fetched_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn upsert_and_list_unlinked() {
        let store = Store::open_in_memory().await.unwrap();
        let mut conn = store.pool().acquire().await.unwrap();
        let now = Utc::now();

        upsert_received_payment(&mut conn, &received("RP-1", 450_000), now)
            .await
            .unwrap();
        upsert_received_payment(&mut conn, &received("RP-2", 100_000), now)
            .await
            .unwrap();

        let unlinked = unlinked_received_payments(&mut *conn).await.unwrap();
        assert_eq!(unlinked.len(), 2);
        assert_eq!(unlinked[0].amount, dec!(4500.00));

        // Re-fetch with an amended amount converges
        upsert_received_payment(&mut conn, &received("RP-1", 450_100), now)
            .await
            .unwrap();
        let back = get_received_payment(&mut *conn, "RP-1").await.unwrap().unwrap();
        assert_eq!(back.amount, dec!(4501.00));
    }
}
