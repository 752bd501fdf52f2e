//! Reconciliation-table repository
//!
//! Leg writes are upserts keyed by NVC code: they touch only their own leg's
//! columns plus the audit timestamps, so replaying a batch converges on the
//! same row. Status is written separately by the engine after
//! reclassification.

use crate::amount::{opt_from_cents, to_cents};
use crate::{Error, Result};
use chrono::{DateTime, NaiveDate, Utc};
use recon_core::{
    InvoiceStatus, ManualFlag, MatchStatus, ReceivedPayment, ReconciliationRecord,
    RemittanceSource,
};
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqliteConnection};

/// Leg 1 write
#[derive(Debug, Clone)]
pub struct RemittanceLeg {
    /// Line amount
    pub amount: Decimal,
    /// Email date
    pub date: NaiveDate,
    /// Remittance feed
    pub source: RemittanceSource,
    /// Source email id
    pub email_id: String,
    /// Contractor on the line
    pub contractor: Option<String>,
}

/// Leg 2 write
#[derive(Debug, Clone)]
pub struct InvoiceLeg {
    /// Invoice amount
    pub amount: Decimal,
    /// Invoice status
    pub status: InvoiceStatus,
    /// Operating tenant
    pub tenant: String,
    /// Pay-run reference
    pub payrun_ref: Option<String>,
    /// Currency
    pub currency: String,
}

/// Leg 4 write
#[derive(Debug, Clone)]
pub struct PaymentLeg {
    /// Payment amount
    pub amount: Decimal,
    /// Sub-account
    pub account_id: Option<String>,
    /// Payment date
    pub date: Option<NaiveDate>,
    /// Currency
    pub currency: String,
    /// Processor status
    pub status: String,
    /// Recipient
    pub recipient: Option<String>,
    /// Recipient country
    pub recipient_country: Option<String>,
}

/// A leg that can be nullified ("forgotten") on a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Leg {
    /// Remittance advice
    Remittance,
    /// Invoice
    Invoice,
    /// Inbound funding
    Funding,
    /// Outbound payment
    Payment,
}

/// Upsert the remittance leg of one NVC
pub async fn upsert_remittance_line(
    conn: &mut SqliteConnection,
    nvc: &str,
    leg: &RemittanceLeg,
    now: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO reconciliation_records (
            nvc_code, remittance_amount_cents, remittance_date,
            remittance_source, remittance_email_id, remittance_contractor,
            first_seen_at, last_updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
        ON CONFLICT(nvc_code) DO UPDATE SET
            remittance_amount_cents = excluded.remittance_amount_cents,
            remittance_date = excluded.remittance_date,
            remittance_source = excluded.remittance_source,
            remittance_email_id = excluded.remittance_email_id,
            remittance_contractor = excluded.remittance_contractor,
            last_updated_at = excluded.last_updated_at
        "#,
    )
    .bind(nvc)
    .bind(to_cents(leg.amount)?)
    .bind(leg.date)
    .bind(leg.source.as_str())
    .bind(&leg.email_id)
    .bind(&leg.contractor)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Upsert the invoice leg of one NVC
pub async fn upsert_invoice_leg(
    conn: &mut SqliteConnection,
    nvc: &str,
    leg: &InvoiceLeg,
    now: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO reconciliation_records (
            nvc_code, invoice_amount_cents, invoice_status, invoice_tenant,
            invoice_payrun_ref, invoice_currency, first_seen_at, last_updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
        ON CONFLICT(nvc_code) DO UPDATE SET
            invoice_amount_cents = excluded.invoice_amount_cents,
            invoice_status = excluded.invoice_status,
            invoice_tenant = excluded.invoice_tenant,
            invoice_payrun_ref = excluded.invoice_payrun_ref,
            invoice_currency = excluded.invoice_currency,
            last_updated_at = excluded.last_updated_at
        "#,
    )
    .bind(nvc)
    .bind(to_cents(leg.amount)?)
    .bind(leg.status.as_str())
    .bind(&leg.tenant)
    .bind(&leg.payrun_ref)
    .bind(&leg.currency)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Upsert the outbound-payment leg of one NVC
pub async fn upsert_payment_leg(
    conn: &mut SqliteConnection,
    nvc: &str,
    leg: &PaymentLeg,
    now: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO reconciliation_records (
            nvc_code, payment_amount_cents, payment_account_id, payment_date,
            payment_currency, payment_status, payment_recipient,
            payment_recipient_country, first_seen_at, last_updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
        ON CONFLICT(nvc_code) DO UPDATE SET
            payment_amount_cents = excluded.payment_amount_cents,
            payment_account_id = excluded.payment_account_id,
            payment_date = excluded.payment_date,
            payment_currency = excluded.payment_currency,
            payment_status = excluded.payment_status,
            payment_recipient = excluded.payment_recipient,
            payment_recipient_country = excluded.payment_recipient_country,
            last_updated_at = excluded.last_updated_at
        "#,
    )
    .bind(nvc)
    .bind(to_cents(leg.amount)?)
    .bind(&leg.account_id)
    .bind(leg.date)
    .bind(&leg.currency)
    .bind(&leg.status)
    .bind(&leg.recipient)
    .bind(&leg.recipient_country)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Copy a received payment's funding fields onto every NVC row belonging to
/// the given remittance email; returns the affected NVC codes
pub async fn propagate_funding_to_nvcs(
    conn: &mut SqliteConnection,
    email_id: &str,
    payment: &ReceivedPayment,
    now: DateTime<Utc>,
) -> Result<Vec<String>> {
    sqlx::query(
        r#"
        UPDATE reconciliation_records SET
            received_payment_id = ?1,
            received_payment_amount_cents = ?2,
            received_payment_date = ?3,
            last_updated_at = ?4
        WHERE remittance_email_id = ?5
        "#,
    )
    .bind(&payment.id)
    .bind(to_cents(payment.amount)?)
    .bind(payment.payment_date)
    .bind(now)
    .bind(email_id)
    .execute(&mut *conn)
    .await?;

    nvcs_for_email(conn, email_id).await
}

/// NVC codes whose remittance leg came from the given email
pub async fn nvcs_for_email(
    conn: &mut SqliteConnection,
    email_id: &str,
) -> Result<Vec<String>> {
    let rows = sqlx::query(
        "SELECT nvc_code FROM reconciliation_records WHERE remittance_email_id = ?1",
    )
    .bind(email_id)
    .fetch_all(&mut *conn)
    .await?;
    rows.iter()
        .map(|row| row.try_get("nvc_code").map_err(Error::from))
        .collect()
}

/// Store a freshly computed classification
pub async fn set_status(
    conn: &mut SqliteConnection,
    nvc: &str,
    status: MatchStatus,
    flags: &str,
    now: DateTime<Utc>,
) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE reconciliation_records
        SET match_status = ?1, match_flags = ?2, last_updated_at = ?3
        WHERE nvc_code = ?4
        "#,
    )
    .bind(status.as_str())
    .bind(flags)
    .bind(now)
    .bind(nvc)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("reconciliation record {}", nvc)));
    }
    Ok(())
}

/// Set or clear the manual follow-up flag
///
/// `resolved` stamps `resolved_at`/`resolved_by`; clearing the flag clears
/// them. Status changes are the engine's responsibility.
pub async fn set_manual_flag(
    conn: &mut SqliteConnection,
    nvc: &str,
    flag: Option<ManualFlag>,
    notes: Option<&str>,
    actor: Option<&str>,
    now: DateTime<Utc>,
) -> Result<()> {
    let resolved = flag == Some(ManualFlag::Resolved);
    let result = sqlx::query(
        r#"
        UPDATE reconciliation_records SET
            flag = ?1,
            flag_notes = CASE
                WHEN ?2 IS NULL THEN flag_notes
                WHEN flag_notes IS NULL OR flag_notes = '' THEN ?2
                ELSE flag_notes || char(10) || ?2
            END,
            resolved_at = CASE WHEN ?3 THEN ?4 ELSE NULL END,
            resolved_by = CASE WHEN ?3 THEN ?5 ELSE NULL END,
            last_updated_at = ?4
        WHERE nvc_code = ?6
        "#,
    )
    .bind(flag.map(|f| f.as_str()))
    .bind(notes)
    .bind(resolved)
    .bind(now)
    .bind(actor)
    .bind(nvc)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("reconciliation record {}", nvc)));
    }
    Ok(())
}

/// Append to the free-text notes
pub async fn append_note(
    conn: &mut SqliteConnection,
    nvc: &str,
    note: &str,
    now: DateTime<Utc>,
) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE reconciliation_records SET
            notes = CASE
                WHEN notes IS NULL OR notes = '' THEN ?1
                ELSE notes || char(10) || ?1
            END,
            last_updated_at = ?2
        WHERE nvc_code = ?3
        "#,
    )
    .bind(note)
    .bind(now)
    .bind(nvc)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("reconciliation record {}", nvc)));
    }
    Ok(())
}

/// Forget one leg of a record; the caller must reclassify afterwards
pub async fn nullify_leg(
    conn: &mut SqliteConnection,
    nvc: &str,
    leg: Leg,
    now: DateTime<Utc>,
) -> Result<()> {
    let sql = match leg {
        Leg::Remittance => {
            r#"UPDATE reconciliation_records SET
                remittance_amount_cents = NULL, remittance_date = NULL,
                remittance_source = NULL, remittance_email_id = NULL,
                remittance_contractor = NULL, last_updated_at = ?1
            WHERE nvc_code = ?2"#
        }
        Leg::Invoice => {
            r#"UPDATE reconciliation_records SET
                invoice_amount_cents = NULL, invoice_status = NULL,
                invoice_tenant = NULL, invoice_payrun_ref = NULL,
                invoice_currency = NULL, last_updated_at = ?1
            WHERE nvc_code = ?2"#
        }
        Leg::Funding => {
            r#"UPDATE reconciliation_records SET
                received_payment_id = NULL, received_payment_amount_cents = NULL,
                received_payment_date = NULL, last_updated_at = ?1
            WHERE nvc_code = ?2"#
        }
        Leg::Payment => {
            r#"UPDATE reconciliation_records SET
                payment_amount_cents = NULL, payment_account_id = NULL,
                payment_date = NULL, payment_currency = NULL,
                payment_status = NULL, payment_recipient = NULL,
                payment_recipient_country = NULL, last_updated_at = ?1
            WHERE nvc_code = ?2"#
        }
    };

    let result = sqlx::query(sql)
        .bind(now)
        .bind(nvc)
        .execute(&mut *conn)
        .await?;
    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("reconciliation record {}", nvc)));
    }
    Ok(())
}

/// Fetch one record
pub async fn get_record<'e, E>(exec: E, nvc: &str) -> Result<Option<ReconciliationRecord>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query("SELECT * FROM reconciliation_records WHERE nvc_code = ?1")
        .bind(nvc)
        .fetch_optional(exec)
        .await?;
    row.as_ref().map(record_from_row).transpose()
}

/// Total number of reconciliation rows
pub async fn count_records<'e, E>(exec: E) -> Result<i64>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query("SELECT COUNT(*) AS n FROM reconciliation_records")
        .fetch_one(exec)
        .await?;
    Ok(row.try_get("n")?)
}

/// Decode a reconciliation row
pub(crate) fn record_from_row(row: &SqliteRow) -> Result<ReconciliationRecord> {
    Ok(ReconciliationRecord {
        nvc_code: row.try_get("nvc_code")?,
        remittance_amount: opt_from_cents(row.try_get("remittance_amount_cents")?),
        remittance_date: row.try_get("remittance_date")?,
        remittance_source: row
            .try_get::<Option<String>, _>("remittance_source")?
            .as_deref()
            .and_then(RemittanceSource::parse),
        remittance_email_id: row.try_get("remittance_email_id")?,
        remittance_contractor: row.try_get("remittance_contractor")?,
        invoice_amount: opt_from_cents(row.try_get("invoice_amount_cents")?),
        invoice_status: row
            .try_get::<Option<String>, _>("invoice_status")?
            .as_deref()
            .and_then(InvoiceStatus::parse),
        invoice_tenant: row.try_get("invoice_tenant")?,
        invoice_payrun_ref: row.try_get("invoice_payrun_ref")?,
        invoice_currency: row.try_get("invoice_currency")?,
        received_payment_id: row.try_get("received_payment_id")?,
        received_payment_amount: opt_from_cents(row.try_get("received_payment_amount_cents")?),
        received_payment_date: row.try_get("received_payment_date")?,
        payment_amount: opt_from_cents(row.try_get("payment_amount_cents")?),
        payment_account_id: row.try_get("payment_account_id")?,
        payment_date: row.try_get("payment_date")?,
        payment_currency: row.try_get("payment_currency")?,
        payment_status: row.try_get("payment_status")?,
        payment_recipient: row.try_get("payment_recipient")?,
        payment_recipient_country: row.try_get("payment_recipient_country")?,
        match_status: MatchStatus::parse_or_unmatched(
            &row.try_get::<String, _>("match_status")?,
        ),
        match_flags: row.try_get("match_flags")?,
        flag: row
            .try_get::<Option<String>, _>("flag")?
            .as_deref()
            .and_then(ManualFlag::parse),
        flag_notes: row.try_get("flag_notes")?,
        notes: row.try_get("notes")?,
        resolved_at: row.try_get("resolved_at")?,
        resolved_by: row.try_get("resolved_by")?,
        first_seen_at: row.try_get("first_seen_at")?,
        last_updated_at: row.try_get("last_updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Store;
    use rust_decimal_macros::dec;

    fn remit_leg(email: &str, amount: Decimal) -> RemittanceLeg {
        RemittanceLeg {
            amount,
            date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            source: RemittanceSource::Oasys,
            email_id: email.to_string(),
            contractor: Some("Jane Doe".to_string()),
        }
    }

    fn invoice_leg(amount: Decimal) -> InvoiceLeg {
        InvoiceLeg {
            amount,
            status: InvoiceStatus::Approved,
            tenant: "mediaco-us".to_string(),
            payrun_ref: Some("PR-77".to_string()),
            currency: "USD".to_string(),
        }
    }

    #[tokio::test]
    async fn upsert_creates_then_updates() {
        let store = Store::open_in_memory().await.unwrap();
        let mut conn = store.pool().acquire().await.unwrap();
        let now = Utc::now();

        upsert_remittance_line(&mut conn, "NVC7KAAA", &remit_leg("E1", dec!(4500.00)), now)
            .await
            .unwrap();
        let rec = get_record(&mut *conn, "NVC7KAAA").await.unwrap().unwrap();
        assert_eq!(rec.remittance_amount, Some(dec!(4500.00)));
        assert_eq!(rec.remittance_email_id.as_deref(), Some("E1"));
        assert!(rec.invoice_amount.is_none());

        // Replay with a corrected amount updates in place
        let later = now + chrono::Duration::seconds(1);
        upsert_remittance_line(&mut conn, "NVC7KAAA", &remit_leg("E1", dec!(4600.00)), later)
            .await
            .unwrap();
        let rec = get_record(&mut *conn, "NVC7KAAA").await.unwrap().unwrap();
        assert_eq!(rec.remittance_amount, Some(dec!(4600.00)));
        assert!(rec.first_seen_at <= rec.last_updated_at);
        assert_eq!(count_records(&mut *conn).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn legs_do_not_clobber_each_other() {
        let store = Store::open_in_memory().await.unwrap();
        let mut conn = store.pool().acquire().await.unwrap();
        let now = Utc::now();

        upsert_remittance_line(&mut conn, "NVC7KBBB", &remit_leg("E2", dec!(1000.00)), now)
            .await
            .unwrap();
        upsert_invoice_leg(&mut conn, "NVC7KBBB", &invoice_leg(dec!(900.00)), now)
            .await
            .unwrap();

        let rec = get_record(&mut *conn, "NVC7KBBB").await.unwrap().unwrap();
        assert_eq!(rec.remittance_amount, Some(dec!(1000.00)));
        assert_eq!(rec.invoice_amount, Some(dec!(900.00)));
        assert_eq!(rec.invoice_status, Some(InvoiceStatus::Approved));
    }

    #[tokio::test]
    async fn set_status_requires_existing_row() {
        let store = Store::open_in_memory().await.unwrap();
        let mut conn = store.pool().acquire().await.unwrap();
        let err = set_status(&mut conn, "NVC7KNONE", MatchStatus::Unmatched, "", Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn manual_flag_resolved_stamps_audit_fields() {
        let store = Store::open_in_memory().await.unwrap();
        let mut conn = store.pool().acquire().await.unwrap();
        let now = Utc::now();

        upsert_remittance_line(&mut conn, "NVC7KCCC", &remit_leg("E3", dec!(10.00)), now)
            .await
            .unwrap();
        set_manual_flag(
            &mut conn,
            "NVC7KCCC",
            Some(ManualFlag::Resolved),
            Some("paid out of band"),
            Some("ops@remitrail"),
            now,
        )
        .await
        .unwrap();

        let rec = get_record(&mut *conn, "NVC7KCCC").await.unwrap().unwrap();
        assert_eq!(rec.flag, Some(ManualFlag::Resolved));
        assert!(rec.resolved_at.is_some());
        assert_eq!(rec.resolved_by.as_deref(), Some("ops@remitrail"));
        assert_eq!(rec.flag_notes.as_deref(), Some("paid out of band"));

        // Clearing the flag clears the resolution stamp and appends nothing
        set_manual_flag(&mut conn, "NVC7KCCC", None, None, None, now)
            .await
            .unwrap();
        let rec = get_record(&mut *conn, "NVC7KCCC").await.unwrap().unwrap();
        assert_eq!(rec.flag, None);
        assert!(rec.resolved_at.is_none());
        assert_eq!(rec.flag_notes.as_deref(), Some("paid out of band"));
    }

    #[tokio::test]
    async fn notes_append_with_newlines() {
        let store = Store::open_in_memory().await.unwrap();
        let mut conn = store.pool().acquire().await.unwrap();
        let now = Utc::now();

        upsert_invoice_leg(&mut conn, "NVC7KDDD", &invoice_leg(dec!(1.00)), now)
            .await
            .unwrap();
        append_note(&mut conn, "NVC7KDDD", "first", now).await.unwrap();
        append_note(&mut conn, "NVC7KDDD", "second", now).await.unwrap();

        let rec = get_record(&mut *conn, "NVC7KDDD").await.unwrap().unwrap();
        assert_eq!(rec.notes.as_deref(), Some("first\nsecond"));
    }

    #[tokio::test]
    async fn nullify_funding_leg() {
        let store = Store::open_in_memory().await.unwrap();
        let mut conn = store.pool().acquire().await.unwrap();
        let now = Utc::now();

        upsert_remittance_line(&mut conn, "NVC7KEEE", &remit_leg("E9", dec!(50.00)), now)
            .await
            .unwrap();
        let rp = ReceivedPayment {
            id: "RP-9".to_string(),
            sub_account: "ACCT-01".to_string(),
            amount: dec!(50.00),
            currency: "USD".to_string(),
            payment_date: NaiveDate::from_ymd_opt(2024, 1, 16).unwrap(),
            status: "booked".to_string(),
            payer_info: "AGENCY".to_string(),
            linked_email_id: Some("E9".to_string()),
            fetched_at: now,
        };
        let affected = propagate_funding_to_nvcs(&mut conn, "E9", &rp, now)
            .await
            .unwrap();
        assert_eq!(affected, vec!["NVC7KEEE".to_string()]);

        let rec = get_record(&mut *conn, "NVC7KEEE").await.unwrap().unwrap();
        assert_eq!(rec.received_payment_id.as_deref(), Some("RP-9"));
        assert_eq!(rec.received_payment_amount, Some(dec!(50.00)));

        nullify_leg(&mut conn, "NVC7KEEE", Leg::Funding, now).await.unwrap();
        let rec = get_record(&mut *conn, "NVC7KEEE").await.unwrap().unwrap();
        assert!(rec.received_payment_id.is_none());
        assert!(rec.received_payment_amount.is_none());
    }
}
