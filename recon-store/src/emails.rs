//! Email cache repository
//!
//! Emails are created on first observation and updated on re-observation;
//! the engine never deletes them. Link fields (`received_payment_id`,
//! confidence, method) are written only by [`link_received_payment`] so a
//! re-fetch can never clobber an established link.

use crate::amount::{opt_from_cents, opt_to_cents};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use recon_core::{CachedEmail, LinkMethod, RemittanceSource};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqliteConnection};

/// Attachment names are stored joined; none of the sources emit this byte
const ATTACHMENT_SEP: char = '\u{1f}';

/// Upsert an observed email
pub async fn upsert_email(
    conn: &mut SqliteConnection,
    email: &CachedEmail,
    now: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO emails (
            id, source, subject, sender, email_date, fetched_at,
            attachment_names, remittance_total_cents, agency_name,
            manual_review
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        ON CONFLICT(id) DO UPDATE SET
            source = excluded.source,
            subject = excluded.subject,
            sender = excluded.sender,
            email_date = excluded.email_date,
            fetched_at = excluded.fetched_at,
            attachment_names = excluded.attachment_names,
            remittance_total_cents = excluded.remittance_total_cents,
            agency_name = excluded.agency_name,
            manual_review = excluded.manual_review
        "#,
    )
    .bind(&email.id)
    .bind(email.source.as_str())
    .bind(&email.subject)
    .bind(&email.sender)
    .bind(email.email_date)
    .bind(now)
    .bind(join_attachments(&email.attachment_names))
    .bind(opt_to_cents(email.remittance_total)?)
    .bind(&email.agency_name)
    .bind(email.manual_review)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Fetch one email
pub async fn get_email<'e, E>(exec: E, id: &str) -> Result<Option<CachedEmail>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query("SELECT * FROM emails WHERE id = ?1")
        .bind(id)
        .fetch_optional(exec)
        .await?;
    row.as_ref().map(email_from_row).transpose()
}

/// Emails eligible for lump-sum matching inside the window:
/// unlinked, parsed, not flagged for manual review
pub async fn unlinked_candidate_emails<'e, E>(
    exec: E,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
) -> Result<Vec<CachedEmail>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query(
        r#"
        SELECT * FROM emails
        WHERE received_payment_id IS NULL
          AND manual_review = 0
          AND remittance_total_cents IS NOT NULL
          AND email_date >= ?1 AND email_date <= ?2
        ORDER BY email_date
        "#,
    )
    .bind(window_start)
    .bind(window_end)
    .fetch_all(exec)
    .await?;
    rows.iter().map(email_from_row).collect()
}

/// Link a received payment to an email (1:1 both ways)
///
/// Fails with [`Error::LinkConflict`] if either side is already linked to a
/// different partner; re-linking the same pair is a no-op (idempotent).
pub async fn link_received_payment(
    conn: &mut SqliteConnection,
    email_id: &str,
    received_payment_id: &str,
    confidence: f64,
    method: LinkMethod,
) -> Result<()> {
    let email = get_email(&mut *conn, email_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("email {}", email_id)))?;
    match email.received_payment_id.as_deref() {
        Some(existing) if existing == received_payment_id => return Ok(()),
        Some(existing) => {
            return Err(Error::LinkConflict(format!(
                "email {} already linked to received payment {}",
                email_id, existing
            )))
        }
        None => {}
    }

    let linked_email: Option<String> = sqlx::query(
        "SELECT linked_email_id FROM received_payments WHERE id = ?1",
    )
    .bind(received_payment_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| Error::NotFound(format!("received payment {}", received_payment_id)))?
    .try_get("linked_email_id")?;
    if let Some(existing) = linked_email {
        if existing != email_id {
            return Err(Error::LinkConflict(format!(
                "received payment {} already linked to email {}",
                received_payment_id, existing
            )));
        }
    }

    sqlx::query(
        r#"
        UPDATE emails
        SET received_payment_id = ?1, match_confidence = ?2, match_method = ?3
        WHERE id = ?4
        "#,
    )
    .bind(received_payment_id)
    .bind(confidence)
    .bind(method.as_str())
    .bind(email_id)
    .execute(&mut *conn)
    .await?;

    sqlx::query("UPDATE received_payments SET linked_email_id = ?1 WHERE id = ?2")
        .bind(email_id)
        .bind(received_payment_id)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

fn join_attachments(names: &[String]) -> String {
    names.join(&ATTACHMENT_SEP.to_string())
}

fn split_attachments(joined: &str) -> Vec<String> {
    if joined.is_empty() {
        return Vec::new();
    }
    joined.split(ATTACHMENT_SEP).map(str::to_string).collect()
}

pub(crate) fn email_from_row(row: &SqliteRow) -> Result<CachedEmail> {
    let source_raw: String = row.try_get("source")?;
    let source = RemittanceSource::parse(&source_raw)
        .ok_or_else(|| Error::InvalidRow(format!("email source '{}'", source_raw)))?;
    Ok(CachedEmail {
        id: row.try_get("id")?,
        source,
        subject: row.try_get("subject")?,
        sender: row.try_get("sender")?,
        email_date: row.try_get("email_date")?,
        fetched_at: row.try_get("fetched_at")?,
        attachment_names: split_attachments(&row.try_get::<String, _>("attachment_names")?),
        remittance_total: opt_from_cents(row.try_get("remittance_total_cents")?),
        agency_name: row.try_get("agency_name")?,
        manual_review: row.try_get("manual_review")?,
        received_payment_id: row.try_get("received_payment_id")?,
        match_confidence: row.try_get("match_confidence")?,
        match_method: row
            .try_get::<Option<String>, _>("match_method")?
            .as_deref()
            .and_then(LinkMethod::parse),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::received::upsert_received_payment;
    use crate::Store;
    use chrono::TimeZone;
    use recon_core::ReceivedPayment;
    use rust_decimal_macros::dec;

    fn email(id: &str) -> CachedEmail {
        CachedEmail {
            id: id.to_string(),
            source: RemittanceSource::Oasys,
            subject: "Remittance advice".to_string(),
            sender: "remit@bbdo.example".to_string(),
            email_date: Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).unwrap(),
            fetched_at: Utc::now(),
            attachment_names: vec!["advice.csv".to_string(), "cover.pdf".to_string()],
            remittance_total: Some(dec!(4500.00)),
            agency_name: Some("BBDO USA LLC".to_string()),
            manual_review: false,
            received_payment_id: None,
            match_confidence: None,
            match_method: None,
        }
    }

    fn received(id: &str) -> ReceivedPayment {
        ReceivedPayment {
            id: id.to_string(),
            sub_account: "ACCT-01".to_string(),
            amount: dec!(4500.00),
            currency: "USD".to_string(),
            payment_date: chrono::NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            status: "booked".to_string(),
            payer_info: "BBDO USA LLC DES:ACH".to_string(),
            linked_email_id: None,
            fetched_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn upsert_round_trips_attachments() {
        let store = Store::open_in_memory().await.unwrap();
        let mut conn = store.pool().acquire().await.unwrap();

        upsert_email(&mut conn, &email("E1"), Utc::now()).await.unwrap();
        let back = get_email(&mut *conn, "E1").await.unwrap().unwrap();
        assert_eq!(back.attachment_names, vec!["advice.csv", "cover.pdf"]);
        assert_eq!(back.remittance_total, Some(dec!(4500.00)));
    }

    #[tokio::test]
    async fn refetch_does_not_clobber_link() {
        let store = Store::open_in_memory().await.unwrap();
        let mut conn = store.pool().acquire().await.unwrap();
        let now = Utc::now();

        upsert_email(&mut conn, &email("E1"), now).await.unwrap();
        upsert_received_payment(&mut conn, &received("RP-1"), now).await.unwrap();
        link_received_payment(&mut conn, "E1", "RP-1", 0.95, LinkMethod::Auto)
            .await
            .unwrap();

        // Same email observed again on the next cycle
        upsert_email(&mut conn, &email("E1"), now).await.unwrap();
        let back = get_email(&mut *conn, "E1").await.unwrap().unwrap();
        assert_eq!(back.received_payment_id.as_deref(), Some("RP-1"));
        assert_eq!(back.match_method, Some(LinkMethod::Auto));
    }

    #[tokio::test]
    async fn link_is_idempotent_but_exclusive() {
        let store = Store::open_in_memory().await.unwrap();
        let mut conn = store.pool().acquire().await.unwrap();
        let now = Utc::now();

        upsert_email(&mut conn, &email("E1"), now).await.unwrap();
        upsert_email(&mut conn, &email("E2"), now).await.unwrap();
        upsert_received_payment(&mut conn, &received("RP-1"), now).await.unwrap();
        upsert_received_payment(&mut conn, &received("RP-2"), now).await.unwrap();

        link_received_payment(&mut conn, "E1", "RP-1", 0.9, LinkMethod::Auto)
            .await
            .unwrap();
        // Replaying the same link is fine
        link_received_payment(&mut conn, "E1", "RP-1", 0.9, LinkMethod::Auto)
            .await
            .unwrap();

        // A second payment cannot take a linked email
        let err = link_received_payment(&mut conn, "E1", "RP-2", 0.9, LinkMethod::Auto)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::LinkConflict(_)));

        // A linked payment cannot take a second email
        let err = link_received_payment(&mut conn, "E2", "RP-1", 0.9, LinkMethod::Auto)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::LinkConflict(_)));
    }

    #[tokio::test]
    async fn candidate_query_excludes_manual_review_and_linked() {
        let store = Store::open_in_memory().await.unwrap();
        let mut conn = store.pool().acquire().await.unwrap();
        let now = Utc::now();

        upsert_email(&mut conn, &email("E1"), now).await.unwrap();

        let mut flagged = email("E2");
        flagged.manual_review = true;
        flagged.remittance_total = None;
        upsert_email(&mut conn, &flagged, now).await.unwrap();

        upsert_received_payment(&mut conn, &received("RP-1"), now).await.unwrap();
        link_received_payment(&mut conn, "E1", "RP-1", 0.9, LinkMethod::Auto)
            .await
            .unwrap();

        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        let candidates = unlinked_candidate_emails(&mut *conn, start, end)
            .await
            .unwrap();
        assert!(candidates.is_empty());
    }
}
