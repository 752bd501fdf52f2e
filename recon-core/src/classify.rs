//! Line-level match classifier
//!
//! `classify` is a pure function of a reconciliation record and the
//! configured tolerances. It never produces `Resolved` (that state is set
//! only by the manual-flag path and preserved by the engine) and it never
//! reads or writes storage.
//!
//! Classification order:
//!
//! 1. Count which legs are present.
//! 2. With legs 1 and 2 both present, an amount divergence beyond tolerance
//!    is `AmountMismatch` and overrides everything else.
//! 3. Within tolerance, a Rejected/Cancelled invoice is `StatusIssue`.
//! 4. Otherwise legs 3 and 4 promote the matched pair toward `Full4Way`.
//!    Comparisons that would cross currencies are skipped and the status
//!    falls back to the strongest class not needing the comparison.
//! 5. Partial leg combinations fall through to the presence-based classes.

use crate::config::Tolerances;
use crate::types::{MatchStatus, ReconciliationRecord};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Marker attached to a classification explaining a skip or an override
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchFlag {
    /// Leg 4 comparison skipped; payment currency differs from reporting
    CrossCurrencySkipped,
    /// Invoice is Rejected
    InvoiceRejected,
    /// Invoice is Cancelled
    InvoiceCancelled,
    /// Leg 4 amount diverges from the remittance amount
    PaymentAmountDivergence,
}

impl MatchFlag {
    /// Storage representation
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchFlag::CrossCurrencySkipped => "cross_currency_skipped",
            MatchFlag::InvoiceRejected => "invoice_rejected",
            MatchFlag::InvoiceCancelled => "invoice_cancelled",
            MatchFlag::PaymentAmountDivergence => "payment_amount_divergence",
        }
    }
}

/// Classifier output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// Derived status
    pub status: MatchStatus,

    /// Flags explaining skips and overrides
    pub flags: Vec<MatchFlag>,
}

impl Classification {
    fn new(status: MatchStatus) -> Self {
        Self {
            status,
            flags: Vec::new(),
        }
    }

    fn with_flags(status: MatchStatus, flags: Vec<MatchFlag>) -> Self {
        Self { status, flags }
    }

    /// Comma-joined flag string for storage
    pub fn flags_str(&self) -> String {
        self.flags
            .iter()
            .map(|f| f.as_str())
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Two amounts are deemed equal within the tolerance (inclusive)
pub fn amounts_match(a: Decimal, b: Decimal, tol: &Tolerances) -> bool {
    (a - b).abs() <= tol.amount_tol
}

/// Derive the match status for a record
pub fn classify(rec: &ReconciliationRecord, tol: &Tolerances) -> Classification {
    match (rec.remittance_amount, rec.invoice_amount) {
        (Some(remit), Some(invoice)) => classify_pair(rec, remit, invoice, tol),
        (Some(_), None) => Classification::new(MatchStatus::RemittanceOnly),
        (None, Some(_)) => {
            if rec.has_payment() {
                Classification::new(MatchStatus::InvoicePaymentOnly)
            } else {
                Classification::new(MatchStatus::InvoiceOnly)
            }
        }
        (None, None) => {
            if rec.has_payment() {
                Classification::new(MatchStatus::PaymentOnly)
            } else {
                Classification::new(MatchStatus::Unmatched)
            }
        }
    }
}

/// Legs 1 and 2 both present
fn classify_pair(
    rec: &ReconciliationRecord,
    remit: Decimal,
    invoice: Decimal,
    tol: &Tolerances,
) -> Classification {
    if !amounts_match(remit, invoice, tol) {
        return Classification::new(MatchStatus::AmountMismatch);
    }

    // Dead invoices never count as matched or mismatched
    if let Some(status) = rec.invoice_status {
        if status.is_dead() {
            let flag = if status == crate::types::InvoiceStatus::Rejected {
                MatchFlag::InvoiceRejected
            } else {
                MatchFlag::InvoiceCancelled
            };
            return Classification::with_flags(MatchStatus::StatusIssue, vec![flag]);
        }
    }

    let has_funding = rec.has_funding();

    match rec.payment_amount {
        Some(payment) => {
            let cross_currency = rec
                .payment_currency
                .as_deref()
                .map(|c| !c.eq_ignore_ascii_case(&tol.reporting_currency))
                .unwrap_or(false);

            if cross_currency {
                // Fall back to the strongest class that needs no
                // cross-currency comparison
                let status = if has_funding {
                    MatchStatus::ThreeWayAwaitingPayment
                } else {
                    MatchStatus::TwoWayMatched
                };
                return Classification::with_flags(status, vec![MatchFlag::CrossCurrencySkipped]);
            }

            if !amounts_match(payment, remit, tol) {
                return Classification::with_flags(
                    MatchStatus::AmountMismatch,
                    vec![MatchFlag::PaymentAmountDivergence],
                );
            }

            if has_funding {
                Classification::new(MatchStatus::Full4Way)
            } else {
                Classification::new(MatchStatus::ThreeWayNoFunding)
            }
        }
        None => {
            if has_funding {
                Classification::new(MatchStatus::ThreeWayAwaitingPayment)
            } else {
                Classification::new(MatchStatus::TwoWayMatched)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::InvoiceStatus;
    use chrono::Utc;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn record(nvc: &str) -> ReconciliationRecord {
        ReconciliationRecord::new(nvc, Utc::now())
    }

    fn tol() -> Tolerances {
        Tolerances::default()
    }

    #[test]
    fn fresh_record_is_unmatched() {
        let rec = record("NVC7KZZZ");
        assert_eq!(classify(&rec, &tol()).status, MatchStatus::Unmatched);
    }

    #[test]
    fn single_leg_classes() {
        let mut rec = record("NVC7KAAA");
        rec.remittance_amount = Some(dec!(4500.00));
        assert_eq!(classify(&rec, &tol()).status, MatchStatus::RemittanceOnly);

        let mut rec = record("NVC7KAAA");
        rec.invoice_amount = Some(dec!(4500.00));
        assert_eq!(classify(&rec, &tol()).status, MatchStatus::InvoiceOnly);

        let mut rec = record("NVC7KAAA");
        rec.payment_amount = Some(dec!(4500.00));
        assert_eq!(classify(&rec, &tol()).status, MatchStatus::PaymentOnly);
    }

    #[test]
    fn invoice_and_payment_without_remittance() {
        let mut rec = record("NVC7KAAA");
        rec.invoice_amount = Some(dec!(4500.00));
        rec.payment_amount = Some(dec!(4500.00));
        assert_eq!(
            classify(&rec, &tol()).status,
            MatchStatus::InvoicePaymentOnly
        );
    }

    #[test]
    fn two_way_within_tolerance() {
        let mut rec = record("NVC7KAAA");
        rec.remittance_amount = Some(dec!(4500.00));
        rec.invoice_amount = Some(dec!(4500.01));
        assert_eq!(classify(&rec, &tol()).status, MatchStatus::TwoWayMatched);
    }

    #[test]
    fn exact_tolerance_boundary_is_matched() {
        // |delta| == amount_tol must match
        let mut rec = record("NVC7KAAA");
        rec.remittance_amount = Some(dec!(100.00));
        rec.invoice_amount = Some(dec!(100.01));
        assert_eq!(classify(&rec, &tol()).status, MatchStatus::TwoWayMatched);

        rec.invoice_amount = Some(dec!(100.02));
        assert_eq!(classify(&rec, &tol()).status, MatchStatus::AmountMismatch);
    }

    #[test]
    fn amount_mismatch() {
        let mut rec = record("NVC7KBBB");
        rec.remittance_amount = Some(dec!(1000.00));
        rec.invoice_amount = Some(dec!(900.00));
        rec.invoice_status = Some(InvoiceStatus::Approved);
        assert_eq!(classify(&rec, &tol()).status, MatchStatus::AmountMismatch);
    }

    #[test]
    fn rejected_invoice_is_status_issue() {
        let mut rec = record("NVC7KCCC");
        rec.remittance_amount = Some(dec!(2000.00));
        rec.invoice_amount = Some(dec!(2000.00));
        rec.invoice_status = Some(InvoiceStatus::Rejected);

        let c = classify(&rec, &tol());
        assert_eq!(c.status, MatchStatus::StatusIssue);
        assert_eq!(c.flags, vec![MatchFlag::InvoiceRejected]);
    }

    #[test]
    fn cancelled_invoice_is_status_issue() {
        let mut rec = record("NVC7KCCC");
        rec.remittance_amount = Some(dec!(2000.00));
        rec.invoice_amount = Some(dec!(2000.00));
        rec.invoice_status = Some(InvoiceStatus::Cancelled);

        let c = classify(&rec, &tol());
        assert_eq!(c.status, MatchStatus::StatusIssue);
        assert_eq!(c.flags, vec![MatchFlag::InvoiceCancelled]);
    }

    #[test]
    fn rejected_with_divergent_amount_is_mismatch() {
        // Divergence wins; StatusIssue applies only when amounts agree
        let mut rec = record("NVC7KCCC");
        rec.remittance_amount = Some(dec!(2000.00));
        rec.invoice_amount = Some(dec!(1500.00));
        rec.invoice_status = Some(InvoiceStatus::Rejected);
        assert_eq!(classify(&rec, &tol()).status, MatchStatus::AmountMismatch);
    }

    #[test]
    fn three_way_awaiting_payment() {
        let mut rec = record("NVC7KAAA");
        rec.remittance_amount = Some(dec!(4500.00));
        rec.invoice_amount = Some(dec!(4500.00));
        rec.invoice_status = Some(InvoiceStatus::Approved);
        rec.received_payment_id = Some("RP-1".to_string());
        rec.received_payment_amount = Some(dec!(4500.00));
        assert_eq!(
            classify(&rec, &tol()).status,
            MatchStatus::ThreeWayAwaitingPayment
        );
    }

    #[test]
    fn three_way_no_funding() {
        let mut rec = record("NVC7KAAA");
        rec.remittance_amount = Some(dec!(4500.00));
        rec.invoice_amount = Some(dec!(4500.00));
        rec.invoice_status = Some(InvoiceStatus::Paid);
        rec.payment_amount = Some(dec!(4500.00));
        rec.payment_currency = Some("USD".to_string());
        assert_eq!(classify(&rec, &tol()).status, MatchStatus::ThreeWayNoFunding);
    }

    #[test]
    fn full_four_way() {
        let mut rec = record("NVC7KAAA");
        rec.remittance_amount = Some(dec!(4500.00));
        rec.invoice_amount = Some(dec!(4500.00));
        rec.invoice_status = Some(InvoiceStatus::Paid);
        rec.received_payment_id = Some("RP-1".to_string());
        rec.received_payment_amount = Some(dec!(4500.00));
        rec.payment_amount = Some(dec!(4500.00));
        rec.payment_currency = Some("USD".to_string());
        assert_eq!(classify(&rec, &tol()).status, MatchStatus::Full4Way);
    }

    #[test]
    fn cross_currency_payment_is_skipped_not_compared() {
        // Leg 4 in GBP: comparison skipped, fall back to the strongest class
        // that does not need it
        let mut rec = record("NVC7KAAA");
        rec.remittance_amount = Some(dec!(4500.00));
        rec.invoice_amount = Some(dec!(4500.00));
        rec.invoice_status = Some(InvoiceStatus::Paid);
        rec.received_payment_id = Some("RP-1".to_string());
        rec.payment_amount = Some(dec!(3600.00));
        rec.payment_currency = Some("GBP".to_string());

        let c = classify(&rec, &tol());
        assert_eq!(c.status, MatchStatus::ThreeWayAwaitingPayment);
        assert_eq!(c.flags, vec![MatchFlag::CrossCurrencySkipped]);

        rec.received_payment_id = None;
        let c = classify(&rec, &tol());
        assert_eq!(c.status, MatchStatus::TwoWayMatched);
        assert_eq!(c.flags, vec![MatchFlag::CrossCurrencySkipped]);
    }

    #[test]
    fn divergent_payment_demotes_to_mismatch() {
        let mut rec = record("NVC7KAAA");
        rec.remittance_amount = Some(dec!(4500.00));
        rec.invoice_amount = Some(dec!(4500.00));
        rec.received_payment_id = Some("RP-1".to_string());
        rec.payment_amount = Some(dec!(4000.00));
        rec.payment_currency = Some("USD".to_string());

        let c = classify(&rec, &tol());
        assert_eq!(c.status, MatchStatus::AmountMismatch);
        assert_eq!(c.flags, vec![MatchFlag::PaymentAmountDivergence]);
    }

    #[test]
    fn flags_str_joins_with_commas() {
        let c = Classification::with_flags(
            MatchStatus::AmountMismatch,
            vec![MatchFlag::InvoiceRejected, MatchFlag::PaymentAmountDivergence],
        );
        assert_eq!(c.flags_str(), "invoice_rejected,payment_amount_divergence");
    }

    proptest! {
        // Determinism: same record, same answer
        #[test]
        fn classify_is_deterministic(
            remit in proptest::option::of(0i64..2_000_000),
            invoice in proptest::option::of(0i64..2_000_000),
            payment in proptest::option::of(0i64..2_000_000),
            funded in proptest::bool::ANY,
        ) {
            let mut rec = record("NVC7KPRP");
            rec.remittance_amount = remit.map(|c| Decimal::new(c, 2));
            rec.invoice_amount = invoice.map(|c| Decimal::new(c, 2));
            rec.payment_amount = payment.map(|c| Decimal::new(c, 2));
            rec.payment_currency = payment.map(|_| "USD".to_string());
            if funded {
                rec.received_payment_id = Some("RP-PROP".to_string());
            }

            let a = classify(&rec, &tol());
            let b = classify(&rec, &tol());
            prop_assert_eq!(a.status, b.status);
            prop_assert_eq!(a.flags, b.flags);
        }

        // The classifier never emits the manual-only terminal state
        #[test]
        fn classify_never_emits_resolved(
            remit in proptest::option::of(0i64..2_000_000),
            invoice in proptest::option::of(0i64..2_000_000),
            payment in proptest::option::of(0i64..2_000_000),
        ) {
            let mut rec = record("NVC7KPRP");
            rec.remittance_amount = remit.map(|c| Decimal::new(c, 2));
            rec.invoice_amount = invoice.map(|c| Decimal::new(c, 2));
            rec.payment_amount = payment.map(|c| Decimal::new(c, 2));
            prop_assert_ne!(classify(&rec, &tol()).status, MatchStatus::Resolved);
        }

        // Without both legs 1 and 2 there is never a matched/mismatched class
        #[test]
        fn pair_classes_require_both_legs(
            amount in 0i64..2_000_000,
            which in 0usize..3,
        ) {
            let mut rec = record("NVC7KPRP");
            match which {
                0 => rec.remittance_amount = Some(Decimal::new(amount, 2)),
                1 => rec.invoice_amount = Some(Decimal::new(amount, 2)),
                _ => rec.payment_amount = Some(Decimal::new(amount, 2)),
            }
            let status = classify(&rec, &tol()).status;
            prop_assert!(!matches!(
                status,
                MatchStatus::TwoWayMatched
                    | MatchStatus::AmountMismatch
                    | MatchStatus::StatusIssue
                    | MatchStatus::Full4Way
            ));
        }
    }
}
