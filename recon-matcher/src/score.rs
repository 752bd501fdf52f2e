//! Weighted lump-sum scoring
//!
//! Score = 0.5 * amount + 0.2 * date + 0.3 * payer. The rungs are calibrated
//! so that an exact-amount same-day alias-hit receipt scores 1.0 and a 5%-off
//! same-day alias-hit receipt still clears the default auto threshold.

use crate::alias::AliasTable;
use crate::payer::extract_payer;
use chrono::NaiveDate;
use recon_core::{CachedEmail, ReceivedPayment, Tolerances};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::debug;

/// Signal weights
const WEIGHT_AMOUNT: f64 = 0.5;
const WEIGHT_DATE: f64 = 0.2;
const WEIGHT_PAYER: f64 = 0.3;

/// Matcher configuration derived from the engine tolerances
#[derive(Debug, Clone)]
pub struct MatcherConfig {
    /// Exact-amount tolerance
    pub amount_tol: Decimal,

    /// Relative divergence scoring 0.7
    pub near_pct: Decimal,

    /// Relative divergence scoring 0.3
    pub far_pct: Decimal,

    /// Date offset (days) scoring 0.5
    pub date_window_days: i64,

    /// Auto-link threshold
    pub auto_match_conf: f64,

    /// Suggest threshold
    pub suggest_conf: f64,
}

impl MatcherConfig {
    /// Derive from the engine tolerances
    pub fn from_tolerances(tol: &Tolerances) -> Self {
        Self {
            amount_tol: tol.amount_tol,
            near_pct: Decimal::new(5, 2),
            far_pct: Decimal::new(10, 2),
            date_window_days: tol.date_window_days,
            auto_match_conf: tol.auto_match_conf,
            suggest_conf: tol.suggest_conf,
        }
    }
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self::from_tolerances(&Tolerances::default())
    }
}

/// Per-signal score breakdown
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MatchScore {
    /// Weighted total in `[0, 1]`
    pub total: f64,

    /// Amount signal
    pub amount: f64,

    /// Date signal
    pub date: f64,

    /// Payer-name signal
    pub payer: f64,
}

/// What to do with a scored candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchDecision {
    /// At or above the auto threshold; the engine applies the link
    AutoLink,
    /// In the suggest band; surfaced to operators only
    Suggest,
    /// Below the suggest threshold
    Unmatched,
}

/// Stateless received-payment to remittance-email scorer
#[derive(Debug, Clone)]
pub struct LumpSumMatcher {
    config: MatcherConfig,
    aliases: AliasTable,
}

impl LumpSumMatcher {
    /// New matcher with the given thresholds and alias table
    pub fn new(config: MatcherConfig, aliases: AliasTable) -> Self {
        Self { config, aliases }
    }

    /// The configured thresholds
    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    /// An email is a candidate only with a parsed total and no manual flag
    /// or existing link
    pub fn is_candidate(email: &CachedEmail) -> bool {
        !email.manual_review
            && email.remittance_total.is_some()
            && email.received_payment_id.is_none()
    }

    /// Score one payment against one email
    ///
    /// Returns `None` for emails that are not lump-sum candidates.
    pub fn score(&self, payment: &ReceivedPayment, email: &CachedEmail) -> Option<MatchScore> {
        if !Self::is_candidate(email) {
            return None;
        }
        let total = email.remittance_total?;

        let amount = self.amount_score(payment.amount, total);
        let date = self.date_score(payment.payment_date, email.email_date.date_naive());
        let payer = self.payer_score(payment, email);

        let score = MatchScore {
            total: WEIGHT_AMOUNT * amount + WEIGHT_DATE * date + WEIGHT_PAYER * payer,
            amount,
            date,
            payer,
        };
        debug!(
            payment_id = %payment.id,
            email_id = %email.id,
            total = score.total,
            "lump-sum score"
        );
        Some(score)
    }

    /// Threshold decision for a total score
    pub fn decide(&self, total: f64) -> MatchDecision {
        if total >= self.config.auto_match_conf {
            MatchDecision::AutoLink
        } else if total >= self.config.suggest_conf {
            MatchDecision::Suggest
        } else {
            MatchDecision::Unmatched
        }
    }

    /// Best-scoring candidate among `emails`, with its score
    pub fn best_match<'a>(
        &self,
        payment: &ReceivedPayment,
        emails: &'a [CachedEmail],
    ) -> Option<(&'a CachedEmail, MatchScore)> {
        let mut best: Option<(&CachedEmail, MatchScore)> = None;
        for email in emails {
            if let Some(score) = self.score(payment, email) {
                match &best {
                    Some((_, current)) if current.total >= score.total => {}
                    _ => best = Some((email, score)),
                }
            }
        }
        best
    }

    fn amount_score(&self, payment: Decimal, total: Decimal) -> f64 {
        let diff = (payment - total).abs();
        if diff <= self.config.amount_tol {
            return 1.0;
        }
        if total.is_zero() {
            return 0.0;
        }
        let rel = diff / total.abs();
        if rel <= self.config.near_pct {
            0.7
        } else if rel <= self.config.far_pct {
            0.3
        } else {
            0.0
        }
    }

    fn date_score(&self, payment_date: NaiveDate, email_date: NaiveDate) -> f64 {
        let days = (payment_date - email_date).num_days().abs();
        if days == 0 {
            1.0
        } else if days == 1 {
            0.8
        } else if days <= self.config.date_window_days {
            0.5
        } else if days <= 7 {
            0.2
        } else {
            0.0
        }
    }

    fn payer_score(&self, payment: &ReceivedPayment, email: &CachedEmail) -> f64 {
        let agency = match email.agency_name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => return 0.0,
        };
        let payer = extract_payer(&payment.payer_info);
        if payer.is_empty() {
            return 0.0;
        }
        self.aliases.similarity(&payer, agency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn email(id: &str, total: Decimal, agency: &str, day: u32) -> CachedEmail {
        CachedEmail {
            id: id.to_string(),
            source: recon_core::RemittanceSource::Oasys,
            subject: format!("Remittance advice {}", id),
            sender: "remit@agency.example".to_string(),
            email_date: Utc.with_ymd_and_hms(2024, 1, day, 9, 0, 0).unwrap(),
            fetched_at: Utc::now(),
            attachment_names: vec!["advice.csv".to_string()],
            remittance_total: Some(total),
            agency_name: Some(agency.to_string()),
            manual_review: false,
            received_payment_id: None,
            match_confidence: None,
            match_method: None,
        }
    }

    fn payment(id: &str, amount: Decimal, payer: &str, day: u32) -> ReceivedPayment {
        ReceivedPayment {
            id: id.to_string(),
            sub_account: "ACCT-01".to_string(),
            amount,
            currency: "USD".to_string(),
            payment_date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            status: "booked".to_string(),
            payer_info: payer.to_string(),
            linked_email_id: None,
            fetched_at: Utc::now(),
        }
    }

    fn matcher() -> LumpSumMatcher {
        let aliases = AliasTable::from_map([("Omnicom Media", vec!["OMNICOM MEDIA GROUP"])]);
        LumpSumMatcher::new(MatcherConfig::default(), aliases)
    }

    #[test]
    fn exact_same_day_alias_payer_scores_one() {
        let m = matcher();
        let e = email("E1", dec!(4500.00), "BBDO USA LLC", 15);
        let p = payment("P1", dec!(4500.00), "BBDO USA LLC DES:ACH PMT ID:0051", 15);

        let score = m.score(&p, &e).unwrap();
        assert_eq!(score.amount, 1.0);
        assert_eq!(score.date, 1.0);
        assert_eq!(score.payer, 1.0);
        assert!((score.total - 1.0).abs() < 1e-9);
        assert_eq!(m.decide(score.total), MatchDecision::AutoLink);
    }

    #[test]
    fn five_percent_off_same_day_alias_hits_auto() {
        // 0.5*0.7 + 0.2*1.0 + 0.3*1.0 = 0.85
        let m = matcher();
        let e = email("E2", dec!(10000.00), "Omnicom Media", 15);
        let p = payment("P2", dec!(10500.00), "OMNICOM MEDIA GROUP", 15);

        let score = m.score(&p, &e).unwrap();
        assert_eq!(score.amount, 0.7);
        assert!((score.total - 0.85).abs() < 1e-9);
        assert_eq!(m.decide(score.total), MatchDecision::AutoLink);
    }

    #[test]
    fn six_percent_off_same_day_alias_is_suggest_only() {
        // 0.5*0.3 + 0.2*1.0 + 0.3*1.0 = 0.65
        let m = matcher();
        let e = email("E2", dec!(10000.00), "Omnicom Media", 15);
        let p = payment("P2", dec!(10600.00), "OMNICOM MEDIA GROUP", 15);

        let score = m.score(&p, &e).unwrap();
        assert_eq!(score.amount, 0.3);
        assert!((score.total - 0.65).abs() < 1e-9);
        assert_eq!(m.decide(score.total), MatchDecision::Suggest);
    }

    #[test]
    fn date_rungs() {
        let m = matcher();
        let e = email("E3", dec!(1000.00), "BBDO USA LLC", 10);

        let same = m.score(&payment("P", dec!(1000.00), "BBDO USA LLC", 10), &e).unwrap();
        assert_eq!(same.date, 1.0);

        let one = m.score(&payment("P", dec!(1000.00), "BBDO USA LLC", 11), &e).unwrap();
        assert_eq!(one.date, 0.8);

        // Exactly the +/-3 day window scores 0.5
        let three = m.score(&payment("P", dec!(1000.00), "BBDO USA LLC", 13), &e).unwrap();
        assert_eq!(three.date, 0.5);

        let seven = m.score(&payment("P", dec!(1000.00), "BBDO USA LLC", 17), &e).unwrap();
        assert_eq!(seven.date, 0.2);

        let nine = m.score(&payment("P", dec!(1000.00), "BBDO USA LLC", 19), &e).unwrap();
        assert_eq!(nine.date, 0.0);
    }

    #[test]
    fn manual_review_email_never_scores() {
        let m = matcher();
        let mut e = email("E4", dec!(1000.00), "BBDO USA LLC", 10);
        e.manual_review = true;
        assert!(m.score(&payment("P", dec!(1000.00), "BBDO USA LLC", 10), &e).is_none());
    }

    #[test]
    fn linked_email_never_scores() {
        let m = matcher();
        let mut e = email("E5", dec!(1000.00), "BBDO USA LLC", 10);
        e.received_payment_id = Some("RP-OTHER".to_string());
        assert!(m.score(&payment("P", dec!(1000.00), "BBDO USA LLC", 10), &e).is_none());
    }

    #[test]
    fn best_match_prefers_higher_score() {
        let m = matcher();
        let close = email("E-CLOSE", dec!(5000.00), "BBDO USA LLC", 15);
        let far = email("E-FAR", dec!(5000.00), "ZENITH OPTIMEDIA", 10);
        let p = payment("P", dec!(5000.00), "BBDO USA LLC DES:ACH", 15);

        let candidates = [far, close];
        let (best, score) = m.best_match(&p, &candidates).unwrap();
        assert_eq!(best.id, "E-CLOSE");
        assert!(score.total > 0.9);
    }
}
