//! Reconciliation data model
//!
//! The central entity is [`ReconciliationRecord`], keyed by NVC code. The
//! cached source entities (`Cached*`, [`ReceivedPayment`]) mirror the shape
//! returned by the respective source adapters; inside the engine their only
//! role is to feed upserts into the reconciliation table and serve read
//! queries.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Derived match status of a reconciliation record
///
/// Closed enumeration; unknown strings read back from storage map to
/// [`MatchStatus::Unmatched`] so that schema evolution never panics a reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchStatus {
    /// All four legs present and in agreement
    #[serde(rename = "full_4way")]
    Full4Way,

    /// Remittance + invoice + funding present, outbound payment missing
    #[serde(rename = "3way_awaiting_payment")]
    ThreeWayAwaitingPayment,

    /// Remittance + invoice + outbound payment present, funding missing
    #[serde(rename = "3way_no_funding")]
    ThreeWayNoFunding,

    /// Remittance + invoice present, amounts within tolerance
    #[serde(rename = "2way_matched")]
    TwoWayMatched,

    /// Remittance + invoice present, amounts diverge beyond tolerance
    #[serde(rename = "amount_mismatch")]
    AmountMismatch,

    /// Amounts agree but the invoice is Rejected or Cancelled
    #[serde(rename = "status_issue")]
    StatusIssue,

    /// Invoice + outbound payment present, no remittance
    #[serde(rename = "invoice_payment_only")]
    InvoicePaymentOnly,

    /// Only the remittance leg present
    #[serde(rename = "remittance_only")]
    RemittanceOnly,

    /// Only the invoice leg present
    #[serde(rename = "invoice_only")]
    InvoiceOnly,

    /// Only the outbound payment leg present
    #[serde(rename = "payment_only")]
    PaymentOnly,

    /// No leg present (or nothing classifiable)
    #[serde(rename = "unmatched")]
    Unmatched,

    /// Manually resolved; sticky terminal state
    #[serde(rename = "resolved")]
    Resolved,
}

impl MatchStatus {
    /// Storage/wire representation
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::Full4Way => "full_4way",
            MatchStatus::ThreeWayAwaitingPayment => "3way_awaiting_payment",
            MatchStatus::ThreeWayNoFunding => "3way_no_funding",
            MatchStatus::TwoWayMatched => "2way_matched",
            MatchStatus::AmountMismatch => "amount_mismatch",
            MatchStatus::StatusIssue => "status_issue",
            MatchStatus::InvoicePaymentOnly => "invoice_payment_only",
            MatchStatus::RemittanceOnly => "remittance_only",
            MatchStatus::InvoiceOnly => "invoice_only",
            MatchStatus::PaymentOnly => "payment_only",
            MatchStatus::Unmatched => "unmatched",
            MatchStatus::Resolved => "resolved",
        }
    }

    /// Parse a stored value; unknowns map to `Unmatched`
    pub fn parse_or_unmatched(s: &str) -> Self {
        match s {
            "full_4way" => MatchStatus::Full4Way,
            "3way_awaiting_payment" => MatchStatus::ThreeWayAwaitingPayment,
            "3way_no_funding" => MatchStatus::ThreeWayNoFunding,
            "2way_matched" => MatchStatus::TwoWayMatched,
            "amount_mismatch" => MatchStatus::AmountMismatch,
            "status_issue" => MatchStatus::StatusIssue,
            "invoice_payment_only" => MatchStatus::InvoicePaymentOnly,
            "remittance_only" => MatchStatus::RemittanceOnly,
            "invoice_only" => MatchStatus::InvoiceOnly,
            "payment_only" => MatchStatus::PaymentOnly,
            "resolved" => MatchStatus::Resolved,
            _ => MatchStatus::Unmatched,
        }
    }

    /// All variants, in reporting order
    pub fn all() -> &'static [MatchStatus] {
        &[
            MatchStatus::Full4Way,
            MatchStatus::ThreeWayAwaitingPayment,
            MatchStatus::ThreeWayNoFunding,
            MatchStatus::TwoWayMatched,
            MatchStatus::AmountMismatch,
            MatchStatus::StatusIssue,
            MatchStatus::InvoicePaymentOnly,
            MatchStatus::RemittanceOnly,
            MatchStatus::InvoiceOnly,
            MatchStatus::PaymentOnly,
            MatchStatus::Unmatched,
            MatchStatus::Resolved,
        ]
    }
}

impl std::fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Invoice status from the operations database
///
/// The source returns a numeric code; the canonical mapping is fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InvoiceStatus {
    /// Draft (code 0)
    Draft,
    /// Approved (code 1)
    Approved,
    /// Processing (code 2)
    Processing,
    /// In Flight (code 3)
    #[serde(rename = "In Flight")]
    InFlight,
    /// Paid (code 4)
    Paid,
    /// Rejected (code 5)
    Rejected,
    /// Cancelled (code 6)
    Cancelled,
}

impl InvoiceStatus {
    /// Map the source's numeric status code
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(InvoiceStatus::Draft),
            1 => Some(InvoiceStatus::Approved),
            2 => Some(InvoiceStatus::Processing),
            3 => Some(InvoiceStatus::InFlight),
            4 => Some(InvoiceStatus::Paid),
            5 => Some(InvoiceStatus::Rejected),
            6 => Some(InvoiceStatus::Cancelled),
            _ => None,
        }
    }

    /// Canonical display name
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "Draft",
            InvoiceStatus::Approved => "Approved",
            InvoiceStatus::Processing => "Processing",
            InvoiceStatus::InFlight => "In Flight",
            InvoiceStatus::Paid => "Paid",
            InvoiceStatus::Rejected => "Rejected",
            InvoiceStatus::Cancelled => "Cancelled",
        }
    }

    /// Parse the canonical display name
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Draft" => Some(InvoiceStatus::Draft),
            "Approved" => Some(InvoiceStatus::Approved),
            "Processing" => Some(InvoiceStatus::Processing),
            "In Flight" => Some(InvoiceStatus::InFlight),
            "Paid" => Some(InvoiceStatus::Paid),
            "Rejected" => Some(InvoiceStatus::Rejected),
            "Cancelled" => Some(InvoiceStatus::Cancelled),
            _ => None,
        }
    }

    /// A dead invoice never counts toward matched/mismatched totals
    pub fn is_dead(&self) -> bool {
        matches!(self, InvoiceStatus::Rejected | InvoiceStatus::Cancelled)
    }
}

impl std::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Remittance email source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemittanceSource {
    /// OASYS agency remittance feed (CSV attachments)
    Oasys,
    /// Dynamics 365 ACH advice (CSV attachments)
    D365Ach,
    /// London GSS advice (image-only; always manual review)
    LdnGss,
}

impl RemittanceSource {
    /// Source key as used in configuration and storage
    pub fn as_str(&self) -> &'static str {
        match self {
            RemittanceSource::Oasys => "oasys",
            RemittanceSource::D365Ach => "d365_ach",
            RemittanceSource::LdnGss => "ldn_gss",
        }
    }

    /// Parse a source key
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "oasys" => Some(RemittanceSource::Oasys),
            "d365_ach" => Some(RemittanceSource::D365Ach),
            "ldn_gss" => Some(RemittanceSource::LdnGss),
            _ => None,
        }
    }
}

impl std::fmt::Display for RemittanceSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Manual follow-up flag set by an operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManualFlag {
    /// Agency or contractor outreach required
    NeedsOutreach,
    /// Under active investigation
    Investigating,
    /// Escalated to pay-ops leadership
    Escalated,
    /// Follow-up complete; terminal
    Resolved,
}

impl ManualFlag {
    /// Storage representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ManualFlag::NeedsOutreach => "needs_outreach",
            ManualFlag::Investigating => "investigating",
            ManualFlag::Escalated => "escalated",
            ManualFlag::Resolved => "resolved",
        }
    }

    /// Parse a stored value
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "needs_outreach" => Some(ManualFlag::NeedsOutreach),
            "investigating" => Some(ManualFlag::Investigating),
            "escalated" => Some(ManualFlag::Escalated),
            "resolved" => Some(ManualFlag::Resolved),
            _ => None,
        }
    }
}

/// How a received payment was linked to a remittance email
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkMethod {
    /// Lump-sum matcher scored at or above the auto threshold
    Auto,
    /// Operator association through the API
    Manual,
}

impl LinkMethod {
    /// Storage representation
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkMethod::Auto => "auto",
            LinkMethod::Manual => "manual",
        }
    }

    /// Parse a stored value
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "auto" => Some(LinkMethod::Auto),
            "manual" => Some(LinkMethod::Manual),
            _ => None,
        }
    }
}

/// The central reconciliation entity, keyed by NVC code
///
/// One row per NVC code; each leg's fields are optional and filled in as the
/// corresponding source is observed. Funding (leg 3) fields are copies of the
/// received payment linked to this row's remittance email.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationRecord {
    /// Unique, immutable NVC code; the only join key
    pub nvc_code: String,

    // Leg 1: remittance advice
    /// Line amount from the remittance email
    pub remittance_amount: Option<Decimal>,
    /// Date of the remittance email
    pub remittance_date: Option<NaiveDate>,
    /// Which remittance feed the email came from
    pub remittance_source: Option<RemittanceSource>,
    /// Source email id
    pub remittance_email_id: Option<String>,
    /// Contractor named on the remittance line
    pub remittance_contractor: Option<String>,

    // Leg 2: invoice
    /// Invoice amount
    pub invoice_amount: Option<Decimal>,
    /// Invoice status
    pub invoice_status: Option<InvoiceStatus>,
    /// Operating tenant owning the invoice
    pub invoice_tenant: Option<String>,
    /// Pay-run reference
    pub invoice_payrun_ref: Option<String>,
    /// Invoice currency
    pub invoice_currency: Option<String>,

    // Leg 3: inbound funding (inherited via the remittance email linkage)
    /// Linked received payment id
    pub received_payment_id: Option<String>,
    /// Received payment amount
    pub received_payment_amount: Option<Decimal>,
    /// Received payment date
    pub received_payment_date: Option<NaiveDate>,

    // Leg 4: outbound payment
    /// Outbound payment amount
    pub payment_amount: Option<Decimal>,
    /// Processor sub-account the payment left from
    pub payment_account_id: Option<String>,
    /// Payment date
    pub payment_date: Option<NaiveDate>,
    /// Payment currency (may differ from the reporting currency)
    pub payment_currency: Option<String>,
    /// Processor payment status
    pub payment_status: Option<String>,
    /// Payment recipient name
    pub payment_recipient: Option<String>,
    /// Recipient country
    pub payment_recipient_country: Option<String>,

    // Derived
    /// Classifier output; never hand-authored except via the resolved path
    pub match_status: MatchStatus,
    /// Comma-joined classifier flags (e.g. `cross_currency_skipped`)
    pub match_flags: String,

    // Manual
    /// Operator follow-up flag
    pub flag: Option<ManualFlag>,
    /// Notes attached to the flag
    pub flag_notes: Option<String>,
    /// Free-text record notes
    pub notes: Option<String>,
    /// When the record was resolved
    pub resolved_at: Option<DateTime<Utc>>,
    /// Who resolved it
    pub resolved_by: Option<String>,

    // Audit
    /// First time any leg was observed
    pub first_seen_at: DateTime<Utc>,
    /// Last write; advances monotonically
    pub last_updated_at: DateTime<Utc>,
}

impl ReconciliationRecord {
    /// Fresh record with no legs
    pub fn new(nvc_code: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            nvc_code: nvc_code.into(),
            remittance_amount: None,
            remittance_date: None,
            remittance_source: None,
            remittance_email_id: None,
            remittance_contractor: None,
            invoice_amount: None,
            invoice_status: None,
            invoice_tenant: None,
            invoice_payrun_ref: None,
            invoice_currency: None,
            received_payment_id: None,
            received_payment_amount: None,
            received_payment_date: None,
            payment_amount: None,
            payment_account_id: None,
            payment_date: None,
            payment_currency: None,
            payment_status: None,
            payment_recipient: None,
            payment_recipient_country: None,
            match_status: MatchStatus::Unmatched,
            match_flags: String::new(),
            flag: None,
            flag_notes: None,
            notes: None,
            resolved_at: None,
            resolved_by: None,
            first_seen_at: now,
            last_updated_at: now,
        }
    }

    /// Leg 1 present
    pub fn has_remittance(&self) -> bool {
        self.remittance_amount.is_some()
    }

    /// Leg 2 present
    pub fn has_invoice(&self) -> bool {
        self.invoice_amount.is_some()
    }

    /// Leg 3 present
    pub fn has_funding(&self) -> bool {
        self.received_payment_id.is_some()
    }

    /// Leg 4 present
    pub fn has_payment(&self) -> bool {
        self.payment_amount.is_some()
    }

    /// Record was manually resolved (sticky)
    pub fn is_resolved(&self) -> bool {
        self.match_status == MatchStatus::Resolved
    }
}

/// A parsed remittance line item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemittanceLine {
    /// NVC code on the line
    pub nvc_code: String,

    /// Line amount
    pub amount: Decimal,

    /// Contractor named on the line
    pub contractor: Option<String>,

    /// Free-text notes column
    pub notes: Option<String>,
}

/// Cached remittance email fingerprint
///
/// Created on first observation, updated on re-observation, never deleted by
/// the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedEmail {
    /// Source-provided unique id
    pub id: String,

    /// Remittance feed
    pub source: RemittanceSource,

    /// Subject line
    pub subject: String,

    /// Sender address
    pub sender: String,

    /// Email date
    pub email_date: DateTime<Utc>,

    /// When the engine last fetched it
    pub fetched_at: DateTime<Utc>,

    /// Attachment file names
    pub attachment_names: Vec<String>,

    /// Parsed lump-sum total, when an attachment decoded
    pub remittance_total: Option<Decimal>,

    /// Normalized paying-agency name
    pub agency_name: Option<String>,

    /// No attachment decoded; excluded from lump-sum matching
    pub manual_review: bool,

    /// Linked inbound funding receipt (1:1)
    pub received_payment_id: Option<String>,

    /// Lump-sum matcher confidence at link time
    pub match_confidence: Option<f64>,

    /// How the link was made
    pub match_method: Option<LinkMethod>,
}

/// Cached invoice row from the operations database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedInvoice {
    /// NVC code (the invoice line id)
    pub nvc_code: String,

    /// Invoice amount
    pub amount: Decimal,

    /// Currency
    pub currency: String,

    /// Status
    pub status: InvoiceStatus,

    /// Operating tenant
    pub tenant: String,

    /// Pay-run reference
    pub payrun_ref: Option<String>,

    /// Invoice date
    pub invoice_date: Option<NaiveDate>,

    /// Contractor name
    pub contractor: Option<String>,

    /// When the engine last fetched it
    pub fetched_at: DateTime<Utc>,
}

/// Cached pay-run header
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedPayrun {
    /// Pay-run reference
    pub payrun_ref: String,

    /// Operating tenant
    pub tenant: String,

    /// Pay-run status as reported by the source
    pub status: String,

    /// Scheduled pay date
    pub pay_date: Option<NaiveDate>,

    /// Total pay-run amount
    pub total_amount: Option<Decimal>,

    /// When the engine last fetched it
    pub fetched_at: DateTime<Utc>,
}

/// Inbound funding receipt at the payment processor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceivedPayment {
    /// Processor-assigned opaque id
    pub id: String,

    /// Processor sub-account that received the funds
    pub sub_account: String,

    /// Amount (reporting currency)
    pub amount: Decimal,

    /// Currency
    pub currency: String,

    /// Payment date
    pub payment_date: NaiveDate,

    /// Processor status
    pub status: String,

    /// Free-text payer/info field (`infoToAccountOwner`-style)
    pub payer_info: String,

    /// Remittance email this receipt is linked to (1:1)
    pub linked_email_id: Option<String>,

    /// When the engine last fetched it
    pub fetched_at: DateTime<Utc>,
}

/// Outbound payment from the processor to a contractor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedPayment {
    /// Processor payment reference
    pub id: String,

    /// NVC code extracted from the `tenant.NVC_CODE` reference
    pub nvc_code: String,

    /// Tenant prefix of the reference
    pub tenant: Option<String>,

    /// Amount
    pub amount: Decimal,

    /// Currency (any)
    pub currency: String,

    /// Processor status
    pub status: String,

    /// Recipient name
    pub recipient: Option<String>,

    /// Recipient country
    pub recipient_country: Option<String>,

    /// Sub-account the payment left from
    pub account_id: Option<String>,

    /// Payment date
    pub payment_date: Option<NaiveDate>,

    /// When the engine last fetched it
    pub fetched_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn match_status_round_trip() {
        for status in MatchStatus::all() {
            assert_eq!(MatchStatus::parse_or_unmatched(status.as_str()), *status);
        }
    }

    #[test]
    fn match_status_unknown_maps_to_unmatched() {
        assert_eq!(
            MatchStatus::parse_or_unmatched("5way_quantum"),
            MatchStatus::Unmatched
        );
    }

    #[test]
    fn invoice_status_code_table() {
        assert_eq!(InvoiceStatus::from_code(0), Some(InvoiceStatus::Draft));
        assert_eq!(InvoiceStatus::from_code(3), Some(InvoiceStatus::InFlight));
        assert_eq!(InvoiceStatus::from_code(5), Some(InvoiceStatus::Rejected));
        assert_eq!(InvoiceStatus::from_code(6), Some(InvoiceStatus::Cancelled));
        assert_eq!(InvoiceStatus::from_code(7), None);
    }

    #[test]
    fn invoice_status_name_round_trip() {
        for code in 0..=6 {
            let status = InvoiceStatus::from_code(code).unwrap();
            assert_eq!(InvoiceStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn remittance_source_keys() {
        assert_eq!(RemittanceSource::parse("oasys"), Some(RemittanceSource::Oasys));
        assert_eq!(RemittanceSource::parse("d365_ach"), Some(RemittanceSource::D365Ach));
        assert_eq!(RemittanceSource::parse("ldn_gss"), Some(RemittanceSource::LdnGss));
        assert_eq!(RemittanceSource::parse("fax"), None);
    }
}
