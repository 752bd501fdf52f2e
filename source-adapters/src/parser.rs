//! Remittance attachment parser
//!
//! Each remittance feed has its own attachment layout:
//!
//! - `oasys`: CSV with `NVC Code, Contractor, Amount, Notes` columns and an
//!   optional trailing `TOTAL` row
//! - `d365_ach`: CSV with `Document, Vendor, Payment Amount, Description`
//!   columns; amounts formatted like `$4,500.00`
//! - `ldn_gss`: image-only PDF advice; never decodable here, the email is
//!   flagged for manual review
//!
//! A parse yields the NVC line items, the lump-sum total (the explicit TOTAL
//! row when present, otherwise the line sum), and leaves agency naming to
//! the email adapter.

use crate::{Error, Result, SourceKind};
use lazy_static::lazy_static;
use recon_core::{RemittanceLine, RemittanceSource};
use regex::Regex;
use rust_decimal::Decimal;
use std::str::FromStr;

lazy_static! {
    static ref NVC_CODE: Regex = Regex::new(r"^NVC[A-Z0-9]{3,}$").expect("static regex");
}

/// Result of parsing one attachment
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRemittance {
    /// NVC line items
    pub lines: Vec<RemittanceLine>,

    /// Lump-sum total covered by the email
    pub total: Decimal,
}

/// True when the string looks like an NVC code
pub fn is_nvc_code(s: &str) -> bool {
    NVC_CODE.is_match(s)
}

/// Parse a money cell: `$4,500.00`, `4500.00`, `(120.50)` (negative)
pub fn parse_amount(raw: &str) -> Option<Decimal> {
    let cleaned = raw.trim().replace(['$', ','], "");
    if cleaned.is_empty() {
        return None;
    }
    let (cleaned, negative) = if cleaned.starts_with('(') && cleaned.ends_with(')') {
        (cleaned[1..cleaned.len() - 1].to_string(), true)
    } else {
        (cleaned, false)
    };
    let amount = Decimal::from_str(cleaned.trim()).ok()?;
    Some(if negative { -amount } else { amount })
}

/// Parse one attachment for the given feed
pub fn parse_attachment(
    source: RemittanceSource,
    name: &str,
    content: &[u8],
) -> Result<ParsedRemittance> {
    match source {
        RemittanceSource::Oasys => parse_csv(content, name, 0, 1, 2, Some(3)),
        RemittanceSource::D365Ach => parse_csv(content, name, 0, 1, 2, Some(3)),
        RemittanceSource::LdnGss => Err(Error::Malformed {
            source_kind: SourceKind::Email,
            detail: format!("{}: ldn_gss advice is image-only", name),
        }),
    }
}

/// Shared CSV walk; column positions differ per feed only in header names,
/// both use (code, party, amount, notes) ordering
fn parse_csv(
    content: &[u8],
    name: &str,
    code_col: usize,
    party_col: usize,
    amount_col: usize,
    notes_col: Option<usize>,
) -> Result<ParsedRemittance> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(content);

    let mut lines = Vec::new();
    let mut explicit_total: Option<Decimal> = None;

    for record in reader.records() {
        let record = record.map_err(|e| Error::Malformed {
            source_kind: SourceKind::Email,
            detail: format!("{}: {}", name, e),
        })?;

        let code = record.get(code_col).unwrap_or("").trim().to_uppercase();
        if code.is_empty() {
            continue;
        }

        if code == "TOTAL" {
            if let Some(total) = record.get(amount_col).and_then(parse_amount) {
                explicit_total = Some(total);
            }
            continue;
        }

        if !is_nvc_code(&code) {
            // Header repeats and subtotal rows are skipped silently
            continue;
        }

        let amount = record
            .get(amount_col)
            .and_then(parse_amount)
            .ok_or_else(|| Error::Malformed {
                source_kind: SourceKind::Email,
                detail: format!("{}: line {} has no amount", name, code),
            })?;

        let contractor = record
            .get(party_col)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        let notes = notes_col
            .and_then(|idx| record.get(idx))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        lines.push(RemittanceLine {
            nvc_code: code,
            amount,
            contractor,
            notes,
        });
    }

    if lines.is_empty() {
        return Err(Error::Malformed {
            source_kind: SourceKind::Email,
            detail: format!("{}: no NVC lines found", name),
        });
    }

    let total = explicit_total.unwrap_or_else(|| lines.iter().map(|l| l.amount).sum());
    Ok(ParsedRemittance { lines, total })
}

/// Display name out of a `"BBDO USA LLC <remit@bbdo.example>"` sender
pub fn agency_from_sender(sender: &str) -> Option<String> {
    let display = match sender.find('<') {
        Some(idx) => &sender[..idx],
        None => sender,
    };
    let display = display.trim().trim_matches('"').trim();
    if display.is_empty() || display.contains('@') {
        return None;
    }
    Some(display.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const OASYS_CSV: &str = "\
NVC Code,Contractor,Amount,Notes
NVC7KAAA,Jane Doe,4500.00,January retainer
NVC7KBBB,John Smith,1000.00,
TOTAL,,5500.00,
";

    const D365_CSV: &str = "\
Document,Vendor,Payment Amount,Description
NVC7KCCC,Acme Studios,\"$2,000.00\",Invoice 9917
NVC7KDDD,Blue Post LLC,\"$150.25\",Color pass
";

    #[test]
    fn parses_oasys_layout_with_total_row() {
        let parsed =
            parse_attachment(RemittanceSource::Oasys, "advice.csv", OASYS_CSV.as_bytes()).unwrap();
        assert_eq!(parsed.lines.len(), 2);
        assert_eq!(parsed.lines[0].nvc_code, "NVC7KAAA");
        assert_eq!(parsed.lines[0].amount, dec!(4500.00));
        assert_eq!(parsed.lines[0].contractor.as_deref(), Some("Jane Doe"));
        assert_eq!(parsed.lines[1].notes, None);
        assert_eq!(parsed.total, dec!(5500.00));
    }

    #[test]
    fn parses_d365_layout_and_sums_when_no_total_row() {
        let parsed =
            parse_attachment(RemittanceSource::D365Ach, "ach.csv", D365_CSV.as_bytes()).unwrap();
        assert_eq!(parsed.lines.len(), 2);
        assert_eq!(parsed.lines[0].amount, dec!(2000.00));
        assert_eq!(parsed.total, dec!(2150.25));
    }

    #[test]
    fn ldn_gss_is_always_malformed() {
        let err = parse_attachment(RemittanceSource::LdnGss, "scan.pdf", b"%PDF-1.4")
            .unwrap_err();
        assert!(matches!(err, Error::Malformed { .. }));
    }

    #[test]
    fn empty_attachment_is_malformed() {
        let err = parse_attachment(RemittanceSource::Oasys, "empty.csv", b"NVC Code,C,A,N\n")
            .unwrap_err();
        assert!(matches!(err, Error::Malformed { .. }));
    }

    #[test]
    fn line_without_amount_is_malformed() {
        let csv = "NVC Code,Contractor,Amount,Notes\nNVC7KAAA,Jane Doe,,\n";
        let err =
            parse_attachment(RemittanceSource::Oasys, "advice.csv", csv.as_bytes()).unwrap_err();
        assert!(matches!(err, Error::Malformed { .. }));
    }

    #[test]
    fn amount_formats() {
        assert_eq!(parse_amount("$4,500.00"), Some(dec!(4500.00)));
        assert_eq!(parse_amount(" 120.5 "), Some(dec!(120.5)));
        assert_eq!(parse_amount("(75.00)"), Some(dec!(-75.00)));
        assert_eq!(parse_amount(""), None);
        assert_eq!(parse_amount("n/a"), None);
    }

    #[test]
    fn nvc_code_shape() {
        assert!(is_nvc_code("NVC7KAAA"));
        assert!(is_nvc_code("NVCX123456"));
        assert!(!is_nvc_code("NVC"));
        assert!(!is_nvc_code("INV-1234"));
        assert!(!is_nvc_code("nvc7kaaa"));
    }

    #[test]
    fn sender_display_name() {
        assert_eq!(
            agency_from_sender("\"BBDO USA LLC\" <remit@bbdo.example>"),
            Some("BBDO USA LLC".to_string())
        );
        assert_eq!(
            agency_from_sender("Omnicom Media <no-reply@omg.example>"),
            Some("Omnicom Media".to_string())
        );
        assert_eq!(agency_from_sender("remit@bbdo.example"), None);
    }
}
