//! Payer-name extraction and normalization
//!
//! The processor reports the payer inside a free-text info field. ACH advice
//! reads like `BBDO USA LLC DES:ACH PMT ID:0051` and wire advice like
//! `WIRE TYPE:WIRE IN DATE:240115 ORIG:OMNICOM MEDIA GROUP TRN:...`; the
//! payer is the text before the first `KEY:` marker, or behind `ORIG:` when
//! present.

/// Normalize a name for comparison: uppercase, alphanumeric words only
pub fn normalize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_space = true;
    for ch in name.chars() {
        if ch.is_alphanumeric() {
            for up in ch.to_uppercase() {
                out.push(up);
            }
            last_space = false;
        } else if !last_space {
            out.push(' ');
            last_space = true;
        }
    }
    out.trim_end().to_string()
}

/// Parse the payer name out of a free-text info field
pub fn extract_payer(info: &str) -> String {
    let up = info.trim().to_uppercase();

    // Wire-format advice carries the originator behind ORIG:
    let base = match up.find("ORIG:") {
        Some(idx) => &up[idx + 5..],
        None => up.as_str(),
    };

    // Take words until the next KEY:VALUE marker (DES:, TRN:, ID:, ...)
    let mut words: Vec<&str> = Vec::new();
    for word in base.split_whitespace() {
        if word.contains(':') {
            break;
        }
        words.push(word);
    }

    normalize_name(&words.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_case_and_punctuation() {
        assert_eq!(normalize_name("BBDO U.S.A., LLC"), "BBDO U S A LLC");
        assert_eq!(normalize_name("  omnicom   media  "), "OMNICOM MEDIA");
        assert_eq!(normalize_name(""), "");
    }

    #[test]
    fn extracts_ach_style_payer() {
        assert_eq!(
            extract_payer("BBDO USA LLC DES:ACH PMT ID:0051 INDN:REMITRAIL"),
            "BBDO USA LLC"
        );
    }

    #[test]
    fn extracts_wire_style_payer_behind_orig() {
        assert_eq!(
            extract_payer("WIRE TYPE:WIRE IN DATE:240115 ORIG:OMNICOM MEDIA GROUP TRN:2024011500123"),
            "OMNICOM MEDIA GROUP"
        );
    }

    #[test]
    fn plain_payer_passes_through() {
        assert_eq!(extract_payer("Havas Media Inc"), "HAVAS MEDIA INC");
    }

    #[test]
    fn empty_info_yields_empty_payer() {
        assert_eq!(extract_payer(""), "");
        assert_eq!(extract_payer("DES:ACH ONLY MARKERS TRN:1"), "");
    }
}
