//! Agency alias table
//!
//! Agencies remit under names that rarely match their wire descriptors
//! ("Omnicom Media" invoices, "OMNICOM MEDIA GROUP" wires). The alias table
//! maps every accepted alias to its canonical agency name; both sides of a
//! comparison are canonicalized before scoring so an alias hit is an exact
//! match.

use crate::payer::normalize_name;
use serde::Deserialize;
use std::collections::HashMap;
use thiserror::Error;

/// Alias table errors
#[derive(Error, Debug)]
pub enum AliasError {
    /// The AGENCY_ALIASES value was not valid JSON
    #[error("Invalid alias table JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Canonical-name lookup over normalized aliases
#[derive(Debug, Clone, Default)]
pub struct AliasTable {
    /// normalized alias -> normalized canonical name
    canonical_by_alias: HashMap<String, String>,
}

impl AliasTable {
    /// Empty table; every comparison falls through to fuzzy similarity
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from the `AGENCY_ALIASES` JSON value:
    /// `{"Omnicom Media": ["OMNICOM MEDIA GROUP", "OMG USA"], ...}`
    pub fn from_json(json: &str) -> Result<Self, AliasError> {
        let raw: HashMap<String, Vec<String>> = serde_json::from_str(json)?;
        Ok(Self::from_map(raw))
    }

    /// Build from an in-memory canonical -> aliases map
    pub fn from_map<I, S>(map: I) -> Self
    where
        I: IntoIterator<Item = (S, Vec<S>)>,
        S: AsRef<str>,
    {
        let mut canonical_by_alias = HashMap::new();
        for (canonical, aliases) in map {
            let canon_norm = normalize_name(canonical.as_ref());
            // The canonical name is an alias of itself
            canonical_by_alias.insert(canon_norm.clone(), canon_norm.clone());
            for alias in aliases {
                canonical_by_alias.insert(normalize_name(alias.as_ref()), canon_norm.clone());
            }
        }
        Self { canonical_by_alias }
    }

    /// Number of known aliases
    pub fn len(&self) -> usize {
        self.canonical_by_alias.len()
    }

    /// True when no aliases are configured
    pub fn is_empty(&self) -> bool {
        self.canonical_by_alias.is_empty()
    }

    /// Canonical form of an already-normalized name
    pub fn canonicalize<'a>(&'a self, normalized: &'a str) -> &'a str {
        match self.canonical_by_alias.get(normalized) {
            Some(canonical) => canonical.as_str(),
            None => normalized,
        }
    }

    /// Similarity of two raw names in `[0, 1]`
    ///
    /// Exact match after normalization and canonicalization scores 1.0;
    /// otherwise Jaro-Winkler over the canonical forms. Empty names score 0.
    pub fn similarity(&self, a: &str, b: &str) -> f64 {
        let a_norm = normalize_name(a);
        let b_norm = normalize_name(b);
        if a_norm.is_empty() || b_norm.is_empty() {
            return 0.0;
        }

        let a_canon = self.canonicalize(&a_norm);
        let b_canon = self.canonicalize(&b_norm);
        if a_canon == b_canon {
            return 1.0;
        }

        strsim::jaro_winkler(a_canon, b_canon)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> AliasTable {
        AliasTable::from_map([
            ("Omnicom Media", vec!["OMNICOM MEDIA GROUP", "OMG USA"]),
            ("BBDO USA LLC", vec!["BBDO WORLDWIDE"]),
        ])
    }

    #[test]
    fn from_json_parses_env_shape() {
        let json = r#"{"Omnicom Media": ["OMNICOM MEDIA GROUP"]}"#;
        let table = AliasTable::from_json(json).unwrap();
        assert_eq!(table.similarity("omnicom media group", "Omnicom Media"), 1.0);
    }

    #[test]
    fn from_json_rejects_garbage() {
        assert!(AliasTable::from_json("not json").is_err());
    }

    #[test]
    fn alias_hit_scores_one() {
        let t = table();
        assert_eq!(t.similarity("OMNICOM MEDIA GROUP", "Omnicom Media"), 1.0);
        assert_eq!(t.similarity("OMG USA", "OMNICOM MEDIA GROUP"), 1.0);
    }

    #[test]
    fn exact_name_scores_one_without_aliases() {
        let t = AliasTable::empty();
        assert_eq!(t.similarity("BBDO USA LLC", "bbdo usa, llc"), 1.0);
    }

    #[test]
    fn near_names_score_high_but_below_one() {
        let t = AliasTable::empty();
        let s = t.similarity("HAVAS MEDIA", "HAVAS MEDIA GROUP");
        assert!(s > 0.8 && s < 1.0, "score was {}", s);
    }

    #[test]
    fn unrelated_names_score_low() {
        let t = AliasTable::empty();
        assert!(t.similarity("BBDO USA LLC", "ZENITH OPTIMEDIA") < 0.7);
    }

    #[test]
    fn empty_name_scores_zero() {
        let t = table();
        assert_eq!(t.similarity("", "BBDO USA LLC"), 0.0);
    }
}
