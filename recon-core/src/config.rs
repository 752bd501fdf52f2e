//! Engine configuration
//!
//! Every tolerance, interval, and connection target is supplied by the
//! environment; nothing source-specific is hard-coded.

use crate::{Error, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

use crate::types::RemittanceSource;

/// Matching tolerances
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tolerances {
    /// Two amounts within this are deemed equal
    pub amount_tol: Decimal,

    /// Date window for lump-sum date scoring (days)
    pub date_window_days: i64,

    /// Lump-sum score at or above this auto-links
    pub auto_match_conf: f64,

    /// Lump-sum score at or above this is suggested, not applied
    pub suggest_conf: f64,

    /// Single reporting currency assumed for legs 1-3
    pub reporting_currency: String,
}

impl Default for Tolerances {
    fn default() -> Self {
        Self {
            amount_tol: Decimal::new(1, 2), // 0.01
            date_window_days: 3,
            auto_match_conf: 0.80,
            suggest_conf: 0.50,
            reporting_currency: "USD".to_string(),
        }
    }
}

/// Full engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Matching tolerances
    pub tolerances: Tolerances,

    /// Sync cycle interval; also the cycle deadline
    pub sync_interval: Duration,

    /// Bounded fetch lookback per cycle (days)
    pub lookback_days: i64,

    /// SQLite database file path
    pub db_path: String,

    /// DB adapter connect timeout
    pub db_connect_timeout: Duration,

    /// DB adapter retry attempts
    pub db_max_retries: u32,

    /// HTTP adapter timeout
    pub api_timeout: Duration,

    /// HTTP adapter retry attempts
    pub api_max_retries: u32,

    /// API bind address
    pub bind_addr: String,

    /// Email relay base URL
    pub email_relay_url: String,

    /// Operations database gateway base URL
    pub ops_db_url: String,

    /// Payment processor API base URL
    pub processor_api_url: String,

    /// Payment processor API key
    pub processor_api_key: String,

    /// Enabled remittance feeds
    pub email_sources: Vec<RemittanceSource>,

    /// Raw `AGENCY_ALIASES` JSON (canonical name -> accepted aliases)
    pub agency_aliases_json: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tolerances: Tolerances::default(),
            sync_interval: Duration::from_secs(300),
            lookback_days: 30,
            db_path: "./data/remitrail.db".to_string(),
            db_connect_timeout: Duration::from_secs(10),
            db_max_retries: 3,
            api_timeout: Duration::from_secs(30),
            api_max_retries: 3,
            bind_addr: "0.0.0.0:8080".to_string(),
            email_relay_url: String::new(),
            ops_db_url: String::new(),
            processor_api_url: String::new(),
            processor_api_key: String::new(),
            email_sources: vec![
                RemittanceSource::Oasys,
                RemittanceSource::D365Ach,
                RemittanceSource::LdnGss,
            ],
            agency_aliases_json: None,
        }
    }
}

impl EngineConfig {
    /// Load from environment variables, falling back to defaults
    pub fn from_env() -> Result<Self> {
        let mut config = EngineConfig::default();

        if let Some(v) = env_var("AMOUNT_TOL") {
            config.tolerances.amount_tol = Decimal::from_str(&v)
                .map_err(|e| Error::Config(format!("AMOUNT_TOL '{}': {}", v, e)))?;
        }
        if let Some(v) = env_var("DATE_WINDOW_DAYS") {
            config.tolerances.date_window_days = parse_env("DATE_WINDOW_DAYS", &v)?;
        }
        if let Some(v) = env_var("AUTO_MATCH_CONF") {
            config.tolerances.auto_match_conf = parse_env("AUTO_MATCH_CONF", &v)?;
        }
        if let Some(v) = env_var("SUGGEST_CONF") {
            config.tolerances.suggest_conf = parse_env("SUGGEST_CONF", &v)?;
        }
        if let Some(v) = env_var("REPORTING_CURRENCY") {
            config.tolerances.reporting_currency = v;
        }
        if let Some(v) = env_var("SYNC_INTERVAL_SECONDS") {
            config.sync_interval = Duration::from_secs(parse_env("SYNC_INTERVAL_SECONDS", &v)?);
        }
        if let Some(v) = env_var("LOOKBACK_DAYS") {
            config.lookback_days = parse_env("LOOKBACK_DAYS", &v)?;
        }
        if let Some(v) = env_var("DB_PATH") {
            config.db_path = v;
        }
        if let Some(v) = env_var("DB_CONNECT_TIMEOUT") {
            config.db_connect_timeout = Duration::from_secs(parse_env("DB_CONNECT_TIMEOUT", &v)?);
        }
        if let Some(v) = env_var("DB_MAX_RETRIES") {
            config.db_max_retries = parse_env("DB_MAX_RETRIES", &v)?;
        }
        if let Some(v) = env_var("API_TIMEOUT") {
            config.api_timeout = Duration::from_secs(parse_env("API_TIMEOUT", &v)?);
        }
        if let Some(v) = env_var("API_MAX_RETRIES") {
            config.api_max_retries = parse_env("API_MAX_RETRIES", &v)?;
        }
        if let Some(v) = env_var("BIND_ADDR") {
            config.bind_addr = v;
        }
        if let Some(v) = env_var("EMAIL_RELAY_URL") {
            config.email_relay_url = v;
        }
        if let Some(v) = env_var("OPS_DB_URL") {
            config.ops_db_url = v;
        }
        if let Some(v) = env_var("PROCESSOR_API_URL") {
            config.processor_api_url = v;
        }
        if let Some(v) = env_var("PROCESSOR_API_KEY") {
            config.processor_api_key = v;
        }
        if let Some(v) = env_var("EMAIL_SOURCES") {
            config.email_sources = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| {
                    RemittanceSource::parse(s).ok_or_else(|| Error::UnknownSource(s.to_string()))
                })
                .collect::<Result<Vec<_>>>()?;
        }
        config.agency_aliases_json = env_var("AGENCY_ALIASES");

        Ok(config)
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn parse_env<T: FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| Error::Config(format!("{} '{}': {}", key, value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn default_tolerances() {
        let tol = Tolerances::default();
        assert_eq!(tol.amount_tol, dec!(0.01));
        assert_eq!(tol.date_window_days, 3);
        assert!((tol.auto_match_conf - 0.80).abs() < f64::EPSILON);
        assert!((tol.suggest_conf - 0.50).abs() < f64::EPSILON);
    }

    #[test]
    fn default_config_interval() {
        let config = EngineConfig::default();
        assert_eq!(config.sync_interval, Duration::from_secs(300));
        assert_eq!(config.db_max_retries, 3);
    }
}
