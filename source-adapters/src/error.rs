//! Error types for source adapters

use crate::types::SourceKind;
use thiserror::Error;

/// Result type for adapter operations
pub type Result<T> = std::result::Result<T, Error>;

/// Adapter errors
#[derive(Error, Debug)]
pub enum Error {
    /// Transient transport failure (connection refused/reset, 5xx)
    #[error("{source_kind} transport error: {reason}")]
    Transport {
        /// Failing source
        source_kind: SourceKind,
        /// What happened
        reason: String,
    },

    /// Request timed out
    #[error("{source_kind} timeout after {seconds}s")]
    Timeout {
        /// Failing source
        source_kind: SourceKind,
        /// Configured timeout
        seconds: u64,
    },

    /// Source is unavailable for non-transient reasons (auth, 4xx)
    #[error("{source_kind} unavailable: {reason}")]
    Unavailable {
        /// Failing source
        source_kind: SourceKind,
        /// What happened
        reason: String,
    },

    /// Retries exhausted on a transient failure
    #[error("{source_kind} retry exhausted after {attempts} attempts: {last_error}")]
    RetryExhausted {
        /// Failing source
        source_kind: SourceKind,
        /// Attempts made
        attempts: u32,
        /// Final error
        last_error: String,
    },

    /// Payload could not be decoded
    #[error("{source_kind} malformed payload: {detail}")]
    Malformed {
        /// Failing source
        source_kind: SourceKind,
        /// What failed to decode
        detail: String,
    },
}

impl Error {
    /// Transient errors are retried; everything else surfaces immediately
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Transport { .. } | Error::Timeout { .. })
    }

    /// Anything except a malformed payload means the source is unavailable
    /// and the engine proceeds in degraded mode
    pub fn is_unavailable(&self) -> bool {
        !matches!(self, Error::Malformed { .. })
    }

    /// The source this error belongs to
    pub fn source_kind(&self) -> SourceKind {
        match self {
            Error::Transport { source_kind, .. }
            | Error::Timeout { source_kind, .. }
            | Error::Unavailable { source_kind, .. }
            | Error::RetryExhausted { source_kind, .. }
            | Error::Malformed { source_kind, .. } => *source_kind,
        }
    }

    /// Map a reqwest failure onto the taxonomy
    pub fn from_reqwest(source: SourceKind, err: reqwest::Error, timeout_secs: u64) -> Self {
        if err.is_timeout() {
            Error::Timeout {
                source_kind: source,
                seconds: timeout_secs,
            }
        } else if err.is_connect() {
            Error::Transport {
                source_kind: source,
                reason: err.to_string(),
            }
        } else {
            Error::Unavailable {
                source_kind: source,
                reason: err.to_string(),
            }
        }
    }

    /// Map an HTTP status onto the taxonomy (5xx transient, 4xx terminal)
    pub fn from_status(source: SourceKind, status: u16, body: String) -> Self {
        if status >= 500 {
            Error::Transport {
                source_kind: source,
                reason: format!("HTTP {}: {}", status, body),
            }
        } else {
            Error::Unavailable {
                source_kind: source,
                reason: format!("HTTP {}: {}", status, body),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transience_classification() {
        let transport = Error::Transport {
            source_kind: SourceKind::InboundFunding,
            reason: "connection refused".to_string(),
        };
        assert!(transport.is_transient());
        assert!(transport.is_unavailable());

        let malformed = Error::Malformed {
            source_kind: SourceKind::Email,
            detail: "bad csv".to_string(),
        };
        assert!(!malformed.is_transient());
        assert!(!malformed.is_unavailable());
    }

    #[test]
    fn status_mapping() {
        let e = Error::from_status(SourceKind::Invoice, 503, "down".to_string());
        assert!(e.is_transient());

        let e = Error::from_status(SourceKind::Invoice, 401, "no".to_string());
        assert!(!e.is_transient());
        assert!(e.is_unavailable());
    }
}
