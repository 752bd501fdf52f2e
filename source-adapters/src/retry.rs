//! Retry policy for transport calls
//!
//! Exponential backoff over transient errors only, bounded by both an
//! attempt cap and the sync-cycle deadline. A retry that would overrun the
//! deadline fails immediately as unavailable so a slow source can never
//! stall the cycle.

use crate::{Error, Result, SourceKind};
use backoff::backoff::Backoff;
use backoff::ExponentialBackoffBuilder;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::warn;

/// Retry parameters
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum attempts (first try included)
    pub max_attempts: u32,

    /// Delay before the first retry
    pub base_delay: Duration,

    /// Delay multiplier per retry
    pub factor: f64,

    /// Hard stop; no retry sleeps past this point
    pub deadline: Option<Instant>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            factor: 2.0,
            deadline: None,
        }
    }
}

impl RetryPolicy {
    /// Policy with an attempt cap and default delays
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    /// Same policy bounded by a cycle deadline
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Run `op`, retrying transient failures
    pub async fn run<T, F, Fut>(&self, source: SourceKind, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut backoff = ExponentialBackoffBuilder::new()
            .with_initial_interval(self.base_delay)
            .with_multiplier(self.factor)
            .with_randomization_factor(0.0)
            .with_max_elapsed_time(
                self.deadline
                    .map(|d| d.saturating_duration_since(Instant::now())),
            )
            .build();

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_transient() => return Err(err),
                Err(err) => {
                    if attempt >= self.max_attempts {
                        return Err(Error::RetryExhausted {
                            source_kind: source,
                            attempts: attempt,
                            last_error: err.to_string(),
                        });
                    }

                    let delay = match backoff.next_backoff() {
                        Some(delay) if self.within_deadline(delay) => delay,
                        _ => {
                            return Err(Error::Unavailable {
                                source_kind: source,
                                reason: format!(
                                    "cycle deadline reached after {} attempts: {}",
                                    attempt, err
                                ),
                            })
                        }
                    };

                    warn!(
                        %source,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient source error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    fn within_deadline(&self, delay: Duration) -> bool {
        match self.deadline {
            Some(deadline) => Instant::now() + delay < deadline,
            None => true,
        }
    }
}
