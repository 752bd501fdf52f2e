//! Periodic sync scheduler
//!
//! Drives the engine's sync cycle on a fixed interval. A cycle that overruns
//! the interval causes the missed ticks to be skipped (never overlapped) and
//! recorded, both in the sync state and in metrics.

use crate::engine::ReconEngine;
use crate::metrics;
use crate::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

/// Interval scheduler over the engine
pub struct Scheduler {
    engine: Arc<ReconEngine>,
    interval: Duration,
}

impl Scheduler {
    /// New scheduler with the configured cycle interval
    pub fn new(engine: Arc<ReconEngine>, interval: Duration) -> Self {
        Self { engine, interval }
    }

    /// Run the scheduling loop forever
    pub async fn start(self: Arc<Self>) {
        info!(interval_secs = self.interval.as_secs(), "starting sync scheduler");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            self.run_cycle_once().await;
        }
    }

    /// Run one cycle immediately (ad-hoc trigger and the loop body)
    pub async fn run_cycle_once(&self) {
        let started = tokio::time::Instant::now();
        match self.engine.run_cycle().await {
            Ok(()) => {
                info!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "sync cycle complete"
                );
            }
            Err(err) => {
                // Store failures abort the cycle; the next tick retries
                error!(error = %err, "sync cycle aborted");
            }
        }

        let elapsed = started.elapsed();
        if elapsed > self.interval {
            let missed = (elapsed.as_secs_f64() / self.interval.as_secs_f64()).floor() as u64;
            self.engine.sync_state().cycles_skipped(missed).await;
            metrics::SYNC_CYCLES_SKIPPED.inc_by(missed);
            info!(
                elapsed_ms = elapsed.as_millis() as u64,
                missed, "cycle overran its interval, skipping missed ticks"
            );
        }
    }

    /// Ad-hoc trigger used by the API
    pub async fn trigger(&self) -> Result<()> {
        info!("ad-hoc sync cycle triggered");
        self.engine.run_cycle().await
    }
}
