//! Per-source sync state
//!
//! Shared between the scheduler (writer) and the read API (poller). A source
//! in `Error` state means the engine is running in degraded mode for that
//! source; cached reads stay authoritative for the last successful cycle.

use chrono::{DateTime, Utc};
use serde::Serialize;
use source_adapters::SourceKind;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Health of one source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncHealth {
    /// Last sync succeeded
    Ok,
    /// Last sync failed; serving cached data
    Error,
    /// Never synced since startup
    Never,
}

/// Sync status of one source
#[derive(Debug, Clone, Serialize)]
pub struct SourceSyncStatus {
    /// When the source last completed (either way)
    pub last_sync_at: Option<DateTime<Utc>>,
    /// Records fetched on the last successful sync
    pub last_count: Option<u64>,
    /// Current health
    pub status: SyncHealth,
    /// Error text when degraded
    pub error: Option<String>,
}

impl Default for SourceSyncStatus {
    fn default() -> Self {
        Self {
            last_sync_at: None,
            last_count: None,
            status: SyncHealth::Never,
            error: None,
        }
    }
}

/// Cycle-level counters
#[derive(Debug, Clone, Default, Serialize)]
pub struct CycleStats {
    /// When the last cycle started
    pub last_cycle_started_at: Option<DateTime<Utc>>,
    /// When the last cycle finished
    pub last_cycle_completed_at: Option<DateTime<Utc>>,
    /// Cycles skipped because the previous one overran its deadline
    pub skipped_cycles: u64,
    /// Completed cycles since startup
    pub completed_cycles: u64,
}

#[derive(Debug, Default)]
struct Inner {
    sources: HashMap<SourceKind, SourceSyncStatus>,
    cycle: CycleStats,
}

/// Shared sync-state handle
#[derive(Debug, Clone, Default)]
pub struct SyncState {
    inner: Arc<RwLock<Inner>>,
}

impl SyncState {
    /// Fresh state; every source starts as `Never`
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful sync for one source
    pub async fn record_ok(&self, source: SourceKind, count: u64) {
        let mut inner = self.inner.write().await;
        inner.sources.insert(
            source,
            SourceSyncStatus {
                last_sync_at: Some(Utc::now()),
                last_count: Some(count),
                status: SyncHealth::Ok,
                error: None,
            },
        );
    }

    /// Record a failed sync for one source
    pub async fn record_error(&self, source: SourceKind, error: impl Into<String>) {
        let mut inner = self.inner.write().await;
        let entry = inner.sources.entry(source).or_default();
        entry.last_sync_at = Some(Utc::now());
        entry.status = SyncHealth::Error;
        entry.error = Some(error.into());
    }

    /// Record the start of a cycle
    pub async fn cycle_started(&self) {
        let mut inner = self.inner.write().await;
        inner.cycle.last_cycle_started_at = Some(Utc::now());
    }

    /// Record the completion of a cycle
    pub async fn cycle_completed(&self) {
        let mut inner = self.inner.write().await;
        inner.cycle.last_cycle_completed_at = Some(Utc::now());
        inner.cycle.completed_cycles += 1;
    }

    /// Record ticks skipped after an overrunning cycle
    pub async fn cycles_skipped(&self, count: u64) {
        let mut inner = self.inner.write().await;
        inner.cycle.skipped_cycles += count;
    }

    /// Snapshot for the API
    pub async fn snapshot(&self) -> (HashMap<SourceKind, SourceSyncStatus>, CycleStats) {
        let inner = self.inner.read().await;
        (inner.sources.clone(), inner.cycle.clone())
    }

    /// True when any source is degraded
    pub async fn any_error(&self) -> bool {
        let inner = self.inner.read().await;
        inner
            .sources
            .values()
            .any(|s| s.status == SyncHealth::Error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_ok_and_error_transitions() {
        let state = SyncState::new();
        assert!(!state.any_error().await);

        state.record_ok(SourceKind::Email, 12).await;
        state
            .record_error(SourceKind::Invoice, "connection refused")
            .await;

        assert!(state.any_error().await);
        let (sources, _) = state.snapshot().await;
        assert_eq!(sources[&SourceKind::Email].status, SyncHealth::Ok);
        assert_eq!(sources[&SourceKind::Email].last_count, Some(12));
        assert_eq!(sources[&SourceKind::Invoice].status, SyncHealth::Error);
        assert!(sources[&SourceKind::Invoice].error.is_some());

        // Recovery clears the error
        state.record_ok(SourceKind::Invoice, 3).await;
        assert!(!state.any_error().await);
    }

    #[tokio::test]
    async fn cycle_counters() {
        let state = SyncState::new();
        state.cycle_started().await;
        state.cycle_completed().await;
        state.cycles_skipped(2).await;

        let (_, cycle) = state.snapshot().await;
        assert_eq!(cycle.completed_cycles, 1);
        assert_eq!(cycle.skipped_cycles, 2);
        assert!(cycle.last_cycle_completed_at.is_some());
    }
}
