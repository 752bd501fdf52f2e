//! Shared API state

use recon_engine::{ReconEngine, Scheduler};
use recon_store::Store;
use std::sync::Arc;

/// State shared by all handlers
#[derive(Clone)]
pub struct AppState {
    /// The local cache store (reads)
    pub store: Store,

    /// The reconciliation engine (writes, suggestions, sync state)
    pub engine: Arc<ReconEngine>,

    /// The sync scheduler (ad-hoc trigger)
    pub scheduler: Arc<Scheduler>,
}
