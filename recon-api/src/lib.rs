//! RemitRail read API
//!
//! HTTP/JSON surface over the local store: the reconciliation queue, record
//! detail, summary counts, suggestions, cross-source search, sync status,
//! and the dashboard overview, plus the two manual mutations (`associate`
//! and `flag`) and an ad-hoc sync trigger.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

pub mod error;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use state::AppState;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Build the router
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(routes::health))
        .route("/metrics", get(routes::metrics))
        .route("/queue", get(routes::queue))
        .route("/summary", get(routes::summary))
        .route("/search", get(routes::cross_search))
        .route("/overview", get(routes::overview))
        .route("/records/:nvc", get(routes::record))
        .route("/records/:nvc/suggestions", get(routes::suggestions))
        .route("/records/:nvc/associate", post(routes::associate))
        .route("/records/:nvc/flag", post(routes::flag))
        .route("/sync/status", get(routes::sync_status))
        .route("/sync/run", post(routes::sync_run))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
