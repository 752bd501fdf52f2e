//! Route handlers

use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::Utc;
use recon_core::{ManualFlag, MatchStatus, ReconciliationRecord};
use recon_engine::AssociateTarget;
use recon_store::queries::{
    self, CrossSearchFilter, CrossSearchResults, QueueFilter, QueueSort, SearchSource,
    SuggestionCandidates,
};
use recon_store::{invoices, records};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::str::FromStr;
use tracing::info;

fn parse_match_status(s: &str) -> Result<MatchStatus, ApiError> {
    MatchStatus::all()
        .iter()
        .copied()
        .find(|m| m.as_str() == s)
        .ok_or_else(|| ApiError::BadRequest(format!("unknown match_status '{}'", s)))
}

fn parse_amount(field: &str, raw: &str) -> Result<Decimal, ApiError> {
    Decimal::from_str(raw)
        .map_err(|_| ApiError::BadRequest(format!("{} is not a decimal amount: '{}'", field, raw)))
}

/// `GET /health` - liveness only, never probes sources
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// `GET /metrics` - Prometheus exposition
pub async fn metrics() -> Result<String, ApiError> {
    let encoder = prometheus::TextEncoder::new();
    encoder
        .encode_to_string(&prometheus::gather())
        .map_err(|e| ApiError::Internal(format!("metrics encoding failed: {}", e)))
}

/// Queue query parameters
#[derive(Debug, Default, Deserialize)]
pub struct QueueParams {
    match_status: Option<String>,
    tenant: Option<String>,
    invoice_status: Option<String>,
    q: Option<String>,
    sort: Option<String>,
    limit: Option<u32>,
    offset: Option<u32>,
}

/// `GET /queue` - paged reconciliation listing
pub async fn queue(
    State(state): State<AppState>,
    Query(params): Query<QueueParams>,
) -> Result<Json<Vec<ReconciliationRecord>>, ApiError> {
    let match_status = params
        .match_status
        .as_deref()
        .map(parse_match_status)
        .transpose()?;
    let invoice_status = params
        .invoice_status
        .as_deref()
        .map(|s| {
            recon_core::InvoiceStatus::parse(s)
                .ok_or_else(|| ApiError::BadRequest(format!("unknown invoice_status '{}'", s)))
        })
        .transpose()?;
    let sort = params
        .sort
        .as_deref()
        .map(|s| {
            QueueSort::parse(s)
                .ok_or_else(|| ApiError::BadRequest(format!("unknown sort '{}'", s)))
        })
        .transpose()?
        .unwrap_or_default();

    let filter = QueueFilter {
        match_status,
        tenant: params.tenant,
        invoice_status,
        q: params.q,
        sort,
        limit: params.limit.unwrap_or(50),
        offset: params.offset.unwrap_or(0),
    };
    Ok(Json(queries::queue(state.store.pool(), &filter).await?))
}

/// Record detail: the row plus its pay-run header when one is referenced
#[derive(Debug, Serialize)]
pub struct RecordDetail {
    record: ReconciliationRecord,
    payrun: Option<recon_core::CachedPayrun>,
}

/// `GET /records/:nvc` - one record with all legs
pub async fn record(
    State(state): State<AppState>,
    Path(nvc): Path<String>,
) -> Result<Json<RecordDetail>, ApiError> {
    let record = records::get_record(state.store.pool(), &nvc)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("no record for {}", nvc)))?;

    let payrun = match &record.invoice_payrun_ref {
        Some(payrun_ref) => invoices::get_payrun(state.store.pool(), payrun_ref).await?,
        None => None,
    };

    Ok(Json(RecordDetail { record, payrun }))
}

/// Summary response
#[derive(Debug, Serialize)]
pub struct SummaryResponse {
    total: i64,
    counts: HashMap<String, i64>,
    matched: i64,
    mismatched: i64,
    status_issues: i64,
}

/// `GET /summary` - counts per match status
pub async fn summary(State(state): State<AppState>) -> Result<Json<SummaryResponse>, ApiError> {
    let summary = queries::summary(state.store.pool()).await?;
    Ok(Json(SummaryResponse {
        total: summary.total,
        matched: summary.matched(),
        mismatched: summary.mismatched(),
        status_issues: summary.status_issues(),
        counts: summary.counts,
    }))
}

/// `GET /records/:nvc/suggestions` - candidates for missing legs
pub async fn suggestions(
    State(state): State<AppState>,
    Path(nvc): Path<String>,
) -> Result<Json<SuggestionCandidates>, ApiError> {
    Ok(Json(state.engine.suggestions(&nvc).await?))
}

/// Cross-search query parameters
#[derive(Debug, Deserialize)]
pub struct SearchParams {
    q: Option<String>,
    source: String,
    amount_min: Option<String>,
    amount_max: Option<String>,
    tenant: Option<String>,
    limit: Option<u32>,
}

/// `GET /search` - search one source cache by text and amount
pub async fn cross_search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<CrossSearchResults>, ApiError> {
    let source = SearchSource::parse(&params.source)
        .ok_or_else(|| ApiError::BadRequest(format!("unknown source '{}'", params.source)))?;
    let amount_min = params
        .amount_min
        .as_deref()
        .map(|raw| parse_amount("amount_min", raw))
        .transpose()?;
    let amount_max = params
        .amount_max
        .as_deref()
        .map(|raw| parse_amount("amount_max", raw))
        .transpose()?;

    let filter = CrossSearchFilter {
        q: params.q,
        source,
        amount_min,
        amount_max,
        tenant: params.tenant,
        limit: params.limit.unwrap_or(50),
    };
    Ok(Json(queries::cross_search(state.store.pool(), &filter).await?))
}

/// `GET /sync/status` - per-source sync state
pub async fn sync_status(State(state): State<AppState>) -> Json<Value> {
    let (sources, cycle) = state.engine.sync_state().snapshot().await;
    let degraded = state.engine.sync_state().any_error().await;

    let sources: HashMap<&'static str, _> = sources
        .into_iter()
        .map(|(kind, status)| (kind.as_str(), status))
        .collect();

    Json(json!({
        "sources": sources,
        "cycle": cycle,
        "degraded": degraded,
    }))
}

/// Overview query parameters
#[derive(Debug, Deserialize)]
pub struct OverviewParams {
    window_days: Option<i64>,
}

/// `GET /overview` - dashboard aggregates plus current source errors
pub async fn overview(
    State(state): State<AppState>,
    Query(params): Query<OverviewParams>,
) -> Result<Json<Value>, ApiError> {
    let window_days = params.window_days.unwrap_or(30).clamp(1, 365);
    let overview = queries::overview(state.store.pool(), window_days, Utc::now()).await?;

    let (sources, _) = state.engine.sync_state().snapshot().await;
    let errors: HashMap<&'static str, String> = sources
        .into_iter()
        .filter_map(|(kind, status)| status.error.map(|e| (kind.as_str(), e)))
        .collect();

    Ok(Json(json!({
        "overview": overview,
        "errors": errors,
    })))
}

/// `POST /sync/run` - ad-hoc cycle, runs in the background
pub async fn sync_run(State(state): State<AppState>) -> Json<Value> {
    let scheduler = state.scheduler.clone();
    tokio::spawn(async move {
        if let Err(err) = scheduler.trigger().await {
            tracing::error!(error = %err, "ad-hoc sync cycle failed");
        }
    });
    Json(json!({ "status": "started" }))
}

/// Associate request body
#[derive(Debug, Deserialize)]
pub struct AssociateBody {
    target_id: String,
    source: String,
}

/// `POST /records/:nvc/associate` - manual leg association
pub async fn associate(
    State(state): State<AppState>,
    Path(nvc): Path<String>,
    Json(body): Json<AssociateBody>,
) -> Result<Json<ReconciliationRecord>, ApiError> {
    let target = AssociateTarget::parse(&body.source, &body.target_id)
        .ok_or_else(|| ApiError::BadRequest(format!("unknown source '{}'", body.source)))?;
    info!(nvc = %nvc, source = %body.source, target = %body.target_id, "manual association");
    Ok(Json(state.engine.associate(&nvc, target).await?))
}

/// Flag request body; a null flag clears it
#[derive(Debug, Deserialize)]
pub struct FlagBody {
    flag: Option<String>,
    notes: Option<String>,
    actor: Option<String>,
}

/// `POST /records/:nvc/flag` - set or clear the manual flag
pub async fn flag(
    State(state): State<AppState>,
    Path(nvc): Path<String>,
    Json(body): Json<FlagBody>,
) -> Result<Json<ReconciliationRecord>, ApiError> {
    let flag = body
        .flag
        .as_deref()
        .map(|s| {
            ManualFlag::parse(s)
                .ok_or_else(|| ApiError::BadRequest(format!("unknown flag '{}'", s)))
        })
        .transpose()?;

    info!(nvc = %nvc, flag = ?flag, "manual flag update");
    Ok(Json(
        state
            .engine
            .set_flag(&nvc, flag, body.notes.as_deref(), body.actor.as_deref())
            .await?,
    ))
}
