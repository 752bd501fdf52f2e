//! API error envelope
//!
//! Every error serializes as `{"detail": "..."}` with a conventional status
//! code.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// API-level error
#[derive(Debug)]
pub enum ApiError {
    /// Invalid query or body (400)
    BadRequest(String),
    /// Unknown record or target (404)
    NotFound(String),
    /// Store or engine failure (500)
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            ApiError::BadRequest(detail) => (StatusCode::BAD_REQUEST, detail),
            ApiError::NotFound(detail) => (StatusCode::NOT_FOUND, detail),
            ApiError::Internal(detail) => (StatusCode::INTERNAL_SERVER_ERROR, detail),
        };
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

impl From<recon_store::Error> for ApiError {
    fn from(err: recon_store::Error) -> Self {
        match err {
            recon_store::Error::NotFound(what) => ApiError::NotFound(what),
            recon_store::Error::LinkConflict(what) => ApiError::BadRequest(what),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<recon_engine::Error> for ApiError {
    fn from(err: recon_engine::Error) -> Self {
        if err.is_invalid_input() {
            ApiError::BadRequest(err.to_string())
        } else {
            ApiError::Internal(err.to_string())
        }
    }
}
