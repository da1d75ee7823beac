//! Typed error taxonomy for the public API boundary.
//!
//! Internal helpers use `anyhow::Result` and `.context(...)` for plumbing
//! (matching the rest of this crate's idiom); the public API converts to
//! [`HsgError`] at its boundary so the HTTP layer can map errors to status
//! codes without re-parsing anyhow chains.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum HsgError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("dimension incompatible: {0}")]
    DimIncompatible(String),

    #[error("provider failure: {0}")]
    ProviderFailure(String),

    #[error("ssrf blocked: {0}")]
    SsrfBlocked(String),

    #[error("transaction aborted: {0}")]
    TransactionAborted(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl HsgError {
    pub fn code(&self) -> &'static str {
        match self {
            HsgError::NotFound(_) => "NOT_FOUND",
            HsgError::Forbidden(_) => "FORBIDDEN",
            HsgError::InvalidRequest(_) => "INVALID_REQUEST",
            HsgError::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            HsgError::DimIncompatible(_) => "DIM_INCOMPATIBLE",
            HsgError::ProviderFailure(_) => "PROVIDER_FAILURE",
            HsgError::SsrfBlocked(_) => "SSRF_BLOCKED",
            HsgError::TransactionAborted(_) => "TRANSACTION_ABORTED",
            HsgError::Internal(_) => "INTERNAL",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            HsgError::NotFound(_) => StatusCode::NOT_FOUND,
            HsgError::Forbidden(_) => StatusCode::FORBIDDEN,
            HsgError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            HsgError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            HsgError::DimIncompatible(_) => StatusCode::UNPROCESSABLE_ENTITY,
            HsgError::ProviderFailure(_) => StatusCode::BAD_GATEWAY,
            HsgError::SsrfBlocked(_) => StatusCode::BAD_REQUEST,
            HsgError::TransactionAborted(_) => StatusCode::INTERNAL_SERVER_ERROR,
            HsgError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl HsgError {
    /// Converts an `anyhow::Error` from the embedding router, recovering the
    /// typed `DimIncompatible` case instead of collapsing it to `Internal`.
    pub fn from_router_error(e: anyhow::Error) -> Self {
        match e.downcast::<crate::embedding::router::DimIncompatible>() {
            Ok(dim) => HsgError::DimIncompatible(dim.to_string()),
            Err(e) => HsgError::Internal(e),
        }
    }

    /// Converts an `anyhow::Error` from the ingestion pipeline, recovering
    /// the typed `PayloadTooLarge` (spec §6: "413 on oversized file") and
    /// `SsrfBlocked` (spec §6: "4xx on SSRF-blocked hosts") cases instead of
    /// collapsing either to `Internal`.
    pub fn from_ingest_error(e: anyhow::Error) -> Self {
        let e = match e.downcast::<crate::memory::ingest::PayloadTooLarge>() {
            Ok(too_large) => return HsgError::PayloadTooLarge(too_large.to_string()),
            Err(e) => e,
        };
        match e.downcast::<crate::memory::ingest::SsrfBlocked>() {
            Ok(blocked) => HsgError::SsrfBlocked(blocked.to_string()),
            Err(e) => HsgError::Internal(e),
        }
    }
}

impl From<rusqlite::Error> for HsgError {
    fn from(e: rusqlite::Error) -> Self {
        HsgError::TransactionAborted(e.to_string())
    }
}

impl IntoResponse for HsgError {
    fn into_response(self) -> Response {
        if matches!(self, HsgError::Internal(_) | HsgError::TransactionAborted(_)) {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::warn!(error = %self, "request rejected");
        }
        let status = self.status();
        let body = Json(json!({
            "error": { "code": self.code(), "message": self.to_string() }
        }));
        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, HsgError>;
