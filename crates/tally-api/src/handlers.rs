//! Update, query, and health handlers.
//!
//! Error bodies are short plain-text strings that reporting agents match on,
//! so they stay fixed regardless of the underlying error detail.

use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use tally_service::ServiceError;
use tally_store::MetricEnvelope;
use tracing::{error, warn};

use crate::AppState;

const PING_TIMEOUT: Duration = Duration::from_secs(2);
const JSON_UTF8: &str = "application/json; charset=utf-8";

fn plain(status: StatusCode, msg: &str) -> Response {
    (status, msg.to_string()).into_response()
}

fn json(status: StatusCode, metric: &MetricEnvelope) -> Response {
    match serde_json::to_vec(metric) {
        Ok(body) => (
            status,
            [(CONTENT_TYPE, HeaderValue::from_static(JSON_UTF8))],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "failed to encode metric envelope");
            plain(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}

fn error_response(err: &ServiceError) -> Response {
    match err {
        ServiceError::BadValue(_) => plain(StatusCode::BAD_REQUEST, "bad value"),
        ServiceError::BadKind(_) => plain(StatusCode::BAD_REQUEST, "bad metric type"),
        ServiceError::MissingName => plain(StatusCode::NOT_FOUND, "metric name is required"),
        ServiceError::Storage(_) | ServiceError::Persist(_) => {
            error!(error = %err, "metric operation failed");
            plain(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}

/// Accept a missing or empty Content-Type, otherwise require `expected`
/// as a case-insensitive prefix so parameters like `charset` pass.
fn content_type_allowed(headers: &HeaderMap, expected: &str) -> bool {
    let Some(value) = headers.get(CONTENT_TYPE) else {
        return true;
    };
    let value = value.to_str().unwrap_or_default();
    value.is_empty() || value.to_ascii_lowercase().starts_with(expected)
}

/// Segments after the route prefix: `{kind}/{name}[/{value}]`.
struct MetricPath<'a> {
    kind: &'a str,
    name: &'a str,
    value: &'a str,
}

fn split_metric_path(path: &str) -> Result<MetricPath<'_>, Response> {
    let parts: Vec<&str> = path.strip_suffix('/').unwrap_or(path).split('/').collect();
    let (kind, name, value) = match parts.as_slice() {
        [kind, name] => (*kind, *name, ""),
        [kind, name, value] => (*kind, *name, *value),
        _ => return Err(plain(StatusCode::NOT_FOUND, "not found")),
    };
    if name.is_empty() {
        return Err(plain(StatusCode::NOT_FOUND, "metric name is required"));
    }
    Ok(MetricPath { kind, name, value })
}

fn decode_envelope(body: &[u8]) -> Result<MetricEnvelope, Response> {
    serde_json::from_slice(body).map_err(|e| {
        warn!(error = %e, "malformed metric envelope");
        plain(StatusCode::BAD_REQUEST, "bad value")
    })
}

// ── Updates ────────────────────────────────────────────────────

/// POST /update/{kind}/{name}/{value}
pub async fn update_text(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(path): Path<String>,
) -> Response {
    if !content_type_allowed(&headers, "text/plain") {
        return plain(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "unsupported media type: expected text/plain",
        );
    }
    let metric = match split_metric_path(&path) {
        Ok(m) => m,
        Err(resp) => return resp,
    };
    match state
        .service
        .update_metric(metric.kind, metric.name, metric.value)
        .await
    {
        Ok(()) => plain(StatusCode::OK, "OK"),
        Err(e) => error_response(&e),
    }
}

/// POST /update/
pub async fn update_json(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if !content_type_allowed(&headers, "application/json") {
        return plain(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "unsupported media type: expected application/json",
        );
    }
    let metric = match decode_envelope(&body) {
        Ok(m) => m,
        Err(resp) => return resp,
    };
    match state.service.update_envelope(&metric).await {
        Ok(current) => json(StatusCode::OK, &current),
        Err(e) => error_response(&e),
    }
}

// ── Queries ────────────────────────────────────────────────────

/// GET /value/{kind}/{name}
pub async fn value_text(State(state): State<AppState>, Path(path): Path<String>) -> Response {
    let metric = match split_metric_path(&path) {
        Ok(m) => m,
        Err(resp) => return resp,
    };
    match state.service.get_metric(metric.kind, metric.name).await {
        Ok(Some(value)) => plain(StatusCode::OK, &value),
        Ok(None) => plain(StatusCode::NOT_FOUND, "bad value"),
        Err(e) => error_response(&e),
    }
}

/// POST /value/
pub async fn value_json(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if !content_type_allowed(&headers, "application/json") {
        return plain(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "unsupported media type: expected application/json",
        );
    }
    let query = match decode_envelope(&body) {
        Ok(m) => m,
        Err(resp) => return resp,
    };
    match state.service.get_envelope(&query).await {
        Ok(Some(current)) => json(StatusCode::OK, &current),
        Ok(None) => plain(StatusCode::NOT_FOUND, "bad value"),
        Err(e) => error_response(&e),
    }
}

// ── Health ─────────────────────────────────────────────────────

/// GET /ping
pub async fn ping(State(state): State<AppState>) -> Response {
    let Some(health) = &state.health else {
        return plain(StatusCode::INTERNAL_SERVER_ERROR, "DB not configured");
    };
    match tokio::time::timeout(PING_TIMEOUT, health.ping()).await {
        Ok(Ok(())) => plain(StatusCode::OK, "OK"),
        Ok(Err(e)) => {
            warn!(error = %e, "database ping failed");
            plain(StatusCode::INTERNAL_SERVER_ERROR, "DB ping failed")
        }
        Err(_) => {
            warn!(timeout_secs = PING_TIMEOUT.as_secs(), "database ping timed out");
            plain(StatusCode::INTERNAL_SERVER_ERROR, "DB ping failed")
        }
    }
}
