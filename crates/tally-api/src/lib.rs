//! tally-api — HTTP surface of the Tally metrics server.
//!
//! Two wire encodings of the same update and query operations, a health
//! probe for the relational backend, and a read-only HTML dashboard.
//!
//! # Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | POST | `/update/{kind}/{name}/{value}` | Text update |
//! | POST | `/update/` | JSON envelope update |
//! | GET | `/value/{kind}/{name}` | Text query |
//! | POST | `/value/` | JSON envelope query |
//! | GET | `/ping` | Backend health probe |
//! | GET | `/` | HTML dashboard |

pub mod dashboard;
pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tally_service::MetricsService;
use tally_store::HealthCheck;
use tower_http::compression::CompressionLayer;
use tower_http::decompression::RequestDecompressionLayer;
use tower_http::trace::TraceLayer;

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<MetricsService>,
    /// Present only when a relational backend is in use.
    pub health: Option<Arc<dyn HealthCheck>>,
}

impl AppState {
    pub fn new(service: Arc<MetricsService>) -> Self {
        Self {
            service,
            health: None,
        }
    }

    pub fn with_health(mut self, health: Arc<dyn HealthCheck>) -> Self {
        self.health = Some(health);
        self
    }
}

/// Build the complete router with tracing and gzip middleware.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(dashboard::index))
        .route("/ping", get(handlers::ping))
        .route("/update/", post(handlers::update_json))
        .route("/update/{*path}", post(handlers::update_text))
        .route("/value/", post(handlers::value_json))
        .route("/value/{*path}", get(handlers::value_text))
        .with_state(state)
        .layer(RequestDecompressionLayer::new().gzip(true))
        .layer(CompressionLayer::new().gzip(true))
        .layer(TraceLayer::new_for_http())
}
