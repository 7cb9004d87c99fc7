//! HTTP API for Atlas Core.
//!
//! | Route | Description |
//! |-------|-------------|
//! | `GET /health` | Liveness plus a store ping |
//! | `GET /metrics` | Prometheus exposition |
//! | `GET /api/v1/experiments` | Experiments owned by the caller, newest first |
//! | `GET /api/v1/experiments/:id` | One experiment at `shape=shallow\|sequences\|full` |
//!
//! Every `/api/v1` route requires the `X-Principal-Id` header. An experiment
//! that is missing and one owned by another principal both answer 404. A
//! path or query string that does not parse answers 400 `INVALID_INPUT`.

mod extract;
mod handlers;
pub mod principal;

use axum::{middleware, routing::get, Router};
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::aggregation::ExperimentAggregator;
use crate::store::ReadStore;
use crate::telemetry::MetricsRegistry;

pub use principal::{Principal, PRINCIPAL_HEADER};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub aggregator: Arc<ExperimentAggregator>,
    pub store: Arc<dyn ReadStore>,
    pub metrics: MetricsRegistry,
}

impl AppState {
    pub fn new(aggregator: Arc<ExperimentAggregator>, store: Arc<dyn ReadStore>, metrics: MetricsRegistry) -> Self {
        Self {
            aggregator,
            store,
            metrics,
        }
    }
}

/// Build the API router.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let v1 = Router::new()
        .route("/experiments", get(handlers::list_experiments))
        .route("/experiments/:id", get(handlers::get_experiment));

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::prometheus_metrics))
        .nest("/api/v1", v1)
        .route_layer(middleware::from_fn(handlers::track_requests))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors)
        .with_state(state)
}

/// Success envelope. Failures use [`crate::error::ErrorResponse`], which
/// shares the `success` flag.
#[derive(Debug, serde::Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T: serde::Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self { success: true, data }
    }
}
