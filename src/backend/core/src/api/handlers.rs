use axum::{
    extract::{MatchedPath, Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use std::time::Instant;
use uuid::Uuid;

use super::extract::{ApiPath, ApiQuery};
use super::principal::Principal;
use super::{ApiResponse, AppState};
use crate::aggregation::{ListExperiments, Shape};
use crate::error::AtlasError;
use crate::model::{ExperimentId, ExperimentStatus};
use crate::telemetry::RequestDurationHistogram;

// ═══════════════════════════════════════════════════════════════════════════════
// Health and Metrics
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let store_ok = match state.store.ping().await {
        Ok(()) => true,
        Err(e) => {
            e.log();
            false
        }
    };

    let status = if store_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(serde_json::json!({
            "status": if store_ok { "healthy" } else { "degraded" },
            "store": if store_ok { "up" } else { "down" },
            "version": env!("CARGO_PKG_VERSION"),
            "fanout": state.aggregator.fanout_stats(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        })),
    )
}

pub async fn prometheus_metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        state.metrics.render(),
    )
}

/// Records request count and duration per matched route.
pub async fn track_requests(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(request).await;

    RequestDurationHistogram::record(
        &method,
        &path,
        response.status().as_u16(),
        start.elapsed().as_secs_f64(),
    );
    response
}

// ═══════════════════════════════════════════════════════════════════════════════
// Experiment Handlers
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
pub struct ExperimentQuery {
    #[serde(default)]
    pub shape: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
    pub limit: Option<usize>,
}

pub async fn get_experiment(
    State(state): State<AppState>,
    Principal(principal): Principal,
    ApiPath(id): ApiPath<Uuid>,
    ApiQuery(query): ApiQuery<ExperimentQuery>,
) -> Result<impl IntoResponse, AtlasError> {
    let shape = match query.shape.as_deref() {
        Some(raw) => raw.parse::<Shape>()?,
        None => Shape::default(),
    };

    let view = state
        .aggregator
        .fetch(shape, ExperimentId(id), &principal, query.limit)
        .await?
        .ok_or_else(|| AtlasError::not_found("Experiment", id.to_string()))?;

    Ok(Json(ApiResponse::success(view)))
}

pub async fn list_experiments(
    State(state): State<AppState>,
    Principal(principal): Principal,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> Result<impl IntoResponse, AtlasError> {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<ExperimentStatus>)
        .transpose()?;

    let experiments = state
        .aggregator
        .list_experiments(
            &principal,
            ListExperiments {
                status,
                limit: query.limit,
            },
        )
        .await?;

    Ok(Json(ApiResponse::success(experiments)))
}
