//! HTTP tests for the experiment routes.
//!
//! Tests cover:
//! - Principal header enforcement
//! - Absence and foreign ownership both mapping to 404
//! - The three shapes over the wire
//! - Listing, query validation and the error envelope
//! - Health and metrics endpoints

use atlas_core::aggregation::{AggregationConfig, ExperimentAggregator};
use atlas_core::api::{build_router, AppState, PRINCIPAL_HEADER};
use atlas_core::model::{Experiment, ExperimentStatus, GuideCandidate, OffTargetSite, PrincipalId, Sequence};
use atlas_core::store::{InMemoryStore, ReadStore};
use atlas_core::telemetry::MetricsRegistry;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

// ============================================================================
// Helpers
// ============================================================================

struct TestApp {
    router: Router,
    experiment_id: Uuid,
}

async fn test_app() -> TestApp {
    let store = InMemoryStore::new();
    let experiment = Experiment::new("alice", "BRCA1 knockout").with_status(ExperimentStatus::Designing);
    let sequence = Sequence::new(experiment.id, "exon 11", "ACGTACGTACGT");
    let guide = GuideCandidate::new(sequence.id, "GACGTTACGATCGATCGATC", 0.82);
    let site = OffTargetSite::new(guide.id, "chr17", 0.31).with_mismatches(2);
    let experiment_id = experiment.id.as_uuid();

    store.insert_experiment(experiment).await;
    store.insert_experiment(Experiment::new("bob", "bob's experiment")).await;
    store.insert_sequence(sequence).await;
    store.insert_guide(guide).await;
    store.insert_off_target(site).await;

    let store: Arc<dyn ReadStore> = Arc::new(store);
    let aggregator = Arc::new(ExperimentAggregator::new(store.clone(), AggregationConfig::default()));
    let router = build_router(AppState::new(aggregator, store, MetricsRegistry::disabled()));

    TestApp { router, experiment_id }
}

fn get(uri: &str, principal: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(principal) = principal {
        builder = builder.header(PRINCIPAL_HEADER, principal);
    }
    builder.body(Body::empty()).unwrap()
}

async fn body_json(body: Body) -> Value {
    let bytes = to_bytes(body, usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

// ============================================================================
// Principal Tests
// ============================================================================

#[tokio::test]
async fn test_missing_principal_is_unauthorized() {
    let app = test_app().await;

    let uri = format!("/api/v1/experiments/{}", app.experiment_id);
    let response = app.router.oneshot(get(&uri, None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = body_json(response.into_body()).await;
    assert_eq!(json["success"], false);
    assert_eq!(json["error"]["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_blank_principal_is_unauthorized() {
    let app = test_app().await;

    let response = app
        .router
        .oneshot(get("/api/v1/experiments", Some("   ")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

// ============================================================================
// Experiment Tests
// ============================================================================

#[tokio::test]
async fn test_get_experiment_default_shape() {
    let app = test_app().await;

    let uri = format!("/api/v1/experiments/{}", app.experiment_id);
    let response = app.router.oneshot(get(&uri, Some("alice"))).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response.into_body()).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["data"]["name"], "BRCA1 knockout");
    assert_eq!(json["data"]["status"], "designing");
    assert!(json["data"].get("sequences").is_none());
}

#[tokio::test]
async fn test_get_experiment_sequences_shape() {
    let app = test_app().await;

    let uri = format!("/api/v1/experiments/{}?shape=sequences", app.experiment_id);
    let response = app.router.oneshot(get(&uri, Some("alice"))).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response.into_body()).await;
    let sequences = json["data"]["sequences"].as_array().unwrap();
    assert_eq!(sequences.len(), 1);
    assert_eq!(sequences[0]["name"], "exon 11");
    assert!(sequences[0].get("guides").is_none());
}

#[tokio::test]
async fn test_get_experiment_full_shape() {
    let app = test_app().await;

    let uri = format!("/api/v1/experiments/{}?shape=full", app.experiment_id);
    let response = app.router.oneshot(get(&uri, Some("alice"))).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response.into_body()).await;
    let guide = &json["data"]["sequences"][0]["guides"][0];
    assert_eq!(guide["spacer"], "GACGTTACGATCGATCGATC");
    assert_eq!(guide["off_targets"][0]["chromosome"], "chr17");
    assert_eq!(guide["off_targets"][0]["mismatches"], 2);
}

#[tokio::test]
async fn test_foreign_experiment_is_not_found() {
    let app = test_app().await;

    let uri = format!("/api/v1/experiments/{}?shape=full", app.experiment_id);
    let response = app.router.oneshot(get(&uri, Some("bob"))).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_json(response.into_body()).await;
    assert_eq!(json["error"]["code"], "RECORD_NOT_FOUND");
}

#[tokio::test]
async fn test_foreign_and_missing_answer_alike() {
    let app = test_app().await;

    let foreign = format!("/api/v1/experiments/{}", app.experiment_id);
    let missing_id = Uuid::new_v4();
    let missing = format!("/api/v1/experiments/{}", missing_id);

    let foreign_resp = app.router.clone().oneshot(get(&foreign, Some("bob"))).await.unwrap();
    let missing_resp = app.router.oneshot(get(&missing, Some("bob"))).await.unwrap();

    assert_eq!(foreign_resp.status(), missing_resp.status());
    let foreign_json = body_json(foreign_resp.into_body()).await;
    let missing_json = body_json(missing_resp.into_body()).await;
    assert_eq!(
        foreign_json["error"]["message"].as_str().unwrap(),
        format!("Experiment not found: {}", app.experiment_id)
    );
    assert_eq!(
        missing_json["error"]["message"].as_str().unwrap(),
        format!("Experiment not found: {}", missing_id)
    );
}

#[tokio::test]
async fn test_unknown_shape_is_rejected() {
    let app = test_app().await;

    let uri = format!("/api/v1/experiments/{}?shape=everything", app.experiment_id);
    let response = app.router.oneshot(get(&uri, Some("alice"))).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let json = body_json(response.into_body()).await;
    assert_eq!(json["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_zero_limit_is_rejected() {
    let app = test_app().await;

    let uri = format!("/api/v1/experiments/{}?shape=sequences&limit=0", app.experiment_id);
    let response = app.router.oneshot(get(&uri, Some("alice"))).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_malformed_id_is_bad_request() {
    let app = test_app().await;

    let response = app
        .router
        .oneshot(get("/api/v1/experiments/not-a-uuid", Some("alice")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response.into_body()).await;
    assert_eq!(json["success"], false);
    assert_eq!(json["error"]["code"], "INVALID_INPUT");
    assert_eq!(json["error"]["numeric_code"], 4101);
}

#[tokio::test]
async fn test_non_numeric_limit_uses_error_envelope() {
    let app = test_app().await;

    let uri = format!("/api/v1/experiments/{}?limit=abc", app.experiment_id);
    let response = app.router.oneshot(get(&uri, Some("alice"))).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response.into_body()).await;
    assert_eq!(json["error"]["code"], "INVALID_INPUT");
}

#[tokio::test]
async fn test_list_negative_limit_uses_error_envelope() {
    let app = test_app().await;

    let response = app
        .router
        .oneshot(get("/api/v1/experiments?limit=-1", Some("alice")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response.into_body()).await;
    assert_eq!(json["success"], false);
    assert_eq!(json["error"]["code"], "INVALID_INPUT");
}

// ============================================================================
// Listing Tests
// ============================================================================

#[tokio::test]
async fn test_list_only_own_experiments() {
    let app = test_app().await;

    let response = app
        .router
        .oneshot(get("/api/v1/experiments", Some("alice")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response.into_body()).await;
    let data = json["data"].as_array().unwrap();
    assert_eq!(data.len(), 1);
    assert_eq!(data[0]["principal_id"], "alice");
}

#[tokio::test]
async fn test_list_status_filter() {
    let app = test_app().await;

    let response = app
        .router
        .oneshot(get("/api/v1/experiments?status=archived", Some("alice")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response.into_body()).await;
    assert!(json["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_list_unknown_status_is_rejected() {
    let app = test_app().await;

    let response = app
        .router
        .oneshot(get("/api/v1/experiments?status=shelved", Some("alice")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

// ============================================================================
// Health and Metrics Tests
// ============================================================================

#[tokio::test]
async fn test_health_check() {
    let app = test_app().await;

    let response = app.router.oneshot(get("/health", None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response.into_body()).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["store"], "up");
    assert_eq!(json["fanout"]["name"], "aggregation");
}

#[tokio::test]
async fn test_metrics_without_exporter() {
    let app = test_app().await;

    let response = app.router.oneshot(get("/metrics", None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[test]
fn test_principal_header_name() {
    assert_eq!(PRINCIPAL_HEADER, "x-principal-id");
    assert_eq!(PrincipalId::new("alice").as_str(), "alice");
}
