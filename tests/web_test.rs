//! Black-box HTTP tests over the axum router, exercised with `oneshot`
//! rather than a bound listener. `AppState` is built directly (no
//! spatial index fetch) against an empty index, so these cover routing,
//! request validation, and the "no coverage" fallback path without
//! needing real raster data on disk.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use terra_elevate::circuit_breaker::BreakerRegistry;
use terra_elevate::config::AppConfig;
use terra_elevate::orchestrator::Orchestrator;
use terra_elevate::provider::AppState;
use terra_elevate::spatial_index::SpatialIndex;
use terra_elevate::usage_stats::UsageStats;
use terra_elevate::web::build_router;

fn empty_app_state() -> Arc<AppState> {
    let spatial_index = Arc::new(SpatialIndex::build(vec![]));
    let usage_stats = Arc::new(UsageStats::new(std::iter::empty::<String>()));
    let breakers = Arc::new(BreakerRegistry::new());
    let orchestrator = Arc::new(Orchestrator::new(vec![], usage_stats.clone()));

    Arc::new(AppState {
        config: AppConfig::from_env(),
        spatial_index,
        orchestrator,
        breakers,
        usage_stats,
    })
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_reports_zero_collections_for_empty_index() {
    let state = empty_app_state();
    let metrics_handle = terra_elevate::metrics::init_metrics();
    let app = build_router(state, metrics_handle);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["collection_count"], 0);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn get_elevation_with_no_sources_returns_null_elevation() {
    let state = empty_app_state();
    let metrics_handle = terra_elevate::metrics::init_metrics();
    let app = build_router(state, metrics_handle);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/elevation?lat=-27.4698&lon=153.0251")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body["elevation_m"].is_null());
    assert!(body["message"].is_string());
}

#[tokio::test]
async fn get_elevation_rejects_out_of_range_latitude() {
    let state = empty_app_state();
    let metrics_handle = terra_elevate::metrics::init_metrics();
    let app = build_router(state, metrics_handle);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/elevation?lat=120.0&lon=153.0")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn points_endpoint_accepts_latitude_longitude_alias() {
    let state = empty_app_state();
    let metrics_handle = terra_elevate::metrics::init_metrics();
    let app = build_router(state, metrics_handle);

    let request_body = json!({
        "points": [
            {"latitude": -27.4698, "longitude": 153.0251},
            {"lat": -36.8485, "lon": 174.7633},
        ]
    });

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/elevation/points")
                .header("content-type", "application/json")
                .body(Body::from(request_body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["total_points"], 2);
    assert_eq!(body["points"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn points_endpoint_rejects_batch_over_configured_limit() {
    let mut config = AppConfig::from_env();
    config.max_batch_size = 2;

    let spatial_index = Arc::new(SpatialIndex::build(vec![]));
    let usage_stats = Arc::new(UsageStats::new(std::iter::empty::<String>()));
    let breakers = Arc::new(BreakerRegistry::new());
    let orchestrator = Arc::new(Orchestrator::new(vec![], usage_stats.clone()));
    let state = Arc::new(AppState {
        config,
        spatial_index,
        orchestrator,
        breakers,
        usage_stats,
    });

    let metrics_handle = terra_elevate::metrics::init_metrics();
    let app = build_router(state, metrics_handle);

    let request_body = json!({
        "points": [
            {"lat": -27.0, "lon": 153.0},
            {"lat": -27.1, "lon": 153.1},
            {"lat": -27.2, "lon": 153.2},
        ]
    });

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/elevation/points")
                .header("content-type", "application/json")
                .body(Body::from(request_body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn line_endpoint_returns_endpoints_and_interior_points() {
    let state = empty_app_state();
    let metrics_handle = terra_elevate::metrics::init_metrics();
    let app = build_router(state, metrics_handle);

    let request_body = json!({
        "start_point": {"lat": -27.4698, "lon": 153.0251},
        "end_point": {"lat": -27.5000, "lon": 153.0500},
        "num_points": 4,
    });

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/elevation/line")
                .header("content-type", "application/json")
                .body(Body::from(request_body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["total_points"], 4);
}

#[tokio::test]
async fn campaigns_list_is_empty_for_empty_index() {
    let state = empty_app_state();
    let metrics_handle = terra_elevate::metrics::init_metrics();
    let app = build_router(state, metrics_handle);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/elevation/campaigns")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn campaign_detail_404s_for_unknown_id() {
    let state = empty_app_state();
    let metrics_handle = terra_elevate::metrics::init_metrics();
    let app = build_router(state, metrics_handle);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/elevation/campaigns/does-not-exist")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
