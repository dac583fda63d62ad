//! HTTP surface: axum router fronting the query pipeline (C1-C9).

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::batch::{self, PointResult};
use crate::circuit_breaker::State as BreakerState;
use crate::collections::{Collection, DataType};
use crate::error::ElevationError;
use crate::geometry::{Point, QueryPoint};
use crate::metrics as app_metrics;
use crate::provider::AppState;

/// `{lat, lon}` or `{latitude, longitude}` — both spellings accepted on
/// every request body, per the documented external contract.
#[derive(Debug, Deserialize)]
struct LatLon {
    #[serde(alias = "latitude")]
    lat: f64,
    #[serde(alias = "longitude")]
    lon: f64,
}

impl LatLon {
    fn into_point(self) -> Result<Point, ElevationError> {
        Point::new(self.lat, self.lon)
    }
}

#[derive(Debug, Deserialize)]
struct ElevationQuery {
    lat: f64,
    lon: f64,
}

#[derive(Debug, Serialize)]
struct ElevationResponse {
    elevation_m: Option<f64>,
    latitude: f64,
    longitude: f64,
    dem_source_used: Option<String>,
    resolution_m: Option<f64>,
    data_type: Option<DataType>,
    message: Option<String>,
}

impl From<PointResult> for ElevationResponse {
    fn from(r: PointResult) -> Self {
        Self {
            elevation_m: r.elevation_m,
            latitude: r.latitude,
            longitude: r.longitude,
            dem_source_used: r.dem_source_used,
            resolution_m: r.resolution_m,
            data_type: r.data_type,
            message: r.message,
        }
    }
}

async fn get_elevation(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ElevationQuery>,
) -> Result<Json<ElevationResponse>, ElevationError> {
    let started = Instant::now();
    let point = Point::new(query.lat, query.lon)?;
    let query_point = QueryPoint::new(point);
    let resolution = state.orchestrator.resolve(&query_point).await;

    let outcome_tag = if resolution.elevation_m.is_some() {
        "found"
    } else {
        "not_found"
    };
    metrics::counter!("elevation_requests_total", "outcome" => outcome_tag).increment(1);
    app_metrics::record_breaker_snapshots(&state.breakers);

    info!(
        lat = point.lat,
        lon = point.lon,
        dem_source_used = resolution.dem_source_used.as_deref().unwrap_or("none"),
        elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
        "elevation request completed"
    );

    Ok(Json(ElevationResponse {
        elevation_m: resolution.elevation_m,
        latitude: point.lat,
        longitude: point.lon,
        dem_source_used: resolution.dem_source_used,
        resolution_m: resolution.resolution_m,
        data_type: resolution.data_type,
        message: resolution.message,
    }))
}

#[derive(Debug, Deserialize)]
struct PointsRequest {
    points: Vec<LatLon>,
}

#[derive(Debug, Serialize)]
struct PointsResponse {
    points: Vec<ElevationResponse>,
    total_points: usize,
    message: Option<String>,
}

async fn get_elevation_points(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PointsRequest>,
) -> Result<Json<PointsResponse>, ElevationError> {
    batch::check_batch_size(request.points.len(), state.config.max_batch_size)?;

    let points = request
        .points
        .into_iter()
        .map(LatLon::into_point)
        .collect::<Result<Vec<_>, _>>()?;
    let total_points = points.len();

    let started = Instant::now();
    let results = batch::resolve_many(&state.orchestrator, points, state.config.batch_concurrency).await;
    info!(
        total_points,
        elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
        "batch elevation request completed"
    );

    Ok(Json(PointsResponse {
        points: results.into_iter().map(ElevationResponse::from).collect(),
        total_points,
        message: None,
    }))
}

#[derive(Debug, Deserialize)]
struct LineRequest {
    start_point: LatLon,
    end_point: LatLon,
    num_points: usize,
}

async fn get_elevation_line(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LineRequest>,
) -> Result<Json<PointsResponse>, ElevationError> {
    let start = request.start_point.into_point()?;
    let end = request.end_point.into_point()?;
    let points = batch::interpolate_line(start, end, request.num_points)?;
    let total_points = points.len();

    let results = batch::resolve_many(&state.orchestrator, points, state.config.batch_concurrency).await;

    Ok(Json(PointsResponse {
        points: results.into_iter().map(ElevationResponse::from).collect(),
        total_points,
        message: None,
    }))
}

#[derive(Debug, Deserialize)]
struct PathRequest {
    points: Vec<LatLon>,
}

async fn get_elevation_path(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PathRequest>,
) -> Result<Json<PointsResponse>, ElevationError> {
    batch::check_batch_size(request.points.len(), state.config.max_batch_size)?;

    let points = request
        .points
        .into_iter()
        .map(LatLon::into_point)
        .collect::<Result<Vec<_>, _>>()?;
    let total_points = points.len();

    let results = batch::resolve_many(&state.orchestrator, points, state.config.batch_concurrency).await;

    Ok(Json(PointsResponse {
        points: results.into_iter().map(ElevationResponse::from).collect(),
        total_points,
        message: None,
    }))
}

#[derive(Debug, Serialize)]
struct CampaignSummary {
    id: String,
    country: String,
    name: String,
    survey_year: Option<i32>,
    resolution_m: f64,
    native_crs: u32,
    data_type: DataType,
    file_count: usize,
}

impl From<&Collection> for CampaignSummary {
    fn from(c: &Collection) -> Self {
        Self {
            id: c.id.clone(),
            country: c.country.to_string(),
            name: c.name.clone(),
            survey_year: c.survey_year,
            resolution_m: c.resolution_m,
            native_crs: c.native_crs,
            data_type: c.data_type,
            file_count: c.file_count,
        }
    }
}

async fn list_campaigns(State(state): State<Arc<AppState>>) -> Json<Vec<CampaignSummary>> {
    let summaries = state
        .spatial_index
        .collections()
        .iter()
        .map(CampaignSummary::from)
        .collect();
    Json(summaries)
}

#[derive(Debug, Deserialize)]
struct CampaignFilesQuery {
    file_page: Option<usize>,
    file_limit: Option<usize>,
}

#[derive(Debug, Serialize)]
struct CampaignDetail {
    #[serde(flatten)]
    summary: CampaignSummary,
    files: Vec<crate::collections::FileRef>,
    file_page: usize,
    file_limit: usize,
    total_files: usize,
}

const DEFAULT_FILE_PAGE_LIMIT: usize = 100;

async fn get_campaign(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<CampaignFilesQuery>,
) -> Result<Json<CampaignDetail>, ElevationError> {
    let collection = state
        .spatial_index
        .collections()
        .iter()
        .find(|c| c.id == id)
        .ok_or_else(|| ElevationError::Validation(format!("no campaign with id {id}")))?;

    let file_page = query.file_page.unwrap_or(0);
    let file_limit = query.file_limit.unwrap_or(DEFAULT_FILE_PAGE_LIMIT).max(1);
    let start = file_page * file_limit;
    let files = collection
        .files
        .iter()
        .skip(start)
        .take(file_limit)
        .cloned()
        .collect();

    Ok(Json(CampaignDetail {
        summary: CampaignSummary::from(collection),
        files,
        file_page,
        file_limit,
        total_files: collection.files.len(),
    }))
}

#[derive(Debug, Serialize)]
struct SourceHealth {
    id: String,
    state: &'static str,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    collection_count: usize,
    provider_type: &'static str,
    sources: Vec<SourceHealth>,
}

fn breaker_state_tag(state: BreakerState) -> &'static str {
    match state {
        BreakerState::Closed => "closed",
        BreakerState::HalfOpen => "half_open",
        BreakerState::Open => "open",
    }
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let sources = state
        .breakers
        .snapshots()
        .into_iter()
        .map(|(id, snapshot)| SourceHealth {
            id,
            state: breaker_state_tag(snapshot.state),
        })
        .collect();

    Json(HealthResponse {
        status: "ok",
        collection_count: state.spatial_index.len(),
        provider_type: "object_storage+http_api",
        sources,
    })
}

async fn metrics_handler(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    app_metrics::render(handle).await
}

pub fn build_router(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let api_router = Router::new()
        .route("/elevation", get(get_elevation))
        .route("/elevation/points", post(get_elevation_points))
        .route("/elevation/line", post(get_elevation_line))
        .route("/elevation/path", post(get_elevation_path))
        .route("/elevation/campaigns", get(list_campaigns))
        .route("/elevation/campaigns/{id}", get(get_campaign))
        .route("/health", get(health))
        .with_state(state);

    let metrics_router = Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metrics_handle);

    Router::new()
        .nest("/api/v1", api_router)
        .merge(metrics_router)
        .layer(CorsLayer::permissive())
}
