//! Error taxonomy shared across the query pipeline.
//!
//! Internal/startup failures (index fetch, PROJ init, GDAL open at startup
//! validation) are plain `anyhow::Result` — they abort the process and
//! carry ad-hoc context. Anything that crosses a component boundary at
//! request time is this typed enum instead, so the orchestrator (C7) can
//! pattern-match on it without downcasting.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// The error taxonomy shared across components. `CircuitOpen` and
/// `NotCovered`/`NoData` are handled as `ElevationOutcome` variants, not as
/// errors that unwind — see `sources::ElevationOutcome`. This enum is for
/// failures a source actually wants to report as a failure.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ElevationError {
    #[error("validation: {0}")]
    Validation(String),

    #[error("unknown EPSG code: {0}")]
    CrsUnknown(u32),

    #[error("raster CRS {raster_epsg} does not match file reference CRS {expected_epsg}")]
    CrsMismatch { raster_epsg: u32, expected_epsg: u32 },

    #[error("timeout after {0:?}")]
    Timeout(std::time::Duration),

    #[error("rate limited, retry after {retry_after_secs:?}s")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("circuit open for source {0}")]
    CircuitOpen(String),

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ElevationError {
    /// Short machine-readable tag, used in metrics labels and log fields.
    pub fn kind_tag(&self) -> &'static str {
        match self {
            ElevationError::Validation(_) => "validation",
            ElevationError::CrsUnknown(_) => "crs_unknown",
            ElevationError::CrsMismatch { .. } => "crs_mismatch",
            ElevationError::Timeout(_) => "timeout",
            ElevationError::RateLimited { .. } => "rate_limited",
            ElevationError::CircuitOpen(_) => "circuit_open",
            ElevationError::Upstream(_) => "upstream",
            ElevationError::Internal(_) => "internal",
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    message: String,
}

impl IntoResponse for ElevationError {
    /// Only `Validation` and `Internal` ever reach an HTTP error status;
    /// every other kind is swallowed by the orchestrator before it gets
    /// anywhere near a handler.
    fn into_response(self) -> Response {
        let status = match &self {
            ElevationError::Validation(_) => StatusCode::BAD_REQUEST,
            ElevationError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorBody {
            error: self.kind_tag().to_string(),
            message: self.to_string(),
        };
        (status, axum::Json(body)).into_response()
    }
}
