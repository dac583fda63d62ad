//! HTTP elevation API sources (`http_api_a`, `http_api_b`): single-point
//! GET against a third-party global DEM service. Free-tier daily quotas
//! are tracked locally since neither provider reports remaining quota.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use tracing::debug;

use crate::collections::DataType;
use crate::error::ElevationError;
use crate::geometry::QueryPoint;

use super::{Coverage, DataSource, ElevationOutcome, HealthStatus, SourceId};

/// The two providers speak different JSON shapes; everything else about
/// them (timeout handling, quota tracking, breaker wiring) is identical.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiProvider {
    /// opentopodata-style: `GET {base}?locations=lat,lon` ->
    /// `{results: [{elevation, ...}], status}`.
    TopoData,
    /// open-elevation-style: `GET {base}?locations=lat,lon` ->
    /// `{results: [{latitude, longitude, elevation}]}`.
    OpenElevation,
}

impl ApiProvider {
    /// Nominal resolution of the backing global DEM, reported alongside a
    /// successful sample since these APIs don't return per-point resolution.
    fn nominal_resolution_m(self) -> f64 {
        match self {
            ApiProvider::TopoData => 90.0,
            ApiProvider::OpenElevation => 30.0,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TopoDataResponse {
    results: Vec<TopoDataResult>,
}

#[derive(Debug, Deserialize)]
struct TopoDataResult {
    elevation: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OpenElevationResponse {
    results: Vec<OpenElevationResult>,
}

#[derive(Debug, Deserialize)]
struct OpenElevationResult {
    elevation: Option<f64>,
}

struct QuotaState {
    date: NaiveDate,
    count: u64,
}

pub struct HttpApiSource {
    id: SourceId,
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
    daily_request_quota: Option<u64>,
    provider: ApiProvider,
    quota: Mutex<QuotaState>,
}

impl HttpApiSource {
    pub fn new(
        id: impl Into<SourceId>,
        client: reqwest::Client,
        base_url: String,
        api_key: Option<String>,
        timeout: Duration,
        daily_request_quota: Option<u64>,
        provider: ApiProvider,
    ) -> Self {
        Self {
            id: id.into(),
            client,
            base_url,
            api_key,
            timeout,
            daily_request_quota,
            provider,
            quota: Mutex::new(QuotaState {
                date: Utc::now().date_naive(),
                count: 0,
            }),
        }
    }

    /// Returns `None` if the request may proceed, or `Some(retry_after)`
    /// if today's quota is already spent.
    fn check_and_consume_quota(&self) -> Option<Duration> {
        let Some(quota) = self.daily_request_quota else {
            return None;
        };
        let mut state = self.quota.lock().unwrap();
        let today = Utc::now().date_naive();
        if state.date != today {
            state.date = today;
            state.count = 0;
        }
        if state.count >= quota {
            let tomorrow = today.succ_opt().unwrap_or(today);
            let midnight = tomorrow.and_hms_opt(0, 0, 0).unwrap().and_utc();
            let retry_after = (midnight - Utc::now())
                .to_std()
                .unwrap_or(Duration::from_secs(60));
            return Some(retry_after);
        }
        state.count += 1;
        None
    }

    async fn fetch_elevation(&self, lat: f64, lon: f64) -> Result<Option<f64>, ElevationError> {
        let locations = format!("{lat},{lon}");
        let mut request = self
            .client
            .get(&self.base_url)
            .query(&[("locations", locations.as_str())])
            .timeout(self.timeout);
        if let Some(api_key) = &self.api_key {
            request = request.query(&[("key", api_key.as_str())]);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ElevationError::Timeout(self.timeout)
            } else {
                ElevationError::Upstream(format!("{} request failed: {e}", self.id))
            }
        })?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            return Err(ElevationError::RateLimited { retry_after_secs });
        }

        if !response.status().is_success() {
            return Err(ElevationError::Upstream(format!(
                "{} responded with status {}",
                self.id,
                response.status()
            )));
        }

        match self.provider {
            ApiProvider::TopoData => {
                let body: TopoDataResponse = response
                    .json()
                    .await
                    .map_err(|e| ElevationError::Upstream(format!("malformed {} response: {e}", self.id)))?;
                Ok(body.results.first().and_then(|r| r.elevation))
            }
            ApiProvider::OpenElevation => {
                let body: OpenElevationResponse = response
                    .json()
                    .await
                    .map_err(|e| ElevationError::Upstream(format!("malformed {} response: {e}", self.id)))?;
                Ok(body.results.first().and_then(|r| r.elevation))
            }
        }
    }
}

#[async_trait]
impl DataSource for HttpApiSource {
    async fn get_elevation(&self, query_point: &QueryPoint) -> ElevationOutcome {
        if let Some(retry_after) = self.check_and_consume_quota() {
            debug!(source = %self.id, "daily request quota exhausted");
            return ElevationOutcome::Error {
                source_id: self.id.clone(),
                error: ElevationError::RateLimited {
                    retry_after_secs: Some(retry_after.as_secs()),
                },
            };
        }

        let lat = query_point.point.lat;
        let lon = query_point.point.lon;

        match self.fetch_elevation(lat, lon).await {
            Ok(Some(elevation_m)) => ElevationOutcome::Found {
                elevation_m,
                source_id: self.id.clone(),
                resolution_m: self.provider.nominal_resolution_m(),
                data_type: DataType::Dem,
                message: None,
            },
            Ok(None) => ElevationOutcome::NotCovered,
            Err(error) => ElevationOutcome::Error {
                source_id: self.id.clone(),
                error,
            },
        }
    }

    async fn health(&self) -> HealthStatus {
        HealthStatus {
            ok: true,
            detail: format!("{} at {}", self.id, self.base_url),
        }
    }

    fn coverage(&self) -> Coverage {
        Coverage {
            description: format!("global coverage via {}", self.base_url),
            bbox: None,
        }
    }

    fn id(&self) -> &str {
        &self.id
    }
}
