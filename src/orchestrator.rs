//! C7: Fallback Orchestrator — walks an ordered chain of data sources,
//! short-circuiting on the first success and translating per-source
//! outcomes into breaker state and usage counters.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::circuit_breaker::CircuitBreaker;
use crate::collections::DataType;
use crate::error::ElevationError;
use crate::geometry::QueryPoint;
use crate::sources::{DataSource, ElevationOutcome, SourceDescriptor};
use crate::usage_stats::UsageStats;

/// One entry in the fallback chain: a source plus its own breaker,
/// ordered by ascending `SourceDescriptor::priority` at construction time.
pub struct ChainEntry {
    pub descriptor: SourceDescriptor,
    pub source: Arc<dyn DataSource>,
    pub breaker: Arc<CircuitBreaker>,
}

/// Top-level result of walking the whole chain for one point: either a
/// source succeeded, or every source was exhausted without coverage.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub elevation_m: Option<f64>,
    pub dem_source_used: Option<String>,
    pub resolution_m: Option<f64>,
    pub data_type: Option<DataType>,
    pub message: Option<String>,
}

pub struct Orchestrator {
    chain: Vec<ChainEntry>,
    usage_stats: Arc<UsageStats>,
}

impl Orchestrator {
    pub fn new(chain: Vec<ChainEntry>, usage_stats: Arc<UsageStats>) -> Self {
        Self { chain, usage_stats }
    }

    pub async fn resolve(&self, query_point: &QueryPoint) -> Resolution {
        let mut attempted = Vec::new();

        for entry in &self.chain {
            let source_id = entry.descriptor.id.as_str();

            if !entry.breaker.allow() {
                self.usage_stats.record_circuit_trip(source_id);
                attempted.push(source_id.to_string());
                continue;
            }

            self.usage_stats.record_attempt(source_id);
            let outcome = entry.source.get_elevation(query_point).await;

            match outcome {
                ElevationOutcome::Found {
                    elevation_m,
                    source_id,
                    resolution_m,
                    data_type,
                    message,
                } => {
                    entry.breaker.record_success();
                    self.usage_stats.record_success(&source_id);
                    metrics::counter!("elevation_source_attempts_total", "source" => source_id.clone(), "outcome" => "found")
                        .increment(1);
                    info!(
                        lat = query_point.point.lat,
                        lon = query_point.point.lon,
                        dem_source_used = %source_id,
                        "elevation resolved"
                    );
                    return Resolution {
                        elevation_m: Some(elevation_m),
                        dem_source_used: Some(source_id),
                        resolution_m: Some(resolution_m),
                        data_type: Some(data_type),
                        message,
                    };
                }
                ElevationOutcome::NotCovered => {
                    metrics::counter!("elevation_source_attempts_total", "source" => source_id.to_string(), "outcome" => "not_covered")
                        .increment(1);
                    attempted.push(source_id.to_string());
                    continue;
                }
                ElevationOutcome::NoData { source_id } => {
                    metrics::counter!("elevation_source_attempts_total", "source" => source_id.clone(), "outcome" => "no_data")
                        .increment(1);
                    attempted.push(source_id);
                    continue;
                }
                ElevationOutcome::Error { source_id, error } => {
                    self.usage_stats.record_failure(&source_id);
                    metrics::counter!("elevation_source_attempts_total", "source" => source_id.clone(), "outcome" => "error")
                        .increment(1);
                    record_failure(&entry.breaker, &error);
                    warn!(source = %source_id, %error, "source failed");
                    attempted.push(source_id);
                    continue;
                }
            }
        }

        Resolution {
            elevation_m: None,
            dem_source_used: None,
            resolution_m: None,
            data_type: None,
            message: Some(format!(
                "no elevation data found; sources tried: {}",
                attempted.join(", ")
            )),
        }
    }
}

/// `CircuitOpen` never reaches here (the orchestrator only calls
/// `get_elevation` after `breaker.allow()` succeeds), so every `Error`
/// outcome trips the breaker. A `RateLimited` outcome carrying
/// `Retry-After` is honoured as the recovery window when it's larger than
/// the breaker's configured timeout.
fn record_failure(breaker: &CircuitBreaker, error: &ElevationError) {
    match error {
        ElevationError::RateLimited {
            retry_after_secs: Some(secs),
        } => breaker.record_failure_with_retry_after(Some(Duration::from_secs(*secs))),
        _ => breaker.record_failure(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point;
    use crate::sources::{Coverage, HealthStatus, SourceKind};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubSource {
        id: String,
        outcomes: Vec<ElevationOutcome>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl DataSource for StubSource {
        async fn get_elevation(&self, _query_point: &QueryPoint) -> ElevationOutcome {
            let i = self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcomes
                .get(i)
                .cloned()
                .unwrap_or(ElevationOutcome::NotCovered)
        }

        async fn health(&self) -> HealthStatus {
            HealthStatus {
                ok: true,
                detail: String::new(),
            }
        }

        fn coverage(&self) -> Coverage {
            Coverage {
                description: String::new(),
                bbox: None,
            }
        }

        fn id(&self) -> &str {
            &self.id
        }
    }

    fn chain_entry(id: &str, outcomes: Vec<ElevationOutcome>) -> ChainEntry {
        ChainEntry {
            descriptor: SourceDescriptor {
                id: id.to_string(),
                kind: SourceKind::PrivateBucket,
                priority: 0,
            },
            source: Arc::new(StubSource {
                id: id.to_string(),
                outcomes,
                calls: AtomicUsize::new(0),
            }),
            breaker: Arc::new(CircuitBreaker::new(id, 3, Duration::from_secs(30))),
        }
    }

    fn query_point() -> QueryPoint {
        QueryPoint::new(Point::new(-27.4698, 153.0251).unwrap())
    }

    #[tokio::test]
    async fn short_circuits_on_first_success() {
        let first = chain_entry(
            "private_bucket",
            vec![ElevationOutcome::Found {
                elevation_m: 10.87,
                source_id: "private_bucket".to_string(),
                resolution_m: 1.0,
                data_type: DataType::Dem,
                message: None,
            }],
        );
        let second = chain_entry("public_bucket", vec![]);
        let usage_stats = Arc::new(UsageStats::new([
            "private_bucket".to_string(),
            "public_bucket".to_string(),
        ]));
        let orchestrator = Orchestrator::new(vec![first, second], usage_stats.clone());

        let resolution = orchestrator.resolve(&query_point()).await;
        assert_eq!(resolution.elevation_m, Some(10.87));
        assert_eq!(resolution.dem_source_used.as_deref(), Some("private_bucket"));
        assert_eq!(usage_stats.snapshot("public_bucket").attempts, 0);
    }

    #[tokio::test]
    async fn not_covered_does_not_trip_breaker_and_falls_through() {
        let first = chain_entry("private_bucket", vec![ElevationOutcome::NotCovered]);
        let second = chain_entry(
            "public_bucket",
            vec![ElevationOutcome::Found {
                elevation_m: 5.0,
                source_id: "public_bucket".to_string(),
                resolution_m: 10.0,
                data_type: DataType::Dem,
                message: None,
            }],
        );
        let first_breaker = first.breaker.clone();
        let usage_stats = Arc::new(UsageStats::new([
            "private_bucket".to_string(),
            "public_bucket".to_string(),
        ]));
        let orchestrator = Orchestrator::new(vec![first, second], usage_stats);

        let resolution = orchestrator.resolve(&query_point()).await;
        assert_eq!(resolution.dem_source_used.as_deref(), Some("public_bucket"));
        assert_eq!(first_breaker.snapshot().failure_count, 0);
    }

    #[tokio::test]
    async fn exhausting_all_sources_returns_null_elevation_with_message() {
        let first = chain_entry("private_bucket", vec![ElevationOutcome::NotCovered]);
        let second = chain_entry("public_bucket", vec![ElevationOutcome::NotCovered]);
        let usage_stats = Arc::new(UsageStats::new([
            "private_bucket".to_string(),
            "public_bucket".to_string(),
        ]));
        let orchestrator = Orchestrator::new(vec![first, second], usage_stats);

        let resolution = orchestrator.resolve(&query_point()).await;
        assert_eq!(resolution.elevation_m, None);
        assert!(resolution.message.unwrap().contains("private_bucket"));
    }

    #[tokio::test]
    async fn open_breaker_skips_source_without_invoking_it() {
        let entry = chain_entry(
            "private_bucket",
            vec![ElevationOutcome::Error {
                source_id: "private_bucket".to_string(),
                error: ElevationError::Upstream("boom".to_string()),
            }],
        );
        entry.breaker.record_failure();
        entry.breaker.record_failure();
        entry.breaker.record_failure();
        assert!(!entry.breaker.allow());

        let usage_stats = Arc::new(UsageStats::new(["private_bucket".to_string()]));
        let orchestrator = Orchestrator::new(vec![entry], usage_stats.clone());
        let resolution = orchestrator.resolve(&query_point()).await;
        assert_eq!(resolution.elevation_m, None);
        assert_eq!(usage_stats.snapshot("private_bucket").attempts, 0);
    }
}
