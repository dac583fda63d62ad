//! Prometheus metrics: request outcomes, per-source attempts, lookup
//! latency, and circuit breaker state.

use axum::response::IntoResponse;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::circuit_breaker::{BreakerStore, State};

/// Install the global recorder and pre-register every series so they
/// show up as zero rather than absent before first use.
pub fn init_metrics() -> PrometheusHandle {
    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            metrics_exporter_prometheus::Matcher::Full(
                "elevation_lookup_duration_seconds".to_string(),
            ),
            &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0],
        )
        .expect("failed to set buckets for elevation_lookup_duration_seconds")
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    metrics::counter!("elevation_requests_total", "outcome" => "found").absolute(0);
    metrics::counter!("elevation_requests_total", "outcome" => "not_found").absolute(0);

    handle
}

/// Refresh the `circuit_breaker_state` gauge from the current breaker
/// snapshots. Called after every lookup rather than polled on a timer,
/// since breaker transitions are rare relative to request volume.
pub fn record_breaker_snapshots(breakers: &dyn BreakerStore) {
    for (source_id, snapshot) in breakers.snapshots() {
        let state_value = match snapshot.state {
            State::Closed => 0.0,
            State::HalfOpen => 1.0,
            State::Open => 2.0,
        };
        metrics::gauge!("circuit_breaker_state", "source" => source_id).set(state_value);
    }
}

pub async fn render(handle: PrometheusHandle) -> impl IntoResponse {
    handle.render()
}
