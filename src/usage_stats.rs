//! Per-source monotonic usage counters, process-wide.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
struct Counters {
    attempts: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    circuit_trips: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageSnapshot {
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    pub circuit_trips: u64,
}

/// Atomic counters keyed by source id, built once at startup and shared
/// read-only thereafter — each entry's own atomics handle concurrent
/// mutation.
#[derive(Debug, Default)]
pub struct UsageStats {
    by_source: HashMap<String, Counters>,
}

impl UsageStats {
    pub fn new(source_ids: impl IntoIterator<Item = String>) -> Self {
        Self {
            by_source: source_ids
                .into_iter()
                .map(|id| (id, Counters::default()))
                .collect(),
        }
    }

    fn counters(&self, source_id: &str) -> &Counters {
        self.by_source
            .get(source_id)
            .unwrap_or_else(|| panic!("usage stats queried for unregistered source {source_id}"))
    }

    pub fn record_attempt(&self, source_id: &str) {
        self.counters(source_id).attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_success(&self, source_id: &str) {
        self.counters(source_id).successes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self, source_id: &str) {
        self.counters(source_id).failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_circuit_trip(&self, source_id: &str) {
        self.counters(source_id)
            .circuit_trips
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, source_id: &str) -> UsageSnapshot {
        let c = self.counters(source_id);
        UsageSnapshot {
            attempts: c.attempts.load(Ordering::Relaxed),
            successes: c.successes.load(Ordering::Relaxed),
            failures: c.failures.load(Ordering::Relaxed),
            circuit_trips: c.circuit_trips.load(Ordering::Relaxed),
        }
    }

    pub fn snapshot_all(&self) -> HashMap<String, UsageSnapshot> {
        self.by_source
            .keys()
            .map(|id| (id.clone(), self.snapshot(id)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_are_independent_per_source() {
        let stats = UsageStats::new(["private_bucket".to_string(), "http_api_a".to_string()]);
        stats.record_attempt("private_bucket");
        stats.record_success("private_bucket");
        stats.record_attempt("http_api_a");
        stats.record_failure("http_api_a");
        stats.record_circuit_trip("http_api_a");

        let private = stats.snapshot("private_bucket");
        assert_eq!(private.attempts, 1);
        assert_eq!(private.successes, 1);
        assert_eq!(private.failures, 0);

        let api_a = stats.snapshot("http_api_a");
        assert_eq!(api_a.attempts, 1);
        assert_eq!(api_a.failures, 1);
        assert_eq!(api_a.circuit_trips, 1);
    }
}
