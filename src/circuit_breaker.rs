//! C5: Circuit Breaker — per-source failure counter with three states,
//! backed by a shared store or in-memory map.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Closed,
    Open,
    HalfOpen,
}

/// Snapshot of a breaker's state. `last_failure` and `open_until` are
/// instants relative to process start rather than wall-clock timestamps,
/// since breaker state is ephemeral and process-scoped.
#[derive(Debug, Clone, Copy)]
pub struct CircuitState {
    pub state: State,
    pub failure_count: u32,
    pub last_failure: Option<Instant>,
    pub open_until: Option<Instant>,
}

struct Inner {
    state: State,
    failure_count: u32,
    last_failure: Option<Instant>,
    open_until: Option<Instant>,
}

impl Inner {
    fn new() -> Self {
        Self {
            state: State::Closed,
            failure_count: 0,
            last_failure: None,
            open_until: None,
        }
    }
}

/// One circuit breaker per data source id.
pub struct CircuitBreaker {
    source_id: String,
    failure_threshold: u32,
    recovery_timeout: Duration,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(source_id: impl Into<String>, failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            source_id: source_id.into(),
            failure_threshold,
            recovery_timeout,
            inner: Mutex::new(Inner::new()),
        }
    }

    /// `allow() -> bool`. In the `open` state, requests fail fast without
    /// invoking the source. Transitions `open` ->
    /// `half_open` once the cool-down window has elapsed.
    pub fn allow(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            State::Closed => true,
            State::HalfOpen => true,
            State::Open => {
                let open_until = inner.open_until.unwrap_or_else(Instant::now);
                if Instant::now() >= open_until {
                    inner.state = State::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// On success: reset `failure_count` and transition to `closed`.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.failure_count = 0;
        inner.state = State::Closed;
        inner.open_until = None;
    }

    /// On failure: increment `failure_count`; trip to `open` once the
    /// threshold is reached, or immediately if already `half_open`.
    pub fn record_failure(&self) {
        self.record_failure_with_retry_after(None);
    }

    /// As `record_failure`, but honours an externally supplied
    /// `Retry-After` as `open_until` when it is larger than the configured
    /// recovery timeout.
    pub fn record_failure_with_retry_after(&self, retry_after: Option<Duration>) {
        let mut inner = self.inner.lock().unwrap();
        let now = Instant::now();
        inner.last_failure = Some(now);

        let should_trip = match inner.state {
            State::HalfOpen => true,
            State::Closed => {
                inner.failure_count += 1;
                inner.failure_count >= self.failure_threshold
            }
            State::Open => false,
        };

        if should_trip {
            let recovery = retry_after
                .filter(|r| *r > self.recovery_timeout)
                .unwrap_or(self.recovery_timeout);
            inner.state = State::Open;
            inner.open_until = Some(now + recovery);
            metrics::counter!("circuit_breaker_trips_total", "source" => self.source_id.clone())
                .increment(1);
            warn!(source = %self.source_id, "circuit breaker tripped open");
        }
    }

    /// Admin operation: force the breaker back to `closed`.
    pub fn force_reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        *inner = Inner::new();
    }

    pub fn snapshot(&self) -> CircuitState {
        let inner = self.inner.lock().unwrap();
        CircuitState {
            state: inner.state,
            failure_count: inner.failure_count,
            last_failure: inner.last_failure,
            open_until: inner.open_until,
        }
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }
}

/// Extension point for where breaker state lives. `BreakerRegistry` is the
/// in-memory implementation; a deployment running more than one process
/// needs a store that's actually shared (e.g. Redis-backed) so one
/// instance's breaker trip is visible to the others, since state here is
/// otherwise process-local and invisible across replicas.
pub trait BreakerStore: Send + Sync {
    fn register(
        &self,
        source_id: &str,
        failure_threshold: u32,
        recovery_timeout: Duration,
    ) -> std::sync::Arc<CircuitBreaker>;

    fn get(&self, source_id: &str) -> Option<std::sync::Arc<CircuitBreaker>>;

    fn snapshots(&self) -> Vec<(String, CircuitState)>;
}

/// Registry of breakers keyed by source id, built once at startup
/// and shared read-only thereafter — each breaker's own
/// interior mutability handles concurrent mutation.
pub struct BreakerRegistry {
    breakers: DashMap<String, std::sync::Arc<CircuitBreaker>>,
}

impl BreakerRegistry {
    pub fn new() -> Self {
        Self {
            breakers: DashMap::new(),
        }
    }

    pub fn register(
        &self,
        source_id: impl Into<String>,
        failure_threshold: u32,
        recovery_timeout: Duration,
    ) -> std::sync::Arc<CircuitBreaker> {
        let source_id = source_id.into();
        let breaker = std::sync::Arc::new(CircuitBreaker::new(
            source_id.clone(),
            failure_threshold,
            recovery_timeout,
        ));
        self.breakers.insert(source_id, breaker.clone());
        breaker
    }

    pub fn get(&self, source_id: &str) -> Option<std::sync::Arc<CircuitBreaker>> {
        self.breakers.get(source_id).map(|b| b.clone())
    }

    pub fn snapshots(&self) -> Vec<(String, CircuitState)> {
        self.breakers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().snapshot()))
            .collect()
    }
}

impl Default for BreakerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl BreakerStore for BreakerRegistry {
    fn register(
        &self,
        source_id: &str,
        failure_threshold: u32,
        recovery_timeout: Duration,
    ) -> std::sync::Arc<CircuitBreaker> {
        BreakerRegistry::register(self, source_id, failure_threshold, recovery_timeout)
    }

    fn get(&self, source_id: &str) -> Option<std::sync::Arc<CircuitBreaker>> {
        BreakerRegistry::get(self, source_id)
    }

    fn snapshots(&self) -> Vec<(String, CircuitState)> {
        BreakerRegistry::snapshots(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_after_threshold_failures() {
        let breaker = CircuitBreaker::new("test", 3, Duration::from_secs(60));
        assert!(breaker.allow());
        breaker.record_failure();
        assert!(breaker.allow());
        breaker.record_failure();
        assert!(breaker.allow());
        breaker.record_failure();
        // S5: after three consecutive failures the next call must not be
        // allowed.
        assert!(!breaker.allow());
        assert_eq!(breaker.snapshot().state, State::Open);
    }

    #[test]
    fn half_open_failure_reopens_with_fresh_window() {
        let breaker = CircuitBreaker::new("test", 1, Duration::from_millis(10));
        breaker.record_failure();
        assert!(!breaker.allow());
        std::thread::sleep(Duration::from_millis(15));
        assert!(breaker.allow());
        assert_eq!(breaker.snapshot().state, State::HalfOpen);
        breaker.record_failure();
        assert_eq!(breaker.snapshot().state, State::Open);
    }

    #[test]
    fn success_resets_failure_count() {
        // Breaker monotonicity: a single success never
        // increases failure_count, and resets it to zero.
        let breaker = CircuitBreaker::new("test", 5, Duration::from_secs(60));
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.snapshot().failure_count, 2);
        breaker.record_success();
        assert_eq!(breaker.snapshot().failure_count, 0);
        assert_eq!(breaker.snapshot().state, State::Closed);
    }

    #[test]
    fn retry_after_overrides_shorter_recovery_timeout() {
        let breaker = CircuitBreaker::new("test", 1, Duration::from_secs(5));
        breaker.record_failure_with_retry_after(Some(Duration::from_secs(30)));
        let snapshot = breaker.snapshot();
        let remaining = snapshot.open_until.unwrap() - Instant::now();
        assert!(remaining > Duration::from_secs(25));
    }

    #[test]
    fn smaller_retry_after_is_ignored() {
        let breaker = CircuitBreaker::new("test", 1, Duration::from_secs(30));
        breaker.record_failure_with_retry_after(Some(Duration::from_secs(1)));
        let snapshot = breaker.snapshot();
        let remaining = snapshot.open_until.unwrap() - Instant::now();
        assert!(remaining > Duration::from_secs(25));
    }
}
