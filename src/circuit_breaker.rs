//! Per-resource circuit breaker.
//!
//! Tracks failures per named resource (typically a target host) and rejects
//! calls to resources that are failing repeatedly. After a cooldown period a
//! tripped resource enters a half-open state where probe calls determine
//! whether to restore or re-trip the circuit. The Open→HalfOpen transition is
//! lazy: it happens on the next call attempt after the cooldown elapses, not
//! on a background timer.
//!
//! # State Machine
//!
//! ```text
//! ┌────────┐  N failures / rate  ┌────────┐   cooldown    ┌──────────┐
//! │ Closed ├────────────────────►│  Open  ├──────────────►│ HalfOpen │
//! └───▲────┘                     └────────┘               └────┬─────┘
//!     │                               ▲                        │
//!     │  M successes                  │  failure               │
//!     └───────────────────────────────┴────────────────────────┘
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use std::time::Instant;

use crate::config::BreakerConfig;
use crate::error::SearchError;

/// Circuit breaker state for a single resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Resource is healthy — calls pass through.
    Closed,
    /// Resource has failed too often — calls are rejected until cooldown.
    Open,
    /// Cooldown elapsed — probe calls are allowed to test recovery.
    HalfOpen,
}

/// Health tracking for a single resource.
#[derive(Debug, Clone)]
struct ResourceHealth {
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    opened_at: Option<Instant>,
    total_calls: u64,
    total_failures: u64,
}

impl Default for ResourceHealth {
    fn default() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            consecutive_successes: 0,
            opened_at: None,
            total_calls: 0,
            total_failures: 0,
        }
    }
}

impl ResourceHealth {
    /// Lifetime failure percentage over all completed calls.
    fn failure_rate(&self) -> f64 {
        if self.total_calls == 0 {
            return 0.0;
        }
        (self.total_failures as f64 / self.total_calls as f64) * 100.0
    }
}

/// Per-resource circuit breaker registry, shared across concurrent callers.
///
/// All state lives behind one [`Mutex`] so that a failure recorded by one
/// task is visible to the next task's admission decision. The lock is never
/// held across the wrapped call itself.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: BreakerConfig,
    resources: Mutex<HashMap<String, ResourceHealth>>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            resources: Mutex::new(HashMap::new()),
        }
    }

    /// Execute `f` under circuit breaker protection for `resource`.
    ///
    /// `f` is invoked at most once. If the circuit is Open and the cooldown
    /// has not elapsed, returns [`SearchError::CircuitOpen`] without invoking
    /// `f`. Failure means `f` returned an error; success means it returned
    /// without one. A call whose future is dropped before `f` resolves —
    /// cancellation mid-flight — records neither outcome and leaves the
    /// lifetime counters untouched.
    pub async fn execute<T, F, Fut>(&self, resource: &str, f: F) -> Result<T, SearchError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, SearchError>>,
    {
        if !self.admit(resource) {
            tracing::warn!(resource, "circuit open, rejecting call");
            return Err(SearchError::CircuitOpen(resource.to_string()));
        }

        match f().await {
            Ok(value) => {
                self.record_success(resource);
                Ok(value)
            }
            Err(err) => {
                self.record_failure(resource);
                Err(err)
            }
        }
    }

    /// Admission decision, including the lazy Open→HalfOpen transition.
    fn admit(&self, resource: &str) -> bool {
        let mut resources = self.resources.lock().unwrap_or_else(|e| e.into_inner());
        let health = resources.entry(resource.to_string()).or_default();

        if health.state == CircuitState::Open {
            let cooldown_elapsed = health
                .opened_at
                .map_or(true, |t| t.elapsed() >= self.config.cooldown);
            if cooldown_elapsed {
                tracing::debug!(resource, "cooldown elapsed, probing (half-open)");
                health.state = CircuitState::HalfOpen;
                health.consecutive_failures = 0;
                health.consecutive_successes = 0;
            } else {
                return false;
            }
        }

        true
    }

    fn record_success(&self, resource: &str) {
        let mut resources = self.resources.lock().unwrap_or_else(|e| e.into_inner());
        let health = resources.entry(resource.to_string()).or_default();

        health.total_calls += 1;
        health.consecutive_failures = 0;
        health.consecutive_successes += 1;

        if health.state == CircuitState::HalfOpen
            && health.consecutive_successes >= self.config.success_threshold
        {
            tracing::info!(resource, "circuit closed (recovery confirmed)");
            health.state = CircuitState::Closed;
            health.consecutive_successes = 0;
        }
    }

    fn record_failure(&self, resource: &str) {
        let mut resources = self.resources.lock().unwrap_or_else(|e| e.into_inner());
        let health = resources.entry(resource.to_string()).or_default();

        health.total_calls += 1;
        health.consecutive_failures += 1;
        health.consecutive_successes = 0;
        health.total_failures += 1;

        // Any failure during a probe reopens immediately and restarts the
        // cooldown clock.
        if health.state == CircuitState::HalfOpen {
            tracing::warn!(resource, "probe failed, circuit reopened");
            health.state = CircuitState::Open;
            health.opened_at = Some(Instant::now());
            return;
        }

        // The lifetime failure-rate check only applies once the sample is at
        // least as large as the consecutive-failure threshold; a single
        // failed first call is not a 100% failure rate worth tripping on.
        let rate_tripped = health.total_calls >= u64::from(self.config.failure_threshold)
            && health.failure_rate() >= self.config.failure_rate_threshold;

        if health.consecutive_failures >= self.config.failure_threshold || rate_tripped {
            tracing::warn!(
                resource,
                consecutive = health.consecutive_failures,
                rate = health.failure_rate(),
                "circuit opened"
            );
            health.state = CircuitState::Open;
            health.opened_at = Some(Instant::now());
        }
    }

    /// Current state for `resource`. Unseen resources report Closed.
    pub fn state(&self, resource: &str) -> CircuitState {
        self.resources
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(resource)
            .map_or(CircuitState::Closed, |h| h.state)
    }

    /// Lifetime failure percentage for `resource` over all completed calls,
    /// independent of Open/Closed history.
    pub fn failure_rate(&self, resource: &str) -> f64 {
        self.resources
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(resource)
            .map_or(0.0, ResourceHealth::failure_rate)
    }

    /// Force `resource` back to Closed with all counters zeroed.
    pub fn reset(&self, resource: &str) {
        let mut resources = self.resources.lock().unwrap_or_else(|e| e.into_inner());
        resources.insert(resource.to_string(), ResourceHealth::default());
        tracing::info!(resource, "circuit manually reset");
    }

    /// Health report: (resource, state, consecutive failures, failure rate)
    /// for every resource the breaker has seen.
    pub fn health_report(&self) -> Vec<(String, CircuitState, u32, f64)> {
        self.resources
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(name, h)| {
                (
                    name.clone(),
                    h.state,
                    h.consecutive_failures,
                    h.failure_rate(),
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn make_breaker(failure_threshold: u32, cooldown: Duration) -> CircuitBreaker {
        CircuitBreaker::new(BreakerConfig {
            failure_threshold,
            success_threshold: 2,
            failure_rate_threshold: 60.0,
            cooldown,
        })
    }

    async fn fail(breaker: &CircuitBreaker, resource: &str) -> Result<(), SearchError> {
        breaker
            .execute(resource, || async {
                Err::<(), _>(SearchError::Transient("boom".into()))
            })
            .await
    }

    async fn succeed(breaker: &CircuitBreaker, resource: &str) -> Result<(), SearchError> {
        breaker.execute(resource, || async { Ok(()) }).await
    }

    #[tokio::test]
    async fn initial_state_is_closed_and_passes_through() {
        let breaker = make_breaker(3, Duration::from_secs(60));
        assert_eq!(breaker.state("epo"), CircuitState::Closed);
        assert!(succeed(&breaker, "epo").await.is_ok());
    }

    #[tokio::test]
    async fn trips_open_at_consecutive_failure_threshold() {
        let breaker = make_breaker(3, Duration::from_secs(600));
        for _ in 0..3 {
            let _ = fail(&breaker, "inpi").await;
        }
        assert_eq!(breaker.state("inpi"), CircuitState::Open);
    }

    #[tokio::test]
    async fn open_rejects_without_invoking_function() {
        let breaker = make_breaker(3, Duration::from_secs(600));
        for _ in 0..3 {
            let _ = fail(&breaker, "inpi").await;
        }

        let mut invoked = false;
        let result = breaker
            .execute("inpi", || {
                invoked = true;
                async { Ok(()) }
            })
            .await;
        assert!(matches!(result, Err(SearchError::CircuitOpen(_))));
        assert!(!invoked, "wrapped function must not run while open");
    }

    #[tokio::test]
    async fn success_resets_consecutive_failures() {
        let breaker = make_breaker(3, Duration::from_secs(60));
        let _ = fail(&breaker, "x").await;
        let _ = fail(&breaker, "x").await;
        let _ = succeed(&breaker, "x").await;
        let _ = fail(&breaker, "x").await;
        let _ = fail(&breaker, "x").await;
        // Never three in a row; the lifetime failure rate (3/4 = 75%)
        // crosses the 60% threshold once the sample is large enough, so
        // the rate check trips the circuit.
        assert_eq!(breaker.state("x"), CircuitState::Open);
    }

    #[tokio::test]
    async fn rate_check_requires_minimum_sample() {
        let breaker = make_breaker(5, Duration::from_secs(60));
        // One failure is a 100% rate but only one call; must stay Closed.
        let _ = fail(&breaker, "x").await;
        assert_eq!(breaker.state("x"), CircuitState::Closed);
    }

    #[tokio::test]
    async fn lazy_transition_to_half_open_after_cooldown() {
        let breaker = make_breaker(2, Duration::from_millis(0));
        for _ in 0..2 {
            let _ = fail(&breaker, "x").await;
        }
        assert_eq!(breaker.state("x"), CircuitState::Open);

        // Zero cooldown: the next call transitions to HalfOpen and executes.
        assert!(succeed(&breaker, "x").await.is_ok());
        assert_eq!(breaker.state("x"), CircuitState::HalfOpen);
    }

    #[tokio::test]
    async fn half_open_failure_reopens() {
        let breaker = make_breaker(2, Duration::from_millis(0));
        for _ in 0..2 {
            let _ = fail(&breaker, "x").await;
        }
        let _ = succeed(&breaker, "x").await; // → HalfOpen
        let _ = fail(&breaker, "x").await; // probe failure
        assert_eq!(breaker.state("x"), CircuitState::Open);
    }

    #[tokio::test]
    async fn half_open_closes_after_success_threshold() {
        let breaker = make_breaker(2, Duration::from_millis(0));
        for _ in 0..2 {
            let _ = fail(&breaker, "x").await;
        }
        let _ = succeed(&breaker, "x").await; // → HalfOpen, 1 success
        assert_eq!(breaker.state("x"), CircuitState::HalfOpen);
        let _ = succeed(&breaker, "x").await; // 2nd success → Closed
        assert_eq!(breaker.state("x"), CircuitState::Closed);
    }

    #[tokio::test]
    async fn lifetime_failure_rate_survives_transitions() {
        let breaker = make_breaker(2, Duration::from_millis(0));
        let _ = succeed(&breaker, "x").await;
        let _ = fail(&breaker, "x").await;
        let _ = fail(&breaker, "x").await; // → Open
        let _ = succeed(&breaker, "x").await; // probe
        let _ = succeed(&breaker, "x").await; // → Closed

        // 2 failures out of 5 completed calls, regardless of state history.
        assert!((breaker.failure_rate("x") - 40.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn dropped_in_flight_call_leaves_counters_untouched() {
        let breaker = make_breaker(3, Duration::from_secs(600));

        // Start a call that parks forever, poll it briefly, then drop it —
        // the shape of a fetch abandoned by cancellation.
        {
            let stalled = breaker.execute("x", || async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok::<(), SearchError>(())
            });
            tokio::select! {
                _ = stalled => unreachable!("stalled call must not finish"),
                _ = tokio::time::sleep(Duration::from_millis(5)) => {}
            }
        }

        // The abandoned call contributes nothing to the denominator: one
        // completed failure is a 100% rate, not 50%.
        let _ = fail(&breaker, "x").await;
        assert!((breaker.failure_rate("x") - 100.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn reset_restores_closed_and_zeroes_counters() {
        let breaker = make_breaker(2, Duration::from_secs(600));
        for _ in 0..2 {
            let _ = fail(&breaker, "x").await;
        }
        assert_eq!(breaker.state("x"), CircuitState::Open);

        breaker.reset("x");
        assert_eq!(breaker.state("x"), CircuitState::Closed);
        assert!((breaker.failure_rate("x")).abs() < f64::EPSILON);
        assert!(succeed(&breaker, "x").await.is_ok());
    }

    #[tokio::test]
    async fn resources_are_independent() {
        let breaker = make_breaker(2, Duration::from_secs(600));
        for _ in 0..2 {
            let _ = fail(&breaker, "a").await;
        }
        assert_eq!(breaker.state("a"), CircuitState::Open);
        assert_eq!(breaker.state("b"), CircuitState::Closed);
        assert!(succeed(&breaker, "b").await.is_ok());
    }

    #[tokio::test]
    async fn shared_across_concurrent_callers() {
        use std::sync::Arc;
        let breaker = Arc::new(make_breaker(4, Duration::from_secs(600)));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let b = Arc::clone(&breaker);
            handles.push(tokio::spawn(async move {
                let _ = fail(&b, "shared").await;
            }));
        }
        for handle in handles {
            handle.await.expect("task");
        }
        assert_eq!(breaker.state("shared"), CircuitState::Open);
    }

    #[tokio::test]
    async fn health_report_lists_seen_resources() {
        let breaker = make_breaker(3, Duration::from_secs(60));
        let _ = fail(&breaker, "a").await;
        let _ = succeed(&breaker, "b").await;

        let report = breaker.health_report();
        assert_eq!(report.len(), 2);
        let a = report.iter().find(|(n, _, _, _)| n == "a").expect("a seen");
        assert_eq!(a.1, CircuitState::Closed);
        assert_eq!(a.2, 1);
    }
}
