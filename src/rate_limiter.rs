//! Per-resource sliding-window rate limiter.
//!
//! Each resource key (typically a target host) carries a set of configured
//! windows — e.g. 10 per minute and 100 per hour. Admission succeeds only if
//! every window has capacity, in which case the current timestamp is recorded
//! in all of them. Timestamps are pruned lazily on each admission check.
//! Windows are in-memory only and reset with the process.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::error::SearchError;

/// Poll interval for [`RateLimiter::await_admission`]. Kept short so the
/// caller's cancellation signal is observed promptly.
const ADMISSION_POLL: Duration = Duration::from_millis(100);

/// One sliding window: at most `max_requests` within `period`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowLimit {
    pub period: Duration,
    pub max_requests: usize,
}

impl WindowLimit {
    pub fn new(period: Duration, max_requests: usize) -> Self {
        Self {
            period,
            max_requests,
        }
    }

    pub fn per_minute(max_requests: usize) -> Self {
        Self::new(Duration::from_secs(60), max_requests)
    }

    pub fn per_hour(max_requests: usize) -> Self {
        Self::new(Duration::from_secs(3600), max_requests)
    }
}

/// Timestamps recorded against one resource, one deque per configured window.
#[derive(Debug, Default)]
struct ResourceWindows {
    recorded: Vec<VecDeque<Instant>>,
}

/// Sliding-window admission control, shared across concurrent callers.
///
/// Interior mutability via a [`Mutex`] so one handle can be shared behind an
/// `Arc`; a request admitted by one task is immediately visible to the next
/// task's admission check.
#[derive(Debug)]
pub struct RateLimiter {
    limits: HashMap<String, Vec<WindowLimit>>,
    windows: Mutex<HashMap<String, ResourceWindows>>,
}

impl RateLimiter {
    /// Create a limiter with per-resource window configurations. Resources
    /// absent from `limits` are never limited.
    pub fn new(limits: HashMap<String, Vec<WindowLimit>>) -> Self {
        Self {
            limits,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Non-blocking admission check for `resource`.
    ///
    /// Returns `false` if any configured window is at capacity. On success
    /// the current timestamp is recorded in every window.
    pub fn admit(&self, resource: &str) -> bool {
        let Some(limits) = self.limits.get(resource) else {
            return true;
        };
        if limits.is_empty() {
            return true;
        }

        let now = Instant::now();
        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());
        let state = windows.entry(resource.to_string()).or_default();
        if state.recorded.len() != limits.len() {
            state.recorded = vec![VecDeque::new(); limits.len()];
        }

        // Prune expired timestamps, then check every window before
        // recording in any of them.
        for (deque, limit) in state.recorded.iter_mut().zip(limits) {
            while deque
                .front()
                .is_some_and(|t| now.duration_since(*t) >= limit.period)
            {
                deque.pop_front();
            }
        }
        let at_capacity = state
            .recorded
            .iter()
            .zip(limits)
            .any(|(deque, limit)| deque.len() >= limit.max_requests);
        if at_capacity {
            tracing::trace!(resource, "rate limit at capacity");
            return false;
        }

        for deque in &mut state.recorded {
            deque.push_back(now);
        }
        true
    }

    /// Poll [`admit`](Self::admit) until granted or cancelled.
    ///
    /// Blocking is bounded only by the caller's cancellation signal; there is
    /// no internal queue.
    pub async fn await_admission(
        &self,
        resource: &str,
        cancel: &CancellationToken,
    ) -> Result<(), SearchError> {
        loop {
            if cancel.is_cancelled() {
                return Err(SearchError::Cancelled);
            }
            if self.admit(resource) {
                return Ok(());
            }
            tokio::select! {
                _ = cancel.cancelled() => return Err(SearchError::Cancelled),
                _ = tokio::time::sleep(ADMISSION_POLL) => {}
            }
        }
    }
}
