//! Multi-strategy fetch engine with blocking detection and strategy
//! memoization.
//!
//! One logical `fetch(target)` walks an ordered list of strategies — plain
//! request, fingerprint-randomized request, anti-bot profile, then headless
//! renders when a renderer is injected — until one succeeds or the attempt
//! budget is spent. Every outbound attempt is gated by the target's rate
//! limiter and wrapped in its circuit breaker. Individual strategy errors
//! never propagate: they are captured into the attempt log, and the only
//! caller-visible failure is "all strategies exhausted" (or cancellation of
//! the whole fetch).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use moka::future::Cache;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::blocking;
use crate::circuit_breaker::CircuitBreaker;
use crate::config::FetchConfig;
use crate::error::SearchError;
use crate::http;
use crate::rate_limiter::RateLimiter;
use crate::retry::RetryPolicy;
use crate::strategy::{FetchStrategy, StrategyClass};

/// Maximum number of memoized target→strategy entries.
const MAX_CACHE_ENTRIES: u64 = 1_000;

/// Browser engine requested from an injected [`PageRenderer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderBackend {
    Chromium,
    Firefox,
    Webkit,
}

/// A page produced by a headless render.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub html: String,
    pub status: u16,
    pub final_url: String,
}

/// Injected headless-browser collaborator. When absent, the headless
/// strategies are excluded from the trial order.
#[async_trait::async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render(&self, url: &str, backend: RenderBackend) -> Result<RenderedPage, SearchError>;
}

/// Immutable record of one strategy attempt within a fetch.
#[derive(Debug, Clone)]
pub struct FetchAttempt {
    pub strategy: FetchStrategy,
    pub started_at: Instant,
    pub success: bool,
    pub status: Option<u16>,
    pub error: Option<String>,
    pub elapsed: Duration,
    pub payload_size: usize,
}

/// Outcome of one `fetch(target)` call. Owned by the caller; the engine
/// retains no reference to it.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub success: bool,
    /// Response body, present only on success.
    pub body: Option<String>,
    /// Final resolved address after redirects.
    pub final_url: String,
    /// Strategy that produced the successful response.
    pub strategy_used: Option<FetchStrategy>,
    /// Ordered log of every attempt made.
    pub attempts: Vec<FetchAttempt>,
    /// Error summary when `success` is false.
    pub error: Option<String>,
    /// Total wall-clock time for the whole fetch.
    pub elapsed: Duration,
}

/// Running success/failure counts for one strategy.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct StrategyStats {
    pub success: u64,
    pub failure: u64,
}

/// Read-only statistics snapshot. Observability only; no behavioural effect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchStats {
    pub per_strategy: HashMap<FetchStrategy, StrategyStats>,
    pub cache_size: u64,
}

/// A successful HTTP response, before the engine turns it into a result.
#[derive(Debug)]
struct FetchedPage {
    status: u16,
    body: String,
    final_url: String,
}

/// Multi-strategy resilient fetch engine.
///
/// Construct once with injected resilience handles and share behind an
/// [`Arc`]; all methods take `&self`.
pub struct FetchEngine {
    config: FetchConfig,
    breaker: Arc<CircuitBreaker>,
    limiter: Arc<RateLimiter>,
    backoff: RetryPolicy,
    strategy_cache: Cache<String, FetchStrategy>,
    stats: Mutex<HashMap<FetchStrategy, StrategyStats>>,
    renderer: Option<Arc<dyn PageRenderer>>,
}

impl FetchEngine {
    pub fn new(config: FetchConfig, breaker: Arc<CircuitBreaker>, limiter: Arc<RateLimiter>) -> Self {
        let backoff = RetryPolicy::new(config.backoff.clone());
        Self {
            config,
            breaker,
            limiter,
            backoff,
            strategy_cache: Cache::builder().max_capacity(MAX_CACHE_ENTRIES).build(),
            stats: Mutex::new(HashMap::new()),
            renderer: None,
        }
    }

    /// Attach a headless renderer, enabling the headless strategies.
    pub fn with_renderer(mut self, renderer: Arc<dyn PageRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Fetch `target`, trying strategies in order until one succeeds.
    ///
    /// The order is: memoized last-successful strategy for this target (when
    /// caching is enabled), then `preferred` if given, then the default
    /// simplest-first order, deduplicated and bounded by `max_retries`. A
    /// blocked failure on a Simple-class strategy skips the remaining Simple
    /// strategies. Strategy errors are absorbed into the attempt log.
    pub async fn fetch(
        &self,
        target: &str,
        preferred: Option<FetchStrategy>,
        cancel: &CancellationToken,
    ) -> FetchResult {
        let started = Instant::now();
        let resource = resource_key(target);
        tracing::debug!(target, resource = %resource, "fetch starting");

        let cached = if self.config.use_strategy_cache {
            self.strategy_cache.get(target).await
        } else {
            None
        };
        if let Some(strategy) = cached {
            tracing::trace!(target, %strategy, "strategy cache hit");
        }

        let order = self.trial_order(cached, preferred);
        let mut attempts: Vec<FetchAttempt> = Vec::new();
        let mut i = 0;

        while i < order.len() && attempts.len() < self.config.max_retries {
            let strategy = order[i];

            // Inter-strategy backoff, scaled by how many attempts were made.
            if !attempts.is_empty() {
                let delay = self.backoff.delay_for(attempts.len() as u32 - 1);
                tracing::trace!(target, ?delay, %strategy, "backoff before next strategy");
                tokio::select! {
                    _ = cancel.cancelled() => {
                        return Self::cancelled_result(target, attempts, started);
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            if self
                .limiter
                .await_admission(&resource, cancel)
                .await
                .is_err()
            {
                return Self::cancelled_result(target, attempts, started);
            }

            let attempt_start = Instant::now();
            let outcome = tokio::select! {
                _ = cancel.cancelled() => {
                    return Self::cancelled_result(target, attempts, started);
                }
                out = self
                    .breaker
                    .execute(&resource, || self.attempt(strategy, target)) => out,
            };

            match outcome {
                Ok(page) => {
                    attempts.push(FetchAttempt {
                        strategy,
                        started_at: attempt_start,
                        success: true,
                        status: Some(page.status),
                        error: None,
                        elapsed: attempt_start.elapsed(),
                        payload_size: page.body.len(),
                    });
                    self.record_stat(strategy, true);
                    if self.config.use_strategy_cache {
                        self.strategy_cache.insert(target.to_string(), strategy).await;
                    }
                    tracing::debug!(target, %strategy, bytes = page.body.len(), "fetch succeeded");
                    return FetchResult {
                        success: true,
                        body: Some(page.body),
                        final_url: page.final_url,
                        strategy_used: Some(strategy),
                        attempts,
                        error: None,
                        elapsed: started.elapsed(),
                    };
                }
                Err(err) => {
                    let blocked = err.is_blocked();
                    attempts.push(FetchAttempt {
                        strategy,
                        started_at: attempt_start,
                        success: false,
                        status: status_from_error(&err),
                        error: Some(err.to_string()),
                        elapsed: attempt_start.elapsed(),
                        payload_size: 0,
                    });
                    // A breaker rejection never ran the strategy, so it says
                    // nothing about how the strategy performs.
                    if !matches!(err, SearchError::CircuitOpen(_)) {
                        self.record_stat(strategy, false);
                    }
                    tracing::warn!(target, %strategy, error = %err, blocked, "strategy failed");

                    // A hardened target rejects all simple request variants
                    // alike; escalate straight to the advanced strategies.
                    if blocked && strategy.class() == StrategyClass::Simple {
                        let next_advanced = order[i + 1..]
                            .iter()
                            .position(|s| s.class() == StrategyClass::Advanced);
                        i = match next_advanced {
                            Some(offset) => i + 1 + offset,
                            None => order.len(),
                        };
                        continue;
                    }
                    i += 1;
                }
            }
        }

        tracing::warn!(target, attempts = attempts.len(), "all strategies exhausted");
        let summary = SearchError::ExhaustedStrategies(format!(
            "{} attempts against {target}",
            attempts.len()
        ))
        .to_string();
        FetchResult {
            success: false,
            body: None,
            final_url: target.to_string(),
            strategy_used: None,
            attempts,
            error: Some(summary),
            elapsed: started.elapsed(),
        }
    }

    /// Read-only statistics snapshot: per-strategy success/failure counts and
    /// the current memoization cache size.
    pub async fn stats(&self) -> FetchStats {
        self.strategy_cache.run_pending_tasks().await;
        let per_strategy = self
            .stats
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        FetchStats {
            per_strategy,
            cache_size: self.strategy_cache.entry_count(),
        }
    }

    /// Build the trial order: cached strategy, then preferred, then the
    /// default order, deduplicated. Headless strategies are included only
    /// when a renderer is attached.
    fn trial_order(
        &self,
        cached: Option<FetchStrategy>,
        preferred: Option<FetchStrategy>,
    ) -> Vec<FetchStrategy> {
        let mut order: Vec<FetchStrategy> = Vec::new();
        let usable = |s: &FetchStrategy| !s.needs_renderer() || self.renderer.is_some();

        for strategy in cached
            .into_iter()
            .chain(preferred)
            .chain(FetchStrategy::default_order().iter().copied())
        {
            if usable(&strategy) && !order.contains(&strategy) {
                order.push(strategy);
            }
        }
        order
    }

    /// Execute one strategy against the target.
    async fn attempt(&self, strategy: FetchStrategy, target: &str) -> Result<FetchedPage, SearchError> {
        let timeout = self.config.timeout_seconds;
        let ua = self.config.user_agent.as_deref();
        match strategy {
            FetchStrategy::Plain => {
                self.http_attempt(http::plain_client(timeout, ua)?, target).await
            }
            FetchStrategy::RotatingHeaders => {
                self.http_attempt(http::browser_client(timeout, ua)?, target).await
            }
            FetchStrategy::AntiBot => {
                self.http_attempt(http::stealth_client(timeout, ua)?, target).await
            }
            FetchStrategy::HeadlessChromium => self.render_attempt(target, RenderBackend::Chromium).await,
            FetchStrategy::HeadlessFirefox => self.render_attempt(target, RenderBackend::Firefox).await,
            FetchStrategy::HeadlessWebkit => self.render_attempt(target, RenderBackend::Webkit).await,
        }
    }

    async fn http_attempt(&self, client: reqwest::Client, target: &str) -> Result<FetchedPage, SearchError> {
        let response = client.get(target).send().await.map_err(|e| {
            let message = format!("request failed: {e}");
            if blocking::is_blocked_error(&message) {
                SearchError::Blocked(message)
            } else {
                SearchError::Transient(message)
            }
        })?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let body = response
            .text()
            .await
            .map_err(|e| SearchError::Transient(format!("response read failed: {e}")))?;

        validate_page(status, body, final_url)
    }

    async fn render_attempt(&self, target: &str, backend: RenderBackend) -> Result<FetchedPage, SearchError> {
        let renderer = self
            .renderer
            .as_ref()
            .ok_or_else(|| SearchError::Transient("no headless renderer attached".into()))?;
        let page = renderer.render(target, backend).await?;
        validate_page(page.status, page.html, page.final_url)
    }

    fn record_stat(&self, strategy: FetchStrategy, success: bool) {
        let mut stats = self.stats.lock().unwrap_or_else(|e| e.into_inner());
        let entry = stats.entry(strategy).or_default();
        if success {
            entry.success += 1;
        } else {
            entry.failure += 1;
        }
    }

    fn cancelled_result(target: &str, attempts: Vec<FetchAttempt>, started: Instant) -> FetchResult {
        FetchResult {
            success: false,
            body: None,
            final_url: target.to_string(),
            strategy_used: None,
            attempts,
            error: Some(SearchError::Cancelled.to_string()),
            elapsed: started.elapsed(),
        }
    }
}

/// Classify a response: non-2xx statuses and block-marker payloads are
/// errors; everything else is a fetched page.
fn validate_page(status: u16, body: String, final_url: String) -> Result<FetchedPage, SearchError> {
    if !(200..300).contains(&status) {
        let message = format!("HTTP {status}");
        return Err(if blocking::is_blocked_status(status) {
            SearchError::Blocked(message)
        } else {
            SearchError::Transient(message)
        });
    }
    if blocking::payload_has_block_markers(&body) {
        return Err(SearchError::Blocked(format!(
            "HTTP {status}: payload contains block markers"
        )));
    }
    Ok(FetchedPage {
        status,
        body,
        final_url,
    })
}

/// Circuit breaker and rate limiter key for a target: its host, falling back
/// to the raw target string for unparseable inputs.
pub fn resource_key(target: &str) -> String {
    url::Url::parse(target)
        .ok()
        .and_then(|u| u.host_str().map(str::to_owned))
        .unwrap_or_else(|| target.to_string())
}

/// Best-effort extraction of an `HTTP NNN` status from an error message,
/// for the attempt log.
fn status_from_error(err: &SearchError) -> Option<u16> {
    let text = err.to_string();
    let idx = text.find("HTTP ")?;
    text[idx + 5..]
        .chars()
        .take_while(char::is_ascii_digit)
        .collect::<String>()
        .parse()
        .ok()
}
