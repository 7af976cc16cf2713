//! Configuration with sensible defaults.
//!
//! All thresholds, timeouts, and limits are plain structured values handed in
//! at construction time. Nothing is read from the environment or disk.

use std::collections::HashMap;
use std::time::Duration;

use crate::error::SearchError;
use crate::rate_limiter::WindowLimit;
use crate::types::Source;

/// Circuit breaker thresholds for one named resource class.
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive failures in Closed state before tripping to Open.
    pub failure_threshold: u32,
    /// Consecutive successes in HalfOpen state before closing.
    pub success_threshold: u32,
    /// Lifetime failure percentage (0–100) that also trips the circuit.
    pub failure_rate_threshold: f64,
    /// Time to wait in Open state before allowing a probe.
    pub cooldown: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            failure_rate_threshold: 60.0,
            cooldown: Duration::from_secs(60),
        }
    }
}

/// Exponential backoff parameters shared by the retry policy and the fetch
/// engine's inter-strategy delays.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub exponential_base: f64,
    /// Apply ±20% uniform jitter to each delay.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            exponential_base: 2.0,
            jitter: true,
        }
    }
}

/// Fetch engine behaviour.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Maximum strategy attempts per fetch (bounds the trial order).
    pub max_retries: usize,
    /// Per-request HTTP timeout in seconds.
    pub timeout_seconds: u64,
    /// Backoff parameters for inter-strategy delays.
    pub backoff: RetryConfig,
    /// Remember which strategy last succeeded per target and try it first.
    pub use_strategy_cache: bool,
    /// Custom User-Agent. If `None`, rotates through realistic browser UAs
    /// for the fingerprint-randomized strategies.
    pub user_agent: Option<String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            timeout_seconds: 30,
            backoff: RetryConfig {
                max_attempts: 5,
                base_delay: Duration::from_secs(1),
                max_delay: Duration::from_secs(30),
                exponential_base: 2.0,
                jitter: true,
            },
            use_strategy_cache: true,
            user_agent: None,
        }
    }
}

/// Top-level configuration for a search orchestrator.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Which sources participate in the fan-out.
    pub sources: Vec<Source>,
    /// Fetch engine settings shared by all adapters.
    pub fetch: FetchConfig,
    /// Circuit breaker thresholds (one breaker state per resource key).
    pub breaker: BreakerConfig,
    /// Sliding-window rate limits keyed by resource (host). Resources
    /// without an entry are never limited.
    pub rate_limits: HashMap<String, Vec<WindowLimit>>,
    /// Maximum WO numbers expanded in the second wave.
    pub max_expansions: usize,
    /// Maximum trial records requested from the trial registry.
    pub max_trials: usize,
    /// Maximum dev-code variations sent to the patent registry.
    pub max_variations: usize,
    /// Base URL of the patent registry endpoint.
    pub registry_base_url: String,
    /// Budget ceiling (USD) for the structured-extraction fallback, per query.
    pub extraction_budget_usd: f64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        let mut rate_limits = HashMap::new();
        // PubChem asks for at most 5 requests per second; stay well under.
        rate_limits.insert(
            "pubchem.ncbi.nlm.nih.gov".to_string(),
            vec![WindowLimit::per_minute(30), WindowLimit::per_hour(400)],
        );
        rate_limits.insert(
            "patents.google.com".to_string(),
            vec![WindowLimit::per_minute(10), WindowLimit::per_hour(100)],
        );
        rate_limits.insert(
            "clinicaltrials.gov".to_string(),
            vec![WindowLimit::per_minute(30)],
        );

        Self {
            sources: vec![
                Source::PubChem,
                Source::Registry,
                Source::ClinicalTrials,
                Source::GooglePatents,
                Source::Espacenet,
            ],
            fetch: FetchConfig::default(),
            breaker: BreakerConfig::default(),
            rate_limits,
            max_expansions: 30,
            max_trials: 50,
            max_variations: 5,
            registry_base_url: "https://crawler3-production.up.railway.app".to_string(),
            extraction_budget_usd: 0.10,
        }
    }
}

impl SearchConfig {
    /// Validates this configuration, returning an error if any field is
    /// invalid.
    pub fn validate(&self) -> Result<(), SearchError> {
        if self.sources.is_empty() {
            return Err(SearchError::Config(
                "at least one source must be enabled".into(),
            ));
        }
        if self.fetch.max_retries == 0 {
            return Err(SearchError::Config(
                "max_retries must be greater than 0".into(),
            ));
        }
        if self.fetch.timeout_seconds == 0 {
            return Err(SearchError::Config(
                "timeout_seconds must be greater than 0".into(),
            ));
        }
        if self.fetch.backoff.max_attempts == 0 {
            return Err(SearchError::Config(
                "backoff max_attempts must be greater than 0".into(),
            ));
        }
        if self.fetch.backoff.exponential_base < 1.0 {
            return Err(SearchError::Config(
                "exponential_base must be at least 1.0".into(),
            ));
        }
        if self.breaker.failure_threshold == 0 || self.breaker.success_threshold == 0 {
            return Err(SearchError::Config(
                "breaker thresholds must be greater than 0".into(),
            ));
        }
        if !(0.0..=100.0).contains(&self.breaker.failure_rate_threshold) {
            return Err(SearchError::Config(
                "failure_rate_threshold must be a percentage (0–100)".into(),
            ));
        }
        if self.extraction_budget_usd < 0.0 {
            return Err(SearchError::Config(
                "extraction_budget_usd must not be negative".into(),
            ));
        }
        Ok(())
    }
}
