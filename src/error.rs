//! Error types for the patent-scout crate.
//!
//! The taxonomy is deliberately narrow: every layer returns one of these
//! variants rather than catching and re-wrapping ad hoc exceptions. Fetch
//! strategies absorb their own errors into attempt logs; only the terminal
//! outcomes below cross component boundaries. No credentials or request
//! payloads appear in error messages.

/// Errors that can occur during fetch and search operations.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// A transient network or HTTP failure — retryable.
    #[error("transient error: {0}")]
    Transient(String),

    /// The target actively rejected the request (bot detection, CAPTCHA,
    /// 403/429/503). Triggers a strategy-class skip in the fetch engine.
    #[error("blocked by target: {0}")]
    Blocked(String),

    /// The circuit breaker for a resource is open; no network call was made.
    #[error("circuit open for resource: {0}")]
    CircuitOpen(String),

    /// Rate limit admission was denied for a resource.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Every fetch strategy was tried and failed for a target.
    #[error("all fetch strategies exhausted: {0}")]
    ExhaustedStrategies(String),

    /// A response could not be parsed into the expected shape.
    #[error("parse error: {0}")]
    Parse(String),

    /// Invalid configuration.
    #[error("config error: {0}")]
    Config(String),

    /// The structured-extraction fallback would exceed its cost budget.
    #[error("extraction budget exceeded: {0}")]
    BudgetExceeded(String),

    /// The query's cancellation signal fired.
    #[error("operation cancelled")]
    Cancelled,
}

impl SearchError {
    /// Whether this error represents an active block by the target, as
    /// opposed to an ordinary failure.
    pub fn is_blocked(&self) -> bool {
        matches!(self, Self::Blocked(_))
    }
}

/// Convenience type alias for patent-scout results.
pub type Result<T> = std::result::Result<T, SearchError>;
