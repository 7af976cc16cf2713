//! # patent-scout
//!
//! Resilient multi-source search for pharmaceutical patent and clinical
//! trial data.
//!
//! The sources this crate fronts — patent registries, Google Patents,
//! PubChem, ClinicalTrials.gov, EPO family data — are slow, rate limited,
//! and sometimes actively hostile to automated clients. The retrieval layer
//! is built around that reality rather than around the happy path.
//!
//! ## Design
//!
//! - A fetch engine escalates through request strategies (plain client,
//!   fingerprint-randomized headers, anti-bot profile, optional headless
//!   renders) and memoizes what worked per target
//! - Per-host circuit breakers, sliding-window rate limits, and jittered
//!   exponential backoff guard every outbound request
//! - One query fans out to all sources in parallel; failures surface as
//!   per-source errors in the result instead of aborting the search
//! - Records are deduplicated on normalized publication numbers and ranked
//!   by field completeness
//!
//! ## Security
//!
//! - No API keys are required by the default source set
//! - Structured-extraction output is treated strictly as data and capped by
//!   a per-query cost budget
//! - Queries are logged at info level without response payloads

pub mod blocking;
pub mod circuit_breaker;
pub mod config;
pub mod error;
pub mod extract;
pub mod fetch_engine;
pub mod http;
pub mod orchestrator;
pub mod rate_limiter;
pub mod retry;
pub mod sources;
pub mod strategy;
pub mod types;

pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use config::{BreakerConfig, FetchConfig, RetryConfig, SearchConfig};
pub use error::{Result, SearchError};
pub use extract::{ExtractionBudget, StructuredExtractor};
pub use fetch_engine::{FetchEngine, FetchResult, PageRenderer};
pub use orchestrator::SearchOrchestrator;
pub use rate_limiter::{RateLimiter, WindowLimit};
pub use retry::RetryPolicy;
pub use strategy::FetchStrategy;
pub use types::{AggregatedResult, CandidateRecord, SearchQuery, Source};

use tokio_util::sync::CancellationToken;

/// Search all configured sources for a molecule.
///
/// Resolves identifiers, fans out to the enabled sources in parallel,
/// optionally expands WO numbers into family filings, then deduplicates and
/// ranks everything found. Individual source failures are reported in
/// [`AggregatedResult::errors`] and do not fail the search.
///
/// # Errors
///
/// Returns [`SearchError::Config`] for an invalid configuration or query,
/// and [`SearchError::Cancelled`] when `cancel` fires mid-search.
///
/// # Examples
///
/// ```no_run
/// # async fn example() -> patent_scout::Result<()> {
/// use tokio_util::sync::CancellationToken;
///
/// let config = patent_scout::SearchConfig::default();
/// let query = patent_scout::SearchQuery::new("darolutamide");
/// let result = patent_scout::search(&query, &config, &CancellationToken::new()).await?;
/// for record in &result.records {
///     println!("{} [{}] {:.0}", record.publication_number, record.jurisdiction, record.quality_score);
/// }
/// # Ok(())
/// # }
/// ```
pub async fn search(
    query: &SearchQuery,
    config: &SearchConfig,
    cancel: &CancellationToken,
) -> Result<AggregatedResult> {
    let orchestrator = SearchOrchestrator::new(config.clone())?;
    orchestrator.search(query, cancel).await
}
