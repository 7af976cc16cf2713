//! Parallel search orchestration.
//!
//! One query runs in phases: identifier resolution (PubChem), a parallel
//! fan-out over the independent sources (registry, patent search, trials),
//! an optional family-expansion wave seeded by the WO numbers found, then
//! aggregation — dedup, scoring, ranking, summaries. A source failure is
//! recorded and tolerated; the search itself fails only on invalid input or
//! cancellation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::circuit_breaker::CircuitBreaker;
use crate::config::SearchConfig;
use crate::error::SearchError;
use crate::extract::{ExtractionBudget, StructuredExtractor};
use crate::fetch_engine::{FetchEngine, PageRenderer};
use crate::orchestrator::dedup::dedup_records;
use crate::orchestrator::scoring::score_and_rank;
use crate::rate_limiter::RateLimiter;
use crate::sources::{
    EspacenetSource, PubChemSource, RegistrySource, TrialsSource, WoSearchSource,
};
use crate::types::{
    AggregatedResult, MoleculeIdentifiers, PartialResult, SearchQuery, Source, SourceFailure,
};

/// Coordinates the source adapters behind one shared fetch engine.
pub struct SearchOrchestrator {
    config: SearchConfig,
    pubchem: PubChemSource,
    registry: RegistrySource,
    trials: TrialsSource,
    wo_search: WoSearchSource,
    espacenet: EspacenetSource,
}

impl SearchOrchestrator {
    /// Build an orchestrator from a validated configuration.
    pub fn new(config: SearchConfig) -> Result<Self, SearchError> {
        Self::with_collaborators(config, None, None)
    }

    /// Build with optional injected collaborators: a headless renderer for
    /// the fetch engine and a structured extractor for the registry parser
    /// fallback.
    pub fn with_collaborators(
        config: SearchConfig,
        renderer: Option<Arc<dyn PageRenderer>>,
        extractor: Option<Arc<dyn StructuredExtractor>>,
    ) -> Result<Self, SearchError> {
        config.validate()?;

        let breaker = Arc::new(CircuitBreaker::new(config.breaker.clone()));
        let limiter = Arc::new(RateLimiter::new(config.rate_limits.clone()));
        let mut engine = FetchEngine::new(config.fetch.clone(), breaker, limiter);
        if let Some(renderer) = renderer {
            engine = engine.with_renderer(renderer);
        }
        let engine = Arc::new(engine);
        let budget = Arc::new(ExtractionBudget::new(config.extraction_budget_usd));

        let mut registry = RegistrySource::new(
            Arc::clone(&engine),
            config.registry_base_url.clone(),
            config.max_variations,
            budget,
        );
        if let Some(extractor) = extractor {
            registry = registry.with_extractor(extractor);
        }

        Ok(Self {
            pubchem: PubChemSource::new(Arc::clone(&engine)),
            trials: TrialsSource::new(Arc::clone(&engine), config.max_trials),
            wo_search: WoSearchSource::new(Arc::clone(&engine)),
            espacenet: EspacenetSource::new(Arc::clone(&engine), config.max_expansions),
            registry,
            config,
        })
    }

    /// Run one search end to end.
    pub async fn search(
        &self,
        query: &SearchQuery,
        cancel: &CancellationToken,
    ) -> Result<AggregatedResult, SearchError> {
        if query.molecule.trim().is_empty() {
            return Err(SearchError::Config("molecule must not be empty".into()));
        }
        if query.jurisdictions.is_empty() {
            return Err(SearchError::Config(
                "at least one jurisdiction is required".into(),
            ));
        }
        let started = Instant::now();
        tracing::info!(molecule = %query.molecule, deep = query.deep_search, "search starting");

        // Phase 1: identifier resolution, best effort.
        let identifiers = if self.enabled(Source::PubChem) {
            match self.pubchem.resolve(&query.molecule, cancel).await {
                Ok(ids) => Some(ids),
                Err(SearchError::Cancelled) => return Err(SearchError::Cancelled),
                Err(err) => {
                    tracing::warn!(error = %err, "identifier resolution failed");
                    None
                }
            }
        } else {
            None
        };

        // Phase 2: independent sources in parallel.
        let ids = identifiers.as_ref();
        let registry_fut = async {
            if !self.enabled(Source::Registry) {
                return None;
            }
            Some(to_partial(
                Source::Registry,
                self.registry.search(query, ids, cancel).await,
            ))
        };
        let wo_fut = async {
            if !self.enabled(Source::GooglePatents) {
                return None;
            }
            Some(to_partial(
                Source::GooglePatents,
                self.wo_search.search(query, ids, cancel).await,
            ))
        };
        let trials_fut = async {
            if !self.enabled(Source::ClinicalTrials) {
                return None;
            }
            Some(to_partial(
                Source::ClinicalTrials,
                self.trials.search(&query.molecule, cancel).await,
            ))
        };
        let (registry_partial, wo_partial, trials_partial) =
            tokio::join!(registry_fut, wo_fut, trials_fut);

        if cancel.is_cancelled() {
            return Err(SearchError::Cancelled);
        }

        let mut partials: Vec<PartialResult> = Vec::new();
        partials.extend(registry_partial);
        partials.extend(trials_partial);

        // Phase 3: family expansion seeded by the WO numbers just found.
        let wo_numbers = wo_partial
            .as_ref()
            .map(|p| wo_numbers_of(p))
            .unwrap_or_default();
        partials.extend(wo_partial);

        if query.deep_search && self.enabled(Source::Espacenet) && !wo_numbers.is_empty() {
            let expansion = self
                .espacenet
                .expand(&wo_numbers, &query.jurisdictions, cancel)
                .await;
            if matches!(expansion, Err(SearchError::Cancelled)) {
                return Err(SearchError::Cancelled);
            }
            partials.push(to_partial(Source::Espacenet, expansion));
        }

        // Phase 4: aggregate.
        let result = aggregate(partials, identifiers, started.elapsed().as_secs_f64());
        tracing::info!(
            records = result.records.len(),
            failures = result.errors.len(),
            elapsed = result.elapsed_seconds,
            "search done"
        );
        Ok(result)
    }

    fn enabled(&self, source: Source) -> bool {
        self.config.sources.contains(&source)
    }
}

fn to_partial(
    source: Source,
    outcome: Result<Vec<crate::types::CandidateRecord>, SearchError>,
) -> PartialResult {
    match outcome {
        Ok(records) => PartialResult::ok(source, records),
        Err(err) => PartialResult::err(source, err),
    }
}

/// WO numbers carried by a patent-search partial.
fn wo_numbers_of(partial: &PartialResult) -> Vec<String> {
    match &partial.outcome {
        Ok(records) => records
            .iter()
            .filter(|r| r.publication_number.starts_with("WO"))
            .map(|r| r.publication_number.clone())
            .collect(),
        Err(_) => Vec::new(),
    }
}

/// Merge partial results into the final output: dedup, score, rank, and
/// summarize. Pure — no I/O — so the whole pipeline tail is testable with
/// synthetic partials.
pub fn aggregate(
    partials: Vec<PartialResult>,
    identifiers: Option<MoleculeIdentifiers>,
    elapsed_seconds: f64,
) -> AggregatedResult {
    let mut records = Vec::new();
    let mut errors: Vec<SourceFailure> = Vec::new();

    for partial in partials {
        match partial.outcome {
            Ok(found) => records.extend(found),
            Err(err) => errors.push(SourceFailure {
                source: partial.source,
                message: err.to_string(),
            }),
        }
    }

    let mut records = dedup_records(records);
    score_and_rank(&mut records);

    let mut by_jurisdiction: HashMap<String, usize> = HashMap::new();
    let mut by_source: HashMap<String, usize> = HashMap::new();
    for record in &records {
        if !record.jurisdiction.is_empty() {
            *by_jurisdiction.entry(record.jurisdiction.clone()).or_insert(0) += 1;
        }
        *by_source.entry(record.source.name().to_string()).or_insert(0) += 1;
    }

    AggregatedResult {
        records,
        by_jurisdiction,
        by_source,
        errors,
        identifiers,
        elapsed_seconds,
    }
}
