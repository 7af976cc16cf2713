//! Structured-extraction fallback with a hard cost budget.
//!
//! When a source payload defeats the regular parsers, an injected
//! [`StructuredExtractor`] may turn it into structured JSON instead. Every
//! call is gated by an [`ExtractionBudget`]: the estimated cost is charged
//! up front and the call is refused once the budget is spent. Extractor
//! output is data only; it is never evaluated or executed.

use std::sync::Mutex;

use crate::error::SearchError;

/// Turns an unparseable payload into structured JSON.
///
/// Implementations typically call out to a remote extraction service; the
/// trait keeps that dependency injectable and testable.
#[async_trait::async_trait]
pub trait StructuredExtractor: Send + Sync {
    /// Extract fields described by `goal` from `payload`.
    async fn extract(&self, payload: &str, goal: &str) -> Result<serde_json::Value, SearchError>;

    /// Estimated cost in USD of extracting from `payload`.
    fn estimate_cost(&self, payload: &str) -> f64;
}

/// Cumulative spend tracker for structured extraction.
///
/// Shared behind an `Arc` by everything that may fall back to extraction
/// within one search, so the cap applies to the search as a whole.
#[derive(Debug)]
pub struct ExtractionBudget {
    max_cost_usd: f64,
    spent: Mutex<f64>,
}

impl ExtractionBudget {
    pub fn new(max_cost_usd: f64) -> Self {
        Self {
            max_cost_usd,
            spent: Mutex::new(0.0),
        }
    }

    /// Charge `cost` against the budget, or refuse without charging if it
    /// would push cumulative spend past the cap.
    pub fn try_charge(&self, cost: f64) -> Result<(), SearchError> {
        let mut spent = self.spent.lock().unwrap_or_else(|e| e.into_inner());
        let projected = *spent + cost;
        if projected > self.max_cost_usd {
            return Err(SearchError::BudgetExceeded(format!(
                "${projected:.4} > ${:.4}",
                self.max_cost_usd
            )));
        }
        *spent = projected;
        Ok(())
    }

    pub fn spent_usd(&self) -> f64 {
        *self.spent.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn remaining_usd(&self) -> f64 {
        (self.max_cost_usd - self.spent_usd()).max(0.0)
    }
}

/// Run a budget-gated extraction: estimate, charge, then extract.
///
/// The estimate is charged before the call, so a refused charge makes no
/// network request at all.
pub async fn extract_within_budget(
    extractor: &dyn StructuredExtractor,
    budget: &ExtractionBudget,
    payload: &str,
    goal: &str,
) -> Result<serde_json::Value, SearchError> {
    let cost = extractor.estimate_cost(payload);
    budget.try_charge(cost)?;
    tracing::debug!(cost_usd = cost, goal, "running structured extraction");
    extractor.extract(payload, goal).await
}
