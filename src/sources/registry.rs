//! National patent registry adapter (INPI, for BR filings).
//!
//! Queries a registry crawler service that fronts the INPI search portal and
//! returns JSON. Each search term — the molecule, its brand name, and a
//! capped set of development codes — is queried separately and the results
//! merged. When the payload defeats the JSON parser, an optional
//! structured-extraction fallback is tried within its cost budget.

use std::sync::Arc;

use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::error::SearchError;
use crate::extract::{extract_within_budget, ExtractionBudget, StructuredExtractor};
use crate::fetch_engine::FetchEngine;
use crate::types::{CandidateRecord, MoleculeIdentifiers, RecordKind, SearchQuery, Source};

const DETAIL_URL: &str =
    "https://busca.inpi.gov.br/pePI/servlet/PatenteServletController?Action=detail&CodPedido=";

const ABSTRACT_LIMIT: usize = 500;

const EXTRACTION_GOAL: &str =
    "patent filings: publication number, title, applicant, abstract, filing date";

#[derive(Debug, Deserialize)]
struct RegistryResponse {
    #[serde(default)]
    data: Vec<RegistryEntry>,
}

/// One entry as emitted by the registry crawler service. The `title` field
/// carries the INPI process number; the human title lives in `applicant`.
#[derive(Debug, Deserialize)]
struct RegistryEntry {
    #[serde(default)]
    title: String,
    #[serde(default)]
    applicant: String,
    #[serde(default, rename = "fullText")]
    full_text: String,
    #[serde(default, rename = "depositDate")]
    deposit_date: String,
}

/// Patent registry adapter.
pub struct RegistrySource {
    engine: Arc<FetchEngine>,
    base_url: String,
    max_variations: usize,
    extractor: Option<Arc<dyn StructuredExtractor>>,
    budget: Arc<ExtractionBudget>,
}

impl RegistrySource {
    pub fn new(
        engine: Arc<FetchEngine>,
        base_url: impl Into<String>,
        max_variations: usize,
        budget: Arc<ExtractionBudget>,
    ) -> Self {
        Self {
            engine,
            base_url: base_url.into(),
            max_variations,
            extractor: None,
            budget,
        }
    }

    /// Attach a structured-extraction fallback for unparseable payloads.
    pub fn with_extractor(mut self, extractor: Arc<dyn StructuredExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    /// Query the registry with every search variation and merge the results.
    ///
    /// A variation that fails is skipped; the call errors only when every
    /// variation failed.
    pub async fn search(
        &self,
        query: &SearchQuery,
        identifiers: Option<&MoleculeIdentifiers>,
        cancel: &CancellationToken,
    ) -> Result<Vec<CandidateRecord>, SearchError> {
        let terms = search_variations(query, identifiers, self.max_variations);
        let mut records: Vec<CandidateRecord> = Vec::new();
        let mut last_error: Option<SearchError> = None;
        let mut any_succeeded = false;

        for term in &terms {
            if cancel.is_cancelled() {
                return Err(SearchError::Cancelled);
            }
            match self.search_term(term, cancel).await {
                Ok(found) => {
                    any_succeeded = true;
                    for record in found {
                        if !records
                            .iter()
                            .any(|r| r.publication_number == record.publication_number)
                        {
                            records.push(record);
                        }
                    }
                }
                Err(err) => {
                    tracing::warn!(term = %term, error = %err, "registry variation failed");
                    last_error = Some(err);
                }
            }
        }

        if !any_succeeded {
            return Err(last_error
                .unwrap_or_else(|| SearchError::Transient("no registry variations ran".into())));
        }
        tracing::info!(terms = terms.len(), records = records.len(), "registry search done");
        Ok(records)
    }

    async fn search_term(
        &self,
        term: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<CandidateRecord>, SearchError> {
        let url = self.search_url(term)?;
        let result = self.engine.fetch(&url, None, cancel).await;
        let body = result.body.ok_or_else(|| {
            SearchError::Transient(
                result
                    .error
                    .unwrap_or_else(|| "empty response from registry".into()),
            )
        })?;

        match parse_registry(&body) {
            Ok(records) => Ok(records),
            Err(parse_err) => {
                let Some(extractor) = &self.extractor else {
                    return Err(parse_err);
                };
                tracing::debug!(term, error = %parse_err, "falling back to structured extraction");
                let value =
                    extract_within_budget(extractor.as_ref(), &self.budget, &body, EXTRACTION_GOAL)
                        .await?;
                records_from_value(&value)
            }
        }
    }

    fn search_url(&self, term: &str) -> Result<String, SearchError> {
        let mut url = url::Url::parse(&self.base_url)
            .map_err(|e| SearchError::Config(format!("bad registry base url: {e}")))?;
        url.set_path("/api/data/inpi/patents");
        url.query_pairs_mut().append_pair("medicine", term);
        Ok(url.to_string())
    }
}

/// Build the ordered list of search terms: molecule, brand name, then
/// development codes from the query and the resolved identifiers, capped.
fn search_variations(
    query: &SearchQuery,
    identifiers: Option<&MoleculeIdentifiers>,
    max_variations: usize,
) -> Vec<String> {
    let mut terms = vec![query.molecule.clone()];
    if let Some(brand) = &query.brand_name {
        terms.push(brand.clone());
    }
    let codes = query
        .dev_codes
        .iter()
        .chain(identifiers.into_iter().flat_map(|ids| ids.dev_codes.iter()));
    for code in codes {
        if terms.len() >= max_variations {
            break;
        }
        if !terms.iter().any(|t| t.eq_ignore_ascii_case(code)) {
            terms.push(code.clone());
        }
    }
    terms.truncate(max_variations.max(1));
    terms
}

fn parse_registry(body: &str) -> Result<Vec<CandidateRecord>, SearchError> {
    let response: RegistryResponse = serde_json::from_str(body)
        .map_err(|e| SearchError::Parse(format!("registry response: {e}")))?;
    Ok(response
        .data
        .into_iter()
        .filter(|entry| !entry.title.trim().is_empty())
        .map(entry_to_record)
        .collect())
}

fn entry_to_record(entry: RegistryEntry) -> CandidateRecord {
    let process_number = entry.title.trim().to_string();
    let mut abstract_text = entry.full_text;
    if abstract_text.len() > ABSTRACT_LIMIT {
        let mut end = ABSTRACT_LIMIT;
        while !abstract_text.is_char_boundary(end) {
            end -= 1;
        }
        abstract_text.truncate(end);
    }

    CandidateRecord {
        publication_number: process_number.clone(),
        jurisdiction: "BR".to_string(),
        title: entry.applicant.trim().to_string(),
        abstract_text,
        applicant: String::new(),
        inventors: Vec::new(),
        filing_date: entry.deposit_date,
        publication_date: String::new(),
        classifications: Vec::new(),
        source: Source::Registry,
        link: format!("{DETAIL_URL}{process_number}"),
        kind: RecordKind::Patent,
        quality_score: 0.0,
    }
}

/// Convert extractor output into records. Accepts the same `data` array
/// shape as the registry itself.
fn records_from_value(value: &serde_json::Value) -> Result<Vec<CandidateRecord>, SearchError> {
    let response: RegistryResponse = serde_json::from_value(value.clone())
        .map_err(|e| SearchError::Parse(format!("extracted registry data: {e}")))?;
    Ok(response
        .data
        .into_iter()
        .filter(|entry| !entry.title.trim().is_empty())
        .map(entry_to_record)
        .collect())
}
