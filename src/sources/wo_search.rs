//! WO publication-number discovery via Google Patents.
//!
//! Issues a handful of query variations against the Google Patents search
//! page and scans both the rendered text and the result links for WO
//! publication numbers (`WO` + 4-digit year + 6–7 digit serial). The numbers
//! found here seed the family-expansion wave.

use std::sync::Arc;

use scraper::{Html, Selector};
use tokio_util::sync::CancellationToken;

use crate::error::SearchError;
use crate::fetch_engine::FetchEngine;
use crate::types::{CandidateRecord, MoleculeIdentifiers, SearchQuery, Source};

const SEARCH_URL: &str = "https://patents.google.com/";

/// Queries issued per search; the host is rate limited to 10/min.
const MAX_QUERIES: usize = 4;
const MAX_DEV_CODE_QUERIES: usize = 2;

/// Publication years accepted as plausible for a WO number.
const WO_YEAR_RANGE: std::ops::RangeInclusive<u32> = 1978..=2035;

/// Google Patents WO-number adapter.
pub struct WoSearchSource {
    engine: Arc<FetchEngine>,
}

impl WoSearchSource {
    pub fn new(engine: Arc<FetchEngine>) -> Self {
        Self { engine }
    }

    /// Search for WO numbers related to the query's molecule. Returns one
    /// sparse patent record per unique WO number found.
    pub async fn search(
        &self,
        query: &SearchQuery,
        identifiers: Option<&MoleculeIdentifiers>,
        cancel: &CancellationToken,
    ) -> Result<Vec<CandidateRecord>, SearchError> {
        let queries = build_queries(query, identifiers);
        let mut wo_numbers: Vec<String> = Vec::new();
        let mut last_error: Option<SearchError> = None;
        let mut any_succeeded = false;

        for term in &queries {
            if cancel.is_cancelled() {
                return Err(SearchError::Cancelled);
            }
            let url = search_url(term)?;
            let result = self.engine.fetch(&url, None, cancel).await;
            match result.body {
                Some(html) => {
                    any_succeeded = true;
                    for wo in extract_wo_from_html(&html) {
                        if !wo_numbers.contains(&wo) {
                            wo_numbers.push(wo);
                        }
                    }
                }
                None => {
                    let message = result
                        .error
                        .unwrap_or_else(|| "empty response from patent search".into());
                    tracing::warn!(term = %term, error = %message, "patent search query failed");
                    last_error = Some(SearchError::Transient(message));
                }
            }
        }

        if !any_succeeded {
            return Err(last_error
                .unwrap_or_else(|| SearchError::Transient("no patent search queries ran".into())));
        }
        tracing::info!(
            queries = queries.len(),
            wo_numbers = wo_numbers.len(),
            "patent search done"
        );
        Ok(wo_numbers.into_iter().map(wo_record).collect())
    }
}

fn search_url(term: &str) -> Result<String, SearchError> {
    let mut url = url::Url::parse(SEARCH_URL)
        .map_err(|e| SearchError::Config(format!("bad patent search url: {e}")))?;
    url.query_pairs_mut().append_pair("q", term);
    Ok(url.to_string())
}

/// Query variations: molecule first, then brand name, then development codes.
fn build_queries(query: &SearchQuery, identifiers: Option<&MoleculeIdentifiers>) -> Vec<String> {
    let mut queries = vec![format!("{} patent WO", query.molecule)];
    if let Some(brand) = &query.brand_name {
        queries.push(format!("{brand} patent WO"));
    }
    let codes = query
        .dev_codes
        .iter()
        .chain(identifiers.into_iter().flat_map(|ids| ids.dev_codes.iter()));
    for code in codes.take(MAX_DEV_CODE_QUERIES) {
        queries.push(format!("{code} patent WO"));
    }
    queries.truncate(MAX_QUERIES);
    queries
}

fn wo_record(wo: String) -> CandidateRecord {
    let mut record = CandidateRecord::patent(wo.clone(), "WO", Source::GooglePatents);
    record.link = format!("https://patents.google.com/?q={wo}");
    record
}

/// Scan a result page for WO numbers: the visible text plus every
/// `/patent/...` link, since result pages carry numbers in both places.
fn extract_wo_from_html(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let mut found: Vec<String> = Vec::new();

    let text: String = document.root_element().text().collect::<Vec<_>>().join(" ");
    for wo in scan_wo_numbers(&text) {
        if !found.contains(&wo) {
            found.push(wo);
        }
    }

    if let Ok(links) = Selector::parse(r#"a[href*="/patent/"]"#) {
        for link in document.select(&links) {
            if let Some(href) = link.value().attr("href") {
                for wo in scan_wo_numbers(href) {
                    if !found.contains(&wo) {
                        found.push(wo);
                    }
                }
            }
        }
    }
    found
}

/// Extract WO numbers from free text: `WO`, optional space, 4-digit year in
/// a plausible range, optional space or slash, 6–7 digit serial. Normalised
/// to `WO{year}{serial}` with separators removed.
pub fn scan_wo_numbers(text: &str) -> Vec<String> {
    let bytes = text.as_bytes();
    let mut found: Vec<String> = Vec::new();
    let mut i = 0;

    while i + 1 < bytes.len() {
        if !(bytes[i].eq_ignore_ascii_case(&b'W') && bytes[i + 1].eq_ignore_ascii_case(&b'O')) {
            i += 1;
            continue;
        }
        let mut j = i + 2;
        if j < bytes.len() && bytes[j] == b' ' {
            j += 1;
        }
        let year_start = j;
        while j < bytes.len() && bytes[j].is_ascii_digit() && j - year_start < 4 {
            j += 1;
        }
        if j - year_start != 4 {
            i += 1;
            continue;
        }
        let year: u32 = match text[year_start..j].parse() {
            Ok(y) => y,
            Err(_) => {
                i += 1;
                continue;
            }
        };
        if !WO_YEAR_RANGE.contains(&year) {
            i += 1;
            continue;
        }

        let mut k = j;
        if k < bytes.len() && bytes[k] == b' ' {
            k += 1;
        }
        if k < bytes.len() && bytes[k] == b'/' {
            k += 1;
        }
        let serial_start = k;
        while k < bytes.len() && bytes[k].is_ascii_digit() && k - serial_start < 7 {
            k += 1;
        }
        let serial_len = k - serial_start;
        if serial_len < 6 {
            i += 1;
            continue;
        }

        let wo = format!("WO{}{}", &text[year_start..j], &text[serial_start..k]);
        if !found.contains(&wo) {
            found.push(wo);
        }
        i = k;
    }
    found
}
