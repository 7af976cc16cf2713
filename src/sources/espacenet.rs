//! Patent family expansion (EPO OPS).
//!
//! Expands WO publication numbers into their family members and keeps the
//! filings in the target jurisdictions. The OPS family payload wraps every
//! leaf value in `{"$": ...}` and collapses single-element lists into bare
//! objects, so parsing navigates [`serde_json::Value`] rather than rigid
//! structs.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::SearchError;
use crate::fetch_engine::FetchEngine;
use crate::types::{CandidateRecord, Source};

const BASE_URL: &str = "https://ops.epo.org/3.2";

/// Family lookups in flight at once.
const MAX_CONCURRENT: usize = 5;

/// Family expansion adapter.
pub struct EspacenetSource {
    engine: Arc<FetchEngine>,
    base_url: String,
    max_expansions: usize,
}

impl EspacenetSource {
    pub fn new(engine: Arc<FetchEngine>, max_expansions: usize) -> Self {
        Self {
            engine,
            base_url: BASE_URL.to_string(),
            max_expansions,
        }
    }

    /// Override the OPS endpoint.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Expand WO numbers (capped) into family filings in `jurisdictions`.
    ///
    /// A WO number whose lookup fails is skipped; the call errors only when
    /// every lookup failed.
    pub async fn expand(
        &self,
        wo_numbers: &[String],
        jurisdictions: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<CandidateRecord>, SearchError> {
        if wo_numbers.is_empty() {
            return Ok(Vec::new());
        }

        if cancel.is_cancelled() {
            return Err(SearchError::Cancelled);
        }

        let outcomes: Vec<(&String, Result<Vec<CandidateRecord>, SearchError>)> =
            stream::iter(wo_numbers.iter().take(self.max_expansions).map(|wo| async move {
                (wo, self.expand_one(wo, jurisdictions, cancel).await)
            }))
            .buffer_unordered(MAX_CONCURRENT)
            .collect()
            .await;

        if cancel.is_cancelled() {
            return Err(SearchError::Cancelled);
        }

        let mut records: Vec<CandidateRecord> = Vec::new();
        let mut last_error: Option<SearchError> = None;
        let mut any_succeeded = false;

        for (wo, outcome) in outcomes {
            match outcome {
                Ok(members) => {
                    any_succeeded = true;
                    for record in members {
                        if !records
                            .iter()
                            .any(|r| r.publication_number == record.publication_number)
                        {
                            records.push(record);
                        }
                    }
                }
                Err(err) => {
                    tracing::warn!(wo = %wo, error = %err, "family expansion failed");
                    last_error = Some(err);
                }
            }
        }

        if !any_succeeded {
            return Err(
                last_error.unwrap_or_else(|| SearchError::Transient("no expansions ran".into()))
            );
        }
        tracing::info!(
            expanded = wo_numbers.len().min(self.max_expansions),
            records = records.len(),
            "family expansion done"
        );
        Ok(records)
    }

    async fn expand_one(
        &self,
        wo: &str,
        jurisdictions: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<CandidateRecord>, SearchError> {
        let url = format!(
            "{}/rest-services/family/publication/docdb/{wo}",
            self.base_url
        );
        let result = self.engine.fetch(&url, None, cancel).await;
        let body = result.body.ok_or_else(|| {
            SearchError::Transient(
                result
                    .error
                    .unwrap_or_else(|| "empty response from family endpoint".into()),
            )
        })?;

        let value: Value = serde_json::from_str(&body)
            .map_err(|e| SearchError::Parse(format!("family payload: {e}")))?;
        Ok(parse_family(&value, wo, jurisdictions))
    }
}

/// OPS collapses single-element arrays into bare values.
fn as_list(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().collect(),
        Value::Null => Vec::new(),
        other => vec![other],
    }
}

/// OPS wraps leaf strings as `{"$": "text"}`.
fn leaf(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(|v| v.get("$"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Walk the family payload and keep members in the target jurisdictions.
fn parse_family(payload: &Value, wo: &str, jurisdictions: &[String]) -> Vec<CandidateRecord> {
    let members = payload
        .get("ops:world-patent-data")
        .and_then(|v| v.get("ops:patent-family"))
        .and_then(|v| v.get("ops:family-member"))
        .map(as_list)
        .unwrap_or_default();

    let mut records = Vec::new();
    for member in members {
        let Some(pub_ref) = member.get("publication-reference") else {
            continue;
        };
        let doc_ids = pub_ref.get("document-id").map(as_list).unwrap_or_default();
        let Some(doc_id) = doc_ids.first() else {
            continue;
        };

        let country = leaf(doc_id, "country");
        let number = leaf(doc_id, "doc-number");
        let kind = leaf(doc_id, "kind");
        let date = leaf(doc_id, "date");
        if country.is_empty() || number.is_empty() {
            continue;
        }
        if !jurisdictions.iter().any(|j| j.eq_ignore_ascii_case(&country)) {
            continue;
        }

        let publication_number = format!("{country}{number}{kind}");
        let mut record = CandidateRecord::patent(&publication_number, &country, Source::Espacenet);
        record.publication_date = date;
        record.abstract_text = format!("Family member of {wo}");
        record.link = format!(
            "https://worldwide.espacenet.com/patent/search?q={publication_number}"
        );
        records.push(record);
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_family() -> Value {
        serde_json::json!({
            "ops:world-patent-data": {
                "ops:patent-family": {
                    "ops:family-member": [
                        {
                            "publication-reference": {
                                "document-id": [{
                                    "country": {"$": "BR"},
                                    "doc-number": {"$": "112012008823"},
                                    "kind": {"$": "B8"},
                                    "date": {"$": "20191112"}
                                }]
                            }
                        },
                        {
                            "publication-reference": {
                                "document-id": {
                                    "country": {"$": "US"},
                                    "doc-number": {"$": "9657003"},
                                    "kind": {"$": "B2"}
                                }
                            }
                        },
                        { "exchange-document": {} }
                    ]
                }
            }
        })
    }

    #[test]
    fn parse_family_filters_to_target_jurisdictions() {
        let records = parse_family(&sample_family(), "WO2011051540", &["BR".to_string()]);
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.publication_number, "BR112012008823B8");
        assert_eq!(record.jurisdiction, "BR");
        assert_eq!(record.publication_date, "20191112");
        assert_eq!(record.source, Source::Espacenet);
        assert!(record.abstract_text.contains("WO2011051540"));
    }

    #[test]
    fn parse_family_handles_bare_document_id() {
        let records = parse_family(&sample_family(), "WO2011051540", &["US".to_string()]);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].publication_number, "US9657003B2");
    }

    #[test]
    fn parse_family_case_insensitive_jurisdictions() {
        let records = parse_family(&sample_family(), "WO2011051540", &["br".to_string()]);
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn parse_family_empty_payload() {
        let records = parse_family(&serde_json::json!({}), "WO1", &["BR".to_string()]);
        assert!(records.is_empty());
    }
}
