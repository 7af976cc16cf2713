//! ClinicalTrials.gov study adapter (API v2).

use std::sync::Arc;

use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::error::SearchError;
use crate::fetch_engine::FetchEngine;
use crate::types::{CandidateRecord, RecordKind, Source};

const API_URL: &str = "https://clinicaltrials.gov/api/v2/studies";
const WEB_URL: &str = "https://clinicaltrials.gov";

#[derive(Debug, Deserialize)]
struct StudiesResponse {
    #[serde(default)]
    studies: Vec<Study>,
}

#[derive(Debug, Deserialize)]
struct Study {
    #[serde(rename = "protocolSection", default)]
    protocol: ProtocolSection,
}

#[derive(Debug, Default, Deserialize)]
struct ProtocolSection {
    #[serde(rename = "identificationModule", default)]
    identification: IdentificationModule,
    #[serde(rename = "statusModule", default)]
    status: StatusModule,
    #[serde(rename = "sponsorCollaboratorsModule", default)]
    sponsors: SponsorModule,
    #[serde(rename = "conditionsModule", default)]
    conditions: ConditionsModule,
    #[serde(rename = "descriptionModule", default)]
    description: DescriptionModule,
}

#[derive(Debug, Default, Deserialize)]
struct IdentificationModule {
    #[serde(rename = "nctId", default)]
    nct_id: String,
    #[serde(rename = "officialTitle")]
    official_title: Option<String>,
    #[serde(rename = "briefTitle", default)]
    brief_title: String,
}

#[derive(Debug, Default, Deserialize)]
struct StatusModule {
    #[serde(rename = "startDateStruct", default)]
    start_date: DateStruct,
    #[serde(rename = "lastUpdateSubmitDate", default)]
    last_update: String,
}

#[derive(Debug, Default, Deserialize)]
struct DateStruct {
    #[serde(default)]
    date: String,
}

#[derive(Debug, Default, Deserialize)]
struct SponsorModule {
    #[serde(rename = "leadSponsor", default)]
    lead_sponsor: LeadSponsor,
}

#[derive(Debug, Default, Deserialize)]
struct LeadSponsor {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct ConditionsModule {
    #[serde(default)]
    conditions: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct DescriptionModule {
    #[serde(rename = "briefSummary", default)]
    brief_summary: String,
}

/// ClinicalTrials.gov adapter. Trials carry their NCT id as the natural key
/// and an empty jurisdiction.
pub struct TrialsSource {
    engine: Arc<FetchEngine>,
    max_trials: usize,
}

impl TrialsSource {
    pub fn new(engine: Arc<FetchEngine>, max_trials: usize) -> Self {
        Self { engine, max_trials }
    }

    /// Search studies mentioning `term`.
    pub async fn search(
        &self,
        term: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<CandidateRecord>, SearchError> {
        let url = self.studies_url(term)?;
        let result = self.engine.fetch(&url, None, cancel).await;
        let body = result.body.ok_or_else(|| {
            SearchError::Transient(
                result
                    .error
                    .unwrap_or_else(|| "empty response from trial registry".into()),
            )
        })?;

        let records = parse_studies(&body, self.max_trials)?;
        tracing::info!(term, trials = records.len(), "trial search done");
        Ok(records)
    }

    fn studies_url(&self, term: &str) -> Result<String, SearchError> {
        let page_size = self.max_trials.min(100);
        let mut url = url::Url::parse(API_URL)
            .map_err(|e| SearchError::Config(format!("bad trials url: {e}")))?;
        url.query_pairs_mut()
            .append_pair("query.term", term)
            .append_pair("pageSize", &page_size.to_string())
            .append_pair("format", "json");
        Ok(url.to_string())
    }
}

fn parse_studies(body: &str, max_trials: usize) -> Result<Vec<CandidateRecord>, SearchError> {
    let response: StudiesResponse = serde_json::from_str(body)
        .map_err(|e| SearchError::Parse(format!("trial studies: {e}")))?;

    Ok(response
        .studies
        .into_iter()
        .take(max_trials)
        .filter_map(study_to_record)
        .collect())
}

fn study_to_record(study: Study) -> Option<CandidateRecord> {
    let protocol = study.protocol;
    let nct_id = protocol.identification.nct_id;
    if nct_id.is_empty() {
        return None;
    }

    let title = protocol
        .identification
        .official_title
        .filter(|t| !t.is_empty())
        .unwrap_or(protocol.identification.brief_title);

    Some(CandidateRecord {
        publication_number: nct_id.clone(),
        jurisdiction: String::new(),
        title,
        abstract_text: protocol.description.brief_summary,
        applicant: protocol.sponsors.lead_sponsor.name,
        inventors: Vec::new(),
        filing_date: protocol.status.start_date.date,
        publication_date: protocol.status.last_update,
        classifications: protocol.conditions.conditions,
        source: Source::ClinicalTrials,
        link: format!("{WEB_URL}/study/{nct_id}"),
        kind: RecordKind::Trial,
        quality_score: 0.0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "studies": [
            {
                "protocolSection": {
                    "identificationModule": {
                        "nctId": "NCT02200614",
                        "briefTitle": "ARAMIS",
                        "officialTitle": "Efficacy and Safety Study of Darolutamide (ODM-201)"
                    },
                    "statusModule": {
                        "startDateStruct": {"date": "2014-09-03"},
                        "lastUpdateSubmitDate": "2023-01-10"
                    },
                    "sponsorCollaboratorsModule": {
                        "leadSponsor": {"name": "Bayer"}
                    },
                    "conditionsModule": {
                        "conditions": ["Prostate Cancer"]
                    },
                    "descriptionModule": {
                        "briefSummary": "Randomized phase III trial."
                    }
                }
            },
            {
                "protocolSection": {
                    "identificationModule": {"nctId": "", "briefTitle": "orphan"}
                }
            }
        ]
    }"#;

    #[test]
    fn parse_studies_maps_fields() {
        let records = parse_studies(SAMPLE, 50).expect("parse");
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.publication_number, "NCT02200614");
        assert_eq!(record.kind, RecordKind::Trial);
        assert_eq!(record.applicant, "Bayer");
        assert_eq!(record.filing_date, "2014-09-03");
        assert_eq!(record.classifications, vec!["Prostate Cancer"]);
        assert!(record.title.starts_with("Efficacy"));
        assert_eq!(record.link, "https://clinicaltrials.gov/study/NCT02200614");
        assert!(record.jurisdiction.is_empty());
    }

    #[test]
    fn parse_studies_honours_cap() {
        let records = parse_studies(SAMPLE, 0).expect("parse");
        assert!(records.is_empty());
    }

    #[test]
    fn parse_studies_rejects_non_json() {
        assert!(matches!(
            parse_studies("not json", 10),
            Err(SearchError::Parse(_))
        ));
    }

    #[test]
    fn missing_modules_default_cleanly() {
        let body = r#"{"studies": [{"protocolSection": {"identificationModule": {"nctId": "NCT000", "briefTitle": "t"}}}]}"#;
        let records = parse_studies(body, 10).expect("parse");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title, "t");
        assert!(records[0].applicant.is_empty());
    }
}
