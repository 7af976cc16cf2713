//! Core types for queries, candidate records, and aggregated results.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::SearchError;

/// Data sources that patent-scout can query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Source {
    /// PubChem compound lookup — resolves CAS numbers and development codes.
    PubChem,
    /// National patent registry endpoint (INPI for BR filings).
    Registry,
    /// ClinicalTrials.gov study API.
    ClinicalTrials,
    /// Google Patents search page, scraped for WO publication numbers.
    GooglePatents,
    /// Espacenet family expansion — WO number to jurisdiction filings.
    Espacenet,
}

impl Source {
    /// Returns the human-readable name of this source.
    pub fn name(&self) -> &'static str {
        match self {
            Self::PubChem => "PubChem",
            Self::Registry => "Registry",
            Self::ClinicalTrials => "ClinicalTrials",
            Self::GooglePatents => "GooglePatents",
            Self::Espacenet => "Espacenet",
        }
    }

    /// Returns all source variants.
    pub fn all() -> &'static [Source] {
        &[
            Self::PubChem,
            Self::Registry,
            Self::ClinicalTrials,
            Self::GooglePatents,
            Self::Espacenet,
        ]
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Whether a candidate record describes a patent filing or a clinical trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordKind {
    Patent,
    Trial,
}

/// One logical search submitted to the orchestrator. Immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
    /// Primary subject — the molecule (INN) name.
    pub molecule: String,
    /// Optional brand/trade name used as a search variation.
    pub brand_name: Option<String>,
    /// Caller-supplied auxiliary identifiers (development codes, CAS).
    pub dev_codes: Vec<String>,
    /// Target jurisdictions by two-letter code, e.g. `["BR"]`.
    pub jurisdictions: Vec<String>,
    /// Whether to run the expansion wave (WO number → family filings).
    pub deep_search: bool,
}

impl SearchQuery {
    /// Build a query for a molecule with default depth and jurisdictions.
    pub fn new(molecule: impl Into<String>) -> Self {
        Self {
            molecule: molecule.into(),
            brand_name: None,
            dev_codes: Vec::new(),
            jurisdictions: vec!["BR".to_string()],
            deep_search: true,
        }
    }
}

/// Identifiers resolved for a molecule before the source fan-out.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MoleculeIdentifiers {
    /// Canonical molecule name as queried.
    pub name: String,
    /// CAS registry number, when one was found among the synonyms.
    pub cas_number: Option<String>,
    /// Development codes (e.g. `BAY-1841788`), best candidates first.
    pub dev_codes: Vec<String>,
    /// Raw synonym list, truncated.
    pub synonyms: Vec<String>,
}

/// Normalised representation of one retrieved entity — a patent filing or a
/// clinical trial. Records from different sources describing the same
/// real-world entity are merged during deduplication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateRecord {
    /// Natural key: publication number for patents, NCT id for trials.
    pub publication_number: String,
    /// Two-letter jurisdiction code; empty when not applicable (trials).
    pub jurisdiction: String,
    pub title: String,
    pub abstract_text: String,
    pub applicant: String,
    pub inventors: Vec<String>,
    /// Dates kept as source-formatted strings; sources disagree on formats
    /// and the core never does date arithmetic.
    pub filing_date: String,
    pub publication_date: String,
    pub classifications: Vec<String>,
    pub source: Source,
    pub link: String,
    pub kind: RecordKind,
    /// Completeness score assigned during aggregation (0–100).
    pub quality_score: f64,
}

impl CandidateRecord {
    /// A patent record with only the identifying fields set.
    pub fn patent(publication_number: impl Into<String>, jurisdiction: impl Into<String>, source: Source) -> Self {
        Self {
            publication_number: publication_number.into(),
            jurisdiction: jurisdiction.into(),
            title: String::new(),
            abstract_text: String::new(),
            applicant: String::new(),
            inventors: Vec::new(),
            filing_date: String::new(),
            publication_date: String::new(),
            classifications: Vec::new(),
            source,
            link: String::new(),
            kind: RecordKind::Patent,
            quality_score: 0.0,
        }
    }

    /// Number of non-empty structured fields, used to pick the more complete
    /// record when deduplication finds a natural-key collision.
    pub fn completeness(&self) -> usize {
        [
            !self.publication_number.is_empty(),
            !self.jurisdiction.is_empty(),
            !self.title.is_empty(),
            !self.abstract_text.is_empty(),
            !self.applicant.is_empty(),
            !self.inventors.is_empty(),
            !self.filing_date.is_empty(),
            !self.publication_date.is_empty(),
            !self.classifications.is_empty(),
            !self.link.is_empty(),
        ]
        .iter()
        .filter(|b| **b)
        .count()
    }
}

/// One source's contribution to a search: a list of candidate records, or
/// the error that prevented it. Created by the adapter, consumed by the
/// orchestrator during aggregation.
#[derive(Debug)]
pub struct PartialResult {
    pub source: Source,
    pub outcome: Result<Vec<CandidateRecord>, SearchError>,
}

impl PartialResult {
    pub fn ok(source: Source, records: Vec<CandidateRecord>) -> Self {
        Self {
            source,
            outcome: Ok(records),
        }
    }

    pub fn err(source: Source, error: SearchError) -> Self {
        Self {
            source,
            outcome: Err(error),
        }
    }
}

/// A source-level failure surfaced in the final result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceFailure {
    pub source: Source,
    pub message: String,
}

/// Final per-query output: deduplicated, ranked records plus summaries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedResult {
    /// Deduplicated records, sorted by quality score descending.
    pub records: Vec<CandidateRecord>,
    /// Record counts per jurisdiction (patents only).
    pub by_jurisdiction: HashMap<String, usize>,
    /// Record counts per contributing source.
    pub by_source: HashMap<String, usize>,
    /// Sources that failed, with their errors. A non-empty list does not
    /// make the overall search a failure.
    pub errors: Vec<SourceFailure>,
    /// Identifiers resolved during the first phase, if any.
    pub identifiers: Option<MoleculeIdentifiers>,
    /// Total wall-clock time for the query, in seconds.
    pub elapsed_seconds: f64,
}
