//! Record quality scoring.
//!
//! Each record earns points for the fields it carries, weighted toward the
//! identifiers that matter when screening patent coverage: the publication
//! number and jurisdiction dominate, descriptive fields add less. Weights
//! sum to 100.

use crate::types::CandidateRecord;

const W_PUBLICATION_NUMBER: f64 = 20.0;
const W_JURISDICTION: f64 = 20.0;
const W_TITLE: f64 = 15.0;
const W_ABSTRACT: f64 = 10.0;
const W_APPLICANT: f64 = 10.0;
const W_FILING_DATE: f64 = 10.0;
const W_INVENTORS: f64 = 5.0;
const W_CLASSIFICATIONS: f64 = 5.0;
const W_PUBLICATION_DATE: f64 = 5.0;

const MAX_SCORE: f64 = 100.0;

/// Completeness score for one record, capped at 100.
pub fn quality_score(record: &CandidateRecord) -> f64 {
    let mut score = 0.0;
    if !record.publication_number.is_empty() {
        score += W_PUBLICATION_NUMBER;
    }
    if !record.jurisdiction.is_empty() {
        score += W_JURISDICTION;
    }
    if !record.title.is_empty() {
        score += W_TITLE;
    }
    if !record.abstract_text.is_empty() {
        score += W_ABSTRACT;
    }
    if !record.applicant.is_empty() {
        score += W_APPLICANT;
    }
    if !record.filing_date.is_empty() {
        score += W_FILING_DATE;
    }
    if !record.inventors.is_empty() {
        score += W_INVENTORS;
    }
    if !record.classifications.is_empty() {
        score += W_CLASSIFICATIONS;
    }
    if !record.publication_date.is_empty() {
        score += W_PUBLICATION_DATE;
    }
    score.min(MAX_SCORE)
}

/// Assign scores and sort best-first. Ties break on publication number so
/// the ordering is deterministic.
pub fn score_and_rank(records: &mut Vec<CandidateRecord>) {
    for record in records.iter_mut() {
        record.quality_score = quality_score(record);
    }
    records.sort_by(|a, b| {
        b.quality_score
            .partial_cmp(&a.quality_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.publication_number.cmp(&b.publication_number))
    });
}
