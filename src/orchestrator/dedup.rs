//! Cross-source record deduplication.
//!
//! Different sources format the same publication number differently — with
//! spaces, dashes, slashes, or lowercase — so records are keyed on a
//! normalized form. On a collision the more complete record survives; first
//! seen wins a tie, so source ordering is stable.

use std::collections::HashMap;

use crate::types::CandidateRecord;

/// Normalize a publication number into a dedup key: uppercase with every
/// non-alphanumeric character removed, and the INPI check digit stripped
/// from BR numbers. `"br 11 2012 008823 8 b8"` and `"BR112012008823B8"`
/// share a key.
pub fn normalize_key(publication_number: &str) -> String {
    let compact: String = publication_number
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect();
    strip_br_check_digit(&compact).unwrap_or(compact)
}

/// INPI process numbers carry a check digit between the 12-digit
/// application number and the kind code ("BR 11 2012 008823 **8** B8");
/// the published form omits it. Drop that digit so both spellings of the
/// same patent key identically. Applies only to the exact BR shape —
/// 13 digits followed by a kind code — so WO and legacy numbers pass
/// through untouched.
fn strip_br_check_digit(compact: &str) -> Option<String> {
    let rest = compact.strip_prefix("BR")?;
    let digit_run = rest.chars().take_while(char::is_ascii_digit).count();
    if digit_run != 13 {
        return None;
    }
    let kind = &rest[digit_run..];
    if !kind.starts_with(|c: char| c.is_ascii_alphabetic()) {
        return None;
    }
    Some(format!("BR{}{kind}", &rest[..12]))
}

/// Deduplicate records by normalized publication number, preserving
/// first-seen order.
pub fn dedup_records(records: Vec<CandidateRecord>) -> Vec<CandidateRecord> {
    let mut kept: Vec<CandidateRecord> = Vec::with_capacity(records.len());
    let mut index_by_key: HashMap<String, usize> = HashMap::new();

    for record in records {
        let key = normalize_key(&record.publication_number);
        if key.is_empty() {
            continue;
        }
        match index_by_key.get(&key) {
            None => {
                index_by_key.insert(key, kept.len());
                kept.push(record);
            }
            Some(&i) => {
                if record.completeness() > kept[i].completeness() {
                    kept[i] = record;
                }
            }
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Source;

    #[test]
    fn normalize_strips_separators_and_uppercases() {
        assert_eq!(normalize_key("BR-112012-008823/B8"), "BR112012008823B8");
        assert_eq!(normalize_key("WO 2011/051540"), "WO2011051540");
    }

    #[test]
    fn normalize_drops_inpi_check_digit() {
        // The process-number spelling carries the check digit; the
        // published spelling does not. Both must key identically.
        assert_eq!(
            normalize_key("br 11 2012 008823 8 b8"),
            normalize_key("BR112012008823B8")
        );
        assert_eq!(normalize_key("BR 11 2016 007690 2 A2"), "BR112016007690A2");
    }

    #[test]
    fn normalize_leaves_non_br_shapes_alone() {
        // No kind code after the digits: not the check-digit shape.
        assert_eq!(normalize_key("BR1120120088238"), "BR1120120088238");
        // Twelve digits plus kind is already the published form.
        assert_eq!(normalize_key("BR102020000001A2"), "BR102020000001A2");
        assert_eq!(normalize_key("WO2011051540"), "WO2011051540");
        assert_eq!(normalize_key("NCT02200614"), "NCT02200614");
    }

    #[test]
    fn check_digit_variant_collapses_with_published_form() {
        let records = vec![
            CandidateRecord::patent("BR112012008823B8", "BR", Source::Registry),
            CandidateRecord::patent("br 11 2012 008823 8 b8", "BR", Source::Espacenet),
        ];
        let deduped = dedup_records(records);
        assert_eq!(deduped.len(), 1);
    }

    #[test]
    fn formatting_variants_collapse_to_one_record() {
        let records = vec![
            CandidateRecord::patent("BR112012008823B8", "BR", Source::Espacenet),
            CandidateRecord::patent("br 112012 008823 b8", "BR", Source::Registry),
        ];
        let deduped = dedup_records(records);
        assert_eq!(deduped.len(), 1);
    }

    #[test]
    fn collision_keeps_more_complete_record() {
        let sparse = CandidateRecord::patent("BR112012008823B8", "BR", Source::Espacenet);
        let mut rich = CandidateRecord::patent("br112012008823b8", "BR", Source::Registry);
        rich.title = "Androgen receptor modulating compounds".into();
        rich.applicant = "Orion Corporation".into();

        let deduped = dedup_records(vec![sparse, rich]);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].source, Source::Registry);
        assert!(!deduped[0].title.is_empty());
    }

    #[test]
    fn tie_keeps_first_seen() {
        let first = CandidateRecord::patent("WO2011051540", "WO", Source::GooglePatents);
        let second = CandidateRecord::patent("wo 2011/051540", "WO", Source::Espacenet);
        let deduped = dedup_records(vec![first, second]);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].source, Source::GooglePatents);
    }

    #[test]
    fn distinct_numbers_all_kept_in_order() {
        let records = vec![
            CandidateRecord::patent("WO2011051540", "WO", Source::GooglePatents),
            CandidateRecord::patent("BR112012008823B8", "BR", Source::Registry),
            CandidateRecord::patent("NCT02200614", "", Source::ClinicalTrials),
        ];
        let deduped = dedup_records(records);
        assert_eq!(deduped.len(), 3);
        assert_eq!(deduped[0].publication_number, "WO2011051540");
        assert_eq!(deduped[2].publication_number, "NCT02200614");
    }

    #[test]
    fn empty_numbers_dropped() {
        let records = vec![CandidateRecord::patent("", "BR", Source::Registry)];
        assert!(dedup_records(records).is_empty());
    }
}
