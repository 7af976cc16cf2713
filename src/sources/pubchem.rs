//! PubChem identifier resolution.
//!
//! Resolves a molecule name into its CAS registry number and development
//! codes by listing PubChem synonyms. Runs first: the identifiers it finds
//! widen every downstream source query.

use std::sync::Arc;

use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::error::SearchError;
use crate::fetch_engine::FetchEngine;
use crate::types::MoleculeIdentifiers;

const BASE_URL: &str = "https://pubchem.ncbi.nlm.nih.gov/rest/pug";

/// Synonym lists routinely run to thousands of entries; keep a useful head.
const MAX_SYNONYMS: usize = 25;
const MAX_DEV_CODES: usize = 10;

#[derive(Debug, Deserialize)]
struct SynonymResponse {
    #[serde(rename = "InformationList")]
    information_list: InformationList,
}

#[derive(Debug, Deserialize)]
struct InformationList {
    #[serde(rename = "Information")]
    information: Vec<Information>,
}

#[derive(Debug, Deserialize)]
struct Information {
    #[serde(rename = "Synonym", default)]
    synonyms: Vec<String>,
}

/// PubChem compound synonym adapter.
pub struct PubChemSource {
    engine: Arc<FetchEngine>,
}

impl PubChemSource {
    pub fn new(engine: Arc<FetchEngine>) -> Self {
        Self { engine }
    }

    /// Resolve `molecule` into identifiers via the compound synonym listing.
    pub async fn resolve(
        &self,
        molecule: &str,
        cancel: &CancellationToken,
    ) -> Result<MoleculeIdentifiers, SearchError> {
        let url = synonyms_url(molecule)?;
        let result = self.engine.fetch(&url, None, cancel).await;
        let body = result.body.ok_or_else(|| {
            SearchError::Transient(
                result
                    .error
                    .unwrap_or_else(|| "empty response from PubChem".into()),
            )
        })?;

        let identifiers = parse_synonyms(molecule, &body)?;
        tracing::info!(
            molecule,
            cas = identifiers.cas_number.as_deref().unwrap_or("-"),
            dev_codes = identifiers.dev_codes.len(),
            "resolved identifiers"
        );
        Ok(identifiers)
    }
}

fn synonyms_url(molecule: &str) -> Result<String, SearchError> {
    let mut url = url::Url::parse(BASE_URL)
        .map_err(|e| SearchError::Config(format!("bad PubChem base url: {e}")))?;
    url.path_segments_mut()
        .map_err(|_| SearchError::Config("PubChem base url cannot be a base".into()))?
        .extend(["compound", "name", molecule, "synonyms", "JSON"]);
    Ok(url.to_string())
}

/// Pick CAS number and development codes out of a synonym response body.
fn parse_synonyms(molecule: &str, body: &str) -> Result<MoleculeIdentifiers, SearchError> {
    let response: SynonymResponse = serde_json::from_str(body)
        .map_err(|e| SearchError::Parse(format!("PubChem synonyms: {e}")))?;
    let synonyms: Vec<String> = response
        .information_list
        .information
        .into_iter()
        .flat_map(|info| info.synonyms)
        .collect();

    let cas_number = synonyms.iter().find(|s| is_cas_number(s)).cloned();
    let mut dev_codes: Vec<String> = Vec::new();
    for synonym in &synonyms {
        if dev_codes.len() >= MAX_DEV_CODES {
            break;
        }
        if is_dev_code(synonym) {
            let code = synonym.to_uppercase();
            if !dev_codes.contains(&code) {
                dev_codes.push(code);
            }
        }
    }

    Ok(MoleculeIdentifiers {
        name: molecule.to_string(),
        cas_number,
        dev_codes,
        synonyms: synonyms.into_iter().take(MAX_SYNONYMS).collect(),
    })
}

/// CAS registry number: 2–7 digits, 2 digits, check digit, dash-separated,
/// with a valid checksum (reversed digits weighted 1..n, mod 10).
pub fn is_cas_number(text: &str) -> bool {
    let text = text.trim();
    let mut parts = text.split('-');
    let (Some(first), Some(second), Some(third), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return false;
    };
    let all_digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    if !(all_digits(first) && all_digits(second) && all_digits(third)) {
        return false;
    }
    if !(2..=7).contains(&first.len()) || second.len() != 2 || third.len() != 1 {
        return false;
    }

    let check = u32::from(third.as_bytes()[0] - b'0');
    let sum: u32 = first
        .bytes()
        .chain(second.bytes())
        .rev()
        .enumerate()
        .map(|(i, b)| (i as u32 + 1) * u32::from(b - b'0'))
        .sum();
    sum % 10 == check
}

/// Development code: 2–5 letters, a dash or space, then 2–8 digits.
/// Matches the shape of codes like `ODM-201` or `BAY 1841788`.
pub fn is_dev_code(text: &str) -> bool {
    let text = text.trim();
    let Some(sep) = text.find(['-', ' ']) else {
        return false;
    };
    let (prefix, rest) = text.split_at(sep);
    let digits = &rest[1..];
    (2..=5).contains(&prefix.len())
        && prefix.bytes().all(|b| b.is_ascii_alphabetic())
        && (2..=8).contains(&digits.len())
        && digits.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cas_number_with_valid_checksum() {
        assert!(is_cas_number("1297538-32-9")); // darolutamide
        assert!(is_cas_number("7732-18-5")); // water
    }

    #[test]
    fn cas_number_with_bad_checksum_rejected() {
        assert!(!is_cas_number("1234-56-7"));
    }

    #[test]
    fn cas_number_malformed_rejected() {
        assert!(!is_cas_number("not-a-cas"));
        assert!(!is_cas_number("1297538-32"));
        assert!(!is_cas_number("1-23-4"));
        assert!(!is_cas_number(""));
    }

    #[test]
    fn dev_code_shapes() {
        assert!(is_dev_code("ODM-201"));
        assert!(is_dev_code("BAY-1841788"));
        assert!(is_dev_code("BAY 1841788"));
        assert!(!is_dev_code("darolutamide"));
        assert!(!is_dev_code("NUBEQA")); // no digits
        assert!(!is_dev_code("A-1")); // prefix and digits too short
        assert!(!is_dev_code("7732-18-5")); // CAS shape, not a dev code
    }

    #[test]
    fn synonyms_url_encodes_name() {
        let url = synonyms_url("some molecule").expect("url");
        assert!(url.contains("/compound/name/some%20molecule/synonyms/JSON"));
    }

    #[test]
    fn parse_synonyms_extracts_cas_and_dev_codes() {
        let body = r#"{
            "InformationList": {
                "Information": [{
                    "CID": 67171867,
                    "Synonym": [
                        "darolutamide",
                        "1297538-32-9",
                        "ODM-201",
                        "BAY-1841788",
                        "odm-201",
                        "Nubeqa"
                    ]
                }]
            }
        }"#;
        let identifiers = parse_synonyms("darolutamide", body).expect("parse");
        assert_eq!(identifiers.cas_number.as_deref(), Some("1297538-32-9"));
        assert_eq!(identifiers.dev_codes, vec!["ODM-201", "BAY-1841788"]);
        assert_eq!(identifiers.name, "darolutamide");
        assert!(identifiers.synonyms.contains(&"Nubeqa".to_string()));
    }

    #[test]
    fn parse_synonyms_rejects_non_json() {
        let err = parse_synonyms("x", "<html>blocked</html>").unwrap_err();
        assert!(matches!(err, SearchError::Parse(_)));
    }
}
