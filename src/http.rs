//! HTTP client construction with browser-like header profiles.
//!
//! Provides configured [`reqwest::Client`] instances for the fetch
//! strategies: a plain client with a stable library User-Agent, a
//! fingerprint-randomized client that imitates a real browser on a random
//! device, and a hardened profile with the full `Sec-Fetch-*` header set for
//! targets behind anti-bot filtering.

use std::time::Duration;

use rand::seq::SliceRandom;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use crate::error::SearchError;

/// Stable User-Agent used by the plain strategy. Deliberately honest; some
/// APIs (PubChem, ClinicalTrials.gov) prefer identifiable clients.
pub const PLAIN_USER_AGENT: &str = concat!("patent-scout/", env!("CARGO_PKG_VERSION"));

/// Realistic browser User-Agent strings, rotated per request.
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:133.0) Gecko/20100101 Firefox/133.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:133.0) Gecko/20100101 Firefox/133.0",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1",
];

/// Select a random User-Agent string from the rotation list.
pub fn random_user_agent() -> &'static str {
    let mut rng = rand::thread_rng();
    USER_AGENTS
        .choose(&mut rng)
        .copied()
        .unwrap_or(USER_AGENTS[0])
}

/// Common browser headers sent by the fingerprint-randomized strategy.
fn browser_headers() -> Vec<(&'static str, &'static str)> {
    vec![
        (
            "Accept",
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
        ),
        ("Accept-Language", "en-US,en;q=0.9"),
        ("Upgrade-Insecure-Requests", "1"),
    ]
}

/// Extra headers layered on by the anti-bot profile.
fn stealth_headers() -> Vec<(&'static str, &'static str)> {
    vec![
        ("Sec-Fetch-Dest", "document"),
        ("Sec-Fetch-Mode", "navigate"),
        ("Sec-Fetch-Site", "none"),
        ("Sec-Fetch-User", "?1"),
        ("Cache-Control", "max-age=0"),
        ("DNT", "1"),
    ]
}

fn header_map(pairs: &[(&str, &str)]) -> Result<HeaderMap, SearchError> {
    let mut map = HeaderMap::new();
    for (name, value) in pairs {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| SearchError::Config(format!("invalid header name: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| SearchError::Config(format!("invalid header value: {e}")))?;
        map.insert(name, value);
    }
    Ok(map)
}

/// Build the client used by the plain strategy.
pub fn plain_client(timeout_seconds: u64, user_agent: Option<&str>) -> Result<reqwest::Client, SearchError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_seconds))
        .user_agent(user_agent.unwrap_or(PLAIN_USER_AGENT))
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .map_err(|e| SearchError::Transient(format!("failed to build HTTP client: {e}")))
}

/// Build the fingerprint-randomized client: random browser User-Agent and
/// standard navigation headers.
pub fn browser_client(timeout_seconds: u64, user_agent: Option<&str>) -> Result<reqwest::Client, SearchError> {
    let ua = user_agent.map(str::to_owned).unwrap_or_else(|| random_user_agent().to_owned());
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_seconds))
        .user_agent(ua)
        .default_headers(header_map(&browser_headers())?)
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .map_err(|e| SearchError::Transient(format!("failed to build HTTP client: {e}")))
}

/// Build the anti-bot client: browser fingerprint plus cookie store and the
/// full `Sec-Fetch-*` set, for targets that interrogate request metadata.
pub fn stealth_client(timeout_seconds: u64, user_agent: Option<&str>) -> Result<reqwest::Client, SearchError> {
    let ua = user_agent.map(str::to_owned).unwrap_or_else(|| random_user_agent().to_owned());
    let mut headers = browser_headers();
    headers.extend(stealth_headers());
    reqwest::Client::builder()
        .cookie_store(true)
        .timeout(Duration::from_secs(timeout_seconds))
        .user_agent(ua)
        .default_headers(header_map(&headers)?)
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .map_err(|e| SearchError::Transient(format!("failed to build HTTP client: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_user_agent_is_from_rotation_list() {
        let ua = random_user_agent();
        assert!(USER_AGENTS.contains(&ua));
        assert!(ua.contains("Mozilla/5.0"));
    }

    #[test]
    fn plain_user_agent_names_the_crate() {
        assert!(PLAIN_USER_AGENT.starts_with("patent-scout/"));
    }

    #[test]
    fn plain_client_builds() {
        assert!(plain_client(10, None).is_ok());
    }

    #[test]
    fn browser_client_builds() {
        assert!(browser_client(10, None).is_ok());
    }

    #[test]
    fn stealth_client_builds() {
        assert!(stealth_client(10, None).is_ok());
    }

    #[test]
    fn custom_user_agent_accepted() {
        assert!(plain_client(10, Some("TestBot/1.0")).is_ok());
        assert!(browser_client(10, Some("TestBot/1.0")).is_ok());
    }

    #[test]
    fn header_map_builds_from_profiles() {
        let map = header_map(&browser_headers()).expect("valid headers");
        assert!(map.contains_key("accept-language"));
        let mut all = browser_headers();
        all.extend(stealth_headers());
        let map = header_map(&all).expect("valid headers");
        assert!(map.contains_key("sec-fetch-mode"));
    }
}
