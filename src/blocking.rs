//! Blocking detection: distinguishing an active rejection from an ordinary
//! failure.
//!
//! A target that returns a bot-wall status, a CAPTCHA page, or a Cloudflare
//! challenge is "blocked" rather than merely failing — the distinction drives
//! the fetch engine's strategy-class skip (no point retrying other simple
//! request variants against a source already known to be hardened).

/// HTTP status codes that indicate an active block.
pub const BLOCKED_STATUS_CODES: &[u16] = &[403, 429, 503];

/// Substrings in error text that indicate an active block.
const BLOCKED_ERROR_SIGNATURES: &[&str] = &[
    "403",
    "forbidden",
    "blocked",
    "captcha",
    "cloudflare",
    "too many requests",
    "access denied",
];

/// Markers in a response payload that indicate a block/challenge page was
/// served instead of content (even with a 200 status).
const BLOCKED_PAYLOAD_MARKERS: &[&str] = &[
    "captcha",
    "access denied",
    "cloudflare",
    "unusual traffic",
    "are you a robot",
    "request blocked",
];

/// Whether this status code is a known blocking response.
pub fn is_blocked_status(status: u16) -> bool {
    BLOCKED_STATUS_CODES.contains(&status)
}

/// Whether this error text matches a known blocking signature.
pub fn is_blocked_error(error: &str) -> bool {
    let lower = error.to_lowercase();
    BLOCKED_ERROR_SIGNATURES.iter().any(|sig| lower.contains(sig))
}

/// Whether a payload contains block/challenge markers. Only the first 16 KiB
/// are scanned; challenge pages are small and real content pages can be
/// megabytes.
pub fn payload_has_block_markers(payload: &str) -> bool {
    let head_len = payload
        .char_indices()
        .take_while(|(i, _)| *i < 16 * 1024)
        .last()
        .map_or(0, |(i, c)| i + c.len_utf8());
    let lower = payload[..head_len].to_lowercase();
    BLOCKED_PAYLOAD_MARKERS
        .iter()
        .any(|marker| lower.contains(marker))
}
