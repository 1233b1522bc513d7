//! Marker-based classification of provider stderr.
//!
//! Classification is case-insensitive substring matching against disjoint
//! marker sets; the priority order among sets is part of the contract and
//! must not be reordered: timeout, rate limit, network, auth, fallback.

use crate::types::{ErrorKind, WarningKind};

const TIMEOUT_MARKERS: &[&str] = &["timeout", "timed out", "deadline"];

const RATE_LIMIT_MARKERS: &[&str] = &["rate limit", "429", "too many requests"];

const NETWORK_MARKERS: &[&str] = &[
    "connection reset",
    "temporary failure",
    "dns",
    "econnreset",
    "unreachable",
];

const AUTH_MARKERS: &[&str] = &["unauthorized", "not logged in", "token", "api key"];

/// Markers that surface a warning without affecting the attempt outcome.
const MCP_STARTUP_MARKERS: &[&str] = &["mcp startup", "mcp server", "failed to connect to mcp"];

fn matches_any(text: &str, markers: &[&str]) -> bool {
    markers.iter().any(|marker| text.contains(marker))
}

/// Map a failed attempt's exit code and stderr to an [`ErrorKind`].
///
/// The exit code is carried for future dialects but classification today is
/// purely textual; anything unmatched is a provider error.
pub fn classify_error(_exit_code: Option<i32>, stderr_text: &str) -> ErrorKind {
    let text = stderr_text.to_lowercase();
    if matches_any(&text, TIMEOUT_MARKERS) {
        ErrorKind::RetryableTimeout
    } else if matches_any(&text, RATE_LIMIT_MARKERS) {
        ErrorKind::RetryableRateLimit
    } else if matches_any(&text, NETWORK_MARKERS) {
        ErrorKind::RetryableTransientNetwork
    } else if matches_any(&text, AUTH_MARKERS) {
        ErrorKind::NonRetryableAuth
    } else {
        ErrorKind::NonRetryableProviderError
    }
}

/// Extract warning kinds from stderr; duplicates are collapsed.
pub fn detect_warnings(stderr_text: &str) -> Vec<WarningKind> {
    let text = stderr_text.to_lowercase();
    let mut warnings = Vec::new();
    if matches_any(&text, MCP_STARTUP_MARKERS) {
        warnings.push(WarningKind::ProviderWarningMcpStartup);
    }
    warnings
}
