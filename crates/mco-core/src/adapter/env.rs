//! Child process environment sanitization.
//!
//! Provider CLIs change behavior when they detect they are being driven by
//! another agent runtime; the variables below are stripped from every child
//! environment (runs and probes alike) so providers behave as if invoked
//! directly. PATH is always preserved.

use std::collections::HashMap;

/// Closed list of variables removed from every child environment.
pub const STRIPPED_ENV_VARS: &[&str] = &["CLAUDECODE"];

/// Copy of the ambient environment with [`STRIPPED_ENV_VARS`] removed.
pub fn sanitized_env() -> HashMap<String, String> {
    sanitize(std::env::vars())
}

/// Pure form of [`sanitized_env`], for callers that already hold a
/// variable snapshot.
pub fn sanitize(vars: impl Iterator<Item = (String, String)>) -> HashMap<String, String> {
    vars.filter(|(key, _)| !STRIPPED_ENV_VARS.contains(&key.as_str()))
        .collect()
}
