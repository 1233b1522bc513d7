//! Shared vocabulary: error kinds, warning kinds, and attempt states.
//!
//! [`ErrorKind`] is a closed set; the orchestrator's retry gate consults
//! [`ErrorKind::is_retryable`] and nothing else.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Classified failure cause for one provider attempt.
///
/// Exactly the three `Retryable*` kinds are eligible for retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    RetryableTimeout,
    RetryableRateLimit,
    RetryableTransientNetwork,
    NonRetryableAuth,
    NonRetryableInvalidInput,
    NonRetryableProviderError,
    NormalizationError,
}

impl ErrorKind {
    /// Whether the orchestrator may spend retry budget on this kind.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::RetryableTimeout | Self::RetryableRateLimit | Self::RetryableTransientNetwork
        )
    }

    /// Wire string, as written into provider result JSON.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RetryableTimeout => "RETRYABLE_TIMEOUT",
            Self::RetryableRateLimit => "RETRYABLE_RATE_LIMIT",
            Self::RetryableTransientNetwork => "RETRYABLE_TRANSIENT_NETWORK",
            Self::NonRetryableAuth => "NON_RETRYABLE_AUTH",
            Self::NonRetryableInvalidInput => "NON_RETRYABLE_INVALID_INPUT",
            Self::NonRetryableProviderError => "NON_RETRYABLE_PROVIDER_ERROR",
            Self::NormalizationError => "NORMALIZATION_ERROR",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Non-fatal provider-side conditions surfaced for visibility.
///
/// Warnings never promote to errors; they ride along on attempt and run
/// results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WarningKind {
    ProviderWarningMcpStartup,
}

impl WarningKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ProviderWarningMcpStartup => "PROVIDER_WARNING_MCP_STARTUP",
        }
    }
}

impl fmt::Display for WarningKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WarningKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PROVIDER_WARNING_MCP_STARTUP" => Ok(Self::ProviderWarningMcpStartup),
            other => Err(format!("unknown warning kind: {other}")),
        }
    }
}

/// Observable state of one provider run, as reported by `poll()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttemptState {
    Started,
    Succeeded,
    Failed,
    Expired,
}

impl AttemptState {
    /// Terminal attempt states have no further `poll()` updates.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Started)
    }
}

impl fmt::Display for AttemptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Started => "STARTED",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
            Self::Expired => "EXPIRED",
        };
        f.write_str(s)
    }
}
