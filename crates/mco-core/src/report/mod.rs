//! Review report formatters.
//!
//! Two wire-compatible artifacts are rendered from an aggregated finding
//! list: a PR-oriented Markdown summary and a SARIF 2.1.0 document. Both
//! are deterministic for a given input.

pub mod markdown;
pub mod sarif;

use serde::Serialize;

pub use markdown::format_markdown_pr;
pub use sarif::format_sarif;

/// Severity levels in rank order; unknown severities rank after all of
/// these.
pub(crate) const SEVERITY_ORDER: [&str; 4] = ["critical", "high", "medium", "low"];

pub(crate) fn severity_rank(severity: &str) -> usize {
    SEVERITY_ORDER
        .iter()
        .position(|level| *level == severity)
        .unwrap_or(SEVERITY_ORDER.len())
}

/// Task-level summary fields shared by both formatters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReportPayload {
    pub decision: String,
    pub terminal_state: String,
    pub provider_success_count: usize,
    pub provider_failure_count: usize,
    pub findings_count: usize,
}

/// Output rendering requested on the command line.
///
/// The report formats are a contract of this layer: they are accepted for
/// `review` only, and any other subcommand must reject them with an
/// argument error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    MarkdownPr,
    Sarif,
}

impl OutputFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::MarkdownPr => "markdown-pr",
            Self::Sarif => "sarif",
        }
    }

    /// True for formats only the `review` subcommand may render.
    pub fn requires_review(self) -> bool {
        matches!(self, Self::MarkdownPr | Self::Sarif)
    }

    /// Enforce the format-gating rule for a non-review subcommand.
    pub fn ensure_allowed_outside_review(self) -> Result<(), String> {
        if self.requires_review() {
            Err(format!(
                "--format {} is supported only for review",
                self.as_str()
            ))
        } else {
            Ok(())
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(Self::Json),
            "markdown-pr" => Ok(Self::MarkdownPr),
            "sarif" => Ok(Self::Sarif),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}
