//! PR-oriented Markdown summary.
//!
//! Deterministic layout: fixed header, summary list, severity breakdown
//! table in rank order, then a findings table sorted by
//! (severity rank, location, title). Every cell is escaped so provider
//! text cannot break the table.

use crate::adapter::NormalizedFinding;

use super::{severity_rank, ReportPayload, SEVERITY_ORDER};

/// Escape a table cell: `\` -> `\\`, `|` -> `\|`, newline -> `<br>`.
fn escape_cell(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('|', "\\|")
        .replace('\n', "<br>")
}

/// Render a finding's location as `file:line`, `file`, or `-`.
fn finding_location(finding: &NormalizedFinding) -> String {
    let Some(evidence) = &finding.evidence else {
        return "-".to_string();
    };
    let file = evidence.file.trim();
    if file.is_empty() {
        return "-".to_string();
    }
    match evidence.line {
        Some(line) if line >= 1 => format!("{file}:{line}"),
        _ => file.to_string(),
    }
}

/// Render the Markdown-PR report.
pub fn format_markdown_pr(payload: &ReportPayload, findings: &[NormalizedFinding]) -> String {
    let mut counts = [0usize; SEVERITY_ORDER.len()];
    for finding in findings {
        let rank = severity_rank(&finding.severity.to_lowercase());
        if rank < counts.len() {
            counts[rank] += 1;
        }
    }

    let mut lines: Vec<String> = vec![
        "## MCO Review Summary".to_string(),
        String::new(),
        format!("- Decision: **{}**", payload.decision),
        format!("- Terminal State: `{}`", payload.terminal_state),
        format!(
            "- Providers: success `{}` / failure `{}`",
            payload.provider_success_count, payload.provider_failure_count
        ),
        format!("- Findings: `{}`", payload.findings_count),
        String::new(),
        "### Severity Breakdown".to_string(),
        String::new(),
        "| Severity | Count |".to_string(),
        "|---|---:|".to_string(),
    ];
    for (level, count) in SEVERITY_ORDER.iter().zip(counts) {
        lines.push(format!("| `{level}` | {count} |"));
    }

    lines.push(String::new());
    lines.push("### Findings".to_string());
    lines.push(String::new());
    if findings.is_empty() {
        lines.push("_No findings reported._".to_string());
        return lines.join("\n");
    }

    lines.push(
        "| Severity | Category | Title | Location | Confidence | Recommendation |".to_string(),
    );
    lines.push("|---|---|---|---|---:|---|".to_string());

    let mut ordered: Vec<&NormalizedFinding> = findings.iter().collect();
    ordered.sort_by_key(|finding| {
        (
            severity_rank(&finding.severity.to_lowercase()),
            finding_location(finding),
            finding.title.clone(),
        )
    });

    for finding in ordered {
        let confidence = match finding.confidence {
            Some(value) => format!("{value:.2}"),
            None => "-".to_string(),
        };
        lines.push(format!(
            "| `{}` | {} | {} | `{}` | {} | {} |",
            escape_cell(&finding.severity.to_lowercase()),
            escape_cell(&finding.category),
            escape_cell(&finding.title),
            escape_cell(&finding_location(finding)),
            confidence,
            escape_cell(&finding.recommendation),
        ));
    }
    lines.join("\n")
}
