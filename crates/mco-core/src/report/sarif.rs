//! SARIF 2.1.0 emitter.
//!
//! Emits exactly one run with `tool.driver.name = "MCO"`. Rule ids are
//! content-derived (`mco/<slug>/<hash10>`) so the same category/title pair
//! always maps to the same rule regardless of input order.

use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};

use crate::adapter::NormalizedFinding;

use super::ReportPayload;

const SARIF_SCHEMA: &str = "https://json.schemastore.org/sarif-2.1.0.json";
const SARIF_VERSION: &str = "2.1.0";
const DRIVER_NAME: &str = "MCO";
const DRIVER_INFO_URI: &str = "https://github.com/mco-org/mco";

fn sarif_level(severity: &str) -> &'static str {
    match severity {
        "critical" => "error",
        "high" => "warning",
        _ => "note",
    }
}

/// Collapse non-alphanumeric runs to `-` and trim; empty slugs fall back
/// to `finding`.
fn normalize_rule_name(category: &str, title: &str) -> String {
    let raw = format!("{category}-{title}").trim().to_lowercase();
    let mut slug = String::with_capacity(raw.len());
    let mut pending_dash = false;
    for ch in raw.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch);
        } else {
            pending_dash = true;
        }
    }
    if slug.is_empty() {
        "finding".to_string()
    } else {
        slug
    }
}

fn rule_id_for(category: &str, title: &str) -> String {
    let digest = Sha256::digest(format!("{category}||{title}").as_bytes());
    let suffix = &hex::encode(digest)[..10];
    format!("mco/{}/{suffix}", normalize_rule_name(category, title))
}

/// Render the SARIF document as a JSON value.
pub fn format_sarif(payload: &ReportPayload, findings: &[NormalizedFinding]) -> Value {
    let mut rules: Vec<Value> = Vec::new();
    let mut seen_rule_ids: Vec<String> = Vec::new();
    let mut results: Vec<Value> = Vec::new();

    for finding in findings {
        let category = finding.category.trim().to_lowercase();
        let category = if category.is_empty() {
            "general".to_string()
        } else {
            category
        };
        let title = {
            let trimmed = finding.title.trim();
            if trimmed.is_empty() { "Finding" } else { trimmed }
        };
        let severity = finding.severity.trim().to_lowercase();
        let rule_id = rule_id_for(&category, title);

        if !seen_rule_ids.contains(&rule_id) {
            let mut rule = Map::new();
            rule.insert("id".to_string(), json!(rule_id));
            rule.insert(
                "name".to_string(),
                json!(normalize_rule_name(&category, title)),
            );
            rule.insert("shortDescription".to_string(), json!({ "text": title }));
            rule.insert("properties".to_string(), json!({ "category": category }));
            let recommendation = finding.recommendation.trim();
            if !recommendation.is_empty() {
                rule.insert("help".to_string(), json!({ "text": recommendation }));
            }
            seen_rule_ids.push(rule_id.clone());
            rules.push(Value::Object(rule));
        }

        let mut result = Map::new();
        result.insert("ruleId".to_string(), json!(rule_id));
        result.insert("level".to_string(), json!(sarif_level(&severity)));
        result.insert("message".to_string(), json!({ "text": title }));
        result.insert(
            "properties".to_string(),
            json!({
                "category": category,
                "severity": severity,
                "confidence": finding.confidence.unwrap_or(0.0),
                "detected_by": finding.detected_by,
                "fingerprint": finding.fingerprint.clone().unwrap_or_default(),
            }),
        );

        if let Some(evidence) = &finding.evidence {
            let file = evidence.file.trim();
            if !file.is_empty() {
                let mut region = Map::new();
                if let Some(line) = evidence.line.filter(|line| *line >= 1) {
                    region.insert("startLine".to_string(), json!(line));
                }
                let snippet = evidence.snippet.trim();
                if !snippet.is_empty() {
                    region.insert("snippet".to_string(), json!({ "text": snippet }));
                }
                result.insert(
                    "locations".to_string(),
                    json!([{
                        "physicalLocation": {
                            "artifactLocation": { "uri": file },
                            "region": Value::Object(region),
                        }
                    }]),
                );
            }
        }
        results.push(Value::Object(result));
    }

    json!({
        "$schema": SARIF_SCHEMA,
        "version": SARIF_VERSION,
        "runs": [{
            "tool": {
                "driver": {
                    "name": DRIVER_NAME,
                    "informationUri": DRIVER_INFO_URI,
                    "rules": rules,
                }
            },
            "properties": {
                "decision": payload.decision,
                "terminal_state": payload.terminal_state,
                "findings_count": payload.findings_count,
            },
            "results": results,
        }]
    })
}
