//! Shared findings extraction: tolerant parsing of provider stdout.
//!
//! Providers emit anything from a single pretty-printed JSON object to a
//! JSONL event stream with log noise interleaved. The scan accepts a
//! stream of JSON values, locates top-level `findings` arrays, and coerces
//! each element into [`NormalizedFinding`], dropping (and counting)
//! malformed entries.

use serde_json::Value;
use tracing::debug;

use super::types::{Evidence, NormalizeContext, NormalizedFinding};

/// Parse a raw payload as a stream of JSON values.
///
/// First tries a whitespace-separated stream parse (which covers both a
/// single document and well-formed JSONL); if that yields nothing, falls
/// back to line-by-line parsing so junk lines between JSON lines do not
/// swallow the rest of the stream.
pub(crate) fn parse_json_stream(raw: &str) -> Vec<Value> {
    let mut values: Vec<Value> = Vec::new();
    let mut clean = true;
    for item in serde_json::Deserializer::from_str(raw).into_iter::<Value>() {
        match item {
            Ok(value) => values.push(value),
            Err(_) => {
                clean = false;
                break;
            }
        }
    }
    if clean {
        return values;
    }

    // The stream hit junk partway through. Re-scan line by line and keep
    // whichever reading recovered more values.
    let line_values: Vec<Value> = raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| serde_json::from_str::<Value>(line).ok())
        .collect();
    if line_values.len() > values.len() {
        line_values
    } else {
        values
    }
}

/// Locate `findings` arrays in `values` and coerce their elements.
pub(crate) fn findings_from_values(
    values: &[Value],
    ctx: &mut NormalizeContext,
) -> Vec<NormalizedFinding> {
    let mut out = Vec::new();
    for value in values {
        let Some(entries) = value.get("findings").and_then(Value::as_array) else {
            continue;
        };
        ctx.payload_located = true;
        for entry in entries {
            match coerce_finding(entry, &ctx.provider, out.len()) {
                Some(finding) => out.push(finding),
                None => {
                    ctx.dropped += 1;
                    debug!(
                        provider = %ctx.provider,
                        raw_ref = %ctx.raw_ref,
                        "dropping malformed finding entry"
                    );
                }
            }
        }
    }
    out
}

/// Default normalization: parse the stream, then scan for findings.
pub(crate) fn collect_findings(raw: &str, ctx: &mut NormalizeContext) -> Vec<NormalizedFinding> {
    let values = parse_json_stream(raw);
    findings_from_values(&values, ctx)
}

/// Coerce one raw entry into the common schema.
///
/// Returns `None` (malformed) when the entry is not an object or carries
/// neither a title nor a finding id.
fn coerce_finding(entry: &Value, provider: &str, index: usize) -> Option<NormalizedFinding> {
    let obj = entry.as_object()?;

    let title = string_field(obj, "title");
    let finding_id = string_field(obj, "finding_id");
    if title.is_empty() && finding_id.is_empty() {
        return None;
    }

    let fingerprint = {
        let value = string_field(obj, "fingerprint");
        (!value.is_empty()).then_some(value)
    };
    let finding_id = if finding_id.is_empty() {
        fingerprint
            .clone()
            .unwrap_or_else(|| format!("{provider}-{index}"))
    } else {
        finding_id
    };

    let severity = {
        let value = string_field(obj, "severity").to_lowercase();
        if value.is_empty() { "low".to_string() } else { value }
    };
    let category = {
        let value = string_field(obj, "category").to_lowercase();
        if value.is_empty() {
            "general".to_string()
        } else {
            value
        }
    };

    let evidence = obj.get("evidence").and_then(Value::as_object).map(|ev| {
        Evidence {
            file: ev
                .get("file")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            line: ev
                .get("line")
                .and_then(Value::as_u64)
                .filter(|line| *line >= 1)
                .and_then(|line| u32::try_from(line).ok()),
            snippet: ev
                .get("snippet")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        }
    });

    let confidence = obj
        .get("confidence")
        .and_then(Value::as_f64)
        .map(|c| c.clamp(0.0, 1.0));

    Some(NormalizedFinding {
        provider: provider.to_string(),
        finding_id,
        severity,
        category,
        title,
        evidence,
        recommendation: string_field(obj, "recommendation"),
        confidence,
        fingerprint,
        detected_by: vec![provider.to_string()],
    })
}

fn string_field(obj: &serde_json::Map<String, Value>, key: &str) -> String {
    obj.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn ctx() -> NormalizeContext {
        NormalizeContext::new("task-1", "claude", Path::new("/repo"), "raw/claude.stdout.log")
    }

    const ONE_FINDING: &str = r#"{"findings":[{"finding_id":"f1","severity":"High","category":"Bug","title":"t","evidence":{"file":"a.rs","line":3,"snippet":"x"},"recommendation":"r","confidence":0.9,"fingerprint":"fp1"}]}"#;

    #[test]
    fn single_object_payload() {
        let mut ctx = ctx();
        let findings = collect_findings(ONE_FINDING, &mut ctx);
        assert_eq!(findings.len(), 1);
        assert!(ctx.payload_located);
        assert_eq!(ctx.dropped, 0);

        let f = &findings[0];
        assert_eq!(f.provider, "claude");
        assert_eq!(f.severity, "high");
        assert_eq!(f.category, "bug");
        assert_eq!(f.detected_by, vec!["claude".to_string()]);
        assert_eq!(f.evidence.as_ref().unwrap().line, Some(3));
        assert_eq!(f.fingerprint.as_deref(), Some("fp1"));
    }

    #[test]
    fn jsonl_stream_with_event_lines() {
        let raw = format!("{}\n{}\n", r#"{"type":"turn.completed"}"#, ONE_FINDING);
        let mut ctx = ctx();
        let findings = collect_findings(&raw, &mut ctx);
        assert_eq!(findings.len(), 1);
    }

    #[test]
    fn junk_lines_do_not_swallow_later_payloads() {
        let raw = format!("starting up...\nnot json {{\n{ONE_FINDING}\n");
        let mut ctx = ctx();
        let findings = collect_findings(&raw, &mut ctx);
        assert_eq!(findings.len(), 1);
    }

    #[test]
    fn malformed_entries_dropped_and_counted() {
        let raw = r#"{"findings":[42,{"severity":"low"},{"title":"kept"}]}"#;
        let mut ctx = ctx();
        let findings = collect_findings(raw, &mut ctx);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].title, "kept");
        assert_eq!(ctx.dropped, 2);
    }

    #[test]
    fn unparsable_payload_yields_empty_list() {
        let mut ctx = ctx();
        assert!(collect_findings("complete garbage", &mut ctx).is_empty());
        assert!(collect_findings("", &mut ctx).is_empty());
        assert!(!ctx.payload_located);
    }

    #[test]
    fn junk_between_jsonl_lines_keeps_both_sides() {
        let raw = format!("{}\nnot json\n{}\n", r#"{"type":"started"}"#, ONE_FINDING);
        let mut ctx = ctx();
        let findings = collect_findings(&raw, &mut ctx);
        assert_eq!(findings.len(), 1);
    }

    #[test]
    fn empty_findings_array_counts_as_located() {
        let mut ctx = ctx();
        let findings = collect_findings(r#"{"findings":[]}"#, &mut ctx);
        assert!(findings.is_empty());
        assert!(ctx.payload_located);
    }

    #[test]
    fn defaults_applied_to_sparse_entries() {
        let raw = r#"{"findings":[{"title":"bare"}]}"#;
        let mut ctx = ctx();
        let findings = collect_findings(raw, &mut ctx);
        let f = &findings[0];
        assert_eq!(f.severity, "low");
        assert_eq!(f.category, "general");
        assert_eq!(f.finding_id, "claude-0");
        assert!(f.evidence.is_none());
        assert!(f.confidence.is_none());
        assert!(f.fingerprint.is_none());
    }

    #[test]
    fn confidence_clamped_and_line_zero_discarded() {
        let raw = r#"{"findings":[{"title":"t","confidence":3.5,"evidence":{"file":"a.rs","line":0}}]}"#;
        let mut ctx = ctx();
        let findings = collect_findings(raw, &mut ctx);
        assert_eq!(findings[0].confidence, Some(1.0));
        assert_eq!(findings[0].evidence.as_ref().unwrap().line, None);
    }
}
