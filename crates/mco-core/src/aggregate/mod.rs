//! Cross-provider finding aggregation.
//!
//! Findings sharing a fingerprint are merged into one entry: `detected_by`
//! becomes the union, confidence takes the maximum, title/recommendation
//! keep the earliest value by provider declaration order, and the first
//! non-empty evidence wins. Fingerprint-less findings pass through
//! unmerged.

use std::collections::HashMap;

use crate::adapter::NormalizedFinding;

/// Merge per-provider finding lists, given in provider declaration order.
pub fn merge_findings(per_provider: Vec<Vec<NormalizedFinding>>) -> Vec<NormalizedFinding> {
    let mut merged: Vec<NormalizedFinding> = Vec::new();
    let mut index_by_fingerprint: HashMap<String, usize> = HashMap::new();

    for finding in per_provider.into_iter().flatten() {
        let Some(fingerprint) = finding.fingerprint.clone() else {
            merged.push(finding);
            continue;
        };
        match index_by_fingerprint.get(&fingerprint) {
            None => {
                index_by_fingerprint.insert(fingerprint, merged.len());
                merged.push(finding);
            }
            Some(&index) => merge_into(&mut merged[index], finding),
        }
    }
    merged
}

/// Fold `incoming` into an existing entry with the same fingerprint.
fn merge_into(existing: &mut NormalizedFinding, incoming: NormalizedFinding) {
    for provider in incoming.detected_by {
        if !existing.detected_by.contains(&provider) {
            existing.detected_by.push(provider);
        }
    }

    existing.confidence = match (existing.confidence, incoming.confidence) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    };

    let existing_has_evidence = existing
        .evidence
        .as_ref()
        .is_some_and(|ev| !ev.is_empty());
    let incoming_has_evidence = incoming
        .evidence
        .as_ref()
        .is_some_and(|ev| !ev.is_empty());
    if !existing_has_evidence && incoming_has_evidence {
        existing.evidence = incoming.evidence;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::Evidence;

    fn finding(provider: &str, fingerprint: Option<&str>, confidence: f64) -> NormalizedFinding {
        NormalizedFinding {
            provider: provider.to_string(),
            finding_id: format!("{provider}-1"),
            severity: "high".to_string(),
            category: "bug".to_string(),
            title: format!("{provider} title"),
            evidence: None,
            recommendation: format!("{provider} rec"),
            confidence: Some(confidence),
            fingerprint: fingerprint.map(String::from),
            detected_by: vec![provider.to_string()],
        }
    }

    #[test]
    fn shared_fingerprint_merges() {
        let merged = merge_findings(vec![
            vec![finding("claude", Some("fp"), 0.6)],
            vec![finding("qwen", Some("fp"), 0.9)],
        ]);
        assert_eq!(merged.len(), 1);
        let f = &merged[0];
        assert_eq!(f.detected_by, vec!["claude".to_string(), "qwen".to_string()]);
        assert_eq!(f.confidence, Some(0.9));
        // Earliest provider's wording wins.
        assert_eq!(f.title, "claude title");
        assert_eq!(f.recommendation, "claude rec");
    }

    #[test]
    fn distinct_fingerprints_stay_separate() {
        let merged = merge_findings(vec![
            vec![finding("claude", Some("fp-a"), 0.5)],
            vec![finding("codex", Some("fp-b"), 0.5)],
        ]);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn fingerprint_less_findings_are_kept_unmerged() {
        let merged = merge_findings(vec![
            vec![finding("claude", None, 0.5)],
            vec![finding("codex", None, 0.5)],
        ]);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn first_non_empty_evidence_wins() {
        let mut early = finding("claude", Some("fp"), 0.5);
        early.evidence = Some(Evidence::default());
        let mut late = finding("codex", Some("fp"), 0.5);
        late.evidence = Some(Evidence {
            file: "src/lib.rs".to_string(),
            line: Some(10),
            snippet: "x".to_string(),
        });

        let merged = merge_findings(vec![vec![early], vec![late]]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].evidence.as_ref().unwrap().file, "src/lib.rs");

        // Once evidence is present it is not replaced by later providers.
        let mut first = finding("claude", Some("fp"), 0.5);
        first.evidence = Some(Evidence {
            file: "a.rs".to_string(),
            line: None,
            snippet: String::new(),
        });
        let mut second = finding("codex", Some("fp"), 0.5);
        second.evidence = Some(Evidence {
            file: "b.rs".to_string(),
            line: None,
            snippet: String::new(),
        });
        let merged = merge_findings(vec![vec![first], vec![second]]);
        assert_eq!(merged[0].evidence.as_ref().unwrap().file, "a.rs");
    }

    #[test]
    fn duplicate_detections_by_same_provider_collapse() {
        let merged = merge_findings(vec![vec![
            finding("claude", Some("fp"), 0.5),
            finding("claude", Some("fp"), 0.7),
        ]]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].detected_by, vec!["claude".to_string()]);
        assert_eq!(merged[0].confidence, Some(0.7));
    }
}
