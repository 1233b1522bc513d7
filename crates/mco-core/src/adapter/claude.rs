//! Claude Code adapter spec.
//!
//! Runs `claude -p` in stream-json mode. Findings usually arrive embedded
//! in the final `result` event as a JSON string, so normalization unwraps
//! those events and re-parses the embedded text before the shared scan.

use std::path::Path;

use serde_json::Value;

use super::findings;
use super::spec::ProviderSpec;
use super::types::{CapabilitySet, NormalizeContext, NormalizedFinding, TaskInput};

#[derive(Debug, Default)]
pub struct ClaudeSpec;

impl ProviderSpec for ClaudeSpec {
    fn provider_id(&self) -> &'static str {
        "claude"
    }

    fn binary_name(&self) -> &'static str {
        "claude"
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet {
            output_schema: false,
            session_resume: true,
            mcp_servers: true,
        }
    }

    fn build_command(&self, input: &TaskInput) -> Vec<String> {
        vec![
            self.binary_name().to_string(),
            "-p".to_string(),
            input.prompt.clone(),
            "--output-format".to_string(),
            "stream-json".to_string(),
            "--verbose".to_string(),
        ]
    }

    fn auth_check_command(&self, binary: &Path) -> Vec<String> {
        vec![
            binary.to_string_lossy().into_owned(),
            "auth".to_string(),
            "status".to_string(),
        ]
    }

    fn normalize(&self, raw: &str, ctx: &mut NormalizeContext) -> Vec<NormalizedFinding> {
        let mut values = findings::parse_json_stream(raw);

        // Final `result` events carry assistant text that itself may be the
        // findings document.
        let embedded: Vec<Value> = values
            .iter()
            .filter(|value| value.get("type").and_then(Value::as_str) == Some("result"))
            .filter_map(|value| value.get("result").and_then(Value::as_str))
            .flat_map(findings::parse_json_stream)
            .collect();
        values.extend(embedded);

        findings::findings_from_values(&values, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> NormalizeContext {
        NormalizeContext::new("t", "claude", Path::new("/repo"), "raw/claude.stdout.log")
    }

    #[test]
    fn command_shape() {
        let input = TaskInput {
            task_id: "t1".to_string(),
            prompt: "review this".to_string(),
            repo_root: "/repo".into(),
            target_paths: vec![".".to_string()],
            metadata: Default::default(),
        };
        let cmd = ClaudeSpec.build_command(&input);
        assert_eq!(cmd[0], "claude");
        assert!(cmd.contains(&"review this".to_string()));
        assert!(cmd.contains(&"stream-json".to_string()));
    }

    #[test]
    fn normalize_unwraps_result_events() {
        let raw = concat!(
            r#"{"type":"assistant","message":{"content":[{"type":"text","text":"looking"}]}}"#,
            "\n",
            r#"{"type":"result","result":"{\"findings\":[{\"finding_id\":\"f1\",\"severity\":\"high\",\"category\":\"bug\",\"title\":\"t\",\"fingerprint\":\"fp\"}]}"}"#,
            "\n",
        );
        let mut ctx = ctx();
        let found = ClaudeSpec.normalize(raw, &mut ctx);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].provider, "claude");
        assert_eq!(found[0].fingerprint.as_deref(), Some("fp"));
    }

    #[test]
    fn normalize_still_accepts_plain_payload() {
        let raw = r#"{"findings":[{"title":"direct"}]}"#;
        let mut ctx = ctx();
        let found = ClaudeSpec.normalize(raw, &mut ctx);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].title, "direct");
    }
}
