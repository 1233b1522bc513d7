//! Codex CLI adapter spec.
//!
//! Runs `codex exec --json`. Codex exits non-zero when its review turns up
//! findings, so the success predicate accepts any exit as long as a
//! findings payload is present on stdout or stderr.

use std::path::Path;

use super::spec::ProviderSpec;
use super::types::{CapabilitySet, TaskInput};

/// Marker that a findings payload is present in captured output.
const FINDINGS_MARKER: &str = "\"findings\"";

#[derive(Debug, Default)]
pub struct CodexSpec;

impl ProviderSpec for CodexSpec {
    fn provider_id(&self) -> &'static str {
        "codex"
    }

    fn binary_name(&self) -> &'static str {
        "codex"
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet {
            output_schema: true,
            session_resume: true,
            mcp_servers: true,
        }
    }

    fn build_command(&self, input: &TaskInput) -> Vec<String> {
        let mut cmd = vec![
            self.binary_name().to_string(),
            "exec".to_string(),
            "--json".to_string(),
            "--skip-git-repo-check".to_string(),
        ];
        if let Some(schema_path) = &input.metadata.output_schema_path {
            cmd.push("--output-schema".to_string());
            cmd.push(schema_path.to_string_lossy().into_owned());
        }
        cmd.push(input.prompt.clone());
        cmd
    }

    fn auth_check_command(&self, binary: &Path) -> Vec<String> {
        vec![
            binary.to_string_lossy().into_owned(),
            "login".to_string(),
            "status".to_string(),
        ]
    }

    fn is_success(&self, exit_code: Option<i32>, stdout: &str, stderr: &str) -> bool {
        exit_code == Some(0)
            || stdout.contains(FINDINGS_MARKER)
            || stderr.contains(FINDINGS_MARKER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input_with_schema(schema: Option<&str>) -> TaskInput {
        let mut metadata = crate::adapter::types::TaskMetadata::default();
        metadata.output_schema_path = schema.map(Into::into);
        TaskInput {
            task_id: "t1".to_string(),
            prompt: "review".to_string(),
            repo_root: "/repo".into(),
            target_paths: vec![".".to_string()],
            metadata,
        }
    }

    #[test]
    fn command_includes_output_schema_when_provided() {
        let cmd = CodexSpec.build_command(&input_with_schema(Some("/tmp/review.schema.json")));
        assert!(cmd.contains(&"--output-schema".to_string()));
        assert!(cmd.contains(&"/tmp/review.schema.json".to_string()));
    }

    #[test]
    fn command_omits_output_schema_by_default() {
        let cmd = CodexSpec.build_command(&input_with_schema(None));
        assert!(!cmd.contains(&"--output-schema".to_string()));
    }

    #[test]
    fn non_zero_exit_with_findings_counts_as_success() {
        let spec = CodexSpec;
        assert!(spec.is_success(Some(1), r#"{"findings":[]}"#, ""));
        assert!(spec.is_success(Some(1), "", r#"{"findings":[{"title":"x"}]}"#));
        assert!(spec.is_success(Some(0), "", ""));
        assert!(!spec.is_success(Some(1), "no payload here", "plain error"));
        assert!(!spec.is_success(None, "", ""));
    }
}
