//! Gemini CLI adapter spec.

use std::path::Path;

use super::spec::ProviderSpec;
use super::types::{CapabilitySet, TaskInput};

#[derive(Debug, Default)]
pub struct GeminiSpec;

impl ProviderSpec for GeminiSpec {
    fn provider_id(&self) -> &'static str {
        "gemini"
    }

    fn binary_name(&self) -> &'static str {
        "gemini"
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet {
            output_schema: false,
            session_resume: false,
            mcp_servers: true,
        }
    }

    fn build_command(&self, input: &TaskInput) -> Vec<String> {
        vec![
            self.binary_name().to_string(),
            "-p".to_string(),
            input.prompt.clone(),
            "--output-format".to_string(),
            "json".to_string(),
        ]
    }

    fn auth_check_command(&self, binary: &Path) -> Vec<String> {
        vec![
            binary.to_string_lossy().into_owned(),
            "auth".to_string(),
            "status".to_string(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_shape() {
        let input = TaskInput {
            task_id: "t1".to_string(),
            prompt: "review".to_string(),
            repo_root: "/repo".into(),
            target_paths: vec![".".to_string()],
            metadata: Default::default(),
        };
        let cmd = GeminiSpec.build_command(&input);
        assert_eq!(cmd[0], "gemini");
        assert!(cmd.contains(&"json".to_string()));
    }
}
