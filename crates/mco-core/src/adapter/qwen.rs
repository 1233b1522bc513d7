//! Qwen Code adapter spec.

use std::path::Path;

use super::spec::ProviderSpec;
use super::types::{CapabilitySet, TaskInput};

#[derive(Debug, Default)]
pub struct QwenSpec;

impl ProviderSpec for QwenSpec {
    fn provider_id(&self) -> &'static str {
        "qwen"
    }

    fn binary_name(&self) -> &'static str {
        "qwen"
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
