//! OpenCode adapter spec.

use std::path::Path;

use super::spec::ProviderSpec;
use super::types::{CapabilitySet, TaskInput};

#[derive(Debug, Default)]
pub struct OpenCodeSpec;

impl ProviderSpec for OpenCodeSpec {
    fn provider_id(&self) -> &'static str {
        "opencode"
    }

    fn binary_name(&self) -> &'static str {
        "opencode"
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet {
            output_schema: false,
            session_resume: true,
            mcp_servers: false,
        }
    }

    fn build_command(&self, input: &TaskInput) -> Vec<String> {
        vec![
            self.binary_name().to_string(),
            "run".to_string(),
            input.prompt.clone(),
            "--print-logs".to_string(),
        ]
    }

    fn auth_check_command(&self, binary: &Path) -> Vec<String> {
        vec![
            binary.to_string_lossy().into_owned(),
            "auth".to_string(),
            "list".to_string(),
        ]
    }
}
