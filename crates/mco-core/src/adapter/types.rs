//! Data contracts shared between the engine and provider adapters.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{AttemptState, ErrorKind};

/// Immutable input to one provider run.
#[derive(Debug, Clone)]
pub struct TaskInput {
    /// Unique per task; becomes the artifact directory name.
    pub task_id: String,
    /// Opaque review prompt handed to the provider.
    pub prompt: String,
    /// Absolute path; the child's working directory.
    pub repo_root: PathBuf,
    /// Repo-relative paths the review should cover. Non-empty.
    pub target_paths: Vec<String>,
    pub metadata: TaskMetadata,
}

/// Recognized task metadata, typed.
///
/// Unknown keys ride through `extra` untouched.
#[derive(Debug, Clone, Default)]
pub struct TaskMetadata {
    /// Base directory for artifacts; defaults to `/tmp/mco` when absent.
    pub artifact_root: Option<PathBuf>,
    /// When present, bypasses per-adapter command assembly entirely.
    pub command_override: Option<Vec<String>>,
    /// JSON schema forwarded to providers that support structured output.
    pub output_schema_path: Option<PathBuf>,
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Handle returned by `run()`; refers to a live run by `run_id`.
#[derive(Debug, Clone, Serialize)]
pub struct TaskRunRef {
    pub task_id: String,
    pub provider: String,
    /// `<provider>-<12 hex chars>`, unique per run.
    pub run_id: String,
    /// The task's artifact root directory.
    pub artifact_path: PathBuf,
    pub started_at: DateTime<Utc>,
    /// OS process id of the spawned child.
    pub pid: u32,
    /// Provider-defined session identifier, if any.
    pub session_id: Option<String>,
}

/// Snapshot returned by `poll()`.
#[derive(Debug, Clone, Serialize)]
pub struct TaskStatus {
    pub task_id: String,
    pub provider: String,
    pub run_id: String,
    pub attempt_state: AttemptState,
    /// True iff `attempt_state` is terminal.
    pub completed: bool,
    /// Refreshed on every non-terminal poll; drives liveness expiry.
    pub heartbeat_at: Option<DateTime<Utc>>,
    /// Path of the per-provider result JSON, once known.
    pub output_path: Option<PathBuf>,
    /// Non-null iff `attempt_state` is `FAILED`.
    pub error_kind: Option<ErrorKind>,
    /// Null until the child exits (or if it died to a signal).
    pub exit_code: Option<i32>,
    /// Short free-form tag: `running`, `completed`, `run_handle_not_found`.
    pub message: String,
}

/// Result of `detect()`: is the provider binary usable here?
#[derive(Debug, Clone, Serialize)]
pub struct ProviderPresence {
    pub provider: String,
    pub detected: bool,
    pub binary_path: Option<PathBuf>,
    pub version: Option<String>,
    pub auth_ok: bool,
    /// `ok`, `binary_not_found`, `probe_config_error`, `auth_check_failed`,
    /// or `probe_unknown_error`.
    pub reason: String,
}

/// Static description of what an adapter supports.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CapabilitySet {
    /// Provider accepts an `--output-schema` style contract file.
    pub output_schema: bool,
    /// Provider can resume a prior session.
    pub session_resume: bool,
    /// Provider can attach MCP servers.
    pub mcp_servers: bool,
}

/// Context handed to `normalize()`; also accumulates parse accounting.
#[derive(Debug, Clone)]
pub struct NormalizeContext {
    pub task_id: String,
    pub provider: String,
    pub repo_root: PathBuf,
    /// Repo-relative path of the raw log the payload came from.
    pub raw_ref: String,
    /// Set when a top-level `findings` array was located in the payload.
    pub payload_located: bool,
    /// Count of malformed finding entries silently dropped.
    pub dropped: u32,
}

impl NormalizeContext {
    pub fn new(task_id: &str, provider: &str, repo_root: &std::path::Path, raw_ref: &str) -> Self {
        Self {
            task_id: task_id.to_string(),
            provider: provider.to_string(),
            repo_root: repo_root.to_path_buf(),
            raw_ref: raw_ref.to_string(),
            payload_located: false,
            dropped: 0,
        }
    }
}

/// Where a finding points in the reviewed tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    #[serde(default)]
    pub file: String,
    /// 1-based line number; absent when the provider gave none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(default)]
    pub snippet: String,
}

impl Evidence {
    /// Evidence counts as present once it names a file.
    pub fn is_empty(&self) -> bool {
        self.file.is_empty()
    }
}

/// A provider observation coerced into the common schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedFinding {
    pub provider: String,
    pub finding_id: String,
    /// Lowercased; `critical`, `high`, `medium`, `low`, or whatever the
    /// provider said -- formatters rank unknown severities last.
    pub severity: String,
    /// Lowercased free-form category.
    pub category: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<Evidence>,
    #[serde(default)]
    pub recommendation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// Content-derived stable id used for cross-provider deduplication.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    /// Providers that reported this finding; singleton at normalization,
    /// enlarged by aggregation.
    pub detected_by: Vec<String>,
}
