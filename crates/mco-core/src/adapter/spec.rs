//! The adapter seam: provider-specific hooks and the supervised interface.
//!
//! Supervision (detect / run / poll / cancel) is implemented once by
//! [`super::ShimAdapter`]; each provider contributes a [`ProviderSpec`]
//! strategy supplying command assembly, the auth probe command, the
//! success predicate, and output normalization.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::findings;
use super::types::{
    CapabilitySet, NormalizeContext, NormalizedFinding, ProviderPresence, TaskInput, TaskRunRef,
    TaskStatus,
};
use crate::artifacts::ArtifactError;
use crate::types::ErrorKind;

/// Errors raised by adapter supervision.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("adapter run command is empty")]
    EmptyCommand,

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error("failed to spawn provider binary {binary:?}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: io::Error,
    },

    #[error("spawned child reported no pid")]
    MissingPid,

    #[error("failed to write provider result {path}: {message}")]
    ResultWrite { path: PathBuf, message: String },

    #[error("failed to signal process group {pgid}: {source}")]
    Signal {
        pgid: i32,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl AdapterError {
    /// The [`ErrorKind`] an attempt should report when supervision itself
    /// fails. Bad input is non-retryable invalid input; infrastructure
    /// faults are provider errors.
    pub fn error_kind(&self) -> ErrorKind {
        match self {
            Self::EmptyCommand | Self::Artifact(_) => ErrorKind::NonRetryableInvalidInput,
            _ => ErrorKind::NonRetryableProviderError,
        }
    }
}

/// Provider-specific strategy consumed by [`super::ShimAdapter`].
pub trait ProviderSpec: Send + Sync {
    /// Stable short id: `claude`, `codex`, `gemini`, `opencode`, `qwen`.
    fn provider_id(&self) -> &'static str;

    /// Name of the binary resolved on PATH.
    fn binary_name(&self) -> &'static str;

    /// Static feature description, used by the engine for gating.
    fn capabilities(&self) -> CapabilitySet;

    /// Assemble the review command for this provider.
    fn build_command(&self, input: &TaskInput) -> Vec<String>;

    /// Cheap command whose exit status reveals auth state.
    fn auth_check_command(&self, binary: &Path) -> Vec<String>;

    /// Whether a finished run counts as a success.
    ///
    /// Defaults to `exit_code == 0`; providers that report findings on a
    /// non-zero exit override this.
    fn is_success(&self, exit_code: Option<i32>, stdout: &str, stderr: &str) -> bool {
        let _ = (stdout, stderr);
        exit_code == Some(0)
    }

    /// Convert raw provider stdout into normalized findings.
    ///
    /// Never fails: an unparsable payload yields an empty list, and
    /// malformed entries are dropped while counted on `ctx`.
    fn normalize(&self, raw: &str, ctx: &mut NormalizeContext) -> Vec<NormalizedFinding> {
        findings::collect_findings(raw, ctx)
    }
}

/// The supervised adapter interface the engine drives.
///
/// Object-safe so adapters can be stored as `Box<dyn ProviderAdapter>` in
/// [`super::AdapterRegistry`].
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Stable provider id this adapter supervises.
    fn provider_id(&self) -> &str;

    fn capabilities(&self) -> CapabilitySet;

    /// Probe binary presence, version, and auth state. Never fails;
    /// probe problems land in `ProviderPresence::reason`.
    async fn detect(&self) -> ProviderPresence;

    /// Spawn the provider child process and register a run handle.
    async fn run(&self, input: &TaskInput) -> Result<TaskRunRef, AdapterError>;

    /// Observe a run. Terminal polls write the provider result record and
    /// release the handle.
    async fn poll(&self, run_ref: &TaskRunRef) -> Result<TaskStatus, AdapterError>;

    /// Terminate a run: SIGTERM the process group, escalate to SIGKILL,
    /// release the handle. Idempotent.
    async fn cancel(&self, run_ref: &TaskRunRef) -> Result<(), AdapterError>;

    /// Normalize raw provider stdout into common findings.
    fn normalize(&self, raw: &str, ctx: &mut NormalizeContext) -> Vec<NormalizedFinding>;
}

// Compile-time assertion: ProviderAdapter must stay object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn ProviderAdapter) {}
};
