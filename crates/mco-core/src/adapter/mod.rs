//! Provider adapters: supervised child-process drivers for review CLIs.
//!
//! Supervision (detect / run / poll / cancel) lives once in
//! [`ShimAdapter`]; each provider contributes a [`ProviderSpec`] with its
//! command assembly, auth probe, success predicate, and normalization.
//!
//! ```text
//! ReviewEngine
//!     |
//!     v
//! AdapterRegistry --get("claude")--> &dyn ProviderAdapter (ShimAdapter)
//!     |                                   |
//!     |   run(task) ----------------------+
//!     |        |
//!     |        v
//!     |   TaskRunRef { run_id, pid, ... }
//!     |        |
//!     |   poll(ref)   -> TaskStatus
//!     |   cancel(ref) -> SIGTERM group, escalate SIGKILL
//!     |   normalize(raw) -> Vec<NormalizedFinding>
//! ```

pub mod claude;
pub mod codex;
mod env;
mod findings;
pub mod gemini;
pub mod opencode;
pub mod qwen;
pub mod registry;
pub mod shim;
pub mod spec;
pub mod types;

pub use env::{sanitize, sanitized_env, STRIPPED_ENV_VARS};
pub use registry::AdapterRegistry;
pub use shim::ShimAdapter;
pub use spec::{AdapterError, ProviderAdapter, ProviderSpec};
pub use types::{
    CapabilitySet, Evidence, NormalizeContext, NormalizedFinding, ProviderPresence, TaskInput,
    TaskMetadata, TaskRunRef, TaskStatus,
};

/// Construct the builtin adapter for a provider id, if one exists.
pub fn builtin_adapter(provider_id: &str) -> Option<ShimAdapter> {
    let spec: Box<dyn ProviderSpec> = match provider_id {
        "claude" => Box::new(claude::ClaudeSpec),
        "codex" => Box::new(codex::CodexSpec),
        "gemini" => Box::new(gemini::GeminiSpec),
        "opencode" => Box::new(opencode::OpenCodeSpec),
        "qwen" => Box::new(qwen::QwenSpec),
        _ => return None,
    };
    Some(ShimAdapter::new(spec))
}

/// Provider ids with builtin adapters, in canonical order.
pub const BUILTIN_PROVIDERS: &[&str] = &["claude", "codex", "gemini", "opencode", "qwen"];
