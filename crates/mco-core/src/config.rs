//! Review policy and configuration types.
//!
//! These deserialize from the CLI's TOML config file; every field has a
//! default so partial files work.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;

/// Tunables governing one review run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewPolicy {
    /// Hard per-provider wall time, in seconds.
    pub timeout_seconds: u64,
    /// Extra slack past the per-provider timeout before expiry fires.
    pub grace_seconds: u64,
    /// Heartbeat TTL: a run whose heartbeat goes stale this long expires.
    pub stall_timeout_seconds: u64,
    /// Delay between `poll()` calls.
    pub poll_interval_seconds: f64,
    /// Wall-time ceiling for the whole review across all providers.
    pub review_hard_timeout_seconds: u64,
    /// When set, malformed finding entries fail the provider instead of
    /// being dropped silently.
    pub enforce_findings_contract: bool,
    pub max_retries: u32,
    pub retry_base_delay_seconds: f64,
    pub retry_backoff_multiplier: f64,
    /// Number of critical/high findings at which the decision flips to
    /// FAIL.
    pub high_escalation_threshold: usize,
    /// When set, a succeeded run whose stdout carries no findings payload
    /// is treated as a normalization failure.
    pub require_non_empty_findings: bool,
    /// Cap on concurrently live provider children; `0` means one permit
    /// per configured provider.
    pub max_provider_parallelism: usize,
    /// Default review targets when a request names none.
    pub allow_paths: Vec<String>,
    pub enforcement_mode: String,
    /// Per-provider overrides of `timeout_seconds`. Kept last so the TOML
    /// rendering emits all scalars before this table.
    pub provider_timeouts: BTreeMap<String, u64>,
}

impl Default for ReviewPolicy {
    fn default() -> Self {
        Self {
            timeout_seconds: 180,
            grace_seconds: 30,
            stall_timeout_seconds: 900,
            poll_interval_seconds: 1.0,
            review_hard_timeout_seconds: 1800,
            enforce_findings_contract: false,
            max_retries: 1,
            retry_base_delay_seconds: 1.0,
            retry_backoff_multiplier: 2.0,
            high_escalation_threshold: 1,
            require_non_empty_findings: true,
            max_provider_parallelism: 0,
            allow_paths: vec![".".to_string()],
            enforcement_mode: "strict".to_string(),
            provider_timeouts: BTreeMap::new(),
        }
    }
}

impl ReviewPolicy {
    /// Effective timeout for one provider, honoring overrides.
    pub fn timeout_for(&self, provider: &str) -> u64 {
        self.provider_timeouts
            .get(provider)
            .copied()
            .unwrap_or(self.timeout_seconds)
    }

    /// The retry policy derived from this configuration.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retries,
            self.retry_base_delay_seconds,
            self.retry_backoff_multiplier,
        )
    }

    /// Number of provider children allowed to run at once.
    pub fn effective_parallelism(&self, provider_count: usize) -> usize {
        if self.max_provider_parallelism == 0 {
            provider_count.max(1)
        } else {
            self.max_provider_parallelism
        }
    }
}

/// Top-level review configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewConfig {
    /// Providers to fan the task out to, in declaration order.
    pub providers: Vec<String>,
    /// Artifact base directory, resolved relative to the reviewed repo.
    pub artifact_base: String,
    pub policy: ReviewPolicy,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            providers: vec!["claude".to_string(), "codex".to_string()],
            artifact_base: "reports/review".to_string(),
            policy: ReviewPolicy::default(),
        }
    }
}

impl ReviewConfig {
    /// Parse a config file body; missing fields fall back to defaults.
    pub fn from_toml_str(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Render the config as TOML, e.g. for `mco init`.
    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let cfg = ReviewConfig::default();
        assert_eq!(cfg.providers, vec!["claude", "codex"]);
        assert_eq!(cfg.artifact_base, "reports/review");
        assert_eq!(cfg.policy.timeout_seconds, 180);
        assert_eq!(cfg.policy.stall_timeout_seconds, 900);
        assert_eq!(cfg.policy.poll_interval_seconds, 1.0);
        assert_eq!(cfg.policy.review_hard_timeout_seconds, 1800);
        assert!(!cfg.policy.enforce_findings_contract);
        assert_eq!(cfg.policy.max_retries, 1);
        assert_eq!(cfg.policy.max_provider_parallelism, 0);
        assert!(cfg.policy.provider_timeouts.is_empty());
        assert_eq!(cfg.policy.allow_paths, vec!["."]);
        assert_eq!(cfg.policy.enforcement_mode, "strict");
    }

    #[test]
    fn provider_timeout_override() {
        let mut policy = ReviewPolicy::default();
        policy.provider_timeouts.insert("qwen".to_string(), 900);
        assert_eq!(policy.timeout_for("qwen"), 900);
        assert_eq!(policy.timeout_for("claude"), 180);
    }

    #[test]
    fn parallelism_zero_means_one_permit_per_provider() {
        let policy = ReviewPolicy::default();
        assert_eq!(policy.effective_parallelism(3), 3);
        assert_eq!(policy.effective_parallelism(0), 1);

        let mut capped = ReviewPolicy::default();
        capped.max_provider_parallelism = 2;
        assert_eq!(capped.effective_parallelism(5), 2);
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let cfg = ReviewConfig::from_toml_str(
            r#"
            providers = ["qwen"]

            [policy]
            max_retries = 3
            "#,
        )
        .unwrap();
        assert_eq!(cfg.providers, vec!["qwen"]);
        assert_eq!(cfg.policy.max_retries, 3);
        assert_eq!(cfg.policy.timeout_seconds, 180);
        assert_eq!(cfg.artifact_base, "reports/review");
    }

    #[test]
    fn retry_policy_derivation() {
        let policy = ReviewPolicy::default();
        let retry = policy.retry_policy();
        assert_eq!(retry.max_retries, 1);
        assert_eq!(retry.compute_delay(1), 1.0);
        assert_eq!(retry.compute_delay(2), 2.0);
    }
}
