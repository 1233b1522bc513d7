//! Review engine: drives one review task across all configured providers.
//!
//! The engine owns the task state machine and the per-provider attempt
//! loop: spawn via the adapter, poll until terminal or expired, retry
//! through the orchestrator runtime, then normalize, aggregate, and reduce
//! to a terminal verdict.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::adapter::{
    AdapterRegistry, NormalizeContext, NormalizedFinding, ProviderAdapter, ProviderPresence,
    TaskInput, TaskMetadata,
};
use crate::aggregate::merge_findings;
use crate::artifacts::ArtifactPaths;
use crate::config::{ReviewConfig, ReviewPolicy};
use crate::orchestrator::{AttemptResult, OrchestratorRuntime, RunResult};
use crate::report::ReportPayload;
use crate::state::{TaskState, TaskStateMachine};
use crate::types::{AttemptState, ErrorKind};

/// Final verdict for the reviewed change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Decision {
    Pass,
    Fail,
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
        })
    }
}

/// One review task, before fan-out.
#[derive(Debug, Clone)]
pub struct ReviewRequest {
    pub task_id: String,
    pub prompt: String,
    pub repo_root: PathBuf,
    /// Repo-relative review targets; falls back to the policy's
    /// `allow_paths` when empty.
    pub target_paths: Vec<String>,
    /// Overrides the config's artifact base when set.
    pub artifact_root: Option<PathBuf>,
    /// Test seam: bypasses per-adapter command assembly for every
    /// provider.
    pub command_override: Option<Vec<String>>,
    pub output_schema_path: Option<PathBuf>,
}

impl ReviewRequest {
    pub fn new(prompt: impl Into<String>, repo_root: impl Into<PathBuf>) -> Self {
        Self {
            task_id: format!("review-{}", &Uuid::new_v4().simple().to_string()[..8]),
            prompt: prompt.into(),
            repo_root: repo_root.into(),
            target_paths: Vec::new(),
            artifact_root: None,
            command_override: None,
            output_schema_path: None,
        }
    }
}

/// Per-provider outcome recorded on the [`ReviewResult`].
#[derive(Debug, Clone, Serialize)]
pub struct ProviderRunSummary {
    pub success: bool,
    pub attempts: u32,
    pub final_error: Option<ErrorKind>,
    pub warnings: Vec<crate::types::WarningKind>,
}

/// Everything the CLI needs to render a finished review.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewResult {
    pub task_id: String,
    pub artifact_root: Option<PathBuf>,
    pub decision: Decision,
    pub terminal_state: TaskState,
    pub provider_results: BTreeMap<String, ProviderRunSummary>,
    pub findings_count: usize,
    pub parse_success_count: usize,
    pub parse_failure_count: usize,
    pub schema_valid_count: usize,
    pub dropped_findings_count: usize,
    pub findings: Vec<NormalizedFinding>,
}

impl ReviewResult {
    /// Summary fields consumed by the report formatters.
    pub fn report_payload(&self) -> ReportPayload {
        let successes = self
            .provider_results
            .values()
            .filter(|summary| summary.success)
            .count();
        ReportPayload {
            decision: self.decision.to_string(),
            terminal_state: self.terminal_state.to_string(),
            provider_success_count: successes,
            provider_failure_count: self.provider_results.len() - successes,
            findings_count: self.findings_count,
        }
    }
}

/// Wires a registry of adapters into the orchestrator runtime.
#[derive(Debug)]
pub struct ReviewEngine {
    registry: Arc<AdapterRegistry>,
    runtime: Arc<OrchestratorRuntime>,
    config: ReviewConfig,
}

impl ReviewEngine {
    pub fn new(registry: AdapterRegistry, config: ReviewConfig) -> Self {
        let runtime = OrchestratorRuntime::new(config.policy.retry_policy());
        Self {
            registry: Arc::new(registry),
            runtime: Arc::new(runtime),
            config,
        }
    }

    /// Build the engine with builtin adapters for the configured providers.
    pub fn from_config(config: ReviewConfig) -> Result<Self> {
        let registry = AdapterRegistry::with_providers(&config.providers)
            .context("building adapter registry")?;
        Ok(Self::new(registry, config))
    }

    /// Probe every configured adapter, in declaration order.
    pub async fn detect_providers(&self) -> Vec<ProviderPresence> {
        let mut presences = Vec::new();
        for provider in self.registry.list() {
            if let Some(adapter) = self.registry.get(provider) {
                presences.push(adapter.detect().await);
            }
        }
        presences
    }

    /// Run every provider once-with-retries and return raw run results in
    /// provider order, without aggregation or verdicts.
    pub async fn dispatch_providers(
        &self,
        request: &ReviewRequest,
        cancel: CancellationToken,
    ) -> Result<Vec<RunResult>> {
        let artifact_root = self.artifact_root_for(request);
        let (runs, _expired) = self.dispatch_all(request, &artifact_root, &cancel).await;
        Ok(runs.into_iter().map(|(_, run)| run).collect())
    }

    /// Run the full review: fan out, supervise, normalize, aggregate,
    /// reduce, decide.
    pub async fn run_review(
        &self,
        request: &ReviewRequest,
        cancel: CancellationToken,
    ) -> Result<ReviewResult> {
        let mut machine = TaskStateMachine::new();
        machine.transition(TaskState::Queued)?;

        let artifact_root = self.artifact_root_for(request);
        info!(
            task_id = %request.task_id,
            providers = ?self.registry.list(),
            artifact_root = %artifact_root.display(),
            "starting review"
        );
        machine.transition(TaskState::Dispatched)?;
        machine.transition(TaskState::Running)?;

        let (runs, expired) = self.dispatch_all(request, &artifact_root, &cancel).await;

        if expired {
            warn!(task_id = %request.task_id, "review hard timeout reached");
            machine.transition(TaskState::Expired)?;
            return Ok(self.interrupted_result(request, &artifact_root, machine.state(), runs));
        }
        if cancel.is_cancelled() {
            info!(task_id = %request.task_id, "review cancelled");
            machine.transition(TaskState::Cancelled)?;
            return Ok(self.interrupted_result(request, &artifact_root, machine.state(), runs));
        }

        machine.transition(TaskState::Aggregating)?;

        let policy = &self.config.policy;
        let paths = ArtifactPaths::new(&artifact_root, &request.task_id)?;

        let mut success_map: BTreeMap<String, bool> = BTreeMap::new();
        let mut summaries: BTreeMap<String, ProviderRunSummary> = BTreeMap::new();
        let mut per_provider_findings: Vec<Vec<NormalizedFinding>> = Vec::new();
        let mut parse_success_count = 0usize;
        let mut parse_failure_count = 0usize;
        let mut schema_valid_count = 0usize;
        let mut dropped_findings_count = 0usize;

        for (provider, run) in &runs {
            let mut success = run.success;
            let mut final_error = run.final_error;

            if run.success {
                let raw =
                    std::fs::read_to_string(paths.stdout_log(provider)?).unwrap_or_default();
                let mut ctx = NormalizeContext::new(
                    &request.task_id,
                    provider,
                    &request.repo_root,
                    &format!("raw/{provider}.stdout.log"),
                );
                let findings = match self.registry.get(provider) {
                    Some(adapter) => adapter.normalize(&raw, &mut ctx),
                    None => Vec::new(),
                };
                dropped_findings_count += ctx.dropped as usize;
                schema_valid_count += findings.len();
                if ctx.payload_located {
                    parse_success_count += 1;
                } else {
                    parse_failure_count += 1;
                }

                let missing_payload = policy.require_non_empty_findings && !ctx.payload_located;
                let contract_broken = policy.enforce_findings_contract && ctx.dropped > 0;
                if missing_payload || contract_broken {
                    warn!(
                        provider,
                        dropped = ctx.dropped,
                        payload_located = ctx.payload_located,
                        "provider output failed the findings contract"
                    );
                    success = false;
                    final_error = Some(ErrorKind::NormalizationError);
                } else {
                    per_provider_findings.push(findings);
                }
            }

            success_map.insert(provider.clone(), success);
            summaries.insert(
                provider.clone(),
                ProviderRunSummary {
                    success,
                    attempts: run.attempts,
                    final_error,
                    warnings: run.warnings.clone(),
                },
            );
        }

        let findings = merge_findings(per_provider_findings);
        let terminal = OrchestratorRuntime::evaluate_terminal_state(&success_map);
        machine.transition(terminal)?;

        let decision = decide(terminal, &findings, policy.high_escalation_threshold);
        info!(
            task_id = %request.task_id,
            terminal = %terminal,
            decision = %decision,
            findings = findings.len(),
            "review finished"
        );

        Ok(ReviewResult {
            task_id: request.task_id.clone(),
            artifact_root: Some(artifact_root),
            decision,
            terminal_state: terminal,
            provider_results: summaries,
            findings_count: findings.len(),
            parse_success_count,
            parse_failure_count,
            schema_valid_count,
            dropped_findings_count,
            findings,
        })
    }

    fn artifact_root_for(&self, request: &ReviewRequest) -> PathBuf {
        request
            .artifact_root
            .clone()
            .unwrap_or_else(|| request.repo_root.join(&self.config.artifact_base))
    }

    fn task_input_for(
        &self,
        request: &ReviewRequest,
        provider: &str,
        artifact_root: &Path,
    ) -> TaskInput {
        let output_schema = self
            .registry
            .get(provider)
            .is_some_and(|adapter| adapter.capabilities().output_schema);
        let target_paths = if request.target_paths.is_empty() {
            self.config.policy.allow_paths.clone()
        } else {
            request.target_paths.clone()
        };
        TaskInput {
            task_id: request.task_id.clone(),
            prompt: request.prompt.clone(),
            repo_root: request.repo_root.clone(),
            target_paths,
            metadata: TaskMetadata {
                artifact_root: Some(artifact_root.to_path_buf()),
                command_override: request.command_override.clone(),
                output_schema_path: output_schema
                    .then(|| request.output_schema_path.clone())
                    .flatten(),
                extra: BTreeMap::new(),
            },
        }
    }

    /// Fan the task out to every provider, bounded by the parallelism cap
    /// and the review hard timeout. Returns results in provider order and
    /// whether the hard timeout fired.
    async fn dispatch_all(
        &self,
        request: &ReviewRequest,
        artifact_root: &Path,
        cancel: &CancellationToken,
    ) -> (Vec<(String, RunResult)>, bool) {
        let providers: Vec<String> = self
            .registry
            .list()
            .into_iter()
            .map(String::from)
            .collect();
        let semaphore = Arc::new(Semaphore::new(
            self.config
                .policy
                .effective_parallelism(providers.len()),
        ));
        let deadline = tokio::time::Instant::now()
            + Duration::from_secs(self.config.policy.review_hard_timeout_seconds);

        let mut join_set: JoinSet<(usize, String, RunResult)> = JoinSet::new();
        for (index, provider) in providers.iter().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let registry = Arc::clone(&self.registry);
            let runtime = Arc::clone(&self.runtime);
            let policy = self.config.policy.clone();
            let input = self.task_input_for(request, provider, artifact_root);
            let provider = provider.clone();
            let task_id = request.task_id.clone();
            let cancel = cancel.clone();

            join_set.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let result = runtime
                    .run_with_retry(&task_id, &provider, |attempt| {
                        let registry = Arc::clone(&registry);
                        let input = input.clone();
                        let provider = provider.clone();
                        let policy = policy.clone();
                        let cancel = cancel.clone();
                        async move {
                            run_provider_attempt(
                                registry, &provider, &input, &policy, &cancel, attempt,
                            )
                            .await
                        }
                    })
                    .await;
                (index, provider, result)
            });
        }

        let mut slots: Vec<Option<RunResult>> = (0..providers.len()).map(|_| None).collect();
        let mut expired = false;
        loop {
            let joined = if expired {
                // Hard timeout already fired: the cancel token is set, so
                // remaining tasks wind down quickly; drain them.
                join_set.join_next().await
            } else {
                match tokio::time::timeout_at(deadline, join_set.join_next()).await {
                    Ok(joined) => joined,
                    Err(_) => {
                        expired = true;
                        cancel.cancel();
                        continue;
                    }
                }
            };
            match joined {
                None => break,
                Some(Ok((index, _provider, run))) => slots[index] = Some(run),
                Some(Err(error)) => {
                    warn!(%error, "provider task panicked");
                }
            }
        }

        let runs = providers
            .into_iter()
            .zip(slots)
            .map(|(provider, slot)| {
                let run = slot.unwrap_or_else(|| RunResult {
                    task_id: request.task_id.clone(),
                    provider: provider.clone(),
                    success: false,
                    attempts: 1,
                    delays_seconds: Vec::new(),
                    output: None,
                    final_error: Some(ErrorKind::NonRetryableProviderError),
                    warnings: Vec::new(),
                });
                (provider, run)
            })
            .collect();
        (runs, expired)
    }

    fn interrupted_result(
        &self,
        request: &ReviewRequest,
        artifact_root: &Path,
        terminal: TaskState,
        runs: Vec<(String, RunResult)>,
    ) -> ReviewResult {
        let provider_results = runs
            .into_iter()
            .map(|(provider, run)| {
                (
                    provider,
                    ProviderRunSummary {
                        success: run.success,
                        attempts: run.attempts,
                        final_error: run.final_error,
                        warnings: run.warnings,
                    },
                )
            })
            .collect();
        ReviewResult {
            task_id: request.task_id.clone(),
            artifact_root: Some(artifact_root.to_path_buf()),
            decision: Decision::Fail,
            terminal_state: terminal,
            provider_results,
            findings_count: 0,
            parse_success_count: 0,
            parse_failure_count: 0,
            schema_valid_count: 0,
            dropped_findings_count: 0,
            findings: Vec::new(),
        }
    }
}

/// Map a finished review to PASS or FAIL.
fn decide(terminal: TaskState, findings: &[NormalizedFinding], threshold: usize) -> Decision {
    if matches!(
        terminal,
        TaskState::Failed | TaskState::Expired | TaskState::Cancelled
    ) {
        return Decision::Fail;
    }
    let escalating = findings
        .iter()
        .filter(|finding| matches!(finding.severity.as_str(), "critical" | "high"))
        .count();
    if threshold > 0 && escalating >= threshold {
        Decision::Fail
    } else {
        Decision::Pass
    }
}

/// One attempt for one provider: spawn, poll to terminal, expire if due.
async fn run_provider_attempt(
    registry: Arc<AdapterRegistry>,
    provider: &str,
    input: &TaskInput,
    policy: &ReviewPolicy,
    cancel: &CancellationToken,
    attempt: u32,
) -> AttemptResult {
    let Some(adapter) = registry.get(provider) else {
        return AttemptResult::failed(ErrorKind::NonRetryableInvalidInput);
    };
    if cancel.is_cancelled() {
        return AttemptResult::failed(ErrorKind::NonRetryableProviderError);
    }

    let run_ref = match adapter.run(input).await {
        Ok(run_ref) => run_ref,
        Err(error) => {
            warn!(provider, attempt, %error, "provider spawn failed");
            return AttemptResult::failed(error.error_kind());
        }
    };
    info!(
        provider,
        run_id = %run_ref.run_id,
        pid = run_ref.pid,
        attempt,
        "provider run started"
    );

    let timeout = policy.timeout_for(provider) as f64;
    let grace = policy.grace_seconds as f64;
    let heartbeat_ttl = policy.stall_timeout_seconds as f64;
    let started = Instant::now();
    let mut last_heartbeat = Instant::now();

    loop {
        let status = match adapter.poll(&run_ref).await {
            Ok(status) => status,
            Err(error) => {
                warn!(provider, run_id = %run_ref.run_id, %error, "poll failed");
                if let Err(cancel_error) = adapter.cancel(&run_ref).await {
                    warn!(provider, %cancel_error, "cancel after poll failure also failed");
                }
                return AttemptResult::failed(error.error_kind());
            }
        };
        if status.completed {
            return attempt_from_status(&status);
        }
        if status.heartbeat_at.is_some() {
            last_heartbeat = Instant::now();
        }

        if OrchestratorRuntime::should_expire(
            started.elapsed().as_secs_f64(),
            timeout,
            grace,
            last_heartbeat.elapsed().as_secs_f64(),
            heartbeat_ttl,
        ) {
            warn!(provider, run_id = %run_ref.run_id, "provider run expired, cancelling");
            if let Err(error) = adapter.cancel(&run_ref).await {
                warn!(provider, %error, "cancel of expired run failed");
            }
            return AttemptResult::failed(ErrorKind::RetryableTimeout);
        }
        if cancel.is_cancelled() {
            if let Err(error) = adapter.cancel(&run_ref).await {
                warn!(provider, %error, "cancel of aborted run failed");
            }
            return AttemptResult::failed(ErrorKind::NonRetryableProviderError);
        }

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs_f64(policy.poll_interval_seconds)) => {}
            _ = cancel.cancelled() => {}
        }
    }
}

/// Build the attempt outcome from a terminal status, folding in the
/// provider result record when it is readable.
fn attempt_from_status(status: &crate::adapter::TaskStatus) -> AttemptResult {
    let mut result = AttemptResult {
        success: matches!(status.attempt_state, AttemptState::Succeeded),
        output: None,
        error_kind: status.error_kind,
        warnings: Vec::new(),
    };
    let Some(path) = &status.output_path else {
        return result;
    };
    let Ok(text) = std::fs::read_to_string(path) else {
        return result;
    };
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(&text) {
        if let Some(warnings) = value.get("warnings").and_then(|w| w.as_array()) {
            result.warnings = warnings
                .iter()
                .filter_map(|w| w.as_str())
                .filter_map(|s| s.parse().ok())
                .collect();
        }
        result.output = Some(value);
    }
    result
}
