//! Orchestrator runtime: per-provider retry loop, terminal-state reducer,
//! and the expiry predicate.
//!
//! The retry loop is callback-driven: the caller supplies a runner that
//! executes one attempt and reports an [`AttemptResult`]. The sleep
//! primitive is injectable so retry schedules can be asserted without
//! waiting on wall-clock time.

use std::collections::BTreeMap;
use std::time::Duration;

use futures::future::BoxFuture;
use serde::Serialize;
use tracing::debug;

use crate::retry::RetryPolicy;
use crate::state::TaskState;
use crate::types::{ErrorKind, WarningKind};

/// Outcome of a single provider attempt, as reported by the runner.
#[derive(Debug, Clone, Default)]
pub struct AttemptResult {
    pub success: bool,
    pub output: Option<serde_json::Value>,
    pub error_kind: Option<ErrorKind>,
    pub warnings: Vec<WarningKind>,
}

impl AttemptResult {
    pub fn succeeded(output: serde_json::Value) -> Self {
        Self {
            success: true,
            output: Some(output),
            ..Self::default()
        }
    }

    pub fn failed(error_kind: ErrorKind) -> Self {
        Self {
            success: false,
            error_kind: Some(error_kind),
            ..Self::default()
        }
    }
}

/// Summary of one provider across all retry attempts.
///
/// Invariant: `delays_seconds.len() == attempts - 1`; a delay is recorded
/// before every re-invocation and nowhere else.
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub task_id: String,
    pub provider: String,
    pub success: bool,
    pub attempts: u32,
    pub delays_seconds: Vec<f64>,
    pub output: Option<serde_json::Value>,
    pub final_error: Option<ErrorKind>,
    pub warnings: Vec<WarningKind>,
}

/// Injectable sleep primitive used between retry attempts.
pub type SleepFn = Box<dyn Fn(Duration) -> BoxFuture<'static, ()> + Send + Sync>;

/// Drives provider attempts to a [`RunResult`] under a [`RetryPolicy`].
pub struct OrchestratorRuntime {
    retry_policy: RetryPolicy,
    sleep_fn: SleepFn,
}

impl std::fmt::Debug for OrchestratorRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrchestratorRuntime")
            .field("retry_policy", &self.retry_policy)
            .finish()
    }
}

impl Default for OrchestratorRuntime {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

impl OrchestratorRuntime {
    /// Runtime sleeping on the tokio timer.
    pub fn new(retry_policy: RetryPolicy) -> Self {
        Self::with_sleep_fn(
            retry_policy,
            Box::new(|duration| Box::pin(tokio::time::sleep(duration))),
        )
    }

    /// Runtime with a caller-supplied sleep, for deterministic tests.
    pub fn with_sleep_fn(retry_policy: RetryPolicy, sleep_fn: SleepFn) -> Self {
        Self {
            retry_policy,
            sleep_fn,
        }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// Run `runner` until it succeeds, fails non-retryably, or exhausts the
    /// retry budget.
    ///
    /// The budget check uses the post-increment attempt counter
    /// (`attempts <= max_retries` after `attempts += 1`), so a policy with
    /// `max_retries = N` invokes the runner up to `N + 1` times. A failed
    /// attempt with no error kind is coerced to
    /// [`ErrorKind::NormalizationError`].
    pub async fn run_with_retry<R, Fut>(
        &self,
        task_id: &str,
        provider: &str,
        mut runner: R,
    ) -> RunResult
    where
        R: FnMut(u32) -> Fut,
        Fut: Future<Output = AttemptResult>,
    {
        let mut attempts: u32 = 0;
        let mut delays: Vec<f64> = Vec::new();
        let mut warnings: Vec<WarningKind> = Vec::new();

        loop {
            attempts += 1;
            let result = runner(attempts).await;
            warnings.extend(result.warnings.iter().copied());

            if result.success {
                return RunResult {
                    task_id: task_id.to_string(),
                    provider: provider.to_string(),
                    success: true,
                    attempts,
                    delays_seconds: delays,
                    output: result.output,
                    final_error: None,
                    warnings,
                };
            }

            let final_error = result.error_kind.unwrap_or(ErrorKind::NormalizationError);
            let should_retry =
                final_error.is_retryable() && attempts <= self.retry_policy.max_retries;
            if !should_retry {
                return RunResult {
                    task_id: task_id.to_string(),
                    provider: provider.to_string(),
                    success: false,
                    attempts,
                    delays_seconds: delays,
                    output: result.output,
                    final_error: Some(final_error),
                    warnings,
                };
            }

            let delay_seconds = self.retry_policy.compute_delay(attempts);
            debug!(
                task_id,
                provider,
                attempt = attempts,
                error = %final_error,
                delay_seconds,
                "retrying provider attempt"
            );
            delays.push(delay_seconds);
            (self.sleep_fn)(Duration::from_secs_f64(delay_seconds)).await;
        }
    }

    /// Reduce per-provider success booleans to the task's terminal state.
    ///
    /// Pure in the multiset of values: permuting provider keys cannot
    /// change the answer.
    pub fn evaluate_terminal_state(required_provider_success: &BTreeMap<String, bool>) -> TaskState {
        if required_provider_success.is_empty() {
            return TaskState::Failed;
        }
        let successes = required_provider_success
            .values()
            .filter(|ok| **ok)
            .count();
        if successes == 0 {
            TaskState::Failed
        } else if successes == required_provider_success.len() {
            TaskState::Completed
        } else {
            TaskState::PartialSuccess
        }
    }

    /// Whether a run has outlived its welcome.
    ///
    /// True iff the hard deadline (`timeout + grace`) has passed or the
    /// heartbeat has gone stale. Monotone in `elapsed_seconds` and
    /// `heartbeat_age_seconds`.
    pub fn should_expire(
        elapsed_seconds: f64,
        timeout_seconds: f64,
        grace_seconds: f64,
        heartbeat_age_seconds: f64,
        heartbeat_ttl_seconds: f64,
    ) -> bool {
        elapsed_seconds > timeout_seconds + grace_seconds
            || heartbeat_age_seconds > heartbeat_ttl_seconds
    }
}
