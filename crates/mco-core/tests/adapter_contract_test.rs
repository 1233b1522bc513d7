//! Adapter contract tests: run / poll / cancel / normalize against fake
//! provider scripts.
//!
//! Real provider binaries are never invoked; every test injects a shell
//! script through `command_override`.

use std::path::Path;
use std::time::Duration;

use chrono::Utc;

use mco_core::adapter::{
    builtin_adapter, NormalizeContext, ProviderAdapter, ShimAdapter, TaskInput, TaskMetadata,
    TaskRunRef, TaskStatus,
};
use mco_core::types::{AttemptState, ErrorKind};
use mco_test_utils::{
    command_override, failing_script, findings_script, sample_findings_payload, sleeping_script,
    write_provider_script,
};

// -----------------------------------------------------------------------
// Helpers
// -----------------------------------------------------------------------

fn task_input(dir: &Path, task_id: &str, command: Vec<String>) -> TaskInput {
    TaskInput {
        task_id: task_id.to_string(),
        prompt: "ignored in contract test".to_string(),
        repo_root: dir.to_path_buf(),
        target_paths: vec![".".to_string()],
        metadata: TaskMetadata {
            artifact_root: Some(dir.to_path_buf()),
            command_override: Some(command),
            output_schema_path: None,
            extra: Default::default(),
        },
    }
}

async fn wait_terminal(adapter: &ShimAdapter, run_ref: &TaskRunRef) -> TaskStatus {
    for _ in 0..100 {
        let status = adapter.poll(run_ref).await.expect("poll should not fail");
        if status.completed {
            return status;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("adapter run did not reach terminal state");
}

// -----------------------------------------------------------------------
// Run / poll / normalize
// -----------------------------------------------------------------------

#[tokio::test]
async fn claude_run_poll_normalize() {
    let tmp = tempfile::tempdir().unwrap();
    let payload = sample_findings_payload("f1", "high", "fp1");
    let script = findings_script(tmp.path(), "fake_claude.sh", &payload);

    let adapter = builtin_adapter("claude").unwrap();
    let task = task_input(tmp.path(), "task-claude-contract", command_override(&script));

    let run_ref = adapter.run(&task).await.unwrap();
    assert!(run_ref.run_id.starts_with("claude-"));
    assert!(run_ref.pid > 0);

    let status = wait_terminal(&adapter, &run_ref).await;
    assert_eq!(status.attempt_state, AttemptState::Succeeded);
    assert!(status.error_kind.is_none());
    assert_eq!(status.exit_code, Some(0));
    assert_eq!(status.message, "completed");
    let output_path = status.output_path.expect("terminal poll knows the result path");
    assert!(output_path.exists());

    let raw_path = tmp
        .path()
        .join("task-claude-contract/raw/claude.stdout.log");
    let raw = std::fs::read_to_string(&raw_path).unwrap();
    let mut ctx = NormalizeContext::new(
        "task-claude-contract",
        "claude",
        tmp.path(),
        "raw/claude.stdout.log",
    );
    let findings = adapter.normalize(&raw, &mut ctx);
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].provider, "claude");
    assert_eq!(findings[0].detected_by, vec!["claude".to_string()]);
}

#[tokio::test]
async fn provider_result_record_has_exact_keys() {
    let tmp = tempfile::tempdir().unwrap();
    let script = findings_script(
        tmp.path(),
        "fake_gemini.sh",
        &sample_findings_payload("g1", "low", "gfp"),
    );

    let adapter = builtin_adapter("gemini").unwrap();
    let task = task_input(tmp.path(), "task-record-keys", command_override(&script));
    let run_ref = adapter.run(&task).await.unwrap();
    let status = wait_terminal(&adapter, &run_ref).await;

    let text = std::fs::read_to_string(status.output_path.unwrap()).unwrap();
    let record: serde_json::Value = serde_json::from_str(&text).unwrap();
    let object = record.as_object().unwrap();

    let expected_keys = [
        "provider",
        "task_id",
        "run_id",
        "pid",
        "command",
        "started_at",
        "completed_at",
        "exit_code",
        "success",
        "error_kind",
        "warnings",
        "stdout_path",
        "stderr_path",
    ];
    for key in expected_keys {
        assert!(object.contains_key(key), "missing key {key}");
    }
    assert_eq!(object.len(), expected_keys.len());

    assert_eq!(record["provider"], "gemini");
    assert_eq!(record["task_id"], "task-record-keys");
    assert_eq!(record["success"], true);
    assert!(record["error_kind"].is_null());
    assert_eq!(record["exit_code"], 0);
    assert_eq!(record["warnings"], serde_json::json!([]));
    assert!(text.is_ascii(), "record must be ASCII-escaped");
}

#[tokio::test]
async fn codex_succeeds_on_non_zero_exit_with_findings() {
    let tmp = tempfile::tempdir().unwrap();
    let payload = sample_findings_payload("f2", "medium", "fp2");
    let body = format!(
        "echo '{{\"type\":\"turn.completed\"}}'\ncat <<'EOF'\n{payload}\nEOF\nexit 1"
    );
    let script = write_provider_script(tmp.path(), "fake_codex.sh", &body);

    let adapter = builtin_adapter("codex").unwrap();
    let task = task_input(tmp.path(), "task-codex-contract", command_override(&script));
    let run_ref = adapter.run(&task).await.unwrap();
    let status = wait_terminal(&adapter, &run_ref).await;

    assert_eq!(status.attempt_state, AttemptState::Succeeded);
    assert!(status.error_kind.is_none());
    assert_eq!(status.exit_code, Some(1));

    let raw = std::fs::read_to_string(
        tmp.path().join("task-codex-contract/raw/codex.stdout.log"),
    )
    .unwrap();
    let mut ctx = NormalizeContext::new(
        "task-codex-contract",
        "codex",
        tmp.path(),
        "raw/codex.stdout.log",
    );
    let findings = adapter.normalize(&raw, &mut ctx);
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].provider, "codex");
}

#[tokio::test]
async fn failed_run_is_classified_from_stderr() {
    let tmp = tempfile::tempdir().unwrap();
    let script = failing_script(tmp.path(), "limited.sh", "rate limit exceeded", 1);

    let adapter = builtin_adapter("qwen").unwrap();
    let task = task_input(tmp.path(), "task-classify", command_override(&script));
    let run_ref = adapter.run(&task).await.unwrap();
    let status = wait_terminal(&adapter, &run_ref).await;

    assert_eq!(status.attempt_state, AttemptState::Failed);
    assert_eq!(status.error_kind, Some(ErrorKind::RetryableRateLimit));

    let record: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(status.output_path.unwrap()).unwrap())
            .unwrap();
    assert_eq!(record["success"], false);
    assert_eq!(record["error_kind"], "RETRYABLE_RATE_LIMIT");
}

#[tokio::test]
async fn warnings_are_recorded_without_failing_the_run() {
    let tmp = tempfile::tempdir().unwrap();
    let payload = sample_findings_payload("w1", "low", "wfp");
    let body = format!(
        "echo 'mcp server failed to start' >&2\ncat <<'EOF'\n{payload}\nEOF"
    );
    let script = write_provider_script(tmp.path(), "warny.sh", &body);

    let adapter = builtin_adapter("opencode").unwrap();
    let task = task_input(tmp.path(), "task-warnings", command_override(&script));
    let run_ref = adapter.run(&task).await.unwrap();
    let status = wait_terminal(&adapter, &run_ref).await;

    assert_eq!(status.attempt_state, AttemptState::Succeeded);
    let record: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(status.output_path.unwrap()).unwrap())
            .unwrap();
    assert_eq!(
        record["warnings"],
        serde_json::json!(["PROVIDER_WARNING_MCP_STARTUP"])
    );
}

// -----------------------------------------------------------------------
// Handle lifecycle
// -----------------------------------------------------------------------

#[tokio::test]
async fn handle_released_after_terminal_poll() {
    let tmp = tempfile::tempdir().unwrap();
    let script = write_provider_script(tmp.path(), "quick.sh", "echo ok");

    let adapter = builtin_adapter("claude").unwrap();
    let task = task_input(tmp.path(), "task-handle-release", command_override(&script));
    let run_ref = adapter.run(&task).await.unwrap();
    assert!(adapter.has_run(&run_ref.run_id).await);

    let status = wait_terminal(&adapter, &run_ref).await;
    assert!(status.completed);
    assert!(!adapter.has_run(&run_ref.run_id).await);
    assert_eq!(adapter.active_runs().await, 0);
}

#[tokio::test]
async fn poll_after_release_reports_missing_handle() {
    let tmp = tempfile::tempdir().unwrap();
    let script = write_provider_script(tmp.path(), "quick.sh", "echo ok");

    let adapter = builtin_adapter("claude").unwrap();
    let task = task_input(tmp.path(), "task-poll-after", command_override(&script));
    let run_ref = adapter.run(&task).await.unwrap();
    wait_terminal(&adapter, &run_ref).await;

    let status = adapter.poll(&run_ref).await.unwrap();
    assert!(status.completed);
    assert_eq!(status.attempt_state, AttemptState::Expired);
    assert_eq!(status.error_kind, Some(ErrorKind::NonRetryableInvalidInput));
    assert_eq!(status.message, "run_handle_not_found");
}

#[tokio::test]
async fn poll_of_unknown_run_id_is_synthetic_terminal() {
    let adapter = builtin_adapter("codex").unwrap();
    let bogus = TaskRunRef {
        task_id: "task-unknown".to_string(),
        provider: "codex".to_string(),
        run_id: "codex-000000000000".to_string(),
        artifact_path: "/tmp/nowhere".into(),
        started_at: Utc::now(),
        pid: 0,
        session_id: None,
    };
    let status = adapter.poll(&bogus).await.unwrap();
    assert!(status.completed);
    assert_eq!(status.attempt_state, AttemptState::Expired);
    assert_eq!(status.error_kind, Some(ErrorKind::NonRetryableInvalidInput));
    assert_eq!(status.message, "run_handle_not_found");
    assert!(status.output_path.is_none());
}

#[tokio::test]
async fn cancel_kills_long_running_child() {
    let tmp = tempfile::tempdir().unwrap();
    let script = sleeping_script(tmp.path(), "sleepy.sh", 10);

    let adapter = builtin_adapter("claude").unwrap();
    let task = task_input(tmp.path(), "task-cancel", command_override(&script));
    let run_ref = adapter.run(&task).await.unwrap();

    adapter.cancel(&run_ref).await.unwrap();
    assert!(!adapter.has_run(&run_ref.run_id).await);

    // A poll after cancellation must still observe a terminal state.
    let status = adapter.poll(&run_ref).await.unwrap();
    assert!(status.completed);
}

#[tokio::test]
async fn cancel_is_idempotent() {
    let tmp = tempfile::tempdir().unwrap();
    let script = sleeping_script(tmp.path(), "sleepy.sh", 10);

    let adapter = builtin_adapter("claude").unwrap();
    let task = task_input(tmp.path(), "task-cancel-twice", command_override(&script));
    let run_ref = adapter.run(&task).await.unwrap();

    adapter.cancel(&run_ref).await.unwrap();
    adapter.cancel(&run_ref).await.unwrap();
    assert!(!adapter.has_run(&run_ref.run_id).await);
}

#[tokio::test]
async fn cancel_releases_finished_run_without_poll() {
    let tmp = tempfile::tempdir().unwrap();
    let script = write_provider_script(tmp.path(), "quick.sh", "echo done");

    let adapter = builtin_adapter("claude").unwrap();
    let task = task_input(tmp.path(), "task-cancel-finished", command_override(&script));
    let run_ref = adapter.run(&task).await.unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    adapter.cancel(&run_ref).await.unwrap();
    assert!(!adapter.has_run(&run_ref.run_id).await);
}

// -----------------------------------------------------------------------
// Environment and command handling
// -----------------------------------------------------------------------

#[tokio::test]
async fn child_environment_is_sanitized() {
    let tmp = tempfile::tempdir().unwrap();
    // Exits 0 only when CLAUDECODE is absent and PATH survived.
    let script = write_provider_script(
        tmp.path(),
        "envcheck.sh",
        "if [ -z \"$CLAUDECODE\" ] && [ -n \"$PATH\" ]; then exit 0; else exit 1; fi",
    );

    let adapter = builtin_adapter("claude").unwrap();
    let task = task_input(tmp.path(), "task-env-check", command_override(&script));

    unsafe { std::env::set_var("CLAUDECODE", "1") };
    let run_ref = adapter.run(&task).await.unwrap();
    let status = wait_terminal(&adapter, &run_ref).await;
    unsafe { std::env::remove_var("CLAUDECODE") };

    assert_eq!(status.attempt_state, AttemptState::Succeeded);
}

#[tokio::test]
async fn empty_command_override_is_refused() {
    let tmp = tempfile::tempdir().unwrap();
    let adapter = builtin_adapter("claude").unwrap();
    let task = task_input(tmp.path(), "task-empty-cmd", Vec::new());

    let error = adapter.run(&task).await.unwrap_err();
    assert!(error.to_string().contains("empty"));
    assert_eq!(adapter.active_runs().await, 0);
}

#[tokio::test]
async fn missing_binary_fails_spawn_without_leaking_a_handle() {
    let tmp = tempfile::tempdir().unwrap();
    let adapter = builtin_adapter("claude").unwrap();
    let task = task_input(
        tmp.path(),
        "task-missing-binary",
        vec!["/nonexistent/path/to/claude".to_string()],
    );

    let error = adapter.run(&task).await.unwrap_err();
    assert!(error.to_string().contains("failed to spawn"));
    assert_eq!(adapter.active_runs().await, 0);
}
