//! Shared provider supervision: spawn, poll, cancel, record.
//!
//! [`ShimAdapter`] implements the supervised lifecycle once over a
//! [`ProviderSpec`] strategy. Each run spawns the provider in its own
//! process group (providers fork helpers of their own), captures stdout
//! and stderr to files, and leaves a per-provider result record behind on
//! terminal poll.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use super::env::sanitized_env;
use super::spec::{AdapterError, ProviderAdapter, ProviderSpec};
use super::types::{
    CapabilitySet, NormalizeContext, NormalizedFinding, ProviderPresence, TaskInput, TaskRunRef,
    TaskStatus,
};
use crate::artifacts::ArtifactPaths;
use crate::errors::{classify_error, detect_warnings};
use crate::types::{AttemptState, ErrorKind};

/// Fallback artifact root when the task metadata names none.
const DEFAULT_ARTIFACT_ROOT: &str = "/tmp/mco";

/// How long to wait after SIGTERM before escalating to SIGKILL.
const TERM_GRACE: Duration = Duration::from_millis(200);

/// How long to wait after SIGKILL before releasing the handle.
const KILL_GRACE: Duration = Duration::from_millis(100);

/// Auth-probe output markers indicating a broken provider configuration.
const PROBE_CONFIG_MARKERS: &[&str] = &[
    "configuration",
    "config",
    "unknown key",
    "invalid",
    "toml",
    "yaml",
];

/// Auth-probe output markers indicating a credential problem.
const PROBE_AUTH_MARKERS: &[&str] = &[
    "not logged",
    "auth",
    "unauthorized",
    "token",
    "api key",
    "login",
];

/// Book-keeping for one live run, exclusively owned by its adapter.
struct RunHandle {
    child: Child,
    pid: u32,
    command: Vec<String>,
    started_at: DateTime<Utc>,
    stdout_path: PathBuf,
    stderr_path: PathBuf,
    provider_result_path: PathBuf,
}

/// Shared supervision base for every provider adapter.
pub struct ShimAdapter {
    spec: Box<dyn ProviderSpec>,
    runs: Mutex<HashMap<String, RunHandle>>,
}

impl std::fmt::Debug for ShimAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShimAdapter")
            .field("provider", &self.spec.provider_id())
            .finish()
    }
}

impl ShimAdapter {
    pub fn new(spec: Box<dyn ProviderSpec>) -> Self {
        Self {
            spec,
            runs: Mutex::new(HashMap::new()),
        }
    }

    /// Whether a run handle is still registered. Exposed for diagnostics
    /// and handle-release assertions.
    pub async fn has_run(&self, run_id: &str) -> bool {
        self.runs.lock().await.contains_key(run_id)
    }

    /// Number of live run handles.
    pub async fn active_runs(&self) -> usize {
        self.runs.lock().await.len()
    }

    fn synthetic_missing_handle_status(&self, run_ref: &TaskRunRef) -> TaskStatus {
        TaskStatus {
            task_id: run_ref.task_id.clone(),
            provider: self.spec.provider_id().to_string(),
            run_id: run_ref.run_id.clone(),
            attempt_state: AttemptState::Expired,
            completed: true,
            heartbeat_at: None,
            output_path: None,
            error_kind: Some(ErrorKind::NonRetryableInvalidInput),
            exit_code: None,
            message: "run_handle_not_found".to_string(),
        }
    }

    async fn probe_version(&self, binary: &Path) -> Option<String> {
        let output = Command::new(binary)
            .arg("--version")
            .env_clear()
            .envs(sanitized_env())
            .output()
            .await
            .ok()?;
        let text = if output.stdout.is_empty() {
            String::from_utf8_lossy(&output.stderr).into_owned()
        } else {
            String::from_utf8_lossy(&output.stdout).into_owned()
        };
        text.lines().last().map(|line| line.trim().to_string())
    }

    async fn probe_auth(&self, binary: &Path) -> (bool, String) {
        let cmd = self.spec.auth_check_command(binary);
        let Some((program, args)) = cmd.split_first() else {
            return (false, "probe_unknown_error".to_string());
        };
        let output = Command::new(program)
            .args(args)
            .env_clear()
            .envs(sanitized_env())
            .output()
            .await;
        let output = match output {
            Ok(output) => output,
            Err(error) => {
                debug!(provider = self.spec.provider_id(), %error, "auth probe failed to run");
                return (false, "probe_unknown_error".to_string());
            }
        };
        if output.status.success() {
            return (true, "ok".to_string());
        }

        let text = format!(
            "{}\n{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        )
        .to_lowercase();
        if PROBE_CONFIG_MARKERS.iter().any(|m| text.contains(m)) {
            (false, "probe_config_error".to_string())
        } else if PROBE_AUTH_MARKERS.iter().any(|m| text.contains(m)) {
            (false, "auth_check_failed".to_string())
        } else {
            (false, "probe_unknown_error".to_string())
        }
    }

    /// Write the terminal result record and release the handle.
    ///
    /// Capture-file reads treat a missing file as empty content; the JSON
    /// write is atomic (temp file + rename) and its failure propagates --
    /// that is an infrastructure fault, not a provider error.
    fn finish_run(
        &self,
        run_ref: &TaskRunRef,
        handle: &RunHandle,
        exit_code: Option<i32>,
    ) -> Result<TaskStatus, AdapterError> {
        let stdout_text = std::fs::read_to_string(&handle.stdout_path).unwrap_or_default();
        let stderr_text = std::fs::read_to_string(&handle.stderr_path).unwrap_or_default();

        let success = self.spec.is_success(exit_code, &stdout_text, &stderr_text);
        let error_kind = if success {
            None
        } else {
            Some(classify_error(exit_code, &stderr_text))
        };
        let warnings: Vec<String> = detect_warnings(&stderr_text)
            .into_iter()
            .map(|w| w.as_str().to_string())
            .collect();

        let payload = json!({
            "provider": self.spec.provider_id(),
            "task_id": run_ref.task_id,
            "run_id": run_ref.run_id,
            "pid": handle.pid,
            "command": handle.command,
            "started_at": handle.started_at.to_rfc3339(),
            "completed_at": Utc::now().to_rfc3339(),
            "exit_code": exit_code,
            "success": success,
            "error_kind": error_kind.map(|kind| kind.as_str()),
            "warnings": warnings,
            "stdout_path": handle.stdout_path.to_string_lossy(),
            "stderr_path": handle.stderr_path.to_string_lossy(),
        });
        write_json_atomic(&handle.provider_result_path, &payload)?;

        debug!(
            provider = self.spec.provider_id(),
            run_id = %run_ref.run_id,
            exit_code,
            success,
            "provider run reached terminal state"
        );

        Ok(TaskStatus {
            task_id: run_ref.task_id.clone(),
            provider: self.spec.provider_id().to_string(),
            run_id: run_ref.run_id.clone(),
            attempt_state: if success {
                AttemptState::Succeeded
            } else {
                AttemptState::Failed
            },
            completed: true,
            heartbeat_at: Some(Utc::now()),
            output_path: Some(handle.provider_result_path.clone()),
            error_kind,
            exit_code,
            message: "completed".to_string(),
        })
    }
}

#[async_trait]
impl ProviderAdapter for ShimAdapter {
    fn provider_id(&self) -> &str {
        self.spec.provider_id()
    }

    fn capabilities(&self) -> CapabilitySet {
        self.spec.capabilities()
    }

    async fn detect(&self) -> ProviderPresence {
        let provider = self.spec.provider_id().to_string();
        let env = sanitized_env();
        let path_var = env.get("PATH").cloned().unwrap_or_default();
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

        let binary = match which::which_in(self.spec.binary_name(), Some(path_var), cwd) {
            Ok(path) => path,
            Err(_) => {
                return ProviderPresence {
                    provider,
                    detected: false,
                    binary_path: None,
                    version: None,
                    auth_ok: false,
                    reason: "binary_not_found".to_string(),
                };
            }
        };

        let version = self.probe_version(&binary).await;
        let (auth_ok, reason) = self.probe_auth(&binary).await;
        ProviderPresence {
            provider,
            detected: true,
            binary_path: Some(binary),
            version,
            auth_ok,
            reason,
        }
    }

    async fn run(&self, input: &TaskInput) -> Result<TaskRunRef, AdapterError> {
        let command = match &input.metadata.command_override {
            Some(command) => command.clone(),
            None => self.spec.build_command(input),
        };
        let Some((program, args)) = command.split_first() else {
            return Err(AdapterError::EmptyCommand);
        };

        let provider = self.spec.provider_id();
        let artifact_root = input
            .metadata
            .artifact_root
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ARTIFACT_ROOT));
        let paths = ArtifactPaths::new(&artifact_root, &input.task_id)?;
        paths.ensure_directories()?;

        let stdout_path = paths.stdout_log(provider)?;
        let stderr_path = paths.stderr_log(provider)?;
        let provider_result_path = paths.provider_result(provider)?;
        let stdout_file = std::fs::File::create(&stdout_path)?;
        let stderr_file = std::fs::File::create(&stderr_path)?;

        let mut builder = Command::new(program);
        builder
            .args(args)
            .current_dir(&input.repo_root)
            .env_clear()
            .envs(sanitized_env())
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::from(stdout_file))
            .stderr(std::process::Stdio::from(stderr_file));
        // New session, new process group: cancellation signals the whole
        // group, so provider-spawned helpers die with the provider.
        #[cfg(unix)]
        unsafe {
            builder.pre_exec(|| {
                if libc::setsid() == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }

        let child = builder.spawn().map_err(|source| AdapterError::Spawn {
            binary: program.clone(),
            source,
        })?;
        let pid = child.id().ok_or(AdapterError::MissingPid)?;

        let run_id = format!("{provider}-{}", &Uuid::new_v4().simple().to_string()[..12]);
        let started_at = Utc::now();

        debug!(provider, run_id = %run_id, pid, "spawned provider child");

        let mut runs = self.runs.lock().await;
        runs.insert(
            run_id.clone(),
            RunHandle {
                child,
                pid,
                command,
                started_at,
                stdout_path,
                stderr_path,
                provider_result_path,
            },
        );

        Ok(TaskRunRef {
            task_id: input.task_id.clone(),
            provider: provider.to_string(),
            run_id,
            artifact_path: paths.root().to_path_buf(),
            started_at,
            pid,
            session_id: None,
        })
    }

    async fn poll(&self, run_ref: &TaskRunRef) -> Result<TaskStatus, AdapterError> {
        let mut runs = self.runs.lock().await;
        let exit_status = match runs.get_mut(&run_ref.run_id) {
            None => return Ok(self.synthetic_missing_handle_status(run_ref)),
            Some(handle) => match handle.child.try_wait()? {
                None => {
                    return Ok(TaskStatus {
                        task_id: run_ref.task_id.clone(),
                        provider: self.spec.provider_id().to_string(),
                        run_id: run_ref.run_id.clone(),
                        attempt_state: AttemptState::Started,
                        completed: false,
                        heartbeat_at: Some(Utc::now()),
                        output_path: Some(handle.provider_result_path.clone()),
                        error_kind: None,
                        exit_code: None,
                        message: "running".to_string(),
                    });
                }
                Some(exit_status) => exit_status,
            },
        };

        match runs.remove(&run_ref.run_id) {
            Some(handle) => self.finish_run(run_ref, &handle, exit_status.code()),
            None => Ok(self.synthetic_missing_handle_status(run_ref)),
        }
    }

    async fn cancel(&self, run_ref: &TaskRunRef) -> Result<(), AdapterError> {
        let mut runs = self.runs.lock().await;
        let Some(handle) = runs.get_mut(&run_ref.run_id) else {
            return Ok(());
        };

        // Already exited: reap and release.
        if handle.child.try_wait()?.is_some() {
            runs.remove(&run_ref.run_id);
            return Ok(());
        }

        let pid = handle.pid;
        match signal_process_group(pid, TERM_SIGNAL) {
            SignalOutcome::Delivered => {}
            SignalOutcome::AlreadyGone => {
                runs.remove(&run_ref.run_id);
                return Ok(());
            }
            SignalOutcome::Error(source) => {
                return Err(AdapterError::Signal {
                    pgid: pid as i32,
                    source,
                });
            }
        }
        tokio::time::sleep(TERM_GRACE).await;

        if handle.child.try_wait()?.is_none() {
            match signal_process_group(pid, KILL_SIGNAL) {
                SignalOutcome::Delivered => {
                    tokio::time::sleep(KILL_GRACE).await;
                }
                SignalOutcome::AlreadyGone => {}
                SignalOutcome::Error(source) => {
                    return Err(AdapterError::Signal {
                        pgid: pid as i32,
                        source,
                    });
                }
            }
        }

        // Reap if possible, then release unconditionally: a handle must
        // never outlive its cancellation.
        if let Err(error) = handle.child.try_wait() {
            warn!(pid, %error, "could not reap cancelled child");
        }
        runs.remove(&run_ref.run_id);
        Ok(())
    }

    fn normalize(&self, raw: &str, ctx: &mut NormalizeContext) -> Vec<NormalizedFinding> {
        self.spec.normalize(raw, ctx)
    }
}

#[cfg(unix)]
const TERM_SIGNAL: i32 = libc::SIGTERM;
#[cfg(unix)]
const KILL_SIGNAL: i32 = libc::SIGKILL;
#[cfg(not(unix))]
const TERM_SIGNAL: i32 = 15;
#[cfg(not(unix))]
const KILL_SIGNAL: i32 = 9;

enum SignalOutcome {
    Delivered,
    /// The process (group) no longer exists; treat as already exited.
    AlreadyGone,
    Error(std::io::Error),
}

/// Signal the child's process group (the child is its own group leader).
#[cfg(unix)]
fn signal_process_group(pid: u32, signal: i32) -> SignalOutcome {
    let ret = unsafe { libc::killpg(pid as libc::pid_t, signal) };
    if ret == 0 {
        return SignalOutcome::Delivered;
    }
    let error = std::io::Error::last_os_error();
    if error.raw_os_error() == Some(libc::ESRCH) {
        SignalOutcome::AlreadyGone
    } else {
        SignalOutcome::Error(error)
    }
}

#[cfg(not(unix))]
fn signal_process_group(_pid: u32, _signal: i32) -> SignalOutcome {
    // Group signalling is a Unix concept; elsewhere the caller falls back
    // to the tokio kill-on-drop behavior.
    SignalOutcome::AlreadyGone
}

/// Serialize `value` with ASCII escaping and 2-space indentation, writing
/// through a temp file so readers never observe a partial record.
fn write_json_atomic(path: &Path, value: &serde_json::Value) -> Result<(), AdapterError> {
    let rendered =
        serde_json::to_string_pretty(value).map_err(|error| AdapterError::ResultWrite {
            path: path.to_path_buf(),
            message: error.to_string(),
        })?;
    let rendered = ascii_escape(&rendered);

    let tmp_path = path.with_extension("json.tmp");
    let write_err = |error: std::io::Error| AdapterError::ResultWrite {
        path: path.to_path_buf(),
        message: error.to_string(),
    };
    std::fs::write(&tmp_path, rendered).map_err(write_err)?;
    std::fs::rename(&tmp_path, path).map_err(write_err)?;
    Ok(())
}

/// Escape every non-ASCII character as `\uXXXX` (surrogate pairs beyond
/// the BMP). Safe on a whole JSON document: non-ASCII bytes can only occur
/// inside string literals.
fn ascii_escape(json: &str) -> String {
    if json.is_ascii() {
        return json.to_string();
    }
    let mut out = String::with_capacity(json.len());
    let mut units = [0u16; 2];
    for ch in json.chars() {
        if ch.is_ascii() {
            out.push(ch);
        } else {
            for unit in ch.encode_utf16(&mut units) {
                out.push_str(&format!("\\u{unit:04x}"));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_escape_passthrough_for_ascii() {
        let text = r#"{"key": "value"}"#;
        assert_eq!(ascii_escape(text), text);
    }

    #[test]
    fn ascii_escape_bmp_and_astral() {
        assert_eq!(ascii_escape("\"caf\u{e9}\""), "\"caf\\u00e9\"");
        // U+1F600 encodes as a surrogate pair.
        assert_eq!(ascii_escape("\"\u{1F600}\""), "\"\\ud83d\\ude00\"");
    }

    #[test]
    fn atomic_write_leaves_no_temp_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("claude.json");
        let payload = json!({"provider": "claude", "note": "r\u{e9}sum\u{e9}"});
        write_json_atomic(&path, &payload).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\\u00e9"));
        assert!(text.is_ascii());
        let back: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(back, payload);
        assert!(!tmp.path().join("claude.json.tmp").exists());
    }
}
