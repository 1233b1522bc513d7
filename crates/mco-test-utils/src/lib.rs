//! Shared test utilities for mco integration tests.
//!
//! Real provider binaries are not available (or welcome) in CI, so tests
//! drive the adapters with small executable shell scripts installed into a
//! temp directory and injected via the task's `command_override`.

use std::path::{Path, PathBuf};

/// Write an executable `/bin/sh` script and return its path.
///
/// `body` is appended verbatim after the shebang line.
pub fn write_provider_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    let script = format!("#!/bin/sh\n{body}\n");
    std::fs::write(&path, script).expect("write provider script");

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
            .expect("chmod provider script");
    }

    path
}

/// Script that prints `payload` on stdout and exits 0.
pub fn findings_script(dir: &Path, name: &str, payload: &str) -> PathBuf {
    write_provider_script(dir, name, &format!("cat <<'EOF'\n{payload}\nEOF"))
}

/// Script that sleeps for `seconds` (used for cancel/expiry tests).
pub fn sleeping_script(dir: &Path, name: &str, seconds: u32) -> PathBuf {
    write_provider_script(dir, name, &format!("sleep {seconds}"))
}

/// Script that prints `stderr_text` on stderr and exits with `code`.
pub fn failing_script(dir: &Path, name: &str, stderr_text: &str, code: i32) -> PathBuf {
    write_provider_script(
        dir,
        name,
        &format!("echo \"{stderr_text}\" >&2\nexit {code}"),
    )
}

/// A `command_override` invoking the given script.
pub fn command_override(script: &Path) -> Vec<String> {
    vec![script.to_string_lossy().into_owned()]
}

/// A canonical single-finding payload for contract tests.
pub fn sample_findings_payload(finding_id: &str, severity: &str, fingerprint: &str) -> String {
    format!(
        concat!(
            r#"{{"findings":[{{"finding_id":"{id}","severity":"{severity}","#,
            r#""category":"bug","title":"title {id}","#,
            r#""evidence":{{"file":"src/lib.rs","line":1,"snippet":"x"}},"#,
            r#""recommendation":"fix {id}","confidence":0.9,"fingerprint":"{fp}"}}]}}"#
        ),
        id = finding_id,
        severity = severity,
        fp = fingerprint,
    )
}
