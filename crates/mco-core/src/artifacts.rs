//! On-disk layout of per-task review artifacts.
//!
//! One task owns one directory tree under the artifact root:
//!
//! ```text
//! <artifact_root>/<task_id>/
//!     providers/<provider>.json      per-provider result record
//!     raw/<provider>.stdout.log      verbatim child stdout
//!     raw/<provider>.stderr.log      verbatim child stderr
//! ```
//!
//! Every path component that comes from outside -- the task id at
//! construction, the provider id at each per-provider accessor -- is
//! validated, so no input can resolve to a path outside `artifact_root`.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors raised while resolving artifact paths.
#[derive(Debug, Error)]
pub enum ArtifactError {
    /// A path component contained a separator, `..`, or was empty.
    #[error("invalid artifact path component: {0:?}")]
    InvalidComponent(String),
}

/// Resolved artifact paths for one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    root: PathBuf,
}

impl ArtifactPaths {
    /// Resolve the layout for `task_id` under `artifact_root`.
    ///
    /// The task id must be a single plain path component.
    pub fn new(artifact_root: &Path, task_id: &str) -> Result<Self, ArtifactError> {
        validate_component(task_id)?;
        Ok(Self {
            root: artifact_root.join(task_id),
        })
    }

    /// The task's artifact root directory: `<artifact_root>/<task_id>`.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding per-provider result JSON files.
    pub fn providers_dir(&self) -> PathBuf {
        self.root.join("providers")
    }

    /// Directory holding raw capture logs.
    pub fn raw_dir(&self) -> PathBuf {
        self.root.join("raw")
    }

    /// `providers/<provider>.json`.
    pub fn provider_result(&self, provider: &str) -> Result<PathBuf, ArtifactError> {
        validate_component(provider)?;
        Ok(self.providers_dir().join(format!("{provider}.json")))
    }

    /// `raw/<provider>.stdout.log`.
    pub fn stdout_log(&self, provider: &str) -> Result<PathBuf, ArtifactError> {
        validate_component(provider)?;
        Ok(self.raw_dir().join(format!("{provider}.stdout.log")))
    }

    /// `raw/<provider>.stderr.log`.
    pub fn stderr_log(&self, provider: &str) -> Result<PathBuf, ArtifactError> {
        validate_component(provider)?;
        Ok(self.raw_dir().join(format!("{provider}.stderr.log")))
    }

    /// Create the providers and raw directories (and missing parents),
    /// ignoring already-exists.
    pub fn ensure_directories(&self) -> io::Result<()> {
        std::fs::create_dir_all(self.providers_dir())?;
        std::fs::create_dir_all(self.raw_dir())?;
        Ok(())
    }
}

/// Reject components that would traverse outside the artifact root.
fn validate_component(value: &str) -> Result<(), ArtifactError> {
    let suspicious = value.is_empty()
        || value == "."
        || value == ".."
        || value.contains('/')
        || value.contains('\\');
    if suspicious {
        return Err(ArtifactError::InvalidComponent(value.to_string()));
    }
    Ok(())
}
