//! Loading and writing the mco settings file.
//!
//! Settings live in a `config.toml` under the XDG config home. Each value
//! is layered: a command-line flag beats an `MCO_*` environment variable,
//! which beats the file, which beats the built-in defaults.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use mco_core::config::ReviewConfig;

const CONFIG_DIR_NAME: &str = "mco";
const CONFIG_FILE_NAME: &str = "config.toml";

/// Directory holding the settings file.
///
/// XDG layout on every platform: `$XDG_CONFIG_HOME/mco` when the variable
/// is set, `~/.config/mco` otherwise.
pub fn config_dir() -> PathBuf {
    let base = std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
        .unwrap_or_else(|| PathBuf::from("."));
    base.join(CONFIG_DIR_NAME)
}

/// Full path of the settings file.
pub fn config_path() -> PathBuf {
    config_dir().join(CONFIG_FILE_NAME)
}

/// Load the config file.
///
/// An explicitly named file must exist; the default location is optional
/// and yields `None` when absent.
pub fn load_config(explicit: Option<&Path>) -> Result<Option<ReviewConfig>> {
    let (path, required) = match explicit {
        Some(path) => (path.to_path_buf(), true),
        None => (config_path(), false),
    };
    if !path.exists() {
        if required {
            bail!("config file not found: {}", path.display());
        }
        return Ok(None);
    }
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    let config = ReviewConfig::from_toml_str(&contents)
        .with_context(|| format!("failed to parse config file at {}", path.display()))?;
    Ok(Some(config))
}

/// Execute `mco init`: write a starter config file with the defaults.
pub fn cmd_init(force: bool) -> Result<()> {
    let path = config_path();
    if path.exists() && !force {
        bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let dir = config_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create config directory {}", dir.display()))?;

    let config = ReviewConfig::default();
    std::fs::write(&path, config.to_toml_string()?)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    println!("Config written to {}", path.display());
    println!("  providers = {:?}", config.providers);
    println!("  artifact_base = {}", config.artifact_base);
    Ok(())
}

/// Parse a comma-separated provider list.
pub fn split_provider_list(list: &str) -> Result<Vec<String>> {
    let providers: Vec<String> = list
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(String::from)
        .collect();
    if providers.is_empty() {
        bail!("provider list is empty");
    }
    Ok(providers)
}

/// Resolve the effective config: CLI flag > `MCO_PROVIDERS` env var >
/// config file > built-in defaults.
pub fn resolve(
    config_flag: Option<&Path>,
    providers_flag: Option<&str>,
    max_retries: Option<u32>,
    timeout_seconds: Option<u64>,
) -> Result<ReviewConfig> {
    let mut config = load_config(config_flag)?.unwrap_or_default();

    let providers = providers_flag
        .map(str::to_string)
        .or_else(|| std::env::var("MCO_PROVIDERS").ok());
    if let Some(list) = providers {
        config.providers = split_provider_list(&list)?;
    }
    if let Some(retries) = max_retries {
        config.policy.max_retries = retries;
    }
    if let Some(timeout) = timeout_seconds {
        config.policy.timeout_seconds = timeout;
    }
    Ok(config)
}
