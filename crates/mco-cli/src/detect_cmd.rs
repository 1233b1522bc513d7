//! `mco detect`: probe configured providers for presence, version, and
//! auth state.

use anyhow::Result;

use mco_core::config::ReviewConfig;
use mco_core::engine::ReviewEngine;

pub async fn run_detect(config: &ReviewConfig, as_json: bool) -> Result<()> {
    let engine = ReviewEngine::from_config(config.clone())?;
    let presences = engine.detect_providers().await;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&presences)?);
        return Ok(());
    }

    println!(
        "{:<10} {:<9} {:<8} {:<22} BINARY",
        "PROVIDER", "DETECTED", "AUTH", "REASON"
    );
    println!("{}", "-".repeat(70));
    for presence in &presences {
        let binary = presence
            .binary_path
            .as_ref()
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<10} {:<9} {:<8} {:<22} {}",
            presence.provider,
            if presence.detected { "yes" } else { "no" },
            if presence.auth_ok { "ok" } else { "no" },
            presence.reason,
            binary,
        );
        if let Some(version) = &presence.version {
            println!("{:<10} {version}", "");
        }
    }
    Ok(())
}
