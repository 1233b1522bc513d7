//! `mco review`: run the full review and render the requested artifact.

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use mco_core::engine::{ReviewEngine, ReviewRequest};
use mco_core::report::{format_markdown_pr, format_sarif, OutputFormat};

pub async fn run_review(
    engine: &ReviewEngine,
    request: &ReviewRequest,
    format: OutputFormat,
) -> Result<()> {
    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let result = engine.run_review(request, cancel).await?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        OutputFormat::MarkdownPr => {
            println!(
                "{}",
                format_markdown_pr(&result.report_payload(), &result.findings)
            );
        }
        OutputFormat::Sarif => {
            let sarif = format_sarif(&result.report_payload(), &result.findings);
            println!("{}", serde_json::to_string_pretty(&sarif)?);
        }
    }
    Ok(())
}
