//! `mco run`: dispatch the prompt to each provider and print the raw run
//! results, without aggregation or a verdict.

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use mco_core::engine::{ReviewEngine, ReviewRequest};

pub async fn run_dispatch(engine: &ReviewEngine, request: &ReviewRequest) -> Result<()> {
    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let runs = engine.dispatch_providers(request, cancel).await?;
    println!("{}", serde_json::to_string_pretty(&runs)?);
    Ok(())
}
