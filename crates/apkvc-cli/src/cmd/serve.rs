use anyhow::{Context, Result};
use apkvc_core::{RetentionSweeper, Vault};
use tokio_util::sync::CancellationToken;

use crate::ui::output;

/// Run the retention sweeper until Ctrl-C
pub async fn serve(vault: &Vault) -> Result<()> {
    let retention = &vault.config().retention;
    let sweeper = RetentionSweeper::spawn(
        vault.retention().clone(),
        retention,
        CancellationToken::new(),
    );

    output::info(&format!(
        "Retention sweeper running every {}s (window: {} months). Press Ctrl-C to stop.",
        retention.interval_secs, retention.window_months
    ));

    let signal = tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl-C");
    sweeper.shutdown().await;
    signal?;

    output::info("Sweeper stopped.");
    Ok(())
}
