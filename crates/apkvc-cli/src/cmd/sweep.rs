use anyhow::Result;
use apkvc_core::Vault;

use crate::ui::output;

/// Run one retention sweep now
pub async fn sweep(vault: &Vault, quiet: bool) -> Result<()> {
    let report = vault.sweep().await?;

    for failure in &report.failures {
        output::warn(&failure.to_string());
    }
    if !quiet {
        output::success(&format!(
            "Examined {}, deleted {}, {} already missing, {} failed",
            report.examined,
            report.deleted,
            report.skipped_missing_file,
            report.failures.len()
        ));
    }
    Ok(())
}
