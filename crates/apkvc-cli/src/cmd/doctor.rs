use anyhow::Result;
use apkvc_core::Vault;

use crate::ui::output;

/// Report configuration and check the decoder runtime
pub async fn doctor(vault: &Vault) -> Result<()> {
    let config = vault.config();
    output::detail("home", &config.home.display().to_string());
    output::detail("storage", &config.storage_root.display().to_string());
    output::detail("catalog", &format!("{} ({})", config.catalog, config.database_path.display()));
    output::detail("decoder jar", &config.decoder.jar.display().to_string());

    let status = vault.check_decoder().await?;
    output::success(&format!("Manifest decoder ready: {status}"));
    Ok(())
}
