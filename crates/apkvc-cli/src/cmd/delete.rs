use anyhow::Result;
use apkvc_core::Vault;

use crate::ui::output;

/// Delete a stored APK and its record
pub async fn delete(vault: &Vault, id: i64, quiet: bool) -> Result<()> {
    let deleted = vault.delete(id).await?;

    if !quiet {
        output::success(&format!("Deleted {}", deleted.record.stored_file_name));
        if !deleted.file_removed {
            output::warn("The stored file was already missing.");
        }
    }
    Ok(())
}
