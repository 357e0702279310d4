use std::path::Path;

use anyhow::Result;
use apkvc_core::{UPLOAD_SUCCESS_MESSAGE, Vault};

use crate::ui::output;

/// Ingest a local APK
pub async fn upload(vault: &Vault, file: &Path, client: Option<&str>, quiet: bool) -> Result<()> {
    let record = vault.ingest_file(file, client).await?;

    if !quiet {
        output::success(UPLOAD_SUCCESS_MESSAGE);
        output::detail("id", &record.id.to_string());
        output::detail("version", &record.version);
        output::detail("stored as", &record.stored_file_name);
        if let Some(client) = &record.client {
            output::detail("client", client);
        }
    }
    Ok(())
}
