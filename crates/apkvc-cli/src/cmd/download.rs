use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use apkvc_core::Vault;

use crate::ui::output;

/// Copy a stored APK to `out` (a file or an existing directory)
pub async fn download(vault: &Vault, id: i64, out: Option<&Path>, quiet: bool) -> Result<()> {
    let target = vault.download(id).await?;

    let dest = match out {
        Some(path) if path.is_dir() => path.join(&target.file_name),
        Some(path) => path.to_path_buf(),
        None => PathBuf::from(&target.file_name),
    };

    let bytes = tokio::fs::copy(&target.path, &dest)
        .await
        .with_context(|| format!("Failed to write {}", dest.display()))?;

    if !quiet {
        output::success(&format!(
            "Saved {} ({}, {})",
            dest.display(),
            output::format_size(bytes),
            target.content_type
        ));
    }
    Ok(())
}
