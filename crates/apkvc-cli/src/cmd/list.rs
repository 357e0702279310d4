use anyhow::{Context, Result};
use apkvc_core::Vault;
use apkvc_core::schema::ListFilter;

use crate::ui::table;

/// List stored APKs, ranked and tagged
pub async fn list(
    vault: &Vault,
    name: Option<String>,
    version: Option<String>,
    client: Option<String>,
    json: bool,
) -> Result<()> {
    let filter = ListFilter {
        name,
        version,
        client,
    };
    let views = vault.list(&filter).await?;

    if json {
        let text = serde_json::to_string_pretty(&views).context("Failed to serialize listing")?;
        println!("{text}");
        return Ok(());
    }

    if views.is_empty() {
        println!();
        println!("  No APKs stored.");
        println!("  Run 'apkvc upload <file.apk>' to add one.");
        return Ok(());
    }

    println!("{}", table::artifact_table(&views));
    Ok(())
}
