//! Subcommand implementations

pub mod delete;
pub mod doctor;
pub mod download;
pub mod list;
pub mod serve;
pub mod sweep;
pub mod upload;

use std::path::Path;

use anyhow::{Context, Result};
use apkvc_core::{Config, Vault};

/// Load configuration and open the vault it describes.
pub fn open_vault(config_path: Option<&Path>) -> Result<Vault> {
    let config = Config::load(config_path).context("Failed to load configuration")?;
    tracing::debug!(
        "Opening vault at {} ({} catalog)",
        config.home.display(),
        config.catalog
    );
    Ok(Vault::open(config)?)
}
