//! apkvc - APK version vault
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]
//!
//! Stores uploaded APKs under `{name}-{version}--{yyyyMMdd}.apk`, lists them
//! newest version first and purges anything older than the retention window.
//!
//! # Directory Layout
//!
//! ```text
//! ~/.apkvc/
//! ├── config.toml   # Optional configuration
//! ├── catalog.db    # SQLite catalog
//! ├── files/        # Stored APKs, one subdirectory per client
//! ├── lib/          # AXMLPrinter2.jar
//! └── tmp/          # Per-upload scratch directories
//! ```

pub mod cmd;
pub mod ui;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "apkvc")]
#[command(author, version, about = "apkvc - APK version vault")]
pub struct Cli {
    /// Config file (default: ~/.apkvc/config.toml)
    #[arg(long, global = true, env = "APKVC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Ingest an APK
    Upload {
        /// Path to the .apk file
        file: PathBuf,
        /// Client (tenant) the APK belongs to
        #[arg(long)]
        client: Option<String>,
    },
    /// List stored APKs, highest version first
    List {
        /// Package name substring
        #[arg(long)]
        name: Option<String>,
        /// Exact version
        #[arg(long = "version", value_name = "VERSION")]
        app_version: Option<String>,
        /// Client substring
        #[arg(long)]
        client: Option<String>,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Copy a stored APK out of the vault
    Download {
        /// Artifact id
        id: i64,
        /// Destination file or directory (default: current directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Delete a stored APK and its record
    Delete {
        /// Artifact id
        id: i64,
    },
    /// Purge APKs older than the retention window
    Sweep,
    /// Run the retention sweeper until interrupted
    Serve,
    /// Check configuration and the manifest decoder runtime
    Doctor,
}
