//! apkvc - APK version vault CLI

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use apkvc_cli::cmd;
use apkvc_cli::ui::output;
use apkvc_cli::{Cli, Commands};

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            output::error(&err);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let vault = cmd::open_vault(cli.config.as_deref())?;
    let quiet = cli.quiet;

    match cli.command {
        Commands::Upload { file, client } => {
            cmd::upload::upload(&vault, &file, client.as_deref(), quiet).await
        }
        Commands::List {
            name,
            app_version,
            client,
            json,
        } => cmd::list::list(&vault, name, app_version, client, json).await,
        Commands::Download { id, output } => {
            cmd::download::download(&vault, id, output.as_deref(), quiet).await
        }
        Commands::Delete { id } => cmd::delete::delete(&vault, id, quiet).await,
        Commands::Sweep => cmd::sweep::sweep(&vault, quiet).await,
        Commands::Serve => cmd::serve::serve(&vault).await,
        Commands::Doctor => cmd::doctor::doctor(&vault).await,
    }
}
