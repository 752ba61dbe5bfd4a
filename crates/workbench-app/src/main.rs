use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use workbench::{init_logging, AppConfig, Cli, WebServer};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file if it exists
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = AppConfig::load(&cli).context("Failed to load configuration")?;
    init_logging(&config.log_level)?;

    info!(
        bind = %config.bind,
        base_dir = %config.base_dir.display(),
        workspace_dir = %config.workspace_dir.display(),
        "starting workbench server"
    );

    WebServer::from_config(config).start().await
}
