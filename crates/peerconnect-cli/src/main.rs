//! PeerConnect CLI entry point

use anyhow::Context;
use clap::Parser;
use tracing::info;

use peerconnect_cli::{cli::Cli, commands::CommandDispatcher, config::AppConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = load_configuration(&cli)?;
    config.apply_env_overrides();
    if let Some(data_dir) = &cli.data_dir {
        config.storage.data_dir = Some(data_dir.into());
    }
    config.logging.verbose |= cli.verbose;

    setup_logging(config.logging.verbose);
    config.validate()?;
    info!("Data directory: {}", config.data_dir().display());

    CommandDispatcher::execute(cli.command, config)
        .await
        .context("command failed")?;
    Ok(())
}

/// Setup logging based on verbosity level
fn setup_logging(verbose: bool) {
    let log_level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

/// Load configuration from file or use defaults
fn load_configuration(cli: &Cli) -> anyhow::Result<AppConfig> {
    match &cli.config {
        Some(path) => AppConfig::load_from_file(path)
            .with_context(|| format!("failed to load configuration from {}", path)),
        None => Ok(AppConfig::default()),
    }
}
