pub mod cli;
pub mod cmd;
pub mod config;
pub mod error;
pub mod fs;
pub mod preflight;
pub mod provision;
pub mod types;

use anyhow::Result;
use clap::Parser as _;
use cmd::IntoCommand as _;
use tracing_subscriber::{layer::SubscriberExt as _, util::SubscriberInitExt as _};

pub async fn run() -> Result<()> {
    let filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    crate::fs::set_verbose(tracing::enabled!(target: "vaultstrap", tracing::Level::DEBUG)).await;

    let args = cli::Cli::parse();
    args.command.into_command().run().await?;

    Ok(())
}
