//! Main entry point for the stash-fetcher CLI

use clap::Parser;
use stash_fetcher::cli::Cli;
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber with optional JSON formatting
fn init_tracing() {
    let json_format = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("stash_fetcher=info"));

    if json_format {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();

    let result = cli.execute().await.map_err(anyhow::Error::from);

    if let Err(e) = result {
        error!("Command failed: {:#}", e);
        std::process::exit(1);
    }
}
