//! entity-tap CLI
//!
//! Command-line interface for discovering and syncing entities

use clap::Parser;
use entity_tap::cli::{Cli, Runner};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries JSON lines only
    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted; finishing without committing in-flight entities");
            on_signal.cancel();
        }
    });

    let runner = Runner::new(cli);
    if let Err(e) = runner.run(cancel).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
