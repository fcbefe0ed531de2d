//! txdispatch - signed Ethereum transaction dispatcher
//!
//! Sends single transactions or batches of rows read from a spreadsheet or
//! text file, signing each with a key from an encrypted keystore and
//! recording the resulting hashes back into the batch file.

use anyhow::Result;
use clap::Parser;
use tracing::info;

mod batch;
mod chain;
mod cli;
mod config;
mod error;
mod macros;
mod tx;
mod wallet;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    // Initialize logging
    init_logging();

    info!("Starting txdispatch v{}", env!("CARGO_PKG_VERSION"));

    cli::run(cli).await
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,txdispatch=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .init();
}
