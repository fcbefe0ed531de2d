//! Command line surface
//!
//! `send` submits one transaction, `sendBatch` submits a range of rows from
//! a batch file. Flags override values loaded from the config file.

use crate::batch::{open_row_source, BatchDispatcher, TransactionIntent};
use crate::chain::RpcClient;
use crate::config::Settings;
use crate::tx::TransactionSender;
use crate::wallet::{read_passphrase, KeystoreDir};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about = "Send signed Ethereum transactions, one at a time or in batches")]
pub struct Cli {
    /// Configuration file
    #[arg(long, global = true, env = "TXDISPATCH_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send a single transaction
    Send(SendArgs),
    /// Send a range of rows from a batch file
    #[command(name = "sendBatch")]
    SendBatch(BatchArgs),
}

/// Key and node selection shared by both commands
#[derive(Args, Debug, Clone, PartialEq)]
pub struct WalletArgs {
    /// Passphrase unlocking the sender key
    #[arg(long, env = "TXDISPATCH_PASSPHRASE", hide_env_values = true)]
    pub passphrase: Option<String>,

    /// File holding the passphrase (alternative to --passphrase)
    #[arg(long, conflicts_with = "passphrase")]
    pub passphrase_file: Option<PathBuf>,

    /// Keystore directory
    #[arg(long)]
    pub keystore: Option<PathBuf>,

    /// JSON-RPC endpoint
    #[arg(long)]
    pub client: Option<String>,
}

#[derive(Args, Debug, Clone, PartialEq)]
pub struct SendArgs {
    #[command(flatten)]
    pub wallet: WalletArgs,

    /// Sender address
    #[arg(long)]
    pub sender: String,

    /// Recipient address; leave empty to deploy `--data` as a contract
    #[arg(long, default_value = "")]
    pub receiver: String,

    /// Value in wei
    #[arg(long, default_value = "0")]
    pub value: String,

    /// Hex encoded call data or contract code
    #[arg(long, default_value = "")]
    pub data: String,

    /// Wait for the transaction to be mined
    #[arg(long)]
    pub sync: bool,
}

#[derive(Args, Debug, Clone, PartialEq)]
pub struct BatchArgs {
    #[command(flatten)]
    pub wallet: WalletArgs,

    /// Batch file (`.xlsx` or comma separated text)
    #[arg(long)]
    pub batch_file: PathBuf,

    /// First row to send (0-based)
    #[arg(long, default_value_t = 0)]
    pub begin: usize,

    /// Row after the last one to send; defaults to the row count
    #[arg(long)]
    pub end: Option<usize>,

    /// Token definitions used by macro payloads
    #[arg(long)]
    pub token_file: Option<PathBuf>,

    /// Worksheet to read from `.xlsx` files
    #[arg(long)]
    pub sheet: Option<String>,
}

/// Load settings and run the selected command
pub async fn run(cli: Cli) -> Result<()> {
    let mut settings = Settings::load(cli.config.as_deref())?;

    match cli.command {
        Command::Send(args) => {
            apply_wallet_overrides(&mut settings, &args.wallet);
            send(&settings, &args).await
        }
        Command::SendBatch(args) => {
            apply_wallet_overrides(&mut settings, &args.wallet);
            if let Some(sheet) = &args.sheet {
                settings.batch.sheet = sheet.clone();
            }
            send_batch(&settings, &args).await
        }
    }
}

fn apply_wallet_overrides(settings: &mut Settings, wallet: &WalletArgs) {
    if let Some(client) = &wallet.client {
        settings.rpc.url = client.clone();
    }
    if let Some(keystore) = &wallet.keystore {
        settings.wallet.keystore_path = Some(keystore.clone());
    }
}

fn connect(settings: &Settings) -> Result<TransactionSender> {
    let keystore_path = settings
        .wallet
        .keystore_path
        .clone()
        .context("No keystore given; pass --keystore or set wallet.keystore_path")?;
    let keystore = KeystoreDir::open(keystore_path)?;
    let client = RpcClient::new(&settings.rpc.url)?;
    info!("Using node {}", settings.rpc.url);

    Ok(TransactionSender::new(Arc::new(client), Arc::new(keystore), settings))
}

fn default_passphrase(wallet: &WalletArgs) -> Result<String> {
    Ok(read_passphrase(
        wallet.passphrase.as_deref(),
        wallet.passphrase_file.as_deref(),
    )?)
}

async fn send(settings: &Settings, args: &SendArgs) -> Result<()> {
    let intent = TransactionIntent::parse(&args.sender, &args.receiver, &args.value, &args.data, None)?;
    let call = intent
        .to_call(None)
        .context("Macro payloads are only expanded by sendBatch")?;
    let passphrase = default_passphrase(&args.wallet)?;
    let sender = connect(settings)?;

    let hash = sender
        .send_transaction(&call, &passphrase, args.sync)
        .await
        .context("Failed to send transaction")?;
    println!("{:?}", hash);
    Ok(())
}

async fn send_batch(settings: &Settings, args: &BatchArgs) -> Result<()> {
    let passphrase = default_passphrase(&args.wallet)?;
    let sender = connect(settings)?;
    let mut source = open_row_source(&args.batch_file, &settings.batch)?;

    let dispatcher = BatchDispatcher::new(&sender, passphrase, args.token_file.clone());
    let report = dispatcher
        .run(source.as_mut(), args.begin, args.end)
        .await
        .with_context(|| format!("Batch {:?} aborted", args.batch_file))?;

    println!(
        "rows {}..{}: {} sent, {} sent but unrecorded, {} failed",
        report.range.begin,
        report.range.end,
        report.recorded(),
        report.unrecorded(),
        report.failed()
    );
    Ok(())
}
