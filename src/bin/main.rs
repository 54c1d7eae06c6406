// vigil: synchronize validator epoch activity and compute trust scores.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use vigil_chain::{ChainClient, JsonRpcClient, RpcSettings};
use vigil_core::resolve_range;
use vigil_store::SledStore;
use vigil_sync::{compute_and_store_scores, synchronize, Settings};

#[derive(Parser)]
#[command(
    name = "vigil",
    about = "Validator epoch-activity sync and trust scoring",
    version
)]
struct Cli {
    /// Settings file (default: an optional ./vigil.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// JSON-RPC endpoint of the node, overriding the settings
    #[arg(long, global = true)]
    rpc_url: Option<String>,

    /// Database directory, overriding the settings
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Analysis window length in days, overriding the settings
    #[arg(long, global = true)]
    days: Option<u64>,

    /// Pin the window's last epoch (for reproducing a historical window)
    #[arg(long, global = true)]
    to_epoch: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve the analysis window against the live chain and print it
    Range,

    /// Fetch and persist activity for the window's missing epochs
    Sync,

    /// Compute, persist and print trust scores for the window
    Scores,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    match run().await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let mut settings = Settings::load(cli.config.as_deref()).context("loading settings")?;
    if let Some(rpc_url) = cli.rpc_url {
        settings.rpc_url = rpc_url;
    }
    if let Some(data_dir) = cli.data_dir {
        settings.data_dir = data_dir;
    }
    if let Some(days) = cli.days {
        settings.window_days = days;
    }
    if let Some(to_epoch) = cli.to_epoch {
        settings.to_epoch = Some(to_epoch);
    }

    let rpc = RpcSettings {
        url: settings.rpc_url.clone(),
        ..RpcSettings::default()
    };
    let chain = Arc::new(JsonRpcClient::new(&rpc).context("building RPC client")?);

    let policy = chain
        .get_policy_constants()
        .await
        .context("fetching policy constants")?;
    let head = chain.get_block_number().await?;
    let current_epoch = chain.get_epoch_number().await?;
    let range = resolve_range(&policy, head, current_epoch, &settings.range_config())?;
    info!(
        from_epoch = range.from_epoch,
        to_epoch = range.to_epoch,
        head,
        "resolved analysis window"
    );

    match cli.command {
        Command::Range => {
            println!("{}", serde_json::to_string_pretty(&range)?);
        }
        Command::Sync => {
            let store = SledStore::open(&settings.data_dir)
                .with_context(|| format!("opening store at {}", settings.data_dir.display()))?;
            let report = synchronize(
                Arc::clone(&chain),
                &store,
                &policy,
                &range,
                &settings.stream_settings(),
            )
            .await?;
            store.flush()?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.is_complete() {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::Scores => {
            let store = SledStore::open(&settings.data_dir)
                .with_context(|| format!("opening store at {}", settings.data_dir.display()))?;
            let scores =
                compute_and_store_scores(chain.as_ref(), &store, &range, &settings.score).await?;
            store.flush()?;
            println!("{}", serde_json::to_string_pretty(&scores)?);
        }
    }
    Ok(ExitCode::SUCCESS)
}
