// vigil_admin: administrative resets and store inspection.
//
// The reset commands are the only paths that delete persisted data; both
// refuse to run without --yes.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use vigil_store::{ActivityStore, ScoreStore, SledStore};
use vigil_sync::Settings;

#[derive(Parser)]
#[command(
    name = "vigil_admin",
    about = "Administrative maintenance for the vigil store",
    version
)]
struct Cli {
    /// Settings file (default: an optional ./vigil.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Database directory, overriding the settings
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Delete persisted activity so the next sync refetches it
    ResetActivity {
        /// First epoch to delete (default: from the beginning)
        #[arg(long)]
        from: Option<u64>,

        /// Last epoch to delete (default: to the end)
        #[arg(long)]
        to: Option<u64>,

        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },

    /// Delete every persisted score tuple
    ResetScores {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },

    /// Print row counts per table
    Stats,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let mut settings = Settings::load(cli.config.as_deref()).context("loading settings")?;
    if let Some(data_dir) = cli.data_dir {
        settings.data_dir = data_dir;
    }
    let store = SledStore::open(&settings.data_dir)
        .with_context(|| format!("opening store at {}", settings.data_dir.display()))?;

    match cli.command {
        Command::ResetActivity { from, to, yes } => {
            if !yes {
                anyhow::bail!("refusing to delete activity without --yes");
            }
            let from = from.unwrap_or(0);
            let to = to.unwrap_or(u64::MAX);
            let rows = store.delete_epochs(from, to)?;
            store.flush()?;
            println!("deleted {rows} activity rows");
        }
        Command::ResetScores { yes } => {
            if !yes {
                anyhow::bail!("refusing to delete scores without --yes");
            }
            let rows = store.delete_scores()?;
            store.flush()?;
            println!("deleted {rows} score rows");
        }
        Command::Stats => {
            let epochs = store.epochs_with_activity(0, u64::MAX)?;
            let activity_rows: u64 = epochs
                .iter()
                .map(|epoch| {
                    store
                        .epoch_activity(*epoch)
                        .map(|rows| rows.map_or(0, |rows| rows.len() as u64))
                })
                .collect::<Result<Vec<u64>, _>>()?
                .into_iter()
                .sum();
            println!(
                "{}",
                serde_json::json!({
                    "epochs": epochs.len(),
                    "activityRows": activity_rows,
                    "firstEpoch": epochs.iter().next(),
                    "lastEpoch": epochs.iter().next_back(),
                })
            );
        }
    }
    Ok(())
}
