// Service settings: defaults, then an optional config file, then VIGIL_*
// environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use vigil_core::RangeConfig;
use vigil_score::ScoreParams;

use crate::fetcher::FetcherSettings;
use crate::stream::StreamSettings;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// JSON-RPC endpoint of the trusted node
    pub rpc_url: String,

    /// Directory holding the activity and score database
    pub data_dir: PathBuf,

    /// Analysis window length in days
    pub window_days: u64,

    /// Pin the window's last epoch instead of deriving it from the head
    pub to_epoch: Option<u64>,

    /// Epochs fetched concurrently
    pub epoch_parallelism: usize,

    /// Bounded stream channel capacity
    pub channel_capacity: usize,

    /// Widest concurrent batch window within one epoch
    pub max_batch_window: usize,

    /// Narrowest concurrent batch window
    pub min_batch_window: usize,

    /// Attempts per batch before its epoch fails
    pub batch_retry_budget: u32,

    /// Score curve parameters
    pub score: ScoreParams,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            rpc_url: "http://127.0.0.1:8648".to_string(),
            data_dir: PathBuf::from("./vigil-data"),
            window_days: 270,
            to_epoch: None,
            epoch_parallelism: 3,
            channel_capacity: 1024,
            max_batch_window: 120,
            min_batch_window: 10,
            batch_retry_budget: 5,
            score: ScoreParams::default(),
        }
    }
}

impl Settings {
    /// Load settings. An explicit `path` must exist; otherwise an optional
    /// `vigil.toml` in the working directory is used. `VIGIL_*` environment
    /// variables override either (nested keys with `__`, e.g.
    /// `VIGIL_SCORE__DOMINANCE__THRESHOLD`).
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let builder = match path {
            Some(path) => Config::builder().add_source(File::from(path)),
            None => Config::builder().add_source(File::with_name("vigil").required(false)),
        };
        builder
            .add_source(Environment::with_prefix("VIGIL").separator("__"))
            .build()?
            .try_deserialize()
    }

    pub fn range_config(&self) -> RangeConfig {
        RangeConfig {
            duration: Duration::from_secs(self.window_days * 24 * 60 * 60),
            to_epoch_index: self.to_epoch,
        }
    }

    pub fn stream_settings(&self) -> StreamSettings {
        StreamSettings {
            epoch_parallelism: self.epoch_parallelism,
            channel_capacity: self.channel_capacity,
            fetcher: FetcherSettings {
                max_batch_window: self.max_batch_window,
                min_batch_window: self.min_batch_window,
                batch_retry_budget: self.batch_retry_budget,
                ..FetcherSettings::default()
            },
        }
    }
}
