// Analysis window resolution.
//
// INVARIANTS:
// 1. Only finished epochs are analyzable: to_epoch < current_epoch
// 2. from_epoch >= 1 and from_epoch <= to_epoch
// 3. snapshot_epoch = to_epoch + 1 (stake balances for the window are read
//    one election later, when they are fully known)
// 4. A Range is derived from the live head per run, never treated as stored truth

use crate::policy::PolicyConstants;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Default analysis window of roughly nine months.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(270 * 24 * 60 * 60);

#[derive(Debug, Error)]
pub enum RangeError {
    #[error("invalid range: {reason}")]
    InvalidRange { reason: String },
}

/// The inclusive window of finished epochs to analyze.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Range {
    /// Chain head block number the window was derived from
    pub head: u64,

    /// Current (unfinished) epoch at derivation time
    pub current_epoch: u64,

    /// First epoch of the window
    pub from_epoch: u64,

    /// Last epoch of the window
    pub to_epoch: u64,

    /// Last block of `to_epoch`
    pub to_block_number: u64,

    /// Epoch whose election block carries the window's stake balances
    pub snapshot_epoch: u64,
}

impl Range {
    /// Number of epochs in the window.
    pub fn epoch_count(&self) -> u64 {
        self.to_epoch - self.from_epoch + 1
    }

    /// The window's epochs in ascending order.
    pub fn epochs(&self) -> impl Iterator<Item = u64> {
        self.from_epoch..=self.to_epoch
    }

    pub fn contains(&self, epoch: u64) -> bool {
        epoch >= self.from_epoch && epoch <= self.to_epoch
    }
}

/// Window selection: an analysis duration, or an explicit final epoch for
/// reproducing a historical window.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RangeConfig {
    /// How far back the window reaches, rounded up to whole epochs
    pub duration: Duration,

    /// Pin the window's last epoch instead of deriving it from the head
    pub to_epoch_index: Option<u64>,
}

impl Default for RangeConfig {
    fn default() -> Self {
        RangeConfig {
            duration: DEFAULT_WINDOW,
            to_epoch_index: None,
        }
    }
}

/// Resolve the epoch window to analyze from the live chain state.
pub fn resolve_range(
    policy: &PolicyConstants,
    head: u64,
    current_epoch: u64,
    config: &RangeConfig,
) -> Result<Range, RangeError> {
    let epoch_ms = policy.epoch_duration_ms();
    let duration_ms = config.duration.as_millis() as u64;
    let epochs_count = ((duration_ms + epoch_ms - 1) / epoch_ms).max(1);

    let to_epoch = match config.to_epoch_index {
        Some(index) => index,
        None => current_epoch.saturating_sub(1),
    };
    if to_epoch < 1 {
        return Err(RangeError::InvalidRange {
            reason: format!("no finished epoch before current epoch {current_epoch}"),
        });
    }
    if to_epoch >= current_epoch {
        return Err(RangeError::InvalidRange {
            reason: format!("epoch {to_epoch} is not finished (current epoch {current_epoch})"),
        });
    }

    let from_epoch = to_epoch.saturating_sub(epochs_count - 1).max(1);
    if from_epoch > to_epoch {
        return Err(RangeError::InvalidRange {
            reason: format!("window is empty: from {from_epoch} > to {to_epoch}"),
        });
    }

    // Clock/consistency guard: the window must lie strictly behind the head.
    let to_block_number = policy.last_block_of(to_epoch);
    if to_block_number >= head {
        return Err(RangeError::InvalidRange {
            reason: format!(
                "window end block {to_block_number} has not been produced (head {head})"
            ),
        });
    }

    Ok(Range {
        head,
        current_epoch,
        from_epoch,
        to_epoch,
        to_block_number,
        snapshot_epoch: to_epoch + 1,
    })
}
