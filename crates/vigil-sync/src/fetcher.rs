// Epoch activity fetching against the chain RPC.
//
// One finished epoch is rebuilt from its election block (who was elected,
// with how many slots) plus the inherents of all its batches (who produced
// and who missed). Batches are fetched in adaptive concurrent windows with
// per-batch retry.
//
// INVARIANTS:
// 1. Only finished epochs are fetched; the current epoch is still mutable
// 2. A fetch either yields the complete epoch map or an error, never a
//    partial tally
// 3. Transient chain errors are retried with exponential backoff up to the
//    budget; data gaps (empty batches, wrong block type) fail immediately

use std::time::Duration;

use futures::stream::{self, StreamExt};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, warn};

use vigil_chain::{BlockType, ChainClient, ChainError, Inherent, InherentType};
use vigil_core::{EpochActivity, PolicyConstants, ValidatorActivity, NULL_ADDRESS};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("epoch {0} is before the first trackable epoch")]
    EpochOutOfRange(u64),

    #[error("epoch {epoch} has not finished yet (current epoch is {current_epoch})")]
    EpochNotFinished { epoch: u64, current_epoch: u64 },

    #[error("block {block_number} is a {block_type:?} block, expected the election block of epoch {epoch}")]
    NotElectionBlock {
        epoch: u64,
        block_number: u64,
        block_type: BlockType,
    },

    #[error("election block {block_number} carries no slot allocations")]
    MissingSlots { block_number: u64 },

    #[error("batch {batch} returned no inherents")]
    NoInherentsFound { batch: u64 },

    #[error("batch {batch} still failing after {attempts} attempts")]
    BatchFetchExhausted {
        batch: u64,
        attempts: u32,
        source: ChainError,
    },

    #[error(transparent)]
    Chain(#[from] ChainError),
}

/// Tuning for batch fetching within one epoch.
#[derive(Debug, Clone)]
pub struct FetcherSettings {
    /// Widest concurrent batch window
    pub max_batch_window: usize,

    /// Narrowest concurrent batch window
    pub min_batch_window: usize,

    /// Attempts per batch before the epoch fails
    pub batch_retry_budget: u32,

    /// Backoff unit; attempt n sleeps `backoff_base * 2^n`
    pub backoff_base: Duration,
}

impl Default for FetcherSettings {
    fn default() -> Self {
        FetcherSettings {
            max_batch_window: 120,
            min_batch_window: 10,
            batch_retry_budget: 5,
            backoff_base: Duration::from_secs(1),
        }
    }
}

/// Concurrency controller for batch windows. Starts wide, halves whenever a
/// window saw a retry or failure, and widens by half again once windows run
/// clean.
#[derive(Debug, Clone, Copy)]
pub struct BatchWindow {
    size: usize,
    min: usize,
    max: usize,
}

impl BatchWindow {
    pub fn new(min: usize, max: usize) -> Self {
        let min = min.max(1);
        let max = max.max(min);
        BatchWindow { size: max, min, max }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Feed back one finished window; `dirty` means some batch in it failed
    /// or needed a retry.
    pub fn record(&mut self, dirty: bool) {
        if dirty {
            self.size = self.min.max(self.size / 2);
        } else {
            let grown = (self.size + self.size / 2).max(self.size + 1);
            self.size = self.max.min(grown);
        }
    }
}

struct BatchOutcome {
    inherents: Vec<Inherent>,
    retried: bool,
}

/// Rebuild the complete activity map of one finished epoch.
///
/// `current_epoch` is the chain's epoch at the time the caller planned the
/// run; epochs at or past it are rejected rather than half-read.
pub async fn fetch_epoch_activity<C>(
    chain: &C,
    policy: &PolicyConstants,
    epoch: u64,
    current_epoch: u64,
    settings: &FetcherSettings,
) -> Result<EpochActivity, FetchError>
where
    C: ChainClient + ?Sized,
{
    if epoch == 0 {
        return Err(FetchError::EpochOutOfRange(epoch));
    }
    if epoch >= current_epoch {
        return Err(FetchError::EpochNotFinished {
            epoch,
            current_epoch,
        });
    }

    let election = chain
        .get_block_by_number(policy.election_block_of(epoch), true)
        .await?;
    if !election.is_election() {
        return Err(FetchError::NotElectionBlock {
            epoch,
            block_number: election.number,
            block_type: election.block_type,
        });
    }
    let slots = match election.slots {
        Some(slots) if !slots.is_empty() => slots,
        _ => {
            return Err(FetchError::MissingSlots {
                block_number: election.number,
            })
        }
    };

    let mut activity = EpochActivity::new();
    let total_slots = policy.slots as f64;
    for allocation in &slots {
        activity.insert(
            allocation.validator.clone(),
            ValidatorActivity::elected(allocation.num_slots as f64 / total_slots),
        );
    }

    let batches = policy.batch_range(epoch);
    let last_batch = *batches.end();
    let mut next_batch = *batches.start();
    let mut window = BatchWindow::new(settings.min_batch_window, settings.max_batch_window);

    while next_batch <= last_batch {
        let window_end = last_batch.min(next_batch + window.size() as u64 - 1);
        let outcomes: Vec<Result<BatchOutcome, FetchError>> =
            stream::iter(next_batch..=window_end)
                .map(|batch| fetch_batch(chain, batch, settings))
                .buffer_unordered(window.size())
                .collect()
                .await;

        let mut dirty = false;
        for outcome in outcomes {
            let outcome = outcome?;
            dirty |= outcome.retried;
            tally_inherents(&mut activity, &outcome.inherents);
        }
        window.record(dirty);
        next_batch = window_end + 1;
    }

    debug!(epoch, validators = activity.len(), "fetched epoch activity");
    Ok(activity)
}

/// One batch of inherents, retried on transient chain errors.
async fn fetch_batch<C>(
    chain: &C,
    batch: u64,
    settings: &FetcherSettings,
) -> Result<BatchOutcome, FetchError>
where
    C: ChainClient + ?Sized,
{
    let mut attempt: u32 = 0;
    loop {
        match chain.get_inherents_by_batch_number(batch).await {
            Ok(inherents) => {
                if inherents.is_empty() {
                    // a node-side data gap; retrying cannot fill it
                    return Err(FetchError::NoInherentsFound { batch });
                }
                return Ok(BatchOutcome {
                    inherents,
                    retried: attempt > 0,
                });
            }
            Err(err) if err.is_transient() && attempt + 1 < settings.batch_retry_budget => {
                let delay = settings.backoff_base * 2u32.saturating_pow(attempt);
                warn!(batch, attempt, error = %err, "batch fetch failed, backing off");
                sleep(delay).await;
                attempt += 1;
            }
            Err(err) if err.is_transient() => {
                return Err(FetchError::BatchFetchExhausted {
                    batch,
                    attempts: attempt + 1,
                    source: err,
                });
            }
            Err(err) => return Err(FetchError::Chain(err)),
        }
    }
}

/// Fold a batch of inherents into the seeded activity map. Inherents with no
/// target, the null address, or addresses outside the epoch's slot list are
/// skipped.
fn tally_inherents(activity: &mut EpochActivity, inherents: &[Inherent]) {
    for inherent in inherents {
        let Some(address) = inherent.validator_address.as_deref() else {
            continue;
        };
        if address == NULL_ADDRESS {
            continue;
        }
        let Some(row) = activity.get_mut(address) else {
            continue;
        };
        match inherent.inherent_type {
            InherentType::Reward => row.rewarded += 1,
            InherentType::Penalize | InherentType::Jail => row.missed += 1,
            InherentType::Other => {}
        }
    }
}
