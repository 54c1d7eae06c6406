// Bounded epoch activity stream.
//
// A producer task fetches the target epochs with bounded epoch-level
// concurrency and pushes per-validator items over a bounded channel, so a
// slow consumer applies backpressure instead of growing a queue.
//
// INVARIANTS:
// 1. A fetched epoch's Validator items arrive contiguously, terminated by
//    exactly one EpochComplete
// 2. A failed epoch yields exactly one EpochUnavailable and nothing else;
//    the run continues
// 3. Dropping the receiver stops the producer at its next send; since the
//    consumer persists only on EpochComplete, cancellation can never tear
//    a half-written epoch

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use vigil_chain::ChainClient;
use vigil_core::{Address, PolicyConstants, ValidatorActivity};

use crate::fetcher::{fetch_epoch_activity, FetcherSettings};

/// One item of the epoch activity stream.
#[derive(Debug, Clone, PartialEq)]
pub enum ActivityEvent {
    /// One validator's activity within `epoch`.
    Validator {
        epoch: u64,
        address: Address,
        activity: ValidatorActivity,
    },

    /// All of `epoch`'s validator items have been sent.
    EpochComplete { epoch: u64 },

    /// The epoch could not be fetched in this run.
    EpochUnavailable { epoch: u64 },
}

/// Epoch-level concurrency and channel sizing for one stream run.
#[derive(Debug, Clone)]
pub struct StreamSettings {
    /// Epochs fetched concurrently
    pub epoch_parallelism: usize,

    /// Bounded channel capacity between producer and consumer
    pub channel_capacity: usize,

    pub fetcher: FetcherSettings,
}

impl Default for StreamSettings {
    fn default() -> Self {
        StreamSettings {
            epoch_parallelism: 3,
            channel_capacity: 1024,
            fetcher: FetcherSettings::default(),
        }
    }
}

/// Spawn the producer for the given target epochs and hand back the
/// receiving end.
///
/// Epoch fetches overlap, but their events are serialized onto the channel
/// one epoch at a time.
pub fn spawn_activity_stream<C>(
    chain: Arc<C>,
    policy: PolicyConstants,
    epochs: Vec<u64>,
    current_epoch: u64,
    settings: &StreamSettings,
) -> (mpsc::Receiver<ActivityEvent>, JoinHandle<()>)
where
    C: ChainClient + ?Sized + 'static,
{
    let (tx, rx) = mpsc::channel(settings.channel_capacity.max(1));
    let parallelism = settings.epoch_parallelism.max(1);
    let fetcher = settings.fetcher.clone();

    let producer = tokio::spawn(async move {
        let mut outcomes = stream::iter(epochs)
            .map(|epoch| {
                let chain = Arc::clone(&chain);
                let fetcher = fetcher.clone();
                async move {
                    let outcome =
                        fetch_epoch_activity(chain.as_ref(), &policy, epoch, current_epoch, &fetcher)
                            .await;
                    (epoch, outcome)
                }
            })
            .buffer_unordered(parallelism);

        while let Some((epoch, outcome)) = outcomes.next().await {
            match outcome {
                Ok(rows) => {
                    for (address, activity) in rows {
                        let event = ActivityEvent::Validator {
                            epoch,
                            address,
                            activity,
                        };
                        if tx.send(event).await.is_err() {
                            debug!(epoch, "receiver dropped, stopping activity stream");
                            return;
                        }
                    }
                    if tx.send(ActivityEvent::EpochComplete { epoch }).await.is_err() {
                        debug!(epoch, "receiver dropped, stopping activity stream");
                        return;
                    }
                }
                Err(err) => {
                    warn!(epoch, error = %err, "epoch unavailable in this run");
                    if tx
                        .send(ActivityEvent::EpochUnavailable { epoch })
                        .await
                        .is_err()
                    {
                        debug!(epoch, "receiver dropped, stopping activity stream");
                        return;
                    }
                }
            }
        }
    });

    (rx, producer)
}
