// Reconciliation: figure out which window epochs are missing from the
// store, fetch exactly those, and persist each one wholesale.
//
// INVARIANTS:
// 1. Epochs already persisted are never refetched by a sync run
// 2. An epoch is persisted only when all its items have arrived; an
//    unavailable epoch leaves no trace and shows up in the report
// 3. A store failure or a crashed producer aborts the run; a fetch failure
//    only costs its epoch

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use vigil_chain::ChainClient;
use vigil_core::{EpochActivity, PolicyConstants, Range};
use vigil_store::{ActivityStore, StoreError};

use crate::stream::{spawn_activity_stream, ActivityEvent, StreamSettings};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("activity producer task failed: {0}")]
    Producer(#[from] tokio::task::JoinError),
}

/// Outcome of one sync run over a window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    /// Epochs the run set out to fetch (the window minus what was synced)
    pub target_epochs: Vec<u64>,

    /// Epochs fetched and persisted by this run
    pub synced: Vec<u64>,

    /// Epochs that could not be fetched; a later run picks them up
    pub unavailable: Vec<u64>,
}

impl SyncReport {
    pub fn is_complete(&self) -> bool {
        self.unavailable.is_empty()
    }
}

/// The window's epochs with no persisted activity, ascending.
pub fn missing_epochs<S>(store: &S, range: &Range) -> Result<Vec<u64>, StoreError>
where
    S: ActivityStore + ?Sized,
{
    let synced = store.epochs_with_activity(range.from_epoch, range.to_epoch)?;
    Ok(range.epochs().filter(|epoch| !synced.contains(epoch)).collect())
}

/// Bring the store up to date for the given window.
///
/// Runs the activity stream over the missing epochs and persists each
/// completed epoch as a whole. Rerunning after a partial result fetches
/// exactly the epochs the report listed as unavailable.
pub async fn synchronize<C, S>(
    chain: Arc<C>,
    store: &S,
    policy: &PolicyConstants,
    range: &Range,
    settings: &StreamSettings,
) -> Result<SyncReport, SyncError>
where
    C: ChainClient + ?Sized + 'static,
    S: ActivityStore + ?Sized,
{
    let target_epochs = missing_epochs(store, range)?;
    if target_epochs.is_empty() {
        info!(
            from_epoch = range.from_epoch,
            to_epoch = range.to_epoch,
            "window already synchronized"
        );
        return Ok(SyncReport {
            target_epochs,
            synced: Vec::new(),
            unavailable: Vec::new(),
        });
    }
    info!(
        from_epoch = range.from_epoch,
        to_epoch = range.to_epoch,
        missing = target_epochs.len(),
        "synchronizing window"
    );

    let (mut events, producer) = spawn_activity_stream(
        chain,
        *policy,
        target_epochs.clone(),
        range.current_epoch,
        settings,
    );

    let mut synced = BTreeSet::new();
    let mut unavailable = BTreeSet::new();
    let mut pending: BTreeMap<u64, EpochActivity> = BTreeMap::new();

    while let Some(event) = events.recv().await {
        match event {
            ActivityEvent::Validator {
                epoch,
                address,
                activity,
            } => {
                pending.entry(epoch).or_default().insert(address, activity);
            }
            ActivityEvent::EpochComplete { epoch } => {
                let rows = pending.remove(&epoch).unwrap_or_default();
                store.replace_epoch(epoch, &rows)?;
                synced.insert(epoch);
            }
            ActivityEvent::EpochUnavailable { epoch } => {
                unavailable.insert(epoch);
            }
        }
    }
    // channel closed, so the producer has already returned; a panicked
    // producer is a failed run, not a batch of unavailable epochs
    producer.await?;

    // epochs the stream never accounted for stay missing
    for epoch in &target_epochs {
        if !synced.contains(epoch) {
            unavailable.insert(*epoch);
        }
    }
    unavailable.retain(|epoch| !synced.contains(epoch));

    let report = SyncReport {
        target_epochs,
        synced: synced.into_iter().collect(),
        unavailable: unavailable.into_iter().collect(),
    };
    if report.is_complete() {
        info!(synced = report.synced.len(), "window synchronized");
    } else {
        warn!(
            synced = report.synced.len(),
            unavailable = ?report.unavailable,
            "window synchronized partially"
        );
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use vigil_chain::testing::test_policy;
    use vigil_chain::{ActiveValidator, Block, ChainError, Inherent};
    use vigil_core::ValidatorActivity;
    use vigil_store::MemoryStore;

    fn range_over(from_epoch: u64, to_epoch: u64) -> Range {
        Range {
            head: 1_000_000,
            current_epoch: to_epoch + 1,
            from_epoch,
            to_epoch,
            to_block_number: 900_000,
            snapshot_epoch: to_epoch + 1,
        }
    }

    fn epoch_rows() -> EpochActivity {
        let mut rows = EpochActivity::new();
        rows.insert("0xaa".to_string(), ValidatorActivity::elected(0.5));
        rows
    }

    #[test]
    fn test_missing_epochs_is_the_resume_set() {
        let store = MemoryStore::new();
        for epoch in 100..=102 {
            store.replace_epoch(epoch, &epoch_rows()).unwrap();
        }

        let missing = missing_epochs(&store, &range_over(100, 105)).unwrap();
        assert_eq!(missing, vec![103, 104, 105]);

        let missing = missing_epochs(&store, &range_over(100, 102)).unwrap();
        assert!(missing.is_empty());
    }

    // Client whose every call dies, crashing the producer task mid-run.
    struct CrashingChain;

    #[async_trait]
    impl ChainClient for CrashingChain {
        async fn get_policy_constants(&self) -> Result<PolicyConstants, ChainError> {
            panic!("chain client crashed")
        }

        async fn get_epoch_number(&self) -> Result<u64, ChainError> {
            panic!("chain client crashed")
        }

        async fn get_block_number(&self) -> Result<u64, ChainError> {
            panic!("chain client crashed")
        }

        async fn get_block_by_number(
            &self,
            _number: u64,
            _include_body: bool,
        ) -> Result<Block, ChainError> {
            panic!("chain client crashed")
        }

        async fn get_inherents_by_batch_number(
            &self,
            _batch: u64,
        ) -> Result<Vec<Inherent>, ChainError> {
            panic!("chain client crashed")
        }

        async fn get_active_validators(&self) -> Result<Vec<ActiveValidator>, ChainError> {
            panic!("chain client crashed")
        }
    }

    #[tokio::test]
    async fn test_producer_crash_fails_the_run() {
        let store = MemoryStore::new();
        let range = range_over(100, 100);

        let result = synchronize(
            Arc::new(CrashingChain),
            &store,
            &test_policy(),
            &range,
            &StreamSettings::default(),
        )
        .await;

        // the crash surfaces as an error, not as unavailable epochs
        assert!(matches!(result, Err(SyncError::Producer(_))));
        assert!(store.epoch_activity(100).unwrap().is_none());
    }

    #[test]
    fn test_report_completeness() {
        let complete = SyncReport {
            target_epochs: vec![1, 2],
            synced: vec![1, 2],
            unavailable: vec![],
        };
        assert!(complete.is_complete());

        let partial = SyncReport {
            target_epochs: vec![1, 2],
            synced: vec![1],
            unavailable: vec![2],
        };
        assert!(!partial.is_complete());
    }
}
