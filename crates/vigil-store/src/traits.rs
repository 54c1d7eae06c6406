// Persistence capability consumed by the sync and scoring layers.

use std::collections::BTreeSet;

use vigil_core::{Address, EpochActivity, EpochsActivities, ScoreValues};

use crate::cache::ValidatorIdCache;
use crate::error::StoreError;

/// Epoch-activity persistence.
///
/// The unit of persistence is a whole epoch: `replace_epoch` deletes every
/// existing row for the epoch and inserts the new set under the epoch's
/// write lock, so replays converge instead of merging, and a reader never
/// observes half an epoch.
pub trait ActivityStore: Send + Sync {
    /// Idempotent wholesale write of one epoch's activity.
    fn replace_epoch(&self, epoch: u64, activity: &EpochActivity) -> Result<(), StoreError>;

    /// All rows of one epoch; `None` when the epoch was never synced.
    fn epoch_activity(&self, epoch: u64) -> Result<Option<EpochActivity>, StoreError>;

    /// Epochs inside the inclusive bounds holding at least one row.
    fn epochs_with_activity(
        &self,
        from_epoch: u64,
        to_epoch: u64,
    ) -> Result<BTreeSet<u64>, StoreError>;

    /// Activity maps for every synced epoch inside the inclusive bounds.
    fn activities_between(
        &self,
        from_epoch: u64,
        to_epoch: u64,
    ) -> Result<EpochsActivities, StoreError>;

    /// Administrative reset of the inclusive epoch bounds. Returns deleted
    /// row count. The only path that removes activity.
    fn delete_epochs(&self, from_epoch: u64, to_epoch: u64) -> Result<u64, StoreError>;
}

/// Score persistence keyed by `(validator id, from epoch, to epoch)` so
/// distinct analysis windows coexist.
pub trait ScoreStore: Send + Sync {
    /// Numeric row id for a validator address, created on first sight.
    /// Memoized through the caller's per-run cache.
    fn validator_id(&self, address: &str, cache: &mut ValidatorIdCache)
        -> Result<u64, StoreError>;

    /// Reverse lookup for reporting.
    fn validator_address(&self, id: u64) -> Result<Option<Address>, StoreError>;

    /// Supersede the score tuple for one validator and window: delete, then
    /// insert, under the tuple's write lock.
    fn replace_score(
        &self,
        validator_id: u64,
        from_epoch: u64,
        to_epoch: u64,
        scores: &ScoreValues,
    ) -> Result<(), StoreError>;

    fn score(
        &self,
        validator_id: u64,
        from_epoch: u64,
        to_epoch: u64,
    ) -> Result<Option<ScoreValues>, StoreError>;

    /// Administrative reset. Returns deleted row count.
    fn delete_scores(&self) -> Result<u64, StoreError>;
}

/// The full persistence surface a run needs.
pub trait TrustStore: ActivityStore + ScoreStore {}

impl<T: ActivityStore + ScoreStore> TrustStore for T {}
