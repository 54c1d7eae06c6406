// Score orchestration: persisted window history in, composite scores
// persisted and returned.

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::info;

use vigil_chain::{ChainClient, ChainError};
use vigil_core::{Address, Range, ScoreValues};
use vigil_score::{compute_scores, ScoreError, ScoreParams};
use vigil_store::{ActivityStore, ScoreStore, StoreError, ValidatorIdCache};

#[derive(Debug, Error)]
pub enum ScoreRunError {
    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Score(#[from] ScoreError),
}

/// Compute the window's scores from persisted activity and the live
/// snapshot balances, persist them per validator, and return them.
///
/// Scores are recomputed from scratch for the requested window; tuples for
/// other windows are left untouched. The id cache lives for exactly this
/// run.
pub async fn compute_and_store_scores<C, S>(
    chain: &C,
    store: &S,
    range: &Range,
    params: &ScoreParams,
) -> Result<BTreeMap<Address, ScoreValues>, ScoreRunError>
where
    C: ChainClient + ?Sized,
    S: ActivityStore + ScoreStore + ?Sized,
{
    let activities = store.activities_between(range.from_epoch, range.to_epoch)?;
    let balances: BTreeMap<Address, i64> = chain
        .get_active_validators()
        .await?
        .into_iter()
        .map(|validator| (validator.address, validator.balance))
        .collect();

    let scores = compute_scores(range, &activities, &balances, params)?;

    let mut cache = ValidatorIdCache::new();
    for (address, values) in &scores {
        let validator_id = store.validator_id(address, &mut cache)?;
        store.replace_score(validator_id, range.from_epoch, range.to_epoch, values)?;
    }

    info!(
        validators = scores.len(),
        from_epoch = range.from_epoch,
        to_epoch = range.to_epoch,
        "scores computed and persisted"
    );
    Ok(scores)
}
