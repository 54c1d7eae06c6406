// Window scoring: assemble per-validator curve inputs from persisted
// history, then compose the sub-scores.

use std::collections::BTreeMap;

use tracing::debug;

use vigil_core::{Address, EpochsActivities, Range, ScoreValues, INVALID_SCORE};

use crate::curves::{availability, dominance, reliability, ScoreError};
use crate::params::ScoreParams;

/// Score every validator in the snapshot active set over the given window.
///
/// `balances` is the stake snapshot taken at the window's snapshot epoch;
/// it defines which validators are scored. `activities` is the persisted
/// history; epochs of the window missing from it contribute nothing. The
/// dominance ratio prefers the balance share and falls back to the
/// validator's latest elected slot share; with neither available the
/// dominance sub-score carries the invalid marker and poisons the total.
pub fn compute_scores(
    range: &Range,
    activities: &EpochsActivities,
    balances: &BTreeMap<Address, i64>,
    params: &ScoreParams,
) -> Result<BTreeMap<Address, ScoreValues>, ScoreError> {
    // window epochs with persisted data, most recent first
    let epochs: Vec<u64> = activities
        .range(range.from_epoch..=range.to_epoch)
        .map(|(epoch, _)| *epoch)
        .rev()
        .collect();

    let total_balance: i128 = balances.values().map(|b| i128::from((*b).max(0))).sum();

    let mut scores = BTreeMap::new();
    for (address, balance) in balances {
        let mut states = Vec::with_capacity(epochs.len());
        let mut tallies = Vec::with_capacity(epochs.len());
        let mut latest_likelihood = -1.0f64;

        for epoch in &epochs {
            match activities.get(epoch).and_then(|map| map.get(address)) {
                Some(activity) if activity.is_elected() => {
                    states.push(true);
                    tallies.push((activity.rewarded, activity.missed));
                    if latest_likelihood < 0.0 {
                        latest_likelihood = activity.likelihood;
                    }
                }
                _ => {
                    states.push(false);
                    tallies.push((-1, -1));
                }
            }
        }

        let dominance_score = match dominance_ratio(*balance, total_balance, latest_likelihood) {
            Some(ratio) => dominance(ratio, &params.dominance)?,
            None => INVALID_SCORE,
        };
        let availability_score = availability(&states, &params.availability)?;
        let reliability_score = reliability(&tallies, &params.reliability)?;

        scores.insert(
            address.clone(),
            ScoreValues::compose(dominance_score, availability_score, reliability_score),
        );
    }

    debug!(
        "scored {} validators over epochs [{}, {}] ({} synced)",
        scores.len(),
        range.from_epoch,
        range.to_epoch,
        epochs.len()
    );
    Ok(scores)
}

/// Stake share for the dominance curve: balance share at the snapshot when
/// known, otherwise the latest elected slot share.
fn dominance_ratio(balance: i64, total_balance: i128, latest_likelihood: f64) -> Option<f64> {
    if balance >= 0 && total_balance > 0 {
        // structurally <= 1; clamp shields the curve from float dust
        return Some((balance as f64 / total_balance as f64).clamp(0.0, 1.0));
    }
    if latest_likelihood >= 0.0 {
        return Some(latest_likelihood);
    }
    None
}
