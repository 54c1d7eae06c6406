// Score curves.
//
// INVARIANTS:
// 1. Input sequences are ordered most-recent-first; index 0 carries the
//    largest weight
// 2. The invalid marker (-1) signals absent data, never a measured value
// 3. Same inputs -> same outputs, bit for bit; no I/O, no clock

use thiserror::Error;

use vigil_core::INVALID_SCORE;

use crate::params::{AvailabilityParams, DominanceParams, ReliabilityParams};

#[derive(Debug, Error)]
pub enum ScoreError {
    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },

    #[error("empty input: no epoch states to weigh")]
    EmptyInput,
}

/// Stake-concentration score.
///
/// Shares below the threshold receive full score; above it the score decays
/// polynomially with the configured steepness, punishing concentration.
pub fn dominance(ratio: f64, params: &DominanceParams) -> Result<f64, ScoreError> {
    if !params.threshold.is_finite() || params.threshold <= 0.0 {
        return Err(ScoreError::InvalidInput {
            reason: format!("dominance threshold {} unset or out of range", params.threshold),
        });
    }
    if !params.steepness.is_finite() || params.steepness <= 0.0 {
        return Err(ScoreError::InvalidInput {
            reason: format!("dominance steepness {} unset or out of range", params.steepness),
        });
    }
    if !(0.0..=1.0).contains(&ratio) {
        return Err(ScoreError::InvalidInput {
            reason: format!("dominance ratio {ratio} outside [0, 1]"),
        });
    }
    Ok((1.0 - (ratio / params.threshold).powf(params.steepness)).max(0.0))
}

/// Recent-participation score over per-epoch elected states, most recent
/// first.
///
/// The weighted moving average is pushed through -x^2 + 2x: full score only
/// for consistent recent presence, with a fast falloff near the bottom.
pub fn availability(states: &[bool], params: &AvailabilityParams) -> Result<f64, ScoreError> {
    if !params.weight_factor.is_finite() || params.weight_factor < 0.0 {
        return Err(ScoreError::InvalidInput {
            reason: format!("availability weight factor {} out of range", params.weight_factor),
        });
    }
    if states.is_empty() {
        return Err(ScoreError::EmptyInput);
    }

    let n = states.len() as f64;
    let mut weighted_sum = 0.0;
    let mut total_weight = 0.0;
    for (i, active) in states.iter().enumerate() {
        let weight = 1.0 - params.weight_factor * i as f64 / n;
        if *active {
            weighted_sum += weight;
        }
        total_weight += weight;
    }
    if total_weight <= 0.0 {
        return Err(ScoreError::EmptyInput);
    }

    let average = weighted_sum / total_weight;
    Ok(-average * average + 2.0 * average)
}

/// Reliability score from per-epoch (rewarded, missed) tallies, most recent
/// first. Entries carrying the -1 sentinel or no recorded outcome contribute
/// no weight.
///
/// The weighted average hit-rate is mapped through a circular curve fit
/// centered at `curve_center`. When nothing in the window carries weight, or
/// the discriminant goes negative, the result is the invalid marker:
/// insufficient data is not the same as measured-and-poor.
pub fn reliability(epochs: &[(i32, i32)], params: &ReliabilityParams) -> Result<f64, ScoreError> {
    if !params.weight_factor.is_finite() || params.weight_factor < 0.0 {
        return Err(ScoreError::InvalidInput {
            reason: format!("reliability weight factor {} out of range", params.weight_factor),
        });
    }
    if !params.curve_center.is_finite() {
        return Err(ScoreError::InvalidInput {
            reason: "reliability curve center unset".to_string(),
        });
    }

    let n = epochs.len() as f64;
    let mut weighted_sum = 0.0;
    let mut total_weight = 0.0;
    for (i, (rewarded, missed)) in epochs.iter().enumerate() {
        if *rewarded < 0 || *missed < 0 {
            continue;
        }
        let tracked = rewarded + missed;
        if tracked == 0 {
            continue;
        }
        let rate = f64::from(*rewarded) / f64::from(tracked);
        let weight = 1.0 - params.weight_factor * i as f64 / n;
        weighted_sum += rate * weight;
        total_weight += weight;
    }
    if total_weight <= 0.0 {
        return Ok(INVALID_SCORE);
    }

    let raw = weighted_sum / total_weight;
    let center = params.curve_center;
    let discriminant = -raw * raw + 2.0 * center * raw + (center - 1.0) * (center - 1.0);
    if discriminant < 0.0 {
        return Ok(INVALID_SCORE);
    }
    Ok((-center + 1.0 - discriminant.sqrt()).clamp(0.0, 1.0))
}
