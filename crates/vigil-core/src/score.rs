// Score value tuple shared by the score engine and the stores.

use serde::{Deserialize, Serialize};

/// Marker for "insufficient data to score". Deliberately distinct from a
/// measured zero so ranking never confuses the two.
pub const INVALID_SCORE: f64 = -1.0;

/// True when a score carries the invalid marker.
pub fn is_invalid(score: f64) -> bool {
    score < 0.0
}

/// The three sub-scores and their product for one validator over one window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreValues {
    /// Stake-concentration penalty score
    pub dominance: f64,

    /// Recent-participation score
    pub availability: f64,

    /// Reward-to-miss ratio score
    pub reliability: f64,

    /// dominance * availability * reliability, or the invalid marker
    pub total: f64,
}

impl ScoreValues {
    /// Combine sub-scores. The invalid marker on any input poisons the
    /// total; a default is never substituted.
    pub fn compose(dominance: f64, availability: f64, reliability: f64) -> Self {
        let total = if is_invalid(dominance) || is_invalid(availability) || is_invalid(reliability)
        {
            INVALID_SCORE
        } else {
            dominance * availability * reliability
        };
        ScoreValues {
            dominance,
            availability,
            reliability,
            total,
        }
    }

    pub fn is_valid(&self) -> bool {
        !is_invalid(self.total)
    }
}
