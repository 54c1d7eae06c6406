// Scoring parameters with protocol defaults.

use serde::{Deserialize, Serialize};

/// Stake-concentration curve parameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct DominanceParams {
    /// Stake share below which no penalty applies
    pub threshold: f64,

    /// Polynomial decay exponent applied above the threshold
    pub steepness: f64,
}

impl Default for DominanceParams {
    fn default() -> Self {
        DominanceParams {
            threshold: 0.15,
            steepness: 7.5,
        }
    }
}

/// Recency weighting for the availability curve.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct AvailabilityParams {
    /// 0 weighs all epochs equally; larger values up-weight recent epochs
    pub weight_factor: f64,
}

impl Default for AvailabilityParams {
    fn default() -> Self {
        AvailabilityParams { weight_factor: 0.5 }
    }
}

/// Reliability curve-fit parameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ReliabilityParams {
    /// Recency weighting, as for availability
    pub weight_factor: f64,

    /// Center of the circle the raw hit-rate is fitted against
    pub curve_center: f64,
}

impl Default for ReliabilityParams {
    fn default() -> Self {
        ReliabilityParams {
            weight_factor: 0.5,
            curve_center: -0.16,
        }
    }
}

/// All scoring parameters bundled for configuration.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreParams {
    pub dominance: DominanceParams,
    pub availability: AvailabilityParams,
    pub reliability: ReliabilityParams,
}
