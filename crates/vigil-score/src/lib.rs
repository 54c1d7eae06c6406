pub mod compute;
pub mod curves;
pub mod params;

pub use compute::compute_scores;
pub use curves::{availability, dominance, reliability, ScoreError};
pub use params::{AvailabilityParams, DominanceParams, ReliabilityParams, ScoreParams};
