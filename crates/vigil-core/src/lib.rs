pub mod activity;
pub mod policy;
pub mod range;
pub mod score;

pub use activity::{Address, EpochActivity, EpochsActivities, ValidatorActivity, NULL_ADDRESS};
pub use policy::{PolicyConstants, PolicyError};
pub use range::{resolve_range, Range, RangeConfig, RangeError, DEFAULT_WINDOW};
pub use score::{is_invalid, ScoreValues, INVALID_SCORE};
