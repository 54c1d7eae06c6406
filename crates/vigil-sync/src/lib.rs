pub mod fetcher;
pub mod reconcile;
pub mod scores;
pub mod settings;
pub mod stream;

pub use fetcher::{fetch_epoch_activity, BatchWindow, FetchError, FetcherSettings};
pub use reconcile::{missing_epochs, synchronize, SyncError, SyncReport};
pub use scores::{compute_and_store_scores, ScoreRunError};
pub use settings::Settings;
pub use stream::{spawn_activity_stream, ActivityEvent, StreamSettings};
