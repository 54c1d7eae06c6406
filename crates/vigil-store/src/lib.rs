pub mod cache;
pub mod error;
pub mod lock;
pub mod memory;
pub mod sled_store;
pub mod traits;

pub use cache::ValidatorIdCache;
pub use error::StoreError;
pub use lock::KeyLocks;
pub use memory::MemoryStore;
pub use sled_store::SledStore;
pub use traits::{ActivityStore, ScoreStore, TrustStore};
