use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error("row encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    #[error("corrupt row: {0}")]
    Corrupt(String),
}
