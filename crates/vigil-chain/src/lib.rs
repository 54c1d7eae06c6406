pub mod client;
pub mod error;
pub mod rpc;
pub mod testing;
pub mod types;

pub use client::ChainClient;
pub use error::ChainError;
pub use rpc::{JsonRpcClient, RpcSettings};
pub use types::{ActiveValidator, Block, BlockType, Inherent, InherentType, SlotAllocation};
