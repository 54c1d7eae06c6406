use async_trait::async_trait;
use vigil_core::PolicyConstants;

use crate::error::ChainError;
use crate::types::{ActiveValidator, Block, Inherent};

/// Read-only node capability the engine consumes.
///
/// Every call returns a value or a typed [`ChainError`]; expected failure
/// modes never panic. Implementations do not retry: retry budgets and
/// backoff are owned by the sync layer so throughput control lives in one
/// place.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Immutable chain constants, validated before being returned.
    async fn get_policy_constants(&self) -> Result<PolicyConstants, ChainError>;

    /// Current epoch index.
    async fn get_epoch_number(&self) -> Result<u64, ChainError>;

    /// Current head block number.
    async fn get_block_number(&self) -> Result<u64, ChainError>;

    /// Block by number. `include_body` controls whether an election block's
    /// slot list is populated.
    async fn get_block_by_number(
        &self,
        number: u64,
        include_body: bool,
    ) -> Result<Block, ChainError>;

    /// Block-production inherents for a global batch number.
    async fn get_inherents_by_batch_number(&self, batch: u64)
        -> Result<Vec<Inherent>, ChainError>;

    /// The active validator set with stake balances at the current state.
    async fn get_active_validators(&self) -> Result<Vec<ActiveValidator>, ChainError>;
}
