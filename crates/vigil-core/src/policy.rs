// Chain policy constants and epoch arithmetic.
//
// INVARIANTS:
// 1. Epoch indices are 1-based; epoch 0 means "before genesis", never analyzable
// 2. The election block is the first block of its epoch, derived arithmetically
// 3. Batch numbers are global and 1-based across the whole chain
// 4. Same constants + same index -> same block number, on every node

use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("invalid policy constants: {0}")]
    Invalid(String),
}

/// Immutable chain constants, fetched once per process from the node.
///
/// Changing any of these requires a hard fork, so a single fetch at startup
/// stays valid for the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyConstants {
    /// Target milliseconds between consecutive blocks
    pub block_separation_time: u64,

    /// Blocks per batch
    pub blocks_per_batch: u64,

    /// Batches per epoch
    pub batches_per_epoch: u64,

    /// Blocks per epoch; must equal blocks_per_batch * batches_per_epoch
    pub blocks_per_epoch: u64,

    /// Block number the first epoch starts at
    pub genesis_block_number: u64,

    /// Total validator slots elected per epoch
    pub slots: u64,
}

impl PolicyConstants {
    /// Build validated constants.
    pub fn new(
        block_separation_time: u64,
        blocks_per_batch: u64,
        batches_per_epoch: u64,
        genesis_block_number: u64,
        slots: u64,
    ) -> Result<Self, PolicyError> {
        let policy = PolicyConstants {
            block_separation_time,
            blocks_per_batch,
            batches_per_epoch,
            blocks_per_epoch: blocks_per_batch.saturating_mul(batches_per_epoch),
            genesis_block_number,
            slots,
        };
        policy.validate()?;
        Ok(policy)
    }

    /// Reject zero or inconsistent parameters. Called on construction and on
    /// constants deserialized from the node.
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.block_separation_time == 0 {
            return Err(PolicyError::Invalid("block_separation_time must be > 0".into()));
        }
        if self.blocks_per_batch == 0 {
            return Err(PolicyError::Invalid("blocks_per_batch must be > 0".into()));
        }
        if self.batches_per_epoch == 0 {
            return Err(PolicyError::Invalid("batches_per_epoch must be > 0".into()));
        }
        if self.slots == 0 {
            return Err(PolicyError::Invalid("slots must be > 0".into()));
        }
        if self.blocks_per_epoch != self.blocks_per_batch * self.batches_per_epoch {
            return Err(PolicyError::Invalid(format!(
                "blocks_per_epoch mismatch: got {}, expected {}",
                self.blocks_per_epoch,
                self.blocks_per_batch * self.batches_per_epoch
            )));
        }
        Ok(())
    }

    /// First block of the given epoch, carrying its slot assignment.
    ///
    /// Deterministic; the caller still verifies the block-type flag on the
    /// fetched block, so an out-of-range epoch surfaces as a typed error
    /// there instead of a wrong silent read.
    pub fn election_block_of(&self, epoch: u64) -> u64 {
        self.genesis_block_number + epoch.saturating_sub(1) * self.blocks_per_epoch
    }

    /// Last block of the given epoch (inclusive).
    pub fn last_block_of(&self, epoch: u64) -> u64 {
        self.election_block_of(epoch + 1) - 1
    }

    /// Epoch a block belongs to. Blocks before genesis map to epoch 0.
    pub fn epoch_at(&self, block_number: u64) -> u64 {
        if block_number < self.genesis_block_number {
            return 0;
        }
        (block_number - self.genesis_block_number) / self.blocks_per_epoch + 1
    }

    /// Global 1-based number of the first batch of the given epoch.
    pub fn first_batch_of(&self, epoch: u64) -> u64 {
        epoch.saturating_sub(1) * self.batches_per_epoch + 1
    }

    /// Inclusive global batch span covered by the given epoch.
    pub fn batch_range(&self, epoch: u64) -> RangeInclusive<u64> {
        let first = self.first_batch_of(epoch);
        first..=first + self.batches_per_epoch - 1
    }

    /// Wall-clock length of one epoch in milliseconds.
    pub fn epoch_duration_ms(&self) -> u64 {
        self.block_separation_time * self.blocks_per_epoch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> PolicyConstants {
        PolicyConstants::new(1000, 60, 720, 0, 512).unwrap()
    }

    #[test]
    fn test_constants_validation() {
        assert!(PolicyConstants::new(0, 60, 720, 0, 512).is_err());
        assert!(PolicyConstants::new(1000, 0, 720, 0, 512).is_err());
        assert!(PolicyConstants::new(1000, 60, 0, 0, 512).is_err());
        assert!(PolicyConstants::new(1000, 60, 720, 0, 0).is_err());

        let mut inconsistent = policy();
        inconsistent.blocks_per_epoch += 1;
        assert!(inconsistent.validate().is_err());
    }

    #[test]
    fn test_election_block_arithmetic() {
        let policy = policy();

        // blocks_per_epoch = 60 * 720 = 43200
        assert_eq!(policy.election_block_of(1), 0);
        assert_eq!(policy.election_block_of(2), 43_200);
        assert_eq!(policy.election_block_of(10), 9 * 43_200);

        assert_eq!(policy.last_block_of(1), 43_199);
        assert_eq!(policy.last_block_of(2), 86_399);
    }

    #[test]
    fn test_epoch_at_inverts_election_block() {
        let policy = policy();

        assert_eq!(policy.epoch_at(policy.election_block_of(1)), 1);
        assert_eq!(policy.epoch_at(policy.last_block_of(1)), 1);
        assert_eq!(policy.epoch_at(policy.election_block_of(7)), 7);
        assert_eq!(policy.epoch_at(policy.last_block_of(7)), 7);
    }

    #[test]
    fn test_pre_genesis_maps_to_epoch_zero() {
        let policy = PolicyConstants::new(1000, 60, 720, 100_000, 512).unwrap();

        assert_eq!(policy.epoch_at(0), 0);
        assert_eq!(policy.epoch_at(99_999), 0);
        assert_eq!(policy.epoch_at(100_000), 1);
    }

    #[test]
    fn test_batch_numbering() {
        let policy = policy();

        assert_eq!(policy.first_batch_of(1), 1);
        assert_eq!(policy.first_batch_of(2), 721);
        assert_eq!(policy.batch_range(1), 1..=720);
        assert_eq!(policy.batch_range(3), 1441..=2160);
        assert_eq!(policy.batch_range(1).count() as u64, policy.batches_per_epoch);
    }

    #[test]
    fn test_epoch_duration() {
        assert_eq!(policy().epoch_duration_ms(), 43_200_000);
    }

    #[test]
    fn test_camel_case_wire_names() {
        let json = r#"{
            "blockSeparationTime": 1000,
            "blocksPerBatch": 60,
            "batchesPerEpoch": 720,
            "blocksPerEpoch": 43200,
            "genesisBlockNumber": 0,
            "slots": 512
        }"#;
        let parsed: PolicyConstants = serde_json::from_str(json).unwrap();
        assert!(parsed.validate().is_ok());
        assert_eq!(parsed, policy());
    }
}
