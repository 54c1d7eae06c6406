// Deterministic in-memory chain for tests.
//
// Blocks, inherents and failures are scripted up front; inherents calls are
// counted so tests can assert retry budgets and window behavior.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use parking_lot::Mutex;

use vigil_core::PolicyConstants;

use crate::client::ChainClient;
use crate::error::ChainError;
use crate::types::{ActiveValidator, Block, BlockType, Inherent, InherentType, SlotAllocation};

/// Constants shared by the test suites: 1000 ms blocks, 60 blocks per batch,
/// 720 batches per epoch, 1000 slots, genesis at block 0.
pub fn test_policy() -> PolicyConstants {
    PolicyConstants::new(1000, 60, 720, 0, 1000).expect("valid test constants")
}

#[derive(Default)]
struct MockState {
    policy: Option<PolicyConstants>,
    head: u64,
    current_epoch: u64,
    blocks: BTreeMap<u64, Block>,
    inherents: HashMap<u64, Vec<Inherent>>,
    active_validators: Vec<ActiveValidator>,
    // batch -> failures still to serve, popped front first
    scripted_failures: HashMap<u64, Vec<ChainError>>,
    batch_calls: HashMap<u64, u32>,
}

/// Scripted [`ChainClient`] double.
pub struct MockChain {
    inner: Mutex<MockState>,
}

impl Default for MockChain {
    fn default() -> Self {
        Self::new()
    }
}

impl MockChain {
    /// A chain with [`test_policy`] constants and nothing else scripted.
    pub fn new() -> Self {
        let state = MockState {
            policy: Some(test_policy()),
            ..MockState::default()
        };
        MockChain {
            inner: Mutex::new(state),
        }
    }

    pub fn with_policy(self, policy: PolicyConstants) -> Self {
        self.inner.lock().policy = Some(policy);
        self
    }

    pub fn set_head(&self, head: u64) {
        self.inner.lock().head = head;
    }

    pub fn set_current_epoch(&self, epoch: u64) {
        self.inner.lock().current_epoch = epoch;
    }

    /// Install the election block for `epoch` with the given slot counts.
    pub fn put_election(&self, epoch: u64, slots: &[(&str, u64)]) {
        let mut state = self.inner.lock();
        let policy = state.policy.expect("policy scripted");
        let number = policy.election_block_of(epoch);
        let block = Block {
            number,
            block_type: BlockType::Election,
            epoch,
            slots: Some(
                slots
                    .iter()
                    .map(|(validator, num_slots)| SlotAllocation {
                        validator: (*validator).to_string(),
                        num_slots: *num_slots,
                    })
                    .collect(),
            ),
        };
        state.blocks.insert(number, block);
    }

    /// Install a non-election block at the given number.
    pub fn put_micro_block(&self, number: u64, epoch: u64) {
        self.inner.lock().blocks.insert(
            number,
            Block {
                number,
                block_type: BlockType::Micro,
                epoch,
                slots: None,
            },
        );
    }

    pub fn put_inherents(&self, batch: u64, inherents: Vec<Inherent>) {
        self.inner.lock().inherents.insert(batch, inherents);
    }

    pub fn set_active_validators(&self, validators: &[(&str, i64)]) {
        self.inner.lock().active_validators = validators
            .iter()
            .map(|(address, balance)| ActiveValidator {
                address: (*address).to_string(),
                balance: *balance,
            })
            .collect();
    }

    /// Script `times` transient failures for a batch before it succeeds.
    pub fn fail_batch(&self, batch: u64, times: u32) {
        let mut state = self.inner.lock();
        let queue = state.scripted_failures.entry(batch).or_default();
        for _ in 0..times {
            queue.push(ChainError::Http { status: 503 });
        }
    }

    /// Script one permanent (non-transient) failure for a batch.
    pub fn fail_batch_fatal(&self, batch: u64) {
        self.inner
            .lock()
            .scripted_failures
            .entry(batch)
            .or_default()
            .push(ChainError::Rpc {
                code: -32602,
                message: format!("batch {batch} rejected"),
            });
    }

    /// How many inherents calls a batch has received.
    pub fn batch_calls(&self, batch: u64) -> u32 {
        self.inner.lock().batch_calls.get(&batch).copied().unwrap_or(0)
    }

    /// Inherent helper: a produced-block reward aimed at `address`.
    pub fn reward(address: &str, block_number: u64) -> Inherent {
        Inherent {
            inherent_type: InherentType::Reward,
            block_number,
            validator_address: Some(address.to_string()),
        }
    }

    /// Inherent helper: a missed-block penalty aimed at `address`.
    pub fn penalize(address: &str, block_number: u64) -> Inherent {
        Inherent {
            inherent_type: InherentType::Penalize,
            block_number,
            validator_address: Some(address.to_string()),
        }
    }

    /// Inherent helper: a jailing aimed at `address`.
    pub fn jail(address: &str, block_number: u64) -> Inherent {
        Inherent {
            inherent_type: InherentType::Jail,
            block_number,
            validator_address: Some(address.to_string()),
        }
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn get_policy_constants(&self) -> Result<PolicyConstants, ChainError> {
        self.inner.lock().policy.ok_or(ChainError::Rpc {
            code: -32601,
            message: "no policy scripted".to_string(),
        })
    }

    async fn get_epoch_number(&self) -> Result<u64, ChainError> {
        Ok(self.inner.lock().current_epoch)
    }

    async fn get_block_number(&self) -> Result<u64, ChainError> {
        Ok(self.inner.lock().head)
    }

    async fn get_block_by_number(
        &self,
        number: u64,
        include_body: bool,
    ) -> Result<Block, ChainError> {
        let state = self.inner.lock();
        let mut block = state
            .blocks
            .get(&number)
            .cloned()
            .ok_or_else(|| ChainError::Rpc {
                code: -32602,
                message: format!("block {number} not found"),
            })?;
        if !include_body {
            block.slots = None;
        }
        Ok(block)
    }

    async fn get_inherents_by_batch_number(
        &self,
        batch: u64,
    ) -> Result<Vec<Inherent>, ChainError> {
        let mut state = self.inner.lock();
        *state.batch_calls.entry(batch).or_insert(0) += 1;

        if let Some(queue) = state.scripted_failures.get_mut(&batch) {
            if !queue.is_empty() {
                return Err(queue.remove(0));
            }
        }
        Ok(state.inherents.get(&batch).cloned().unwrap_or_default())
    }

    async fn get_active_validators(&self) -> Result<Vec<ActiveValidator>, ChainError> {
        Ok(self.inner.lock().active_validators.clone())
    }
}
