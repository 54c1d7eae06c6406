// Wire types returned by the chain node.

use serde::{Deserialize, Serialize};
use vigil_core::Address;

/// Block classification reported by the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BlockType {
    Micro,
    Macro,
    Election,
}

/// The block header subset the engine reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub number: u64,

    #[serde(rename = "type")]
    pub block_type: BlockType,

    /// Epoch the block belongs to
    pub epoch: u64,

    /// Slot assignment; populated only on election blocks fetched with a body
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slots: Option<Vec<SlotAllocation>>,
}

impl Block {
    pub fn is_election(&self) -> bool {
        self.block_type == BlockType::Election
    }
}

/// One validator's slot allocation inside an election block.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotAllocation {
    pub validator: Address,
    pub num_slots: u64,
}

/// Inherent kinds the engine accounts for. Unknown kinds deserialize to
/// `Other` and are skipped, so new protocol records do not break old syncers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InherentType {
    Reward,
    Penalize,
    Jail,
    #[serde(other)]
    Other,
}

/// Protocol-level reward/penalty record attached to a block.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Inherent {
    #[serde(rename = "type")]
    pub inherent_type: InherentType,

    pub block_number: u64,

    /// Absent on records not aimed at a validator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validator_address: Option<Address>,
}

/// Active validator with its stake at the queried state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveValidator {
    pub address: Address,
    pub balance: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_inherent_kind_becomes_other() {
        let inherent: Inherent = serde_json::from_str(
            r#"{"type":"futureThing","blockNumber":42,"validatorAddress":"0xab"}"#,
        )
        .unwrap();
        assert_eq!(inherent.inherent_type, InherentType::Other);
        assert_eq!(inherent.block_number, 42);
    }

    #[test]
    fn test_election_block_parses_slots() {
        let block: Block = serde_json::from_str(
            r#"{
                "number": 43200,
                "type": "election",
                "epoch": 2,
                "slots": [
                    {"validator": "0xaa", "numSlots": 300},
                    {"validator": "0xbb", "numSlots": 212}
                ]
            }"#,
        )
        .unwrap();
        assert!(block.is_election());
        let slots = block.slots.unwrap();
        assert_eq!(slots.len(), 2);
        assert_eq!(slots[0].num_slots, 300);
    }

    #[test]
    fn test_micro_block_has_no_slots() {
        let block: Block =
            serde_json::from_str(r#"{"number":7,"type":"micro","epoch":1}"#).unwrap();
        assert!(!block.is_election());
        assert!(block.slots.is_none());
    }
}
