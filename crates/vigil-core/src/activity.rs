// Per-epoch validator activity records.
//
// INVARIANTS:
// 1. An epoch's activity map is written wholesale or not at all
// 2. Sentinel -1 marks "not elected / not yet measured", distinct from zero
// 3. BTreeMap keys keep iteration and serialization deterministic

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Validator account address, carried as an opaque string.
pub type Address = String;

/// Reserved address inherents point at when no validator is attached.
/// Excluded from all accounting.
pub const NULL_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

/// One validator's behavior within one epoch.
///
/// A validator absent from the epoch's election keeps the -1 sentinels in
/// `likelihood` / `rewarded` / `missed` and is skipped by the availability
/// and reliability weighting, while staying visible for stake bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatorActivity {
    /// Assigned slot share at election time (assigned / total slots)
    pub likelihood: f64,

    /// Batches in which the validator produced its assigned block
    pub rewarded: i32,

    /// Batches in which the validator was penalized or jailed
    pub missed: i32,

    /// Share of elected slots; filled once the scoring caller knows the set
    pub dominance_ratio_via_slots: f64,

    /// Share of total stake at the snapshot epoch; filled by the scoring caller
    pub dominance_ratio_via_balance: f64,

    /// Stake balance at the snapshot epoch; filled by the scoring caller
    pub balance: i64,
}

impl ValidatorActivity {
    /// Seed record for a validator present in the election-block slot list.
    pub fn elected(likelihood: f64) -> Self {
        ValidatorActivity {
            likelihood,
            rewarded: 0,
            missed: 0,
            dominance_ratio_via_slots: -1.0,
            dominance_ratio_via_balance: -1.0,
            balance: -1,
        }
    }

    /// Record for a validator tracked in the window but not elected in this
    /// epoch.
    pub fn unelected() -> Self {
        ValidatorActivity {
            likelihood: -1.0,
            rewarded: -1,
            missed: -1,
            dominance_ratio_via_slots: -1.0,
            dominance_ratio_via_balance: -1.0,
            balance: -1,
        }
    }

    pub fn is_elected(&self) -> bool {
        self.likelihood >= 0.0
    }

    /// Batches with any recorded production outcome in this epoch.
    pub fn tracked_batches(&self) -> i64 {
        if !self.is_elected() {
            return 0;
        }
        i64::from(self.rewarded) + i64::from(self.missed)
    }
}

/// Activity of every elected validator within one analyzed epoch.
pub type EpochActivity = BTreeMap<Address, ValidatorActivity>;

/// Activity per epoch across an analysis window.
pub type EpochsActivities = BTreeMap<u64, EpochActivity>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elected_seed() {
        let activity = ValidatorActivity::elected(0.6);
        assert!(activity.is_elected());
        assert_eq!(activity.rewarded, 0);
        assert_eq!(activity.missed, 0);
        assert_eq!(activity.balance, -1);
        assert!(activity.dominance_ratio_via_balance < 0.0);
    }

    #[test]
    fn test_unelected_sentinels() {
        let activity = ValidatorActivity::unelected();
        assert!(!activity.is_elected());
        assert_eq!(activity.rewarded, -1);
        assert_eq!(activity.missed, -1);
        assert_eq!(activity.tracked_batches(), 0);
    }

    #[test]
    fn test_tracked_batches_counts_both_outcomes() {
        let mut activity = ValidatorActivity::elected(0.25);
        activity.rewarded = 700;
        activity.missed = 20;
        assert_eq!(activity.tracked_batches(), 720);
    }

    #[test]
    fn test_wire_field_names_are_camel_case() {
        let json = serde_json::to_string(&ValidatorActivity::elected(0.5)).unwrap();
        assert!(json.contains("dominanceRatioViaSlots"));
        assert!(json.contains("dominanceRatioViaBalance"));
        assert!(json.contains("likelihood"));
    }

    #[test]
    fn test_epoch_map_iterates_in_address_order() {
        let mut epoch: EpochActivity = BTreeMap::new();
        epoch.insert("0xbb".into(), ValidatorActivity::elected(0.5));
        epoch.insert("0xaa".into(), ValidatorActivity::elected(0.5));
        let keys: Vec<&str> = epoch.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["0xaa", "0xbb"]);
    }
}
