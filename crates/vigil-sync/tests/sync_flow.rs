// End-to-end sync and scoring flows against the scripted chain.

use std::sync::Arc;
use std::time::Duration;

use vigil_chain::testing::{test_policy, MockChain};
use vigil_core::{resolve_range, EpochActivity, PolicyConstants, RangeConfig, ValidatorActivity};
use vigil_score::ScoreParams;
use vigil_store::{ActivityStore, MemoryStore, ScoreStore, SledStore, ValidatorIdCache};
use vigil_sync::{compute_and_store_scores, missing_epochs, synchronize, StreamSettings};

const A: &str = "0xaaaa";
const B: &str = "0xbbbb";

// 2 blocks per batch, 3 batches per epoch, 10 slots
fn small_policy() -> PolicyConstants {
    PolicyConstants::new(1000, 2, 3, 0, 10).unwrap()
}

/// Script a finished epoch: its election block plus one inherent per listed
/// validator in every batch.
fn script_epoch(
    chain: &MockChain,
    policy: &PolicyConstants,
    epoch: u64,
    slots: &[(&str, u64)],
    rewarded: &[&str],
    missed: &[&str],
) {
    chain.put_election(epoch, slots);
    let block = policy.election_block_of(epoch) + 1;
    for batch in policy.batch_range(epoch) {
        let mut inherents = Vec::new();
        for address in rewarded {
            inherents.push(MockChain::reward(address, block));
        }
        for address in missed {
            inherents.push(MockChain::penalize(address, block));
        }
        chain.put_inherents(batch, inherents);
    }
}

/// A window pinned to `[to - epochs + 1, to]` via an explicit final epoch.
fn window(policy: &PolicyConstants, to_epoch: u64, epochs: u64) -> RangeConfig {
    RangeConfig {
        duration: Duration::from_millis(policy.epoch_duration_ms() * epochs),
        to_epoch_index: Some(to_epoch),
    }
}

#[tokio::test]
async fn test_full_epoch_fetch_end_to_end() {
    let policy = test_policy();
    let chain = Arc::new(MockChain::new());
    chain.set_current_epoch(102);
    let head = policy.election_block_of(102) + 10;
    chain.set_head(head);
    script_epoch(&chain, &policy, 100, &[(A, 600), (B, 400)], &[A], &[B]);

    let range = resolve_range(&policy, head, 102, &window(&policy, 100, 1)).unwrap();
    assert_eq!((range.from_epoch, range.to_epoch), (100, 100));

    let store = MemoryStore::new();
    let report = synchronize(
        Arc::clone(&chain),
        &store,
        &policy,
        &range,
        &StreamSettings::default(),
    )
    .await
    .unwrap();

    assert_eq!(report.target_epochs, vec![100]);
    assert_eq!(report.synced, vec![100]);
    assert!(report.is_complete());

    let rows = store.epoch_activity(100).unwrap().unwrap();
    assert_eq!(rows.len(), 2);
    let a = &rows[A];
    assert_eq!((a.likelihood, a.rewarded, a.missed), (0.6, 720, 0));
    let b = &rows[B];
    assert_eq!((b.likelihood, b.rewarded, b.missed), (0.4, 0, 720));
}

#[tokio::test]
async fn test_rerun_fetches_only_missing_epochs() {
    let policy = small_policy();
    let chain = Arc::new(MockChain::new().with_policy(policy));
    chain.set_current_epoch(107);
    let head = policy.election_block_of(107) + 3;
    chain.set_head(head);
    for epoch in 100..=105 {
        script_epoch(&chain, &policy, epoch, &[(A, 6), (B, 4)], &[A], &[B]);
    }

    let store = MemoryStore::new();
    // epochs 100..=102 were persisted by an earlier run
    for epoch in 100..=102 {
        let mut rows = EpochActivity::new();
        rows.insert(A.to_string(), ValidatorActivity::elected(0.6));
        store.replace_epoch(epoch, &rows).unwrap();
    }

    let range = resolve_range(&policy, head, 107, &window(&policy, 105, 6)).unwrap();
    assert_eq!((range.from_epoch, range.to_epoch), (100, 105));
    assert_eq!(missing_epochs(&store, &range).unwrap(), vec![103, 104, 105]);

    let report = synchronize(
        Arc::clone(&chain),
        &store,
        &policy,
        &range,
        &StreamSettings::default(),
    )
    .await
    .unwrap();

    assert_eq!(report.target_epochs, vec![103, 104, 105]);
    assert_eq!(report.synced, vec![103, 104, 105]);
    // persisted epochs were not refetched
    for epoch in 100..=102 {
        assert_eq!(chain.batch_calls(policy.first_batch_of(epoch)), 0);
    }
    for epoch in 103..=105 {
        assert_eq!(chain.batch_calls(policy.first_batch_of(epoch)), 1);
    }
    assert!(missing_epochs(&store, &range).unwrap().is_empty());
}

#[tokio::test]
async fn test_unavailable_epoch_is_reported_and_recovered_later() {
    let policy = small_policy();
    let chain = Arc::new(MockChain::new().with_policy(policy));
    chain.set_current_epoch(104);
    let head = policy.election_block_of(104) + 3;
    chain.set_head(head);
    script_epoch(&chain, &policy, 100, &[(A, 10)], &[A], &[]);
    script_epoch(&chain, &policy, 102, &[(A, 10)], &[A], &[]);
    // epoch 101's election block is missing; only its inherents exist
    let block = policy.election_block_of(101) + 1;
    for batch in policy.batch_range(101) {
        chain.put_inherents(batch, vec![MockChain::reward(A, block)]);
    }

    let store = MemoryStore::new();
    let range = resolve_range(&policy, head, 104, &window(&policy, 102, 3)).unwrap();
    let report = synchronize(
        Arc::clone(&chain),
        &store,
        &policy,
        &range,
        &StreamSettings::default(),
    )
    .await
    .unwrap();

    assert_eq!(report.synced, vec![100, 102]);
    assert_eq!(report.unavailable, vec![101]);
    assert!(!report.is_complete());
    assert!(store.epoch_activity(101).unwrap().is_none());

    // the node catches up; the next run targets exactly the gap
    chain.put_election(101, &[(A, 10)]);
    let report = synchronize(
        Arc::clone(&chain),
        &store,
        &policy,
        &range,
        &StreamSettings::default(),
    )
    .await
    .unwrap();

    assert_eq!(report.target_epochs, vec![101]);
    assert_eq!(report.synced, vec![101]);
    assert!(report.is_complete());
    assert!(missing_epochs(&store, &range).unwrap().is_empty());
}

#[tokio::test]
async fn test_sync_then_score_against_durable_store() {
    let policy = small_policy();
    let chain = Arc::new(MockChain::new().with_policy(policy));
    chain.set_current_epoch(14);
    let head = policy.election_block_of(14) + 3;
    chain.set_head(head);
    for epoch in 10..=12 {
        script_epoch(&chain, &policy, epoch, &[(A, 6), (B, 4)], &[A], &[B]);
    }
    chain.set_active_validators(&[(A, 120), (B, 880)]);

    let store = SledStore::temporary().unwrap();
    let range = resolve_range(&policy, head, 14, &window(&policy, 12, 3)).unwrap();
    let report = synchronize(
        Arc::clone(&chain),
        &store,
        &policy,
        &range,
        &StreamSettings::default(),
    )
    .await
    .unwrap();
    assert!(report.is_complete());

    let scores = compute_and_store_scores(chain.as_ref(), &store, &range, &ScoreParams::default())
        .await
        .unwrap();

    // A: modest stake, produced everything
    assert!(scores[A].dominance > 0.8);
    assert_eq!(scores[A].reliability, 1.0);
    assert!(scores[A].total > 0.5);
    // B: dominant stake, missed everything; measured zero, not invalid
    assert_eq!(scores[B].dominance, 0.0);
    assert_eq!(scores[B].reliability, 0.0);
    assert_eq!(scores[B].total, 0.0);
    assert!(scores[B].is_valid());

    let mut cache = ValidatorIdCache::new();
    for address in [A, B] {
        let id = store.validator_id(address, &mut cache).unwrap();
        let stored = store.score(id, range.from_epoch, range.to_epoch).unwrap();
        assert_eq!(stored, Some(scores[address]));
    }
}
