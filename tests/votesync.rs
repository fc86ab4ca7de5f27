mod common;

use common::*;
use async_trait::async_trait;
use delegate_committee::chain::ClaimSignature;
use delegate_committee::{
    Bucket, ClaimPolicyConfig, Committee, CommitteeError, CommitteeStatus, DelegateNode,
    ElectionResult, MemoryStore, NativeCommittee, NativeCommitteeConfig, RawData, Result,
    StorageConfig, VoteSync, VoteSyncConfig,
};
use num_bigint::BigUint;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

fn votesync_config() -> VoteSyncConfig {
    VoteSyncConfig {
        start_height: 100,
        cycle_interval: 20,
        poll_interval_ms: 5,
        retained_cycles: 2,
        policy: ClaimPolicyConfig::WeightedVotes,
    }
}

fn signature() -> ClaimSignature {
    ClaimSignature {
        v: 27,
        r: [1; 32],
        s: [2; 32],
    }
}

fn ledger() -> Arc<MockChain> {
    let chain = MockChain::new(127);
    chain.register(100, "alpha", 1_000);
    chain.stake(100, voter(1), 100, "alpha", 30 * DAY, false);
    chain.stake(105, voter(2), 200, "beta", 30 * DAY, false);
    chain.stake(112, voter(1), 150, "alpha", 30 * DAY, true);
    Arc::new(chain)
}

#[tokio::test]
async fn test_proofs_follow_the_committee() {
    let chain = ledger();
    let node = DelegateNode::new(
        &StorageConfig::default(),
        committee_config(),
        votesync_config(),
        chain.clone(),
    )
    .unwrap();
    assert!(node.votesync().proof_for_account(&voter(1)).is_none());

    node.start().await.unwrap();
    wait_for_height(node.committee().as_ref(), 120).await;
    eventually("cycle 1", || {
        node.votesync()
            .current_cycle()
            .map_or(false, |cycle| cycle.cycle() == 1)
    })
    .await;
    wait_for_status("active", || node.votesync().status(), CommitteeStatus::Active).await;

    let cycle = node.votesync().current_cycle().unwrap();
    assert_eq!(cycle.height(), 120);
    let frozen = node.committee().result_by_height(120).await.unwrap();
    assert_eq!(cycle.total_claimable(), frozen.total_voted_stakes);

    let proof = node.votesync().proof_for_account(&voter(1)).unwrap();
    assert_eq!(proof.cycle, 1);
    assert_eq!(proof.root, cycle.root());
    assert!(proof.amount > BigUint::from(250u32));
    assert!(proof.verify());

    // an account without votes gets no proof, not an error
    assert!(node.votesync().proof_for_account(&voter(9)).is_none());

    let pending = node
        .votesync()
        .submit_claim(&voter(2), 1_700_000_000, signature())
        .await
        .unwrap();
    assert_eq!(pending.tx_hash[7], 1);
    {
        let submitted = chain.submitted.lock();
        assert_eq!(submitted.len(), 1);
        let request = &submitted[0];
        assert_eq!(request.account, voter(2));
        assert_eq!(request.root, cycle.root());
        assert_eq!(request.deadline, 1_700_000_000);
        assert_eq!(request.signature, signature());
    }

    let err = node
        .votesync()
        .submit_claim(&voter(9), 1_700_000_000, signature())
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(chain.submitted.lock().len(), 1);

    node.stop().await;
    assert_eq!(node.votesync().status(), CommitteeStatus::Inactive);
    assert_eq!(node.committee().status(), CommitteeStatus::Inactive);
}

fn native_bucket(index: u64, voter_id: u8, amount: u64) -> Bucket {
    Bucket {
        index,
        voter: voter(voter_id),
        amount: BigUint::from(amount),
        candidate: name("native"),
        start_time: 0,
        duration: 0,
        decay: false,
    }
}

#[tokio::test]
async fn test_retained_cycle_window() {
    let committee = Arc::new(
        NativeCommittee::new(
            NativeCommitteeConfig {
                start_height: 0,
                interval: 10,
                ..Default::default()
            },
            Arc::new(MemoryStore::new()),
        )
        .unwrap(),
    );
    let votesync = VoteSync::new(
        VoteSyncConfig {
            start_height: 0,
            cycle_interval: 10,
            retained_cycles: 2,
            ..Default::default()
        },
        committee.clone(),
        ledger(),
    )
    .unwrap();
    assert!(!votesync.refresh().await.unwrap());

    for epoch in 0..6u64 {
        committee
            .put_native_poll_by_epoch(epoch, 1_000 + epoch, vec![native_bucket(0, 1, 10 + epoch)])
            .await
            .unwrap();
        assert!(votesync.refresh().await.unwrap());
    }

    assert_eq!(votesync.retained_cycles(), vec![3, 4, 5]);
    let latest = votesync.proof_for_account(&voter(1)).unwrap();
    assert_eq!(latest.cycle, 5);
    assert_eq!(latest.amount, BigUint::from(15u32));

    let older = votesync.proof_for_account_in_cycle(3, &voter(1)).unwrap();
    assert_eq!(older.amount, BigUint::from(13u32));
    assert!(older.verify());
    assert_ne!(older.root, latest.root);
    assert!(votesync.proof_for_account_in_cycle(2, &voter(1)).is_none());
}

/// Native committee whose ranking reads can be made to fail
struct FlakyCommittee {
    inner: NativeCommittee,
    fail: AtomicBool,
}

#[async_trait]
impl Committee for FlakyCommittee {
    async fn start(&self) -> Result<()> {
        self.inner.start().await
    }

    async fn stop(&self) {
        self.inner.stop().await
    }

    fn status(&self) -> CommitteeStatus {
        self.inner.status()
    }

    async fn latest_height(&self) -> Result<Option<u64>> {
        self.inner.latest_height().await
    }

    async fn result_by_height(&self, height: u64) -> Result<Arc<ElectionResult>> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(CommitteeError::Corrupted("snapshot checksum".into()));
        }
        self.inner.result_by_height(height).await
    }

    async fn raw_data_by_height(&self, height: u64) -> Result<RawData> {
        self.inner.raw_data_by_height(height).await
    }

    async fn height_by_time(&self, timestamp: u64) -> Result<u64> {
        self.inner.height_by_time(timestamp).await
    }
}

#[tokio::test]
async fn test_failed_refresh_keeps_installed_cycle() {
    let committee = Arc::new(FlakyCommittee {
        inner: NativeCommittee::new(
            NativeCommitteeConfig {
                start_height: 0,
                interval: 10,
                ..Default::default()
            },
            Arc::new(MemoryStore::new()),
        )
        .unwrap(),
        fail: AtomicBool::new(false),
    });
    committee
        .inner
        .put_native_poll_by_epoch(0, 1_000, vec![native_bucket(0, 1, 10)])
        .await
        .unwrap();

    let votesync = VoteSync::new(
        VoteSyncConfig {
            start_height: 0,
            cycle_interval: 10,
            ..Default::default()
        },
        committee.clone(),
        ledger(),
    )
    .unwrap();
    assert!(votesync.refresh().await.unwrap());
    let installed = votesync.current_cycle().unwrap();

    committee
        .inner
        .put_native_poll_by_epoch(1, 2_000, vec![native_bucket(0, 1, 40)])
        .await
        .unwrap();
    committee.fail.store(true, Ordering::SeqCst);
    let err = votesync.refresh().await.unwrap_err();
    assert!(matches!(err, CommitteeError::Corrupted(_)));

    let current = votesync.current_cycle().unwrap();
    assert_eq!(current.cycle(), 0);
    assert_eq!(current.root(), installed.root());
    assert_eq!(
        votesync.proof_for_account(&voter(1)).unwrap().amount,
        BigUint::from(10u32)
    );

    committee.fail.store(false, Ordering::SeqCst);
    assert!(votesync.refresh().await.unwrap());
    assert_eq!(votesync.current_cycle().unwrap().cycle(), 1);
    assert_eq!(
        votesync.proof_for_account(&voter(1)).unwrap().amount,
        BigUint::from(40u32)
    );
}
