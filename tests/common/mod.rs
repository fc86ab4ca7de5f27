#![allow(dead_code)]

use async_trait::async_trait;
use delegate_committee::carrier::encode_candidate_names;
use delegate_committee::chain::{
    BucketCursor, BucketPage, ChainClient, ClaimRequest, PendingClaim, RawBucket,
    RawRegistration, RegistrationPage,
};
use delegate_committee::{
    Address, CandidateName, Committee, CommitteeConfig, CommitteeError, CommitteeStatus, Result,
    RetryConfig,
};
use num_bigint::BigUint;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

pub const GENESIS_TIME: u64 = 1_600_000_000;
pub const BLOCK_TIME: u64 = 10;
pub const DAY: u64 = 86_400;

/// Timestamp of the block at `height`
pub fn time_of(height: u64) -> u64 {
    GENESIS_TIME + height * BLOCK_TIME
}

pub fn name(s: &str) -> CandidateName {
    CandidateName::new(s).unwrap()
}

pub fn voter(n: u8) -> Address {
    Address([n; 20])
}

struct LedgerBucket {
    created_at: u64,
    raw: RawBucket,
    candidate: CandidateName,
}

/// Holds the next bucket page read at `height` until released
pub struct PageGate {
    height: u64,
    pub entered: Arc<Notify>,
    pub release: Arc<Notify>,
}

struct LedgerRegistration {
    created_at: u64,
    raw: RawRegistration,
    name: CandidateName,
}

/// In-memory ledger exposing buckets as a circular list
///
/// A record is visible at every height from its creation height on, so each
/// historical height sees a stable prefix of the list.
pub struct MockChain {
    tip: AtomicU64,
    buckets: RwLock<Vec<LedgerBucket>>,
    registrations: RwLock<Vec<LedgerRegistration>>,
    fail_reads: AtomicBool,
    gate: Mutex<Option<PageGate>>,
    pub submitted: Mutex<Vec<ClaimRequest>>,
}

impl MockChain {
    pub fn new(tip: u64) -> Self {
        Self {
            tip: AtomicU64::new(tip),
            buckets: RwLock::new(Vec::new()),
            registrations: RwLock::new(Vec::new()),
            fail_reads: AtomicBool::new(false),
            gate: Mutex::new(None),
            submitted: Mutex::new(Vec::new()),
        }
    }

    pub fn set_tip(&self, tip: u64) {
        self.tip.store(tip, Ordering::SeqCst);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Pause the next bucket page read at `height`
    ///
    /// Returns the notifier fired when the read starts and the one that lets it finish.
    pub fn gate_buckets_at(&self, height: u64) -> (Arc<Notify>, Arc<Notify>) {
        let gate = PageGate {
            height,
            entered: Arc::new(Notify::new()),
            release: Arc::new(Notify::new()),
        };
        let handles = (gate.entered.clone(), gate.release.clone());
        *self.gate.lock() = Some(gate);
        handles
    }

    /// Add a bucket locked at its creation block
    pub fn stake(
        &self,
        created_at: u64,
        voter: Address,
        amount: u64,
        candidate: &str,
        duration: u64,
        decay: bool,
    ) {
        let mut buckets = self.buckets.write();
        let index = buckets.len() as u64;
        buckets.push(LedgerBucket {
            created_at,
            raw: RawBucket {
                index,
                voter,
                amount: BigUint::from(amount),
                start_time: time_of(created_at),
                duration,
                decay,
            },
            candidate: name(candidate),
        });
    }

    pub fn register(&self, created_at: u64, candidate: &str, self_staked: u64) {
        self.registrations.write().push(LedgerRegistration {
            created_at,
            raw: RawRegistration {
                owner: voter(0xa0),
                operator: voter(0xb0),
                reward: voter(0xc0),
                self_staked: BigUint::from(self_staked),
                beacon_pubkey: vec![0x02; 33],
            },
            name: name(candidate),
        });
    }

    fn check(&self) -> Result<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(CommitteeError::ChainClient("rpc unavailable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn tip_height(&self) -> Result<u64> {
        self.check()?;
        Ok(self.tip.load(Ordering::SeqCst))
    }

    async fn block_time(&self, height: u64) -> Result<u64> {
        self.check()?;
        Ok(time_of(height))
    }

    async fn registrations(&self, height: u64, offset: u64, limit: u32) -> Result<RegistrationPage> {
        self.check()?;
        let registrations = self.registrations.read();
        let visible: Vec<&LedgerRegistration> = registrations
            .iter()
            .filter(|r| r.created_at <= height)
            .skip(offset as usize)
            .take(limit as usize)
            .collect();
        let names: Vec<CandidateName> = visible.iter().map(|r| r.name).collect();
        Ok(RegistrationPage {
            entries: visible.iter().map(|r| r.raw.clone()).collect(),
            names: encode_candidate_names(&names),
        })
    }

    async fn buckets(&self, height: u64, cursor: BucketCursor, limit: u32) -> Result<BucketPage> {
        self.check()?;
        let gate = {
            let mut slot = self.gate.lock();
            match slot.as_ref() {
                Some(gate) if gate.height == height => slot.take(),
                _ => None,
            }
        };
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        let buckets = self.buckets.read();
        let visible: Vec<&LedgerBucket> = buckets.iter().filter(|b| b.created_at <= height).collect();
        if visible.is_empty() {
            return Ok(BucketPage::default());
        }
        let first = match cursor {
            BucketCursor::Start => 0,
            BucketCursor::After(index) => (index as usize + 1) % visible.len(),
        };
        let page: Vec<&LedgerBucket> = (0..limit as usize)
            .map(|k| visible[(first + k) % visible.len()])
            .collect();
        let names: Vec<CandidateName> = page.iter().map(|b| b.candidate).collect();
        Ok(BucketPage {
            entries: page.iter().map(|b| b.raw.clone()).collect(),
            candidates: encode_candidate_names(&names),
        })
    }

    async fn submit_claim(&self, request: &ClaimRequest) -> Result<PendingClaim> {
        let mut submitted = self.submitted.lock();
        submitted.push(request.clone());
        let mut tx_hash = [0u8; 32];
        tx_hash[..8].copy_from_slice(&(submitted.len() as u64).to_be_bytes());
        Ok(PendingClaim { tx_hash })
    }
}

/// Grid starting at 100 with 10-block epochs, 5 confirmations
pub fn committee_config() -> CommitteeConfig {
    CommitteeConfig {
        start_height: 100,
        interval: 10,
        page_size: 2,
        confirmations: 5,
        poll_interval_ms: 5,
        cache_size: 8,
        retry: RetryConfig {
            max_attempts: 3,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
        },
        ..Default::default()
    }
}

/// Poll `probe` until it holds or two seconds pass
pub async fn eventually<F>(what: &str, mut probe: F)
where
    F: FnMut() -> bool,
{
    for _ in 0..400 {
        if probe() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {}", what);
}

pub async fn wait_for_status<F>(what: &str, status: F, expected: CommitteeStatus)
where
    F: Fn() -> CommitteeStatus,
{
    eventually(what, || status() == expected).await
}

/// Wait until `committee` has synchronized the epoch at `height`
pub async fn wait_for_height<C: Committee + ?Sized>(committee: &C, height: u64) {
    for _ in 0..400 {
        if let Ok(Some(latest)) = committee.latest_height().await {
            if latest >= height {
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("committee never reached height {}", height);
}
