//! Committee query surface and its two staking models
//!
//! Both variants share the archive, the ranking engine and the sync worker;
//! they differ only in how snapshots reach the archive:
//!
//! - [`DelegatedCommittee`] walks the voting contract through the vote
//!   carrier, one epoch boundary at a time.
//! - [`NativeCommittee`] is fed by an external block pipeline through
//!   [`NativeCommittee::put_native_poll_by_epoch`]; its loop only keeps health.

use crate::archive::Archive;
use crate::carrier::VoteCarrier;
use crate::chain::ChainClient;
use crate::config::{CommitteeConfig, NativeCommitteeConfig};
use crate::error::{CommitteeError, Result};
use crate::indexing::EpochGrid;
use crate::query::QueryEngine;
use crate::ranking::{ElectionResult, ResultCalculator};
use crate::retry::RetryPolicy;
use crate::schema::namespaces;
use crate::storage::KvStore;
use crate::sync::{SyncDriver, SyncWorker};
use crate::types::{Bucket, CommitteeStatus, EpochSnapshot, RawData};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

/// Ranking query surface served to the API layer
#[async_trait]
pub trait Committee: Send + Sync {
    /// Launch the background sync loop
    async fn start(&self) -> Result<()>;

    /// Stop the sync loop and wait for it to exit; idempotent
    async fn stop(&self);

    fn status(&self) -> CommitteeStatus;

    /// Boundary height of the latest synchronized epoch
    async fn latest_height(&self) -> Result<Option<u64>>;

    async fn result_by_height(&self, height: u64) -> Result<Arc<ElectionResult>>;

    async fn raw_data_by_height(&self, height: u64) -> Result<RawData>;

    /// Boundary height of the latest epoch minted at or before `timestamp`
    async fn height_by_time(&self, timestamp: u64) -> Result<u64>;
}

/// Walks the voting contract epoch by epoch
struct DelegatedSync {
    archive: Arc<Archive>,
    chain: Arc<dyn ChainClient>,
    carrier: VoteCarrier,
    retry: RetryPolicy,
    page_size: u32,
    confirmations: u64,
}

impl DelegatedSync {
    async fn sync_epoch(
        &self,
        epoch: u64,
        height: u64,
        shutdown: &watch::Receiver<bool>,
    ) -> Result<()> {
        let chain = &self.chain;
        let mint_time = self
            .retry
            .run("fetch block time", || async move { chain.block_time(height).await })
            .await?;
        let registrations = self
            .carrier
            .all_registrations(height, self.page_size, shutdown)
            .await?;
        let buckets = self
            .carrier
            .all_votes(height, self.page_size, shutdown)
            .await?;

        // A stop request during the walk must not leave a half-read epoch behind
        if *shutdown.borrow() {
            return Err(CommitteeError::Cancelled);
        }

        let snapshot = EpochSnapshot {
            epoch,
            mint_time,
            registrations,
            buckets,
        };
        self.archive.put(epoch, &snapshot).await
    }
}

#[async_trait]
impl SyncDriver for DelegatedSync {
    async fn tick(&self, shutdown: &watch::Receiver<bool>) -> Result<bool> {
        let chain = &self.chain;
        let tip = self
            .retry
            .run("fetch tip height", || async move { chain.tip_height().await })
            .await?;
        let confirmed = tip.saturating_sub(self.confirmations);

        let mut synced = 0u64;
        loop {
            if *shutdown.borrow() {
                return Err(CommitteeError::Cancelled);
            }
            let epoch = self.archive.next_epoch().await?;
            let height = self.archive.grid().height_of(epoch);
            if height > confirmed || tip < self.confirmations {
                break;
            }
            self.sync_epoch(epoch, height, shutdown).await?;
            synced += 1;
        }

        if synced > 0 {
            debug!("Synchronized {} delegated epochs up to tip {}", synced, tip);
        }
        Ok(self.archive.tip_epoch().await?.is_some())
    }
}

/// Committee backed by the on-chain voting contract
pub struct DelegatedCommittee {
    query: QueryEngine,
    driver: Arc<DelegatedSync>,
    worker: SyncWorker,
}

impl DelegatedCommittee {
    pub fn new(
        config: CommitteeConfig,
        chain: Arc<dyn ChainClient>,
        store: Arc<dyn KvStore>,
    ) -> Result<Self> {
        config.validate()?;
        let grid = EpochGrid::new(config.start_height, config.interval)?;
        let retry = RetryPolicy::from(&config.retry);
        let archive = Arc::new(Archive::new(store, namespaces::DELEGATED, grid, retry));

        info!(
            "Delegated committee from height {} every {} blocks",
            config.start_height, config.interval
        );

        let driver = Arc::new(DelegatedSync {
            archive: archive.clone(),
            carrier: VoteCarrier::new(chain.clone(), retry),
            chain,
            retry,
            page_size: config.page_size,
            confirmations: config.confirmations,
        });
        Ok(Self {
            query: QueryEngine::new(
                archive,
                ResultCalculator::from_config(&config.ranking),
                config.cache_size,
            ),
            driver,
            worker: SyncWorker::new(namespaces::DELEGATED, config.poll_interval()),
        })
    }

    pub fn archive(&self) -> &Arc<Archive> {
        self.query.archive()
    }
}

#[async_trait]
impl Committee for DelegatedCommittee {
    async fn start(&self) -> Result<()> {
        self.worker.start(self.driver.clone()).await
    }

    async fn stop(&self) {
        self.worker.stop().await
    }

    fn status(&self) -> CommitteeStatus {
        self.worker.status()
    }

    async fn latest_height(&self) -> Result<Option<u64>> {
        self.query.latest_height().await
    }

    async fn result_by_height(&self, height: u64) -> Result<Arc<ElectionResult>> {
        self.query.result_by_height(height).await
    }

    async fn raw_data_by_height(&self, height: u64) -> Result<RawData> {
        self.query.raw_data_by_height(height).await
    }

    async fn height_by_time(&self, timestamp: u64) -> Result<u64> {
        self.query.height_by_time(timestamp).await
    }
}

/// Health bookkeeping for the natively fed archive
struct NativeSync {
    archive: Arc<Archive>,
}

#[async_trait]
impl SyncDriver for NativeSync {
    async fn tick(&self, shutdown: &watch::Receiver<bool>) -> Result<bool> {
        if *shutdown.borrow() {
            return Err(CommitteeError::Cancelled);
        }
        let tip = self.archive.tip_epoch().await?;
        debug!("Native archive tip epoch: {:?}", tip);
        Ok(tip.is_some())
    }
}

/// Committee fed directly by the host chain's staking protocol
pub struct NativeCommittee {
    query: QueryEngine,
    driver: Arc<NativeSync>,
    worker: SyncWorker,
}

impl NativeCommittee {
    pub fn new(config: NativeCommitteeConfig, store: Arc<dyn KvStore>) -> Result<Self> {
        config.validate()?;
        let grid = EpochGrid::new(config.start_height, config.interval)?;
        let retry = RetryPolicy::from(&config.retry);
        let archive = Arc::new(Archive::new(store, namespaces::NATIVE, grid, retry));

        info!(
            "Native committee from height {} every {} blocks",
            config.start_height, config.interval
        );

        Ok(Self {
            query: QueryEngine::new(
                archive.clone(),
                ResultCalculator::from_config(&config.ranking),
                config.cache_size,
            ),
            driver: Arc::new(NativeSync { archive }),
            worker: SyncWorker::new(namespaces::NATIVE, config.poll_interval()),
        })
    }

    pub fn archive(&self) -> &Arc<Archive> {
        self.query.archive()
    }

    /// Store the native buckets polled at `epoch`, replacing any earlier poll
    pub async fn put_native_poll_by_epoch(
        &self,
        epoch: u64,
        mint_time: u64,
        buckets: Vec<Bucket>,
    ) -> Result<()> {
        let snapshot = EpochSnapshot {
            epoch,
            mint_time,
            registrations: Vec::new(),
            buckets,
        };
        let replaced = self.query.archive().upsert(epoch, &snapshot).await?;
        if replaced {
            self.query.invalidate(epoch);
        }
        Ok(())
    }

    pub async fn native_buckets_by_epoch(&self, epoch: u64) -> Result<Vec<Bucket>> {
        Ok(self.query.archive().get(epoch).await?.buckets)
    }
}

#[async_trait]
impl Committee for NativeCommittee {
    async fn start(&self) -> Result<()> {
        self.worker.start(self.driver.clone()).await
    }

    async fn stop(&self) {
        self.worker.stop().await
    }

    fn status(&self) -> CommitteeStatus {
        self.worker.status()
    }

    async fn latest_height(&self) -> Result<Option<u64>> {
        self.query.latest_height().await
    }

    async fn result_by_height(&self, height: u64) -> Result<Arc<ElectionResult>> {
        self.query.result_by_height(height).await
    }

    async fn raw_data_by_height(&self, height: u64) -> Result<RawData> {
        self.query.raw_data_by_height(height).await
    }

    async fn height_by_time(&self, timestamp: u64) -> Result<u64> {
        self.query.height_by_time(timestamp).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use crate::types::{Address, CandidateName};
    use num_bigint::BigUint;
    use std::time::Duration;

    fn bucket(index: u64, amount: u64, candidate: &str) -> Bucket {
        Bucket {
            index,
            voter: Address([index as u8; 20]),
            amount: BigUint::from(amount),
            candidate: CandidateName::new(candidate).unwrap(),
            start_time: 0,
            duration: 0,
            decay: false,
        }
    }

    fn native() -> NativeCommittee {
        NativeCommittee::new(
            NativeCommitteeConfig {
                start_height: 500,
                interval: 50,
                poll_interval_ms: 5,
                ..Default::default()
            },
            Arc::new(MemoryStore::new()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_native_poll_upsert_refreshes_results() {
        let committee = native();
        committee
            .put_native_poll_by_epoch(0, 1_000, vec![bucket(1, 10, "alpha")])
            .await
            .unwrap();
        let first = committee.result_by_height(520).await.unwrap();
        assert_eq!(first.candidates[0].score, BigUint::from(10u32));

        committee
            .put_native_poll_by_epoch(0, 1_000, vec![bucket(1, 10, "alpha"), bucket(2, 30, "beta")])
            .await
            .unwrap();
        let second = committee.result_by_height(520).await.unwrap();
        assert_eq!(second.candidates[0].name.to_string(), "beta");
        assert_eq!(committee.native_buckets_by_epoch(0).await.unwrap().len(), 2);
        assert_eq!(committee.latest_height().await.unwrap(), Some(500));
    }

    #[tokio::test]
    async fn test_native_poll_must_stay_contiguous() {
        let committee = native();
        let err = committee
            .put_native_poll_by_epoch(1, 1_000, vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, CommitteeError::EpochGap { epoch: 1, next: 0 }));
        assert!(committee
            .native_buckets_by_epoch(0)
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_native_status_follows_ingestion() {
        let committee = native();
        committee.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(committee.status(), CommitteeStatus::Starting);

        committee
            .put_native_poll_by_epoch(0, 1_000, vec![bucket(1, 10, "alpha")])
            .await
            .unwrap();
        for _ in 0..200 {
            if committee.status() == CommitteeStatus::Active {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(committee.status(), CommitteeStatus::Active);

        committee.stop().await;
        assert_eq!(committee.status(), CommitteeStatus::Inactive);
        // queries keep working after stop
        assert_eq!(committee.height_by_time(1_000).await.unwrap(), 500);
    }
}
