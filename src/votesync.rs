//! VoteSync: settlement cycles and claim proofs
//!
//! A background task watches the committee's latest synchronized height. When
//! a new cycle boundary is covered, it freezes the election result at that
//! boundary, builds the cycle's proof tree and installs it in one step. A
//! failed build leaves the installed cycles untouched.
//!
//! The newest cycle serves [`VoteSync::proof_for_account`]; up to
//! `retained_cycles` superseded cycles stay available for historical lookups.
//! Replay protection is the claim contract's job.

use crate::chain::{ChainClient, ClaimRequest, ClaimSignature, PendingClaim};
use crate::committee::Committee;
use crate::config::VoteSyncConfig;
use crate::error::{CommitteeError, Result};
use crate::indexing::EpochGrid;
use crate::proof_generator::{AccountProof, ProofCycle, ProofGenerator};
use crate::sync::{SyncDriver, SyncWorker};
use crate::types::{Address, CommitteeStatus};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

const WORKER_NAME: &str = "votesync";

/// Cycle builder state shared with the background task
struct CycleBuilder {
    committee: Arc<dyn Committee>,
    grid: EpochGrid,
    generator: ProofGenerator,
    retained: usize,
    /// Oldest first
    cycles: RwLock<VecDeque<Arc<ProofCycle>>>,
}

impl CycleBuilder {
    fn latest(&self) -> Option<Arc<ProofCycle>> {
        self.cycles.read().back().cloned()
    }

    fn install(&self, cycle: ProofCycle) {
        let mut cycles = self.cycles.write();
        if cycles.back().map_or(false, |c| c.cycle() >= cycle.cycle()) {
            return;
        }
        info!(
            "Installed cycle {} at height {}: {} claims, root {}",
            cycle.cycle(),
            cycle.height(),
            cycle.claims().len(),
            hex::encode(cycle.root())
        );
        cycles.push_back(Arc::new(cycle));
        while cycles.len() > self.retained + 1 {
            cycles.pop_front();
        }
    }

    /// Build the newest cycle covered by the committee, if not built yet
    async fn refresh(&self) -> Result<bool> {
        let has_cycle = self.latest().is_some();
        let Some(latest_height) = self.committee.latest_height().await? else {
            return Ok(has_cycle);
        };
        let Some(cycle) = self.grid.epoch_of(latest_height) else {
            return Ok(has_cycle);
        };
        if self.latest().map_or(false, |c| c.cycle() >= cycle) {
            return Ok(true);
        }

        let height = self.grid.height_of(cycle);
        let result = match self.committee.result_by_height(height).await {
            Ok(result) => result,
            Err(e) if e.is_not_found() => {
                debug!("Cycle {} height {} not synchronized: {}", cycle, height, e);
                return Ok(has_cycle);
            }
            Err(e) => return Err(e),
        };

        self.install(self.generator.generate(cycle, height, &result)?);
        Ok(true)
    }
}

#[async_trait]
impl SyncDriver for CycleBuilder {
    async fn tick(&self, shutdown: &watch::Receiver<bool>) -> Result<bool> {
        if *shutdown.borrow() {
            return Err(CommitteeError::Cancelled);
        }
        self.refresh().await
    }
}

/// Claim proof service over a committee's rankings
pub struct VoteSync {
    builder: Arc<CycleBuilder>,
    chain: Arc<dyn ChainClient>,
    worker: SyncWorker,
}

impl VoteSync {
    pub fn new(
        config: VoteSyncConfig,
        committee: Arc<dyn Committee>,
        chain: Arc<dyn ChainClient>,
    ) -> Result<Self> {
        config.validate()?;
        let builder = CycleBuilder {
            committee,
            grid: EpochGrid::new(config.start_height, config.cycle_interval)?,
            generator: ProofGenerator::from_config(&config.policy),
            retained: config.retained_cycles,
            cycles: RwLock::new(VecDeque::new()),
        };
        Ok(Self {
            builder: Arc::new(builder),
            chain,
            worker: SyncWorker::new(WORKER_NAME, config.poll_interval()),
        })
    }

    pub async fn start(&self) -> Result<()> {
        self.worker.start(self.builder.clone()).await
    }

    pub async fn stop(&self) {
        self.worker.stop().await
    }

    pub fn status(&self) -> CommitteeStatus {
        self.worker.status()
    }

    /// Build the newest covered cycle now instead of waiting for the next tick
    ///
    /// Returns `true` once at least one cycle is installed.
    pub async fn refresh(&self) -> Result<bool> {
        self.builder.refresh().await
    }

    pub fn current_cycle(&self) -> Option<Arc<ProofCycle>> {
        self.builder.latest()
    }

    /// Cycles currently retained, oldest first
    pub fn retained_cycles(&self) -> Vec<u64> {
        self.builder
            .cycles
            .read()
            .iter()
            .map(|cycle| cycle.cycle())
            .collect()
    }

    /// Proof of `account`'s claim in the newest cycle
    ///
    /// `None` means no proof: no cycle is built yet or the account has nothing
    /// to claim.
    pub fn proof_for_account(&self, account: &Address) -> Option<AccountProof> {
        self.builder.latest()?.proof_for(account)
    }

    /// Proof of `account`'s claim in a retained `cycle`
    pub fn proof_for_account_in_cycle(&self, cycle: u64, account: &Address) -> Option<AccountProof> {
        let cycles = self.builder.cycles.read();
        cycles
            .iter()
            .find(|c| c.cycle() == cycle)?
            .proof_for(account)
    }

    /// Submit `account`'s claim for the newest cycle
    ///
    /// The signature authorizes the claim for `deadline`; it is produced by the
    /// claimant, not here. Submissions are not retried.
    pub async fn submit_claim(
        &self,
        account: &Address,
        deadline: u64,
        signature: ClaimSignature,
    ) -> Result<PendingClaim> {
        let proof = self.proof_for_account(account).ok_or_else(|| {
            CommitteeError::NotFound(format!("no claim for {} in the current cycle", account))
        })?;

        let request = ClaimRequest {
            cycle: proof.cycle,
            root: proof.root,
            account: proof.account,
            amount: proof.amount,
            leaf_index: proof.leaf_index,
            leaf_count: proof.leaf_count,
            proof: proof.proof,
            deadline,
            signature,
        };
        let pending = self.chain.submit_claim(&request).await?;
        info!(
            "Submitted cycle {} claim for {}: tx {}",
            request.cycle,
            account,
            hex::encode(pending.tx_hash)
        );
        Ok(pending)
    }
}
