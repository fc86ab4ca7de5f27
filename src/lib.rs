//! Delegate committee - point-in-time rankings of delegate candidates
//!
//! The committee follows stake buckets on an external ledger and answers, for
//! any synchronized height, which candidates hold the most decay-weighted
//! votes. Two staking models feed the same ranking surface: buckets read from
//! a voting contract ("delegated") and buckets pushed by the host chain's
//! protocol ("native"). VoteSync turns frozen rankings into per-cycle claim
//! proofs.
//!
//! # Architecture
//!
//! ```text
//! ChainClient (paginated reads)
//!     ↓
//! VoteCarrier (circular bucket walk, name decoding)
//!     ↓
//! Committee sync loop ──→ Archive (one immutable snapshot per epoch)
//!                            ↓
//!                         QueryEngine ──→ ResultCalculator ──→ ElectionResult
//!                                                                 ↓
//!                                              VoteSync (claims + Merkle proofs)
//! ```
//!
//! # Query Flow
//!
//! ```text
//! ResultByHeight(h)
//!     ↓
//! EpochGrid: h → epoch
//!     ↓
//! Archive: epoch → snapshot (LRU-cached result if present)
//!     ↓
//! Weighting: bucket → weighted vote at the snapshot's mint time
//!     ↓
//! Ranking: score desc, name asc
//! ```

pub mod archive;
pub mod carrier;
pub mod chain;
pub mod committee;
pub mod config;
pub mod error;
pub mod indexing;
pub mod merkle;
pub mod proof_generator;
pub mod query;
pub mod ranking;
pub mod retry;
pub mod schema;
pub mod storage;
pub mod sync;
pub mod types;
pub mod votesync;
pub mod weighting;

pub use archive::Archive;
pub use carrier::VoteCarrier;
pub use chain::{BucketCursor, ChainClient, ClaimRequest, ClaimSignature, PendingClaim};
pub use committee::{Committee, DelegatedCommittee, NativeCommittee};
pub use config::{
    ClaimPolicyConfig, CommitteeConfig, DecayConfig, NativeCommitteeConfig, RankingConfig,
    RetryConfig, StorageConfig, VoteSyncConfig,
};
pub use error::{CommitteeError, Result};
pub use proof_generator::{AccountProof, ProofCycle, ProofGenerator};
pub use ranking::{CandidateResult, ElectionResult, ResultCalculator};
pub use storage::{open_store, KvStore, MemoryStore, ParityStore};
pub use types::{
    Address, Bucket, CandidateName, CommitteeStatus, EpochSnapshot, RawData, Registration, Vote,
};
pub use votesync::VoteSync;
pub use weighting::{DecayStrategy, Weighting};

use std::sync::Arc;
use tracing::info;

/// Delegated committee plus its VoteSync service on one store
pub struct DelegateNode {
    committee: Arc<DelegatedCommittee>,
    votesync: VoteSync,
}

impl DelegateNode {
    /// Open the store and wire the committee and VoteSync together
    pub fn new(
        storage: &StorageConfig,
        committee: CommitteeConfig,
        votesync: VoteSyncConfig,
        chain: Arc<dyn ChainClient>,
    ) -> Result<Self> {
        info!(
            "Initializing delegate node ({})",
            storage.db_path.as_deref().unwrap_or("in-memory")
        );
        let store = open_store(storage.db_path.as_deref())?;
        let committee = Arc::new(DelegatedCommittee::new(committee, chain.clone(), store)?);
        let votesync = VoteSync::new(votesync, committee.clone(), chain)?;
        Ok(Self {
            committee,
            votesync,
        })
    }

    pub fn committee(&self) -> &Arc<DelegatedCommittee> {
        &self.committee
    }

    pub fn votesync(&self) -> &VoteSync {
        &self.votesync
    }

    pub async fn start(&self) -> Result<()> {
        self.committee.start().await?;
        self.votesync.start().await
    }

    /// Stops VoteSync, then the committee
    pub async fn stop(&self) {
        self.votesync.stop().await;
        self.committee.stop().await;
    }
}
