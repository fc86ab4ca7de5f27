//! Per-cycle claim proofs
//!
//! A settlement cycle freezes one election result, turns it into claims with
//! a [`ClaimPolicy`] and commits to every `(cycle, account, amount)` leaf in a
//! Merkle tree. Claims are ordered by account so the same result always
//! yields the same root.

use crate::config::ClaimPolicyConfig;
use crate::error::{CommitteeError, Result};
use crate::merkle::{self, Hash, MerkleTree};
use crate::ranking::ElectionResult;
use crate::types::Address;
use num_bigint::BigUint;
use num_traits::Zero;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

/// One account's claimable amount
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claim {
    pub account: Address,
    pub amount: BigUint,
}

/// Derives claimable amounts from a frozen election result
pub trait ClaimPolicy: Send + Sync + Debug {
    /// Claims keyed by account; zero amounts are dropped by the caller
    fn claims(&self, result: &ElectionResult) -> Vec<Claim>;
}

/// Each voter may claim its total weighted votes
#[derive(Debug, Clone, Copy, Default)]
pub struct WeightedVotes;

impl ClaimPolicy for WeightedVotes {
    fn claims(&self, result: &ElectionResult) -> Vec<Claim> {
        result
            .weighted_votes_by_voter()
            .into_iter()
            .map(|(account, amount)| Claim { account, amount })
            .collect()
    }
}

/// A fixed pool split pro rata by weighted votes, rounded down
#[derive(Debug, Clone)]
pub struct RewardPool {
    pub pool: BigUint,
}

impl ClaimPolicy for RewardPool {
    fn claims(&self, result: &ElectionResult) -> Vec<Claim> {
        let by_voter = result.weighted_votes_by_voter();
        let total = by_voter
            .values()
            .fold(BigUint::zero(), |acc, amount| acc + amount);
        if total.is_zero() {
            return Vec::new();
        }
        by_voter
            .into_iter()
            .map(|(account, weight)| Claim {
                account,
                amount: &self.pool * weight / &total,
            })
            .collect()
    }
}

pub fn policy_from_config(config: &ClaimPolicyConfig) -> Arc<dyn ClaimPolicy> {
    match config {
        ClaimPolicyConfig::WeightedVotes => Arc::new(WeightedVotes),
        ClaimPolicyConfig::RewardPool { pool } => Arc::new(RewardPool { pool: pool.clone() }),
    }
}

/// Inclusion proof of one account's claim
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountProof {
    pub cycle: u64,
    /// Height of the frozen snapshot
    pub height: u64,
    pub account: Address,
    pub amount: BigUint,
    pub leaf_index: u32,
    /// Number of leaves in the cycle's tree
    pub leaf_count: u32,
    pub proof: Vec<Hash>,
    pub root: Hash,
}

impl AccountProof {
    pub fn leaf(&self) -> Hash {
        merkle::leaf_hash(self.cycle, &self.account, &self.amount)
    }

    /// Check the proof against the root it was issued with
    pub fn verify(&self) -> bool {
        self.verify_against(&self.root)
    }

    pub fn verify_against(&self, root: &Hash) -> bool {
        merkle::verify_proof(
            &self.leaf(),
            self.leaf_index,
            self.leaf_count,
            &self.proof,
            root,
        )
    }
}

/// Frozen claims of one settlement cycle and their Merkle tree
#[derive(Debug, Clone)]
pub struct ProofCycle {
    cycle: u64,
    height: u64,
    claims: Vec<Claim>,
    positions: HashMap<Address, usize>,
    tree: MerkleTree,
}

impl ProofCycle {
    /// Commit to `claims`; zero amounts are dropped and duplicates rejected
    pub fn build(cycle: u64, height: u64, mut claims: Vec<Claim>) -> Result<Self> {
        claims.retain(|claim| !claim.amount.is_zero());
        claims.sort_by(|a, b| a.account.cmp(&b.account));
        if claims.len() > u32::MAX as usize {
            return Err(CommitteeError::Corrupted(format!(
                "cycle {} has {} claims",
                cycle,
                claims.len()
            )));
        }

        let mut positions = HashMap::with_capacity(claims.len());
        for (i, claim) in claims.iter().enumerate() {
            if positions.insert(claim.account, i).is_some() {
                return Err(CommitteeError::Corrupted(format!(
                    "account {} claims twice in cycle {}",
                    claim.account, cycle
                )));
            }
        }

        let leaves: Vec<Hash> = claims
            .iter()
            .map(|claim| merkle::leaf_hash(cycle, &claim.account, &claim.amount))
            .collect();

        Ok(Self {
            cycle,
            height,
            claims,
            positions,
            tree: MerkleTree::build(&leaves),
        })
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn height(&self) -> u64 {
        self.height
    }

    pub fn root(&self) -> Hash {
        self.tree.root()
    }

    pub fn claims(&self) -> &[Claim] {
        &self.claims
    }

    pub fn total_claimable(&self) -> BigUint {
        self.claims
            .iter()
            .fold(BigUint::zero(), |acc, claim| acc + &claim.amount)
    }

    /// Proof for `account`, or `None` when it has nothing to claim
    pub fn proof_for(&self, account: &Address) -> Option<AccountProof> {
        let index = *self.positions.get(account)?;
        let claim = &self.claims[index];
        Some(AccountProof {
            cycle: self.cycle,
            height: self.height,
            account: claim.account,
            amount: claim.amount.clone(),
            leaf_index: index as u32,
            leaf_count: self.claims.len() as u32,
            proof: self.tree.proof(index)?,
            root: self.root(),
        })
    }
}

/// Builds proof cycles under one claim policy
#[derive(Debug, Clone)]
pub struct ProofGenerator {
    policy: Arc<dyn ClaimPolicy>,
}

impl ProofGenerator {
    pub fn new(policy: Arc<dyn ClaimPolicy>) -> Self {
        Self { policy }
    }

    pub fn from_config(config: &ClaimPolicyConfig) -> Self {
        Self::new(policy_from_config(config))
    }

    pub fn generate(&self, cycle: u64, height: u64, result: &ElectionResult) -> Result<ProofCycle> {
        ProofCycle::build(cycle, height, self.policy.claims(result))
    }
}
