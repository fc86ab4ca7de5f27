//! Candidate ranking
//!
//! Turns one epoch snapshot into an [`ElectionResult`]: buckets are weighted
//! at the snapshot's mint time, grouped by target candidate and ranked by the
//! sum of their weights. Self stake comes from the candidate's registration
//! and never feeds the score.

use crate::config::RankingConfig;
use crate::types::{Address, CandidateName, EpochSnapshot, Registration, Vote};
use crate::weighting::Weighting;
use num_bigint::BigUint;
use num_traits::Zero;
use std::collections::BTreeMap;

/// One ranked candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateResult {
    pub name: CandidateName,
    /// `None` for candidates that received votes without registering
    pub registration: Option<Registration>,
    /// Sum of weighted votes
    pub score: BigUint,
    pub self_staking_tokens: BigUint,
    /// Ordered by bucket index
    pub votes: Vec<Vote>,
}

/// Ranked view of one epoch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElectionResult {
    pub epoch: u64,
    pub mint_time: u64,
    /// Descending by score, ties broken by name
    pub candidates: Vec<CandidateResult>,
    /// Unweighted sum over every bucket in the snapshot
    pub total_votes: BigUint,
    /// Weighted sum over every bucket in the snapshot
    pub total_voted_stakes: BigUint,
}

impl ElectionResult {
    /// Top `n` candidates
    pub fn delegates(&self, n: usize) -> &[CandidateResult] {
        &self.candidates[..n.min(self.candidates.len())]
    }

    pub fn candidate(&self, name: &CandidateName) -> Option<&CandidateResult> {
        self.candidates.iter().find(|c| &c.name == name)
    }

    /// Weighted votes per voter across the ranked candidates
    pub fn weighted_votes_by_voter(&self) -> BTreeMap<Address, BigUint> {
        let mut by_voter: BTreeMap<Address, BigUint> = BTreeMap::new();
        for vote in self.candidates.iter().flat_map(|c| c.votes.iter()) {
            *by_voter.entry(vote.bucket.voter).or_default() += &vote.weighted_amount;
        }
        by_voter
    }
}

/// Snapshot to ranking calculator
#[derive(Debug, Clone)]
pub struct ResultCalculator {
    weighting: Weighting,
    score_threshold: BigUint,
    self_staking_threshold: BigUint,
}

impl ResultCalculator {
    pub fn new(
        weighting: Weighting,
        score_threshold: BigUint,
        self_staking_threshold: BigUint,
    ) -> Self {
        Self {
            weighting,
            score_threshold,
            self_staking_threshold,
        }
    }

    pub fn from_config(config: &RankingConfig) -> Self {
        Self::new(
            Weighting::from_config(&config.decay),
            config.score_threshold.clone(),
            config.self_staking_threshold.clone(),
        )
    }

    pub fn calculate(&self, snapshot: &EpochSnapshot) -> ElectionResult {
        let mut registrations: BTreeMap<CandidateName, &Registration> = BTreeMap::new();
        for registration in &snapshot.registrations {
            registrations.insert(registration.name, registration);
        }

        let mut total_votes = BigUint::zero();
        let mut total_voted_stakes = BigUint::zero();
        let mut groups: BTreeMap<CandidateName, Vec<Vote>> = BTreeMap::new();
        for bucket in &snapshot.buckets {
            let vote = self.weighting.vote(bucket, snapshot.mint_time);
            total_votes += &bucket.amount;
            total_voted_stakes += &vote.weighted_amount;
            groups.entry(bucket.candidate).or_default().push(vote);
        }
        for name in registrations.keys() {
            groups.entry(*name).or_default();
        }

        let mut candidates: Vec<CandidateResult> = groups
            .into_iter()
            .map(|(name, mut votes)| {
                votes.sort_by(|a, b| {
                    (a.bucket.index, a.bucket.voter).cmp(&(b.bucket.index, b.bucket.voter))
                });
                let score = votes
                    .iter()
                    .fold(BigUint::zero(), |acc, vote| acc + &vote.weighted_amount);
                let registration = registrations.get(&name).map(|r| (*r).clone());
                let self_staking_tokens = registration
                    .as_ref()
                    .map(|r| r.self_staked.clone())
                    .unwrap_or_default();
                CandidateResult {
                    name,
                    registration,
                    score,
                    self_staking_tokens,
                    votes,
                }
            })
            .filter(|c| {
                c.score >= self.score_threshold
                    && c.self_staking_tokens >= self.self_staking_threshold
            })
            .collect();

        candidates.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.name.cmp(&b.name)));

        ElectionResult {
            epoch: snapshot.epoch,
            mint_time: snapshot.mint_time,
            candidates,
            total_votes,
            total_voted_stakes,
        }
    }
}

impl Default for ResultCalculator {
    fn default() -> Self {
        Self::from_config(&RankingConfig::default())
    }
}
