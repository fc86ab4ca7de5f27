//! Committee configuration
//!
//! Loading these structs from a file is the embedding process's job; every
//! struct deserializes with serde and validates itself before use.

use crate::error::{CommitteeError, Result};
use crate::types::amount_serde;
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Bounded retry settings for transient chain/KV failures
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Back-off before the second attempt
    pub initial_backoff_ms: u64,
    /// Ceiling for the doubling back-off
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff_ms: 100,
            max_backoff_ms: 3_200,
        }
    }
}

impl RetryConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(CommitteeError::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.initial_backoff_ms > self.max_backoff_ms {
            return Err(CommitteeError::Config(
                "retry.initial_backoff_ms exceeds retry.max_backoff_ms".to_string(),
            ));
        }
        Ok(())
    }
}

/// Shape of the decay curve applied to bucket weights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecayConfig {
    /// `1 + ln(ceil(remaining_days)) / ln(base) / divisor`
    Logarithmic { base: f64, divisor: f64 },
    /// Every bucket counts at its base amount
    Flat,
}

impl Default for DecayConfig {
    fn default() -> Self {
        DecayConfig::Logarithmic {
            base: 1.2,
            divisor: 100.0,
        }
    }
}

/// Ranking settings shared by both committee variants
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingConfig {
    pub decay: DecayConfig,
    /// Candidates scoring below this are left out of the ranking
    #[serde(with = "amount_serde")]
    pub score_threshold: BigUint,
    /// Candidates self-staking below this are left out of the ranking
    #[serde(with = "amount_serde")]
    pub self_staking_threshold: BigUint,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            decay: DecayConfig::default(),
            score_threshold: BigUint::default(),
            self_staking_threshold: BigUint::default(),
        }
    }
}

impl RankingConfig {
    pub fn validate(&self) -> Result<()> {
        if let DecayConfig::Logarithmic { base, divisor } = self.decay {
            if !(base > 1.0) || !base.is_finite() {
                return Err(CommitteeError::Config(format!(
                    "decay base must be finite and greater than 1, got {}",
                    base
                )));
            }
            if !(divisor > 0.0) || !divisor.is_finite() {
                return Err(CommitteeError::Config(format!(
                    "decay divisor must be finite and positive, got {}",
                    divisor
                )));
            }
        }
        Ok(())
    }
}

/// Contract-backed (delegated) committee configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitteeConfig {
    /// First height of the epoch grid
    pub start_height: u64,
    /// Heights per epoch
    pub interval: u64,
    /// Records requested per chain page
    pub page_size: u32,
    /// Blocks an epoch boundary must sit below the chain tip before syncing
    pub confirmations: u64,
    /// How often the sync loop polls the chain tip
    pub poll_interval_ms: u64,
    /// Cached election results (one per epoch)
    pub cache_size: usize,
    pub retry: RetryConfig,
    pub ranking: RankingConfig,
}

impl Default for CommitteeConfig {
    fn default() -> Self {
        Self {
            start_height: 0,
            interval: 720,
            page_size: 255,
            confirmations: 12,
            poll_interval_ms: 15_000,
            cache_size: 64,
            retry: RetryConfig::default(),
            ranking: RankingConfig::default(),
        }
    }
}

impl CommitteeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.interval == 0 {
            return Err(CommitteeError::Config("interval must be positive".to_string()));
        }
        if self.page_size == 0 {
            return Err(CommitteeError::Config("page_size must be positive".to_string()));
        }
        if self.poll_interval_ms == 0 {
            return Err(CommitteeError::Config(
                "poll_interval_ms must be positive".to_string(),
            ));
        }
        self.retry.validate()?;
        self.ranking.validate()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Natively-fed committee configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NativeCommitteeConfig {
    pub start_height: u64,
    pub interval: u64,
    pub poll_interval_ms: u64,
    pub cache_size: usize,
    pub retry: RetryConfig,
    pub ranking: RankingConfig,
}

impl Default for NativeCommitteeConfig {
    fn default() -> Self {
        Self {
            start_height: 0,
            interval: 720,
            poll_interval_ms: 10_000,
            cache_size: 64,
            retry: RetryConfig::default(),
            ranking: RankingConfig::default(),
        }
    }
}

impl NativeCommitteeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.interval == 0 {
            return Err(CommitteeError::Config("interval must be positive".to_string()));
        }
        if self.poll_interval_ms == 0 {
            return Err(CommitteeError::Config(
                "poll_interval_ms must be positive".to_string(),
            ));
        }
        self.retry.validate()?;
        self.ranking.validate()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// How claimable amounts are derived from a cycle's weighted votes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClaimPolicyConfig {
    /// Each voter may claim its total weighted votes
    WeightedVotes,
    /// A fixed pool is split pro rata by weighted votes
    RewardPool {
        #[serde(with = "amount_serde")]
        pool: BigUint,
    },
}

impl Default for ClaimPolicyConfig {
    fn default() -> Self {
        ClaimPolicyConfig::WeightedVotes
    }
}

/// VoteSync settlement cycle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteSyncConfig {
    /// Height of cycle 0
    pub start_height: u64,
    /// Heights per settlement cycle
    pub cycle_interval: u64,
    pub poll_interval_ms: u64,
    /// Superseded cycles kept for historical proof lookups
    pub retained_cycles: usize,
    pub policy: ClaimPolicyConfig,
}

impl Default for VoteSyncConfig {
    fn default() -> Self {
        Self {
            start_height: 0,
            cycle_interval: 720 * 24,
            poll_interval_ms: 60_000,
            retained_cycles: 4,
            policy: ClaimPolicyConfig::default(),
        }
    }
}

impl VoteSyncConfig {
    pub fn validate(&self) -> Result<()> {
        if self.cycle_interval == 0 {
            return Err(CommitteeError::Config(
                "cycle_interval must be positive".to_string(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(CommitteeError::Config(
                "poll_interval_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Where the archive keeps its data
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Database path; `None` keeps everything in memory
    pub db_path: Option<String>,
}
