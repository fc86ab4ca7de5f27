//! Bucket weighting
//!
//! A bucket's weighted amount is `amount * multiplier(remaining)`, where
//! `remaining` is the lock time left at the mint time. Non-decaying buckets
//! always count their full lock duration; decaying buckets lose remaining time
//! linearly until unlock, where the multiplier bottoms out at 1.
//!
//! The curve mapping remaining time to a multiplier is a [`DecayStrategy`].
//! Multipliers are fixed point (`WEIGHT_SCALE` = 1.0) so the same inputs give
//! bit-identical weights.

use crate::config::DecayConfig;
use crate::types::{Bucket, Vote};
use num_bigint::BigUint;
use std::fmt::Debug;
use std::sync::Arc;

pub const SECONDS_PER_DAY: u64 = 86_400;

/// Fixed-point scale of a multiplier: parts per billion
pub const WEIGHT_SCALE: u64 = 1_000_000_000;

/// Maps remaining lock time to a weight multiplier
///
/// Implementations must return at least `WEIGHT_SCALE` and be non-decreasing
/// in `remaining`.
pub trait DecayStrategy: Send + Sync + Debug {
    fn multiplier(&self, remaining: u64) -> u64;
}

/// `1 + ln(ceil(remaining_days)) / ln(base) / divisor`
#[derive(Debug, Clone, Copy)]
pub struct LogarithmicDecay {
    pub base: f64,
    pub divisor: f64,
}

impl DecayStrategy for LogarithmicDecay {
    fn multiplier(&self, remaining: u64) -> u64 {
        let days = remaining.div_ceil(SECONDS_PER_DAY);
        if days <= 1 {
            return WEIGHT_SCALE;
        }
        let bonus = (days as f64).ln() / self.base.ln() / self.divisor;
        let scaled = (WEIGHT_SCALE as f64 * (1.0 + bonus)).round();
        if scaled.is_finite() && scaled >= WEIGHT_SCALE as f64 {
            scaled as u64
        } else {
            WEIGHT_SCALE
        }
    }
}

/// No lock bonus
#[derive(Debug, Clone, Copy, Default)]
pub struct FlatWeight;

impl DecayStrategy for FlatWeight {
    fn multiplier(&self, _remaining: u64) -> u64 {
        WEIGHT_SCALE
    }
}

pub fn strategy_from_config(config: &DecayConfig) -> Arc<dyn DecayStrategy> {
    match *config {
        DecayConfig::Logarithmic { base, divisor } => Arc::new(LogarithmicDecay { base, divisor }),
        DecayConfig::Flat => Arc::new(FlatWeight),
    }
}

/// Lock time left at `mint_time`
pub fn remaining_duration(duration: u64, decay: bool, start_time: u64, mint_time: u64) -> u64 {
    if !decay || mint_time <= start_time {
        return duration;
    }
    start_time.saturating_add(duration).saturating_sub(mint_time)
}

/// `amount * multiplier / WEIGHT_SCALE`, rounded down
pub fn scale_amount(amount: &BigUint, multiplier: u64) -> BigUint {
    amount * BigUint::from(multiplier) / BigUint::from(WEIGHT_SCALE)
}

/// Weighting engine bound to one decay strategy
#[derive(Debug, Clone)]
pub struct Weighting {
    strategy: Arc<dyn DecayStrategy>,
}

impl Weighting {
    pub fn new(strategy: Arc<dyn DecayStrategy>) -> Self {
        Self { strategy }
    }

    pub fn from_config(config: &DecayConfig) -> Self {
        Self::new(strategy_from_config(config))
    }

    /// Weighted amount of a lock observed at `mint_time`
    pub fn weight(
        &self,
        amount: &BigUint,
        duration: u64,
        decay: bool,
        start_time: u64,
        mint_time: u64,
    ) -> BigUint {
        let remaining = remaining_duration(duration, decay, start_time, mint_time);
        scale_amount(amount, self.strategy.multiplier(remaining))
    }

    /// Enrich a bucket into a vote as of `mint_time`
    pub fn vote(&self, bucket: &Bucket, mint_time: u64) -> Vote {
        let remaining =
            remaining_duration(bucket.duration, bucket.decay, bucket.start_time, mint_time);
        Vote {
            bucket: bucket.clone(),
            weighted_amount: scale_amount(&bucket.amount, self.strategy.multiplier(remaining)),
            remaining,
        }
    }
}

impl Default for Weighting {
    fn default() -> Self {
        Self::from_config(&DecayConfig::default())
    }
}
