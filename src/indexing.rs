//! Epoch grid and mint-time indexing
//!
//! Heights are coarsened onto a fixed grid: epoch `n` covers heights
//! `[start + n * interval, start + (n + 1) * interval)`. Only the boundary
//! height of each epoch produces a snapshot.

use crate::error::{CommitteeError, Result};
use std::future::Future;

/// Fixed height grid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpochGrid {
    start_height: u64,
    interval: u64,
}

impl EpochGrid {
    pub fn new(start_height: u64, interval: u64) -> Result<Self> {
        if interval == 0 {
            return Err(CommitteeError::Config(
                "epoch interval must be positive".to_string(),
            ));
        }
        Ok(Self {
            start_height,
            interval,
        })
    }

    pub fn start_height(&self) -> u64 {
        self.start_height
    }

    /// Epoch containing `height`, or `None` below the grid start
    pub fn epoch_of(&self, height: u64) -> Option<u64> {
        height
            .checked_sub(self.start_height)
            .map(|offset| offset / self.interval)
    }

    /// Boundary height of `epoch`
    pub fn height_of(&self, epoch: u64) -> u64 {
        self.start_height
            .saturating_add(epoch.saturating_mul(self.interval))
    }
}

/// Find the latest epoch in `0..=tip` whose mint time is at or before `target`
///
/// Mint times are non-decreasing in epoch order, so this is a binary search
/// making `O(log tip)` calls to `mint_time_of`. Returns `None` when `target`
/// precedes epoch 0.
pub async fn latest_epoch_at_or_before<F, Fut>(
    tip: u64,
    target: u64,
    mut mint_time_of: F,
) -> Result<Option<u64>>
where
    F: FnMut(u64) -> Fut,
    Fut: Future<Output = Result<u64>>,
{
    if mint_time_of(0).await? > target {
        return Ok(None);
    }

    // Invariant: mint_time(lo) <= target; everything above hi is > target
    let mut lo = 0u64;
    let mut hi = tip;
    while lo < hi {
        let mid = lo + (hi - lo + 1) / 2;
        if mint_time_of(mid).await? <= target {
            lo = mid;
        } else {
            hi = mid - 1;
        }
    }
    Ok(Some(lo))
}
