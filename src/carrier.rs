//! Vote carrier: paged reads of registrations and buckets
//!
//! Bucket pages walk a circular on-chain list. The carrier asks for one record
//! more than the page size; that lookahead record tells it whether another
//! page exists without spending a call on an empty page. A walk over `N`
//! buckets with page size `p` therefore takes `ceil(N / p)` calls (one call
//! when `N` is zero) and never emits the head record twice.

use crate::chain::{BucketCursor, ChainClient};
use crate::error::{CommitteeError, Result};
use crate::retry::RetryPolicy;
use crate::types::{Bucket, CandidateName, Registration};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

/// Width of one packed candidate-name record
pub const CANDIDATE_RECORD_LEN: usize = 73;

/// Decode `count` packed name records
///
/// Byte 0 of each record is the name length, bytes `1..=len` the name.
pub fn decode_candidate_names(blob: &[u8], count: usize) -> Result<Vec<CandidateName>> {
    let expected = CANDIDATE_RECORD_LEN
        .checked_mul(count)
        .ok_or(CommitteeError::MalformedCandidates {
            expected: usize::MAX,
            actual: blob.len(),
        })?;
    if blob.len() != expected {
        return Err(CommitteeError::MalformedCandidates {
            expected,
            actual: blob.len(),
        });
    }

    blob.chunks_exact(CANDIDATE_RECORD_LEN)
        .map(|record| {
            let len = record[0] as usize;
            let name = record.get(1..1 + len).ok_or_else(|| {
                CommitteeError::InvalidCandidateName(format!(
                    "length prefix {} overruns record",
                    len
                ))
            })?;
            CandidateName::from_bytes(name)
        })
        .collect()
}

/// Pack names into records; the inverse of [`decode_candidate_names`]
pub fn encode_candidate_names(names: &[CandidateName]) -> Vec<u8> {
    let mut blob = vec![0u8; names.len() * CANDIDATE_RECORD_LEN];
    for (record, name) in blob.chunks_exact_mut(CANDIDATE_RECORD_LEN).zip(names) {
        let trimmed = name.trimmed();
        record[0] = trimmed.len() as u8;
        record[1..1 + trimmed.len()].copy_from_slice(trimmed);
    }
    blob
}

/// Paginated reader over the chain client
pub struct VoteCarrier {
    client: Arc<dyn ChainClient>,
    retry: RetryPolicy,
}

impl VoteCarrier {
    pub fn new(client: Arc<dyn ChainClient>, retry: RetryPolicy) -> Self {
        Self { client, retry }
    }

    /// Fetch up to `page_size` buckets after `cursor`
    ///
    /// Returns the cursor for the following page, or `None` once the walk has
    /// reached the end of the list.
    pub async fn votes(
        &self,
        height: u64,
        cursor: BucketCursor,
        page_size: u32,
    ) -> Result<(Option<BucketCursor>, Vec<Bucket>)> {
        let page_size = page_size.max(1);
        let limit = page_size.saturating_add(1);
        let client = &self.client;
        let page = self
            .retry
            .run("fetch bucket page", || async move {
                client.buckets(height, cursor, limit).await
            })
            .await?;

        let names = decode_candidate_names(&page.candidates, page.entries.len())?;

        let mut buckets = Vec::with_capacity(page_size as usize);
        let mut next = None;
        for (i, (raw, candidate)) in page.entries.into_iter().zip(names).enumerate() {
            // Index 0 is the list head; meeting it again means the walk wrapped
            let wrapped = raw.index == 0 && (cursor != BucketCursor::Start || i > 0);
            if wrapped {
                break;
            }
            if buckets.len() == page_size as usize {
                next = buckets
                    .last()
                    .map(|last: &Bucket| BucketCursor::After(last.index));
                break;
            }
            buckets.push(Bucket {
                index: raw.index,
                voter: raw.voter,
                amount: raw.amount,
                candidate,
                start_time: raw.start_time,
                duration: raw.duration,
                decay: raw.decay,
            });
        }

        debug!(
            "Fetched {} buckets at height {} after {:?}",
            buckets.len(),
            height,
            cursor
        );
        Ok((next, buckets))
    }

    /// Walk every bucket as of `height`
    ///
    /// Checks `shutdown` before each page; a raised flag aborts the walk with
    /// [`CommitteeError::Cancelled`].
    pub async fn all_votes(
        &self,
        height: u64,
        page_size: u32,
        shutdown: &watch::Receiver<bool>,
    ) -> Result<Vec<Bucket>> {
        let mut seen = HashSet::new();
        let mut all = Vec::new();
        let mut cursor = BucketCursor::Start;
        loop {
            if *shutdown.borrow() {
                return Err(CommitteeError::Cancelled);
            }
            let (next, buckets) = self.votes(height, cursor, page_size).await?;
            for bucket in buckets {
                if !seen.insert(bucket.index) {
                    return Err(CommitteeError::Corrupted(format!(
                        "bucket {} listed twice at height {}",
                        bucket.index, height
                    )));
                }
                all.push(bucket);
            }
            match next {
                Some(next) => cursor = next,
                None => return Ok(all),
            }
        }
    }

    /// Fetch up to `page_size` registrations starting at `offset`
    pub async fn registrations(
        &self,
        height: u64,
        offset: u64,
        page_size: u32,
    ) -> Result<(Option<u64>, Vec<Registration>)> {
        let page_size = page_size.max(1);
        let client = &self.client;
        let page = self
            .retry
            .run("fetch registration page", || async move {
                client.registrations(height, offset, page_size).await
            })
            .await?;

        let names = decode_candidate_names(&page.names, page.entries.len())?;
        let full = page.entries.len() >= page_size as usize;
        let registrations: Vec<Registration> = page
            .entries
            .into_iter()
            .zip(names)
            .take(page_size as usize)
            .map(|(raw, name)| Registration {
                name,
                owner: raw.owner,
                operator: raw.operator,
                reward: raw.reward,
                self_staked: raw.self_staked,
                beacon_pubkey: raw.beacon_pubkey,
            })
            .collect();

        let next = full.then(|| offset + registrations.len() as u64);
        Ok((next, registrations))
    }

    /// Fetch every registration as of `height`
    pub async fn all_registrations(
        &self,
        height: u64,
        page_size: u32,
        shutdown: &watch::Receiver<bool>,
    ) -> Result<Vec<Registration>> {
        let mut all = Vec::new();
        let mut offset = 0;
        loop {
            if *shutdown.borrow() {
                return Err(CommitteeError::Cancelled);
            }
            let (next, registrations) = self.registrations(height, offset, page_size).await?;
            all.extend(registrations);
            match next {
                Some(next) => offset = next,
                None => return Ok(all),
            }
        }
    }
}
