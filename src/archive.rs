//! Height-indexed archive of per-epoch snapshots
//!
//! Each epoch's snapshot is written once, together with its mint time and the
//! tip marker, in a single store batch. Snapshots are never rewritten by the
//! sync path; the only exception is [`Archive::upsert`], which serves native
//! polls pushed by an external block pipeline.

use crate::error::{CommitteeError, Result};
use crate::indexing::{latest_epoch_at_or_before, EpochGrid};
use crate::retry::RetryPolicy;
use crate::schema::{self, COL_METADATA, COL_MINT_TIMES, COL_SNAPSHOTS};
use crate::storage::{KvStore, WriteBatch};
use crate::types::EpochSnapshot;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Epoch snapshot archive
pub struct Archive {
    store: Arc<dyn KvStore>,
    namespace: &'static str,
    grid: EpochGrid,
    retry: RetryPolicy,
    /// Serializes writers so the checks before a write stay valid
    write_guard: Mutex<()>,
}

impl Archive {
    pub fn new(
        store: Arc<dyn KvStore>,
        namespace: &'static str,
        grid: EpochGrid,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            namespace,
            grid,
            retry,
            write_guard: Mutex::new(()),
        }
    }

    pub fn grid(&self) -> &EpochGrid {
        &self.grid
    }

    /// Latest archived epoch, if any
    pub async fn tip_epoch(&self) -> Result<Option<u64>> {
        let key = schema::tip_key(self.namespace);
        match self.read(COL_METADATA, &key, "read tip").await? {
            Some(bytes) => schema::decode_u64(&bytes)
                .map(Some)
                .ok_or_else(|| CommitteeError::Corrupted(format!("{} tip marker", self.namespace))),
            None => Ok(None),
        }
    }

    /// Epoch the next sequential write must carry
    pub async fn next_epoch(&self) -> Result<u64> {
        Ok(self.tip_epoch().await?.map_or(0, |tip| tip + 1))
    }

    /// Boundary height of the latest archived epoch
    pub async fn latest_height(&self) -> Result<Option<u64>> {
        Ok(self
            .tip_epoch()
            .await?
            .map(|epoch| self.grid.height_of(epoch)))
    }

    /// Persist a new immutable snapshot for `epoch`
    ///
    /// Epochs must arrive in order: writing epoch `n + 1` requires epoch `n`.
    pub async fn put(&self, epoch: u64, snapshot: &EpochSnapshot) -> Result<()> {
        if snapshot.epoch != epoch {
            return Err(CommitteeError::EpochMismatch {
                expected: epoch,
                actual: snapshot.epoch,
            });
        }

        let _guard = self.write_guard.lock().await;

        let next = self.next_epoch().await?;
        if epoch < next {
            return Err(CommitteeError::DuplicateEpoch(epoch));
        }
        if epoch > next {
            return Err(CommitteeError::EpochGap { epoch, next });
        }
        if epoch > 0 && self.mint_time(epoch - 1).await? > snapshot.mint_time {
            return Err(CommitteeError::NonMonotonicMintTime {
                epoch,
                mint_time: snapshot.mint_time,
            });
        }

        self.commit_snapshot(epoch, snapshot, true).await?;

        info!(
            "Archived {} epoch {} ({} registrations, {} buckets)",
            self.namespace,
            epoch,
            snapshot.registrations.len(),
            snapshot.buckets.len()
        );
        Ok(())
    }

    /// Insert or replace the snapshot for `epoch`
    ///
    /// Returns `true` when an existing snapshot was replaced. The epoch may be
    /// any archived epoch or the next one; mint times must stay ordered with
    /// the neighbouring epochs.
    pub async fn upsert(&self, epoch: u64, snapshot: &EpochSnapshot) -> Result<bool> {
        if snapshot.epoch != epoch {
            return Err(CommitteeError::EpochMismatch {
                expected: epoch,
                actual: snapshot.epoch,
            });
        }

        let _guard = self.write_guard.lock().await;

        let next = self.next_epoch().await?;
        if epoch > next {
            return Err(CommitteeError::EpochGap { epoch, next });
        }
        let out_of_order = CommitteeError::NonMonotonicMintTime {
            epoch,
            mint_time: snapshot.mint_time,
        };
        if epoch > 0 && self.mint_time(epoch - 1).await? > snapshot.mint_time {
            return Err(out_of_order);
        }
        if epoch + 1 < next && self.mint_time(epoch + 1).await? < snapshot.mint_time {
            return Err(out_of_order);
        }

        let replaced = epoch < next;
        self.commit_snapshot(epoch, snapshot, !replaced).await?;

        debug!(
            "Upserted {} epoch {} (replaced: {})",
            self.namespace, epoch, replaced
        );
        Ok(replaced)
    }

    /// Load the snapshot for `epoch`
    pub async fn get(&self, epoch: u64) -> Result<EpochSnapshot> {
        let key = schema::epoch_key(self.namespace, epoch);
        let value = self
            .read(COL_SNAPSHOTS, &key, "read snapshot")
            .await?
            .ok_or_else(|| {
                CommitteeError::NotFound(format!("{} epoch {}", self.namespace, epoch))
            })?;

        let snapshot: EpochSnapshot = serde_json::from_slice(&value)?;
        if snapshot.epoch != epoch {
            return Err(CommitteeError::EpochMismatch {
                expected: epoch,
                actual: snapshot.epoch,
            });
        }
        Ok(snapshot)
    }

    /// Mint time recorded for `epoch`
    pub async fn mint_time(&self, epoch: u64) -> Result<u64> {
        let key = schema::epoch_key(self.namespace, epoch);
        let bytes = self
            .read(COL_MINT_TIMES, &key, "read mint time")
            .await?
            .ok_or_else(|| {
                CommitteeError::NotFound(format!("{} mint time of epoch {}", self.namespace, epoch))
            })?;
        schema::decode_u64(&bytes).ok_or_else(|| {
            CommitteeError::Corrupted(format!("{} mint time of epoch {}", self.namespace, epoch))
        })
    }

    /// Archived epoch serving `height`
    ///
    /// Fails with `NotFound` below the grid start or past the latest archived
    /// epoch, so an answer for a height never changes once given.
    pub async fn epoch_for_height(&self, height: u64) -> Result<u64> {
        let epoch = self.grid.epoch_of(height).ok_or_else(|| {
            CommitteeError::NotFound(format!(
                "height {} is below start height {}",
                height,
                self.grid.start_height()
            ))
        })?;
        match self.tip_epoch().await? {
            Some(tip) if epoch <= tip => Ok(epoch),
            _ => Err(CommitteeError::NotFound(format!(
                "height {} is not synchronized yet",
                height
            ))),
        }
    }

    /// Snapshot serving `height`
    pub async fn get_by_height(&self, height: u64) -> Result<EpochSnapshot> {
        let epoch = self.epoch_for_height(height).await?;
        self.get(epoch).await
    }

    /// Boundary height of the latest epoch minted at or before `timestamp`
    pub async fn height_by_time(&self, timestamp: u64) -> Result<u64> {
        let tip = self
            .tip_epoch()
            .await?
            .ok_or_else(|| CommitteeError::NotFound(format!("{} archive is empty", self.namespace)))?;

        let epoch = latest_epoch_at_or_before(tip, timestamp, |epoch| self.mint_time(epoch))
            .await?
            .ok_or_else(|| {
                CommitteeError::NotFound(format!(
                    "time {} precedes the first snapshot",
                    timestamp
                ))
            })?;
        Ok(self.grid.height_of(epoch))
    }

    async fn commit_snapshot(
        &self,
        epoch: u64,
        snapshot: &EpochSnapshot,
        advance_tip: bool,
    ) -> Result<()> {
        let key = schema::epoch_key(self.namespace, epoch);
        let mut batch: WriteBatch = vec![
            (COL_SNAPSHOTS, key.clone(), Some(serde_json::to_vec(snapshot)?)),
            (COL_MINT_TIMES, key, Some(schema::encode_u64(snapshot.mint_time))),
        ];
        if advance_tip {
            batch.push((
                COL_METADATA,
                schema::tip_key(self.namespace),
                Some(schema::encode_u64(epoch)),
            ));
        }

        let store = &self.store;
        let batch = &batch;
        self.retry
            .run("commit snapshot", || async move { store.commit(batch.clone()) })
            .await
    }

    async fn read(&self, col: u8, key: &[u8], what: &str) -> Result<Option<Vec<u8>>> {
        let store = &self.store;
        self.retry
            .run(what, || async move { store.get(col, key) })
            .await
    }
}
