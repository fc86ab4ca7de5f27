//! Height-indexed read path shared by both committee variants

use crate::archive::Archive;
use crate::error::Result;
use crate::ranking::{ElectionResult, ResultCalculator};
use crate::types::RawData;
use lru::LruCache;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::debug;

/// Cached results plus a generation counter per invalidated epoch
///
/// A result computed while its epoch was invalidated is not cached.
struct ResultCache {
    results: LruCache<u64, Arc<ElectionResult>>,
    generations: HashMap<u64, u64>,
}

impl ResultCache {
    fn generation(&self, epoch: u64) -> u64 {
        self.generations.get(&epoch).copied().unwrap_or(0)
    }
}

/// Answers ranking queries from the archive, caching results per epoch
pub struct QueryEngine {
    archive: Arc<Archive>,
    calculator: ResultCalculator,
    /// `None` when caching is disabled
    cache: Option<Mutex<ResultCache>>,
}

impl QueryEngine {
    pub fn new(archive: Arc<Archive>, calculator: ResultCalculator, cache_size: usize) -> Self {
        Self {
            archive,
            calculator,
            cache: NonZeroUsize::new(cache_size).map(|cap| {
                Mutex::new(ResultCache {
                    results: LruCache::new(cap),
                    generations: HashMap::new(),
                })
            }),
        }
    }

    pub fn archive(&self) -> &Arc<Archive> {
        &self.archive
    }

    /// Ranking of the epoch serving `height`
    pub async fn result_by_height(&self, height: u64) -> Result<Arc<ElectionResult>> {
        let epoch = self.archive.epoch_for_height(height).await?;
        self.result_by_epoch(epoch).await
    }

    pub async fn result_by_epoch(&self, epoch: u64) -> Result<Arc<ElectionResult>> {
        let mut generation = 0;
        if let Some(cache) = &self.cache {
            let mut cache = cache.lock();
            if let Some(hit) = cache.results.get(&epoch) {
                return Ok(hit.clone());
            }
            generation = cache.generation(epoch);
        }

        let snapshot = self.archive.get(epoch).await?;
        let result = Arc::new(self.calculator.calculate(&snapshot));
        debug!(
            "Ranked epoch {}: {} candidates",
            epoch,
            result.candidates.len()
        );

        if let Some(cache) = &self.cache {
            let mut cache = cache.lock();
            if cache.generation(epoch) == generation {
                cache.results.put(epoch, result.clone());
            } else {
                debug!("Epoch {} changed while ranking, result not cached", epoch);
            }
        }
        Ok(result)
    }

    /// Unranked snapshot of the epoch serving `height`
    pub async fn raw_data_by_height(&self, height: u64) -> Result<RawData> {
        Ok(self.archive.get_by_height(height).await?.into())
    }

    pub async fn height_by_time(&self, timestamp: u64) -> Result<u64> {
        self.archive.height_by_time(timestamp).await
    }

    pub async fn latest_height(&self) -> Result<Option<u64>> {
        self.archive.latest_height().await
    }

    /// Drop the cached result of `epoch` after its snapshot changed
    pub fn invalidate(&self, epoch: u64) {
        if let Some(cache) = &self.cache {
            let mut cache = cache.lock();
            cache.results.pop(&epoch);
            *cache.generations.entry(epoch).or_insert(0) += 1;
        }
    }
}
