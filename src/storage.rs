//! KV store capability backing the archive
//!
//! The archive only needs point reads and atomic batch writes, so the
//! capability is kept that small. [`ParityStore`] persists to ParityDB;
//! [`MemoryStore`] keeps everything in a map for tests and ephemeral nodes.

use crate::error::Result;
use crate::schema;
use parity_db::{Db, Options};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// One batch of column writes; `None` deletes the key
pub type WriteBatch = Vec<(u8, Vec<u8>, Option<Vec<u8>>)>;

/// Ordered key/value persistence
///
/// `commit` must apply the whole batch or nothing.
pub trait KvStore: Send + Sync {
    fn get(&self, col: u8, key: &[u8]) -> Result<Option<Vec<u8>>>;

    fn commit(&self, batch: WriteBatch) -> Result<()>;

    fn put(&self, col: u8, key: &[u8], value: Vec<u8>) -> Result<()> {
        self.commit(vec![(col, key.to_vec(), Some(value))])
    }
}

/// ParityDB-backed store
pub struct ParityStore {
    db: Db,
}

impl ParityStore {
    /// Open or create a store at `db_path`
    pub fn open(db_path: &str) -> Result<Self> {
        let path = Path::new(db_path);
        if !path.exists() {
            std::fs::create_dir_all(path)?;
        }

        let opts = Options::with_columns(path, schema::COLUMN_COUNT);
        let db = Db::open_or_create(&opts)?;

        info!("Archive store opened at {}", db_path);

        Ok(Self { db })
    }
}

impl KvStore for ParityStore {
    fn get(&self, col: u8, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.db.get(col, key)?)
    }

    fn commit(&self, batch: WriteBatch) -> Result<()> {
        let entries = batch.len();
        self.db.commit(batch)?;
        debug!("Committed {} entries", entries);
        Ok(())
    }
}

/// In-memory store
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<(u8, Vec<u8>), Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl KvStore for MemoryStore {
    fn get(&self, col: u8, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.read().get(&(col, key.to_vec())).cloned())
    }

    fn commit(&self, batch: WriteBatch) -> Result<()> {
        let mut entries = self.entries.write();
        for (col, key, value) in batch {
            match value {
                Some(value) => {
                    entries.insert((col, key), value);
                }
                None => {
                    entries.remove(&(col, key));
                }
            }
        }
        Ok(())
    }
}

/// Open the store described by `db_path`, falling back to memory
pub fn open_store(db_path: Option<&str>) -> Result<Arc<dyn KvStore>> {
    match db_path {
        Some(path) => Ok(Arc::new(ParityStore::open(path)?)),
        None => {
            info!("Archive store kept in memory");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}
