//! Committee error types

use thiserror::Error;

/// Committee result type
pub type Result<T> = std::result::Result<T, CommitteeError>;

/// Committee errors
///
/// Variants fall into three groups: transient I/O failures against the chain
/// client or the KV store (retried up to a bound), data-integrity failures
/// (never retried) and absent data (`NotFound`), which callers should render
/// as "not yet available" rather than as an outage.
#[derive(Error, Debug)]
pub enum CommitteeError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("ParityDB error: {0}")]
    ParityDBError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Chain client error: {0}")]
    ChainClient(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Epoch {0} is already archived")]
    DuplicateEpoch(u64),

    #[error("Epoch mismatch: expected {expected}, got {actual}")]
    EpochMismatch { expected: u64, actual: u64 },

    #[error("Epoch {epoch} skips ahead of archived tip (next expected {next})")]
    EpochGap { epoch: u64, next: u64 },

    #[error("Mint time {mint_time} of epoch {epoch} is out of order with its neighbours")]
    NonMonotonicMintTime { epoch: u64, mint_time: u64 },

    #[error("Malformed candidate blob: expected {expected} bytes, got {actual}")]
    MalformedCandidates { expected: usize, actual: usize },

    #[error("Invalid candidate name: {0}")]
    InvalidCandidateName(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Corrupted archive entry: {0}")]
    Corrupted(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Config(String),

    #[error("Gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<CommitteeError>,
    },

    #[error("Sync loop already started")]
    AlreadyStarted,

    #[error("Operation cancelled")]
    Cancelled,
}

impl CommitteeError {
    /// Whether the failure is transient I/O that may succeed on retry
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CommitteeError::Storage(_)
                | CommitteeError::ParityDBError(_)
                | CommitteeError::IoError(_)
                | CommitteeError::ChainClient(_)
        )
    }

    /// Whether the failure means "no data here yet"
    pub fn is_not_found(&self) -> bool {
        matches!(self, CommitteeError::NotFound(_))
    }
}

impl From<parity_db::Error> for CommitteeError {
    fn from(err: parity_db::Error) -> Self {
        CommitteeError::ParityDBError(err.to_string())
    }
}
