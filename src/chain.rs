//! Chain client capability
//!
//! The committee never talks to contracts directly; it goes through
//! [`ChainClient`], which wraps whatever generated bindings the deployment
//! uses. Every call may be slow and fallible network I/O: implementations
//! report failures as [`CommitteeError::ChainClient`](crate::error::CommitteeError::ChainClient)
//! so the caller's retry policy can tell them apart from integrity errors.
//! Implementations must not retry internally.

use crate::error::Result;
use crate::types::Address;
use async_trait::async_trait;
use num_bigint::BigUint;

/// Position in the circular on-chain bucket list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketCursor {
    /// Before the first record (the list head has index 0)
    Start,
    /// After the record with this index
    After(u64),
}

/// A bucket as returned by the voting contract, before name decoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBucket {
    pub index: u64,
    pub voter: Address,
    pub amount: BigUint,
    pub start_time: u64,
    pub duration: u64,
    pub decay: bool,
}

/// One page of the bucket list
///
/// `candidates` packs one 73-byte name record per entry, in entry order.
#[derive(Debug, Clone, Default)]
pub struct BucketPage {
    pub entries: Vec<RawBucket>,
    pub candidates: Vec<u8>,
}

/// A registration as returned by the registry contract, before name decoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRegistration {
    pub owner: Address,
    pub operator: Address,
    pub reward: Address,
    pub self_staked: BigUint,
    pub beacon_pubkey: Vec<u8>,
}

/// One page of registrations; `names` packs one 73-byte record per entry
#[derive(Debug, Clone, Default)]
pub struct RegistrationPage {
    pub entries: Vec<RawRegistration>,
    pub names: Vec<u8>,
}

/// ECDSA-style signature components authorizing a claim
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimSignature {
    pub v: u8,
    pub r: [u8; 32],
    pub s: [u8; 32],
}

/// Claim transaction parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimRequest {
    pub cycle: u64,
    /// Accumulator root the proof is checked against
    pub root: [u8; 32],
    pub account: Address,
    pub amount: BigUint,
    pub leaf_index: u32,
    pub leaf_count: u32,
    pub proof: Vec<[u8; 32]>,
    /// Unix time after which the claim is void
    pub deadline: u64,
    pub signature: ClaimSignature,
}

/// Handle to a submitted, not yet confirmed claim transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingClaim {
    pub tx_hash: [u8; 32],
}

/// Read and write access to the external ledger
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Current chain tip height
    async fn tip_height(&self) -> Result<u64>;

    /// Timestamp (unix seconds) of the block at `height`
    async fn block_time(&self, height: u64) -> Result<u64>;

    /// Up to `limit` registrations starting at `offset`, as of `height`
    async fn registrations(&self, height: u64, offset: u64, limit: u32)
        -> Result<RegistrationPage>;

    /// Up to `limit` buckets following `cursor` in the circular list, as of `height`
    ///
    /// The list wraps: after the last record the walk continues at index 0.
    async fn buckets(&self, height: u64, cursor: BucketCursor, limit: u32) -> Result<BucketPage>;

    /// Submit a signed claim transaction
    async fn submit_claim(&self, request: &ClaimRequest) -> Result<PendingClaim>;
}
