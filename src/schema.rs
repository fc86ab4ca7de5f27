//! Archive key layout inside the KV store
//!
//! # Columns
//!
//! ## Snapshots (`COL_SNAPSHOTS`)
//! - Key: `{namespace}:{epoch_be}`
//! - Value: Serialized EpochSnapshot (JSON)
//! - Purpose: One immutable snapshot per epoch
//! - Query: O(1) lookup by epoch index
//!
//! ## Mint times (`COL_MINT_TIMES`)
//! - Key: `{namespace}:{epoch_be}`
//! - Value: Mint time (8 bytes, big-endian u64)
//! - Purpose: Let `HeightByTime` binary-search epochs without decoding snapshots
//!
//! ## Metadata (`COL_METADATA`)
//! - Key: `{namespace}:tip`
//! - Value: Latest archived epoch (8 bytes, big-endian u64)
//!
//! All three entries for an epoch are written in the same batch, so a reader
//! never sees a tip that points at a missing snapshot.
//!
//! Epoch indices are encoded big-endian so keys sort in epoch order. The
//! namespace keeps the delegated and native archives apart when they share a
//! store.

pub const COL_SNAPSHOTS: u8 = 0;
pub const COL_MINT_TIMES: u8 = 1;
pub const COL_METADATA: u8 = 2;

/// Number of columns the store is opened with
pub const COLUMN_COUNT: u8 = 3;

/// Key namespaces
pub mod namespaces {
    pub const DELEGATED: &str = "delegated";
    pub const NATIVE: &str = "native";
}

const TIP_SUFFIX: &[u8] = b"tip";

/// Build a snapshot or mint-time key
pub fn epoch_key(namespace: &str, epoch: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(namespace.len() + 9);
    key.extend_from_slice(namespace.as_bytes());
    key.push(b':');
    key.extend_from_slice(&epoch.to_be_bytes());
    key
}

/// Build the tip marker key
pub fn tip_key(namespace: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(namespace.len() + 1 + TIP_SUFFIX.len());
    key.extend_from_slice(namespace.as_bytes());
    key.push(b':');
    key.extend_from_slice(TIP_SUFFIX);
    key
}

pub fn encode_u64(value: u64) -> Vec<u8> {
    value.to_be_bytes().to_vec()
}

/// Decode a big-endian u64 value; `None` if the width is wrong
pub fn decode_u64(bytes: &[u8]) -> Option<u64> {
    let buf: [u8; 8] = bytes.try_into().ok()?;
    Some(u64::from_be_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epoch_keys_sort_by_epoch() {
        let a = epoch_key(namespaces::DELEGATED, 9);
        let b = epoch_key(namespaces::DELEGATED, 10);
        let c = epoch_key(namespaces::DELEGATED, 256);
        assert!(a < b && b < c);
        assert_ne!(
            epoch_key(namespaces::DELEGATED, 1),
            epoch_key(namespaces::NATIVE, 1)
        );
    }

    #[test]
    fn test_u64_codec() {
        assert_eq!(decode_u64(&encode_u64(42)), Some(42));
        assert_eq!(decode_u64(&[1, 2, 3]), None);
    }
}
