//! Committee types

use crate::error::{CommitteeError, Result};
use num_bigint::BigUint;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Fixed width of a candidate name in bytes
pub const CANDIDATE_NAME_LEN: usize = 12;

/// Width of an account address in bytes
pub const ADDRESS_LEN: usize = 20;

/// Account address on the external ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address(pub [u8; ADDRESS_LEN]);

impl Address {
    /// Build an address from a 20-byte slice
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != ADDRESS_LEN {
            return Err(CommitteeError::InvalidAddress(format!(
                "expected {} bytes, got {}",
                ADDRESS_LEN,
                bytes.len()
            )));
        }
        let mut address = [0u8; ADDRESS_LEN];
        address.copy_from_slice(bytes);
        Ok(Self(address))
    }

    /// Parse a hex address, with or without `0x`
    pub fn from_hex(s: &str) -> Result<Self> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s)
            .map_err(|e| CommitteeError::InvalidAddress(format!("{}: {}", s, e)))?;
        Self::from_slice(&bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Address::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Candidate name, zero-padded to [`CANDIDATE_NAME_LEN`] bytes
///
/// Padding makes lookups compare equal regardless of how the name was
/// delivered (short string, padded contract field, packed record).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct CandidateName([u8; CANDIDATE_NAME_LEN]);

impl CandidateName {
    /// Build a name from raw bytes; trailing zero padding is accepted
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let trimmed = trim_trailing_zeros(bytes);
        if trimmed.len() > CANDIDATE_NAME_LEN {
            return Err(CommitteeError::InvalidCandidateName(format!(
                "{} bytes exceeds {}",
                trimmed.len(),
                CANDIDATE_NAME_LEN
            )));
        }
        let mut name = [0u8; CANDIDATE_NAME_LEN];
        name[..trimmed.len()].copy_from_slice(trimmed);
        Ok(Self(name))
    }

    pub fn new(name: &str) -> Result<Self> {
        Self::from_bytes(name.as_bytes())
    }

    /// Padded representation
    pub fn as_bytes(&self) -> &[u8; CANDIDATE_NAME_LEN] {
        &self.0
    }

    /// Name without padding
    pub fn trimmed(&self) -> &[u8] {
        trim_trailing_zeros(&self.0)
    }
}

fn trim_trailing_zeros(bytes: &[u8]) -> &[u8] {
    let end = bytes.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
    &bytes[..end]
}

impl fmt::Display for CandidateName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(self.trimmed()))
    }
}

impl Serialize for CandidateName {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for CandidateName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        CandidateName::from_bytes(&bytes).map_err(serde::de::Error::custom)
    }
}

/// A candidate's self-declared identity at a given epoch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub name: CandidateName,
    pub owner: Address,
    pub operator: Address,
    pub reward: Address,
    /// Self-staked amount, tracked apart from the candidate's score
    #[serde(with = "amount_serde")]
    pub self_staked: BigUint,
    /// Beacon/consensus public key - stored as hex string for serialization
    #[serde(with = "hex_bytes")]
    pub beacon_pubkey: Vec<u8>,
}

/// One stake/vote lock record as observed at an epoch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bucket {
    /// Position of the bucket in the on-chain list
    pub index: u64,
    pub voter: Address,
    #[serde(with = "amount_serde")]
    pub amount: BigUint,
    pub candidate: CandidateName,
    /// Lock start, unix seconds
    pub start_time: u64,
    /// Lock duration in seconds
    pub duration: u64,
    /// Whether counted weight shrinks as the lock approaches expiry
    pub decay: bool,
}

/// A bucket enriched with its weight as of a specific mint time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub bucket: Bucket,
    #[serde(with = "amount_serde")]
    pub weighted_amount: BigUint,
    /// Remaining lock duration in seconds at the mint time
    pub remaining: u64,
}

/// Immutable per-epoch snapshot persisted by the archive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochSnapshot {
    pub epoch: u64,
    /// Observation time of the epoch boundary block, unix seconds
    pub mint_time: u64,
    pub registrations: Vec<Registration>,
    pub buckets: Vec<Bucket>,
}

/// Raw staking data behind a height
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawData {
    pub epoch: u64,
    pub mint_time: u64,
    pub registrations: Vec<Registration>,
    pub buckets: Vec<Bucket>,
}

impl From<EpochSnapshot> for RawData {
    fn from(snapshot: EpochSnapshot) -> Self {
        Self {
            epoch: snapshot.epoch,
            mint_time: snapshot.mint_time,
            registrations: snapshot.registrations,
            buckets: snapshot.buckets,
        }
    }
}

/// Committee status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitteeStatus {
    /// Sync loop started, first epoch not yet synchronized
    Starting,
    /// Synchronizing normally
    Active,
    /// Stopped or failed; restart is external
    Inactive,
}

impl CommitteeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommitteeStatus::Starting => "STARTING",
            CommitteeStatus::Active => "ACTIVE",
            CommitteeStatus::Inactive => "INACTIVE",
        }
    }
}

impl fmt::Display for CommitteeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Serialize big integer amounts as decimal strings
pub mod amount_serde {
    use num_bigint::BigUint;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::str::FromStr;

    pub fn serialize<S>(amount: &BigUint, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&amount.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<BigUint, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        BigUint::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// Serialize byte vectors as hex strings
pub mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        hex::decode(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_name_padding_equality() {
        let short = CandidateName::new("robotbp").unwrap();
        let padded = CandidateName::from_bytes(b"robotbp\0\0\0\0\0").unwrap();
        assert_eq!(short, padded);
        assert_eq!(short.to_string(), "robotbp");
        assert_eq!(short.as_bytes().len(), CANDIDATE_NAME_LEN);
    }

    #[test]
    fn test_candidate_name_too_long() {
        let err = CandidateName::new("thirteenbytes").unwrap_err();
        assert!(matches!(err, CommitteeError::InvalidCandidateName(_)));
    }

    #[test]
    fn test_address_hex() {
        let address = Address([0xab; ADDRESS_LEN]);
        let parsed = Address::from_hex(&address.to_string()).unwrap();
        assert_eq!(address, parsed);
        assert!(Address::from_hex("0x1234").is_err());
    }

    #[test]
    fn test_snapshot_json_keeps_amount_precision() {
        let amount = BigUint::parse_bytes(b"123456789012345678901234567890", 10).unwrap();
        let snapshot = EpochSnapshot {
            epoch: 4,
            mint_time: 1_600_000_000,
            registrations: vec![],
            buckets: vec![Bucket {
                index: 1,
                voter: Address([1; ADDRESS_LEN]),
                amount: amount.clone(),
                candidate: CandidateName::new("alpha").unwrap(),
                start_time: 1_599_000_000,
                duration: 86_400,
                decay: true,
            }],
        };
        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains("\"123456789012345678901234567890\""));
        let decoded: EpochSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.buckets[0].amount, amount);
    }
}
