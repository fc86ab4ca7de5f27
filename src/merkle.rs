//! Merkle accumulator over claim leaves
//!
//! Leaves and inner nodes are hashed with blake3 under distinct one-byte
//! prefixes, so an inner node can never be passed off as a leaf. An odd node
//! at the end of a level is paired with itself; the root commits to the leaf
//! count, so that padding never yields a second valid position.

use crate::types::Address;
use num_bigint::BigUint;

pub type Hash = [u8; 32];

const LEAF_PREFIX: u8 = 0x00;
const NODE_PREFIX: u8 = 0x01;
const ROOT_PREFIX: u8 = 0x02;

/// Leaf committing to `(cycle, account, amount)`
pub fn leaf_hash(cycle: u64, account: &Address, amount: &BigUint) -> Hash {
    let amount = amount.to_bytes_be();
    let mut hasher = blake3::Hasher::new();
    hasher.update(&[LEAF_PREFIX]);
    hasher.update(&cycle.to_be_bytes());
    hasher.update(account.as_bytes());
    hasher.update(&(amount.len() as u32).to_be_bytes());
    hasher.update(&amount);
    *hasher.finalize().as_bytes()
}

/// Hash two nodes together
pub fn hash_pair(left: &Hash, right: &Hash) -> Hash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&[NODE_PREFIX]);
    hasher.update(left);
    hasher.update(right);
    *hasher.finalize().as_bytes()
}

/// Bind the top node to the number of leaves under it
fn seal(leaf_count: u32, top: &Hash) -> Hash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&[ROOT_PREFIX]);
    hasher.update(&leaf_count.to_be_bytes());
    hasher.update(top);
    *hasher.finalize().as_bytes()
}

/// Proof length of a tree with `leaf_count` leaves
pub fn depth_for(leaf_count: u32) -> usize {
    u64::from(leaf_count).next_power_of_two().trailing_zeros() as usize
}

/// Check that `leaf` sits at `index` of a `leaf_count`-leaf tree under `root`
pub fn verify_proof(
    leaf: &Hash,
    index: u32,
    leaf_count: u32,
    proof: &[Hash],
    root: &Hash,
) -> bool {
    if index >= leaf_count || proof.len() != depth_for(leaf_count) {
        return false;
    }

    let mut current = *leaf;
    let mut position = index;
    for sibling in proof {
        current = if position & 1 == 0 {
            hash_pair(&current, sibling)
        } else {
            hash_pair(sibling, &current)
        };
        position >>= 1;
    }
    seal(leaf_count, &current) == *root
}

/// Merkle tree kept level by level, leaves first
#[derive(Debug, Clone)]
pub struct MerkleTree {
    levels: Vec<Vec<Hash>>,
}

impl MerkleTree {
    pub fn build(leaves: &[Hash]) -> Self {
        let mut levels = vec![leaves.to_vec()];
        let mut current = leaves.to_vec();

        while current.len() > 1 {
            let next: Vec<Hash> = current
                .chunks(2)
                .map(|pair| hash_pair(&pair[0], pair.get(1).unwrap_or(&pair[0])))
                .collect();
            levels.push(next.clone());
            current = next;
        }

        Self { levels }
    }

    /// Root hash sealed with the leaf count; all zeroes for an empty tree
    pub fn root(&self) -> Hash {
        match self.levels.last().and_then(|level| level.first()) {
            Some(top) => seal(self.leaf_count() as u32, top),
            None => [0u8; 32],
        }
    }

    pub fn leaf_count(&self) -> usize {
        self.levels.first().map_or(0, Vec::len)
    }

    /// Number of hashes in every proof
    pub fn depth(&self) -> usize {
        self.levels.len().saturating_sub(1)
    }

    /// Sibling path for the leaf at `index`
    pub fn proof(&self, index: usize) -> Option<Vec<Hash>> {
        if index >= self.leaf_count() {
            return None;
        }

        let mut path = Vec::with_capacity(self.depth());
        let mut position = index;
        for level in &self.levels[..self.depth()] {
            let sibling = position ^ 1;
            path.push(*level.get(sibling).unwrap_or(&level[position]));
            position >>= 1;
        }
        Some(path)
    }
}
