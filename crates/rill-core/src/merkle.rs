//! BLAKE3 Merkle tree for transaction commitment.
//!
//! Uses domain-separated hashing to prevent second-preimage attacks:
//! - Leaf hash: `BLAKE3(0x00 || data)`
//! - Internal node: `BLAKE3(0x01 || left || right)`
//!
//! Odd-length layers are padded by duplicating the last element.
//! Empty trees produce [`Hash256::ZERO`].

use serde::{Deserialize, Serialize};

use crate::types::Hash256;

/// Domain separation prefix for leaf hashes.
const LEAF_PREFIX: u8 = 0x00;

/// Domain separation prefix for internal node hashes.
const NODE_PREFIX: u8 = 0x01;

/// Compute a domain-separated leaf hash: `BLAKE3(0x00 || data)`.
pub fn leaf_hash(data: &Hash256) -> Hash256 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&[LEAF_PREFIX]);
    hasher.update(data.as_bytes());
    Hash256(hasher.finalize().into())
}

/// Compute a domain-separated internal node hash: `BLAKE3(0x01 || left || right)`.
pub fn node_hash(left: &Hash256, right: &Hash256) -> Hash256 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&[NODE_PREFIX]);
    hasher.update(left.as_bytes());
    hasher.update(right.as_bytes());
    Hash256(hasher.finalize().into())
}

/// Compute the Merkle root from a slice of leaf values (typically transaction IDs).
///
/// Returns [`Hash256::ZERO`] for an empty slice.
/// This is more efficient than building a full [`MerkleTree`] when proofs are not needed.
pub fn merkle_root(leaves: &[Hash256]) -> Hash256 {
    if leaves.is_empty() {
        return Hash256::ZERO;
    }

    let mut current: Vec<Hash256> = leaves.iter().map(leaf_hash).collect();

    while current.len() > 1 {
        current = next_layer(&current);
    }

    current[0]
}

/// Compute the next layer of the tree from the current one.
///
/// Pairs adjacent hashes with [`node_hash`]. Duplicates the last element
/// when the layer has an odd number of entries.
fn next_layer(layer: &[Hash256]) -> Vec<Hash256> {
    let mut next = Vec::with_capacity(layer.len().div_ceil(2));
    let mut i = 0;
    while i < layer.len() {
        let left = &layer[i];
        let right = if i + 1 < layer.len() {
            &layer[i + 1]
        } else {
            left
        };
        next.push(node_hash(left, right));
        i += 2;
    }
    next
}

/// Full Merkle tree supporting root computation and proof generation.
///
/// Stores all intermediate layers so that inclusion proofs can be extracted
/// for any leaf.
#[derive(Clone, Debug)]
pub struct MerkleTree {
    /// Original leaf values passed to [`from_leaves`](Self::from_leaves).
    leaves: Vec<Hash256>,
    /// `layers[0]` = leaf hashes, `layers[last]` = `[root]`.
    layers: Vec<Vec<Hash256>>,
}

impl MerkleTree {
    /// Build a Merkle tree from leaf values (typically transaction IDs).
    pub fn from_leaves(leaves: &[Hash256]) -> Self {
        if leaves.is_empty() {
            return Self {
                leaves: Vec::new(),
                layers: Vec::new(),
            };
        }

        let mut layers = Vec::new();
        let leaf_layer: Vec<Hash256> = leaves.iter().map(leaf_hash).collect();
        layers.push(leaf_layer);

        while layers.last().unwrap().len() > 1 {
            let prev = layers.last().unwrap();
            layers.push(next_layer(prev));
        }

        Self {
            leaves: leaves.to_vec(),
            layers,
        }
    }

    /// The Merkle root. Returns [`Hash256::ZERO`] for an empty tree.
    pub fn root(&self) -> Hash256 {
        self.layers
            .last()
            .and_then(|l| l.first())
            .copied()
            .unwrap_or(Hash256::ZERO)
    }

    /// Number of leaves in the tree.
    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }

    /// Generate an inclusion proof for the leaf at `index`.
    ///
    /// Returns `None` if the index is out of bounds or the tree is empty.
    pub fn proof(&self, index: usize) -> Option<MerkleProof> {
        if self.leaves.is_empty() || index >= self.leaves.len() {
            return None;
        }

        let mut path = Vec::new();
        let mut pos = index;

        // Walk from leaf layer to just below the root
        for layer in &self.layers[..self.layers.len() - 1] {
            let sibling_pos = pos ^ 1;
            let sibling = if sibling_pos < layer.len() {
                layer[sibling_pos]
            } else {
                // Odd layer: last element's sibling is itself (duplication)
                layer[pos]
            };

            let side = if pos % 2 == 0 {
                Side::Right
            } else {
                Side::Left
            };

            path.push(ProofStep {
                hash: sibling,
                side,
            });
            pos /= 2;
        }

        Some(MerkleProof {
            leaf_index: index,
            leaf: self.leaves[index],
            path,
        })
    }
}

/// Which side a sibling hash is on relative to the current node.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub enum Side {
    /// Sibling is on the left (we are on the right).
    Left,
    /// Sibling is on the right (we are on the left).
    Right,
}

/// A single step in a Merkle inclusion proof.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct ProofStep {
    /// The sibling hash at this level of the tree.
    pub hash: Hash256,
    /// Which side the sibling is on.
    pub side: Side,
}

/// Merkle inclusion proof for a single leaf.
///
/// Proves that `leaf` is included in a tree with a given root by providing
/// the sibling hashes along the path from the leaf to the root.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct MerkleProof {
    /// Index of the leaf in the original tree.
    pub leaf_index: usize,
    /// The original leaf value (e.g. a transaction ID).
    pub leaf: Hash256,
    /// Sibling hashes from leaf level up to root.
    pub path: Vec<ProofStep>,
}

impl MerkleProof {
    /// Verify this proof against an expected Merkle root.
    ///
    /// Recomputes the root from the leaf and sibling path, then compares.
    pub fn verify(&self, expected_root: &Hash256) -> bool {
        let mut current = leaf_hash(&self.leaf);

        for step in &self.path {
            current = match step.side {
                Side::Left => node_hash(&step.hash, &current),
                Side::Right => node_hash(&current, &step.hash),
            };
        }

        current == *expected_root
    }
}
