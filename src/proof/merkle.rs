//! Merkle Tree Commitments
//!
//! Binary Poseidon Merkle tree over field elements. Leaves are padded
//! with zero to the next power of two. Internal nodes hash the sorted
//! pair `poseidon(min, max)`, so a proof is a plain list of siblings with
//! no left/right flags. This ordering is part of the wire contract with
//! the on-chain verifier.

use starknet_crypto::{poseidon_hash, Felt};

/// Padding value for missing leaves.
pub const PADDING_LEAF: Felt = Felt::ZERO;

/// Binary Merkle tree for commitment generation.
///
/// Supports building from leaves, computing root, and generating/verifying proofs.
#[derive(Clone, Debug)]
pub struct MerkleTree {
    /// All tree levels (padded leaves at index 0, root at last index).
    levels: Vec<Vec<Felt>>,
    /// Number of real (unpadded) leaves.
    leaf_count: usize,
}

impl MerkleTree {
    /// Build a tree from pre-hashed leaves.
    pub fn from_leaves(leaves: &[Felt]) -> Self {
        let mut current_level = leaves.to_vec();
        if current_level.is_empty() {
            current_level.push(PADDING_LEAF);
        }

        // Pad to power of 2 for balanced tree
        let target_size = current_level.len().next_power_of_two();
        current_level.resize(target_size, PADDING_LEAF);

        let mut levels = vec![current_level.clone()];

        // Build up to root
        while current_level.len() > 1 {
            let next_level: Vec<Felt> = current_level
                .chunks(2)
                .map(|pair| hash_pair(&pair[0], &pair[1]))
                .collect();
            levels.push(next_level.clone());
            current_level = next_level;
        }

        Self { levels, leaf_count: leaves.len() }
    }

    /// The root hash.
    pub fn root(&self) -> Felt {
        self.levels
            .last()
            .and_then(|level| level.first())
            .copied()
            .unwrap_or(PADDING_LEAF)
    }

    /// Number of real leaves in the tree.
    pub fn leaf_count(&self) -> usize {
        self.leaf_count
    }

    /// Tree depth, which is also the proof length.
    pub fn depth(&self) -> usize {
        self.levels.len().saturating_sub(1)
    }

    /// Generate an inclusion proof for the leaf at `index`.
    ///
    /// Returns None if index is out of bounds.
    pub fn generate_proof(&self, index: usize) -> Option<Vec<Felt>> {
        if index >= self.leaf_count {
            return None;
        }

        let mut siblings = Vec::with_capacity(self.depth());
        let mut current_index = index;

        // Walk up the tree, collecting sibling hashes
        for level in &self.levels[..self.depth()] {
            let sibling_index = current_index ^ 1;
            siblings.push(level.get(sibling_index).copied().unwrap_or(PADDING_LEAF));
            current_index /= 2;
        }

        Some(siblings)
    }

    /// Verify an inclusion proof for a pre-hashed leaf.
    pub fn verify_proof(root: &Felt, leaf: &Felt, proof: &[Felt]) -> bool {
        let computed = proof
            .iter()
            .fold(*leaf, |current, sibling| hash_pair(&current, sibling));
        computed == *root
    }
}

/// Hash two child nodes, numerically smaller first.
pub fn hash_pair(a: &Felt, b: &Felt) -> Felt {
    if a < b {
        poseidon_hash(*a, *b)
    } else {
        poseidon_hash(*b, *a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaves(n: u64) -> Vec<Felt> {
        (1..=n).map(|i| Felt::from(i * 1_000_003)).collect()
    }

    #[test]
    fn test_pair_hash_is_order_independent() {
        let a = Felt::from(11u64);
        let b = Felt::from(7u64);
        assert_eq!(hash_pair(&a, &b), hash_pair(&b, &a));
        assert_eq!(hash_pair(&a, &b), poseidon_hash(b, a));
    }

    #[test]
    fn test_merkle_root_determinism() {
        let tree1 = MerkleTree::from_leaves(&leaves(4));
        let tree2 = MerkleTree::from_leaves(&leaves(4));
        assert_eq!(tree1.root(), tree2.root());
    }

    #[test]
    fn test_different_leaves_different_root() {
        let mut other = leaves(4);
        other[2] = Felt::from(99u64);
        assert_ne!(
            MerkleTree::from_leaves(&leaves(4)).root(),
            MerkleTree::from_leaves(&other).root()
        );
    }

    #[test]
    fn test_padding_to_power_of_two() {
        let tree = MerkleTree::from_leaves(&leaves(100));
        assert_eq!(tree.leaf_count(), 100);
        assert_eq!(tree.depth(), 7);

        let mut padded = leaves(100);
        padded.resize(128, Felt::ZERO);
        assert_eq!(tree.root(), MerkleTree::from_leaves(&padded).root());
    }

    #[test]
    fn test_merkle_proof_verification() {
        let data = leaves(100);
        let tree = MerkleTree::from_leaves(&data);
        let root = tree.root();

        for i in [0, 1, 50, 98, 99] {
            let proof = tree.generate_proof(i).unwrap();
            assert_eq!(proof.len(), 7);
            assert!(MerkleTree::verify_proof(&root, &data[i], &proof));
        }
    }

    #[test]
    fn test_invalid_proof_fails() {
        let data = leaves(4);
        let tree = MerkleTree::from_leaves(&data);
        let root = tree.root();
        let proof = tree.generate_proof(0).unwrap();

        assert!(!MerkleTree::verify_proof(&root, &Felt::from(5u64), &proof));

        let mut tampered = proof.clone();
        tampered[1] = tampered[1] + Felt::ONE;
        assert!(!MerkleTree::verify_proof(&root, &data[0], &tampered));
    }

    #[test]
    fn test_proof_out_of_bounds() {
        let tree = MerkleTree::from_leaves(&leaves(100));
        assert!(tree.generate_proof(100).is_none());
        assert!(tree.generate_proof(127).is_none());
    }
}
