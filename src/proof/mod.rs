//! Board Commitments
//!
//! Lets a player prove one cell's ship/empty status without revealing the
//! rest of the board.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    COMMITMENT ENGINE                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  merkle.rs       - Sorted-pair Poseidon Merkle tree         │
//! │  commitment.rs   - Nonce derivation, leaves, reveal proofs  │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod commitment;
pub mod merkle;

// Re-export key types
pub use commitment::{
    attack_commitment, commit, derive_nonce, leaf_hash, random_reveal_nonce, verify_reveal,
    BoardCommitment, CellReveal, CommitmentError, MasterSecret, PROOF_LENGTH,
};
pub use merkle::{hash_pair, MerkleTree};
