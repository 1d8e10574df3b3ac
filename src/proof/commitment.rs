//! Board Commitment Protocol
//!
//! Commit to a hidden board before the game starts, then disclose one
//! cell at a time with an inclusion proof.
//!
//! ```text
//! nonce(x,y) = poseidon([master_secret, x, y])
//! leaf(x,y)  = poseidon([x, y, nonce(x,y), is_ship])
//! root       = merkle(leaf(0,0) .. leaf(9,9), padded to 128)
//! ```
//!
//! Nonces are recomputed from the master secret on demand, so the vault
//! only ever persists the board and one 128-bit value.

use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use starknet_crypto::{poseidon_hash_many, Felt};
use std::fmt;
use thiserror::Error;

use crate::core::board::{Board, BoardError, Cell, Coord, CELL_COUNT};
use crate::core::felt::felt_hex;
use crate::proof::merkle::MerkleTree;

/// Proof length for a 128-leaf tree.
pub const PROOF_LENGTH: usize = 7;

/// Commitment errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommitmentError {
    /// Coordinates or placement list outside the board.
    #[error(transparent)]
    Board(#[from] BoardError),
}

/// The per-board master secret (128 bits).
///
/// Never reused across two commitments for the same player and game.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MasterSecret(#[serde(with = "felt_hex")] Felt);

impl MasterSecret {
    /// Draw a fresh secret from the OS RNG.
    pub fn random() -> Self {
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes[16..]);
        Self(Felt::from_bytes_be(&bytes))
    }

    /// Wrap an existing felt (e.g. a migrated legacy salt).
    pub fn from_felt(value: Felt) -> Self {
        Self(value)
    }

    /// The secret as a field element.
    pub fn as_felt(&self) -> &Felt {
        &self.0
    }
}

impl fmt::Debug for MasterSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterSecret(<redacted>)")
    }
}

/// Derive the nonce bound into one cell's leaf.
pub fn derive_nonce(secret: &MasterSecret, coord: Coord) -> Felt {
    poseidon_hash_many(&[*secret.as_felt(), Felt::from(coord.x), Felt::from(coord.y)])
}

/// Hash one cell into its leaf.
pub fn leaf_hash(coord: Coord, nonce: &Felt, is_ship: bool) -> Felt {
    let flag = if is_ship { Felt::ONE } else { Felt::ZERO };
    poseidon_hash_many(&[Felt::from(coord.x), Felt::from(coord.y), *nonce, flag])
}

/// Everything the defender discloses for one attacked cell.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CellReveal {
    /// The attacked cell.
    pub coord: Coord,
    /// True ship/empty status as committed.
    pub is_ship: bool,
    /// The cell nonce.
    pub nonce: Felt,
    /// Sibling path from leaf to root.
    pub proof: Vec<Felt>,
}

/// A committed board: layout, secret and the tree over them.
#[derive(Clone)]
pub struct BoardCommitment {
    board: Board,
    secret: MasterSecret,
    tree: MerkleTree,
}

impl BoardCommitment {
    /// Build the commitment tree for a board.
    pub fn commit(board: &Board, secret: &MasterSecret) -> Self {
        let leaves: Vec<Felt> = Coord::all()
            .map(|coord| leaf_hash(coord, &derive_nonce(secret, coord), board.is_ship(coord)))
            .collect();
        debug_assert_eq!(leaves.len(), CELL_COUNT);

        Self { board: board.clone(), secret: *secret, tree: MerkleTree::from_leaves(&leaves) }
    }

    /// Build from a raw placement list, rejecting off-board cells.
    pub fn from_cells(cells: &[Cell], secret: &MasterSecret) -> Result<Self, CommitmentError> {
        Ok(Self::commit(&Board::from_cells(cells)?, secret))
    }

    /// The public commitment.
    pub fn root(&self) -> Felt {
        self.tree.root()
    }

    /// The committed layout.
    pub fn board(&self) -> &Board {
        &self.board
    }

    /// Produce the disclosure for cell `(x, y)`.
    pub fn prove(&self, x: u8, y: u8) -> Result<CellReveal, CommitmentError> {
        Ok(self.prove_coord(Coord::new(x, y)?))
    }

    /// Produce the disclosure for a validated coordinate.
    pub fn prove_coord(&self, coord: Coord) -> CellReveal {
        // Every board index is a real leaf, so the path always exists.
        let proof = self.tree.generate_proof(coord.index()).unwrap_or_default();
        CellReveal {
            coord,
            is_ship: self.board.is_ship(coord),
            nonce: derive_nonce(&self.secret, coord),
            proof,
        }
    }
}

impl fmt::Debug for BoardCommitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoardCommitment").field("root", &self.root()).finish_non_exhaustive()
    }
}

/// Root for `board` under `secret`.
pub fn commit(board: &Board, secret: &MasterSecret) -> Felt {
    BoardCommitment::commit(board, secret).root()
}

/// Check a single-cell disclosure against a published root.
///
/// Off-board coordinates and proofs of the wrong length never verify.
pub fn verify_reveal(
    root: &Felt,
    x: u8,
    y: u8,
    is_ship: bool,
    nonce: &Felt,
    proof: &[Felt],
) -> bool {
    let Ok(coord) = Coord::new(x, y) else {
        return false;
    };
    if proof.len() != PROOF_LENGTH {
        return false;
    }
    MerkleTree::verify_proof(root, &leaf_hash(coord, nonce, is_ship), proof)
}

/// Commitment hash submitted by `commit_attack`.
pub fn attack_commitment(coord: Coord, reveal_nonce: &Felt) -> Felt {
    poseidon_hash_many(&[Felt::from(coord.x), Felt::from(coord.y), *reveal_nonce])
}

/// Fresh nonce for an attack commitment (248 bits, below the field prime).
pub fn random_reveal_nonce() -> Felt {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes[1..]);
    Felt::from_bytes_be(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn secret(n: u64) -> MasterSecret {
        MasterSecret::from_felt(Felt::from(n))
    }

    fn sample_board() -> Board {
        let ships = [(0, 1), (0, 2), (0, 3), (3, 7), (9, 9), (5, 5)];
        Board::from_ships(ships.iter().map(|(x, y)| Coord::new(*x, *y).unwrap()))
    }

    #[test]
    fn test_commit_determinism() {
        let board = sample_board();
        assert_eq!(commit(&board, &secret(42)), commit(&board, &secret(42)));
    }

    #[test]
    fn test_secret_changes_root() {
        let board = sample_board();
        assert_ne!(commit(&board, &secret(1)), commit(&board, &secret(2)));
    }

    #[test]
    fn test_nonce_is_stable_and_per_cell() {
        let s = secret(7);
        let a = Coord::new(1, 2).unwrap();
        let b = Coord::new(2, 1).unwrap();
        assert_eq!(derive_nonce(&s, a), derive_nonce(&s, a));
        assert_ne!(derive_nonce(&s, a), derive_nonce(&s, b));
    }

    #[test]
    fn test_prove_and_verify_every_cell() {
        let board = sample_board();
        let s = secret(99);
        let commitment = BoardCommitment::commit(&board, &s);
        let root = commitment.root();

        for coord in Coord::all() {
            let reveal = commitment.prove_coord(coord);
            assert_eq!(reveal.proof.len(), PROOF_LENGTH);
            assert_eq!(reveal.is_ship, board.is_ship(coord));
            assert_eq!(reveal.nonce, derive_nonce(&s, coord));
            let (x, y) = (coord.x, coord.y);
            assert!(verify_reveal(&root, x, y, reveal.is_ship, &reveal.nonce, &reveal.proof));
        }
    }

    #[test]
    fn test_flipped_status_fails() {
        let commitment = BoardCommitment::commit(&sample_board(), &secret(5));
        let reveal = commitment.prove(3, 7).unwrap();
        assert!(reveal.is_ship);
        assert!(!verify_reveal(&commitment.root(), 3, 7, false, &reveal.nonce, &reveal.proof));
    }

    #[test]
    fn test_proof_for_other_cell_fails() {
        let commitment = BoardCommitment::commit(&sample_board(), &secret(5));
        let reveal = commitment.prove(4, 4).unwrap();
        let root = commitment.root();
        assert!(!verify_reveal(&root, 4, 5, reveal.is_ship, &reveal.nonce, &reveal.proof));
    }

    #[test]
    fn test_out_of_range_rejected() {
        let commitment = BoardCommitment::commit(&sample_board(), &secret(5));
        assert!(matches!(commitment.prove(10, 0), Err(CommitmentError::Board(_))));
        assert!(matches!(commitment.prove(0, 200), Err(CommitmentError::Board(_))));

        let cells = [Cell { x: 0, y: 10, is_ship: true }];
        assert!(BoardCommitment::from_cells(&cells, &secret(5)).is_err());
    }

    #[test]
    fn test_short_proof_rejected() {
        let commitment = BoardCommitment::commit(&sample_board(), &secret(5));
        let reveal = commitment.prove(0, 0).unwrap();
        let root = commitment.root();
        assert!(!verify_reveal(&root, 0, 0, reveal.is_ship, &reveal.nonce, &reveal.proof[..6]));
    }

    #[test]
    fn test_attack_commitment_binds_coordinate() {
        let nonce = Felt::from(1234u64);
        let a = attack_commitment(Coord::new(1, 1).unwrap(), &nonce);
        let b = attack_commitment(Coord::new(1, 2).unwrap(), &nonce);
        assert_ne!(a, b);
    }

    #[test]
    fn test_random_secrets_differ() {
        assert_ne!(MasterSecret::random(), MasterSecret::random());
        assert_ne!(random_reveal_nonce(), random_reveal_nonce());
    }

    #[test]
    fn test_secret_debug_redacted() {
        assert_eq!(format!("{:?}", secret(1)), "MasterSecret(<redacted>)");
    }

    fn arb_board() -> impl Strategy<Value = Board> {
        proptest::collection::vec(any::<bool>(), CELL_COUNT).prop_map(|flags| {
            Board::from_ships(
                flags
                    .iter()
                    .enumerate()
                    .filter(|(_, ship)| **ship)
                    .filter_map(|(i, _)| Coord::from_index(i)),
            )
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn prop_commit_is_deterministic(board in arb_board(), s in any::<u64>()) {
            prop_assert_eq!(commit(&board, &secret(s)), commit(&board, &secret(s)));
        }

        #[test]
        fn prop_single_flip_changes_root(
            board in arb_board(),
            s in any::<u64>(),
            idx in 0usize..CELL_COUNT,
        ) {
            let coord = Coord::from_index(idx).unwrap();
            let mut flipped = board.clone();
            flipped.set(coord, !board.is_ship(coord));
            prop_assert_ne!(commit(&board, &secret(s)), commit(&flipped, &secret(s)));
        }

        #[test]
        fn prop_tampering_breaks_proof(
            board in arb_board(),
            s in any::<u64>(),
            idx in 0usize..CELL_COUNT,
            level in 0usize..PROOF_LENGTH,
        ) {
            let commitment = BoardCommitment::commit(&board, &secret(s));
            let root = commitment.root();
            let coord = Coord::from_index(idx).unwrap();
            let reveal = commitment.prove_coord(coord);
            let (x, y) = (coord.x, coord.y);

            prop_assert!(verify_reveal(&root, x, y, reveal.is_ship, &reveal.nonce, &reveal.proof));

            let mut proof = reveal.proof.clone();
            proof[level] = proof[level] + Felt::ONE;
            prop_assert!(!verify_reveal(&root, x, y, reveal.is_ship, &reveal.nonce, &proof));

            let bad_nonce = reveal.nonce + Felt::ONE;
            prop_assert!(!verify_reveal(&root, x, y, reveal.is_ship, &bad_nonce, &reveal.proof));

            let flipped = !reveal.is_ship;
            prop_assert!(!verify_reveal(&root, x, y, flipped, &reveal.nonce, &reveal.proof));
        }
    }
}
