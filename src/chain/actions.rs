//! Write actions.
//!
//! Each action maps to one entrypoint on the actions contract. Calldata is
//! the flat felt list the contract ABI expects; arrays are prefixed with
//! their length.

use crate::core::board::Coord;
use crate::core::felt::Felt;
use crate::proof::commitment::CellReveal;

/// A submission to the actions contract.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GameAction {
    /// Create a game against `opponent`. The caller becomes player 1.
    SpawnGame {
        /// Second player.
        opponent: Felt,
    },
    /// Publish a board root.
    CommitBoard {
        /// Game id.
        game_id: u64,
        /// Merkle root.
        root: Felt,
    },
    /// Commit to a target without disclosing it.
    CommitAttack {
        /// Game id.
        game_id: u64,
        /// `poseidon([x, y, reveal_nonce])`.
        commitment: Felt,
    },
    /// Open a previous attack commitment.
    RevealAttack {
        /// Game id.
        game_id: u64,
        /// Targeted cell.
        coord: Coord,
        /// Nonce used in the commitment.
        reveal_nonce: Felt,
    },
    /// Disclose one cell of the local board.
    Reveal {
        /// Game id.
        game_id: u64,
        /// Attacked cell.
        coord: Coord,
        /// Cell nonce.
        nonce: Felt,
        /// Committed status.
        is_ship: bool,
        /// Inclusion proof.
        proof: Vec<Felt>,
    },
}

impl GameAction {
    /// Reveal action for a computed disclosure.
    pub fn reveal(game_id: u64, disclosure: CellReveal) -> Self {
        GameAction::Reveal {
            game_id,
            coord: disclosure.coord,
            nonce: disclosure.nonce,
            is_ship: disclosure.is_ship,
            proof: disclosure.proof,
        }
    }

    /// Contract entrypoint name.
    pub fn entrypoint(&self) -> &'static str {
        match self {
            GameAction::SpawnGame { .. } => "spawn_game",
            GameAction::CommitBoard { .. } => "commit_board",
            GameAction::CommitAttack { .. } => "commit_attack",
            GameAction::RevealAttack { .. } => "reveal_attack",
            GameAction::Reveal { .. } => "reveal",
        }
    }

    /// Game targeted by the action, if any.
    pub fn game_id(&self) -> Option<u64> {
        match self {
            GameAction::SpawnGame { .. } => None,
            GameAction::CommitBoard { game_id, .. }
            | GameAction::CommitAttack { game_id, .. }
            | GameAction::RevealAttack { game_id, .. }
            | GameAction::Reveal { game_id, .. } => Some(*game_id),
        }
    }

    /// Flat calldata.
    pub fn calldata(&self) -> Vec<Felt> {
        match self {
            GameAction::SpawnGame { opponent } => vec![*opponent],
            GameAction::CommitBoard { game_id, root } => vec![Felt::from(*game_id), *root],
            GameAction::CommitAttack { game_id, commitment } => {
                vec![Felt::from(*game_id), *commitment]
            }
            GameAction::RevealAttack { game_id, coord, reveal_nonce } => vec![
                Felt::from(*game_id),
                Felt::from(coord.x),
                Felt::from(coord.y),
                *reveal_nonce,
            ],
            GameAction::Reveal { game_id, coord, nonce, is_ship, proof } => {
                let mut calldata = vec![
                    Felt::from(*game_id),
                    Felt::from(coord.x),
                    Felt::from(coord.y),
                    *nonce,
                    if *is_ship { Felt::ONE } else { Felt::ZERO },
                    Felt::from(proof.len() as u64),
                ];
                calldata.extend_from_slice(proof);
                calldata
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reveal_calldata_layout() {
        let action = GameAction::Reveal {
            game_id: 9,
            coord: Coord::new(3, 7).unwrap(),
            nonce: Felt::from(55u64),
            is_ship: true,
            proof: vec![Felt::from(1u64), Felt::from(2u64)],
        };
        assert_eq!(action.entrypoint(), "reveal");
        assert_eq!(
            action.calldata(),
            [9u64, 3, 7, 55, 1, 2, 1, 2].map(Felt::from).to_vec()
        );
    }

    #[test]
    fn test_simple_calldata() {
        let spawn = GameAction::SpawnGame { opponent: Felt::from(4u64) };
        assert_eq!(spawn.calldata(), vec![Felt::from(4u64)]);
        assert_eq!(spawn.game_id(), None);

        let commit = GameAction::CommitBoard { game_id: 2, root: Felt::from(8u64) };
        assert_eq!(commit.entrypoint(), "commit_board");
        assert_eq!(commit.calldata(), vec![Felt::from(2u64), Felt::from(8u64)]);
        assert_eq!(commit.game_id(), Some(2));

        let open = GameAction::RevealAttack {
            game_id: 2,
            coord: Coord::new(0, 9).unwrap(),
            reveal_nonce: Felt::from(6u64),
        };
        assert_eq!(open.entrypoint(), "reveal_attack");
        assert_eq!(open.calldata(), [2u64, 0, 9, 6].map(Felt::from).to_vec());
    }
}
