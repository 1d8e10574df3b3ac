//! Core primitives.
//!
//! Board geometry, field element conversions and local digests. Nothing
//! in this module performs I/O.

pub mod board;
pub mod felt;
pub mod hash;

// Re-export core types
pub use board::{Board, BoardError, Cell, Coord, BOARD_SIZE, CELL_COUNT};
pub use felt::{felt_key, felt_to_u64, felt_to_u8, parse_felt, Felt};
pub use hash::{LocalHash, LocalHasher};
