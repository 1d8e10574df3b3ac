//! Board Layout
//!
//! A 10x10 grid of ship/empty flags, owned by the player who placed it.
//! The serialized form is the placement list `[{x, y, is_ship}]` used by
//! the vault payload and the legacy plaintext format.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Board side length.
pub const BOARD_SIZE: u8 = 10;

/// Number of cells on a board.
pub const CELL_COUNT: usize = (BOARD_SIZE as usize) * (BOARD_SIZE as usize);

/// Board validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BoardError {
    /// Coordinate outside `0..=9`.
    #[error("coordinate ({x}, {y}) out of bounds, expected 0-9")]
    OutOfBounds {
        /// Column.
        x: u64,
        /// Row.
        y: u64,
    },
}

/// A validated cell coordinate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "RawCoord")]
pub struct Coord {
    /// Column (0-9).
    pub x: u8,
    /// Row (0-9).
    pub y: u8,
}

impl Coord {
    /// Create a coordinate, rejecting anything off the board.
    pub fn new(x: u8, y: u8) -> Result<Self, BoardError> {
        if x >= BOARD_SIZE || y >= BOARD_SIZE {
            return Err(BoardError::OutOfBounds { x: x as u64, y: y as u64 });
        }
        Ok(Self { x, y })
    }

    /// Create a coordinate from wider integers (e.g. decoded event words).
    pub fn from_u64(x: u64, y: u64) -> Result<Self, BoardError> {
        match (u8::try_from(x), u8::try_from(y)) {
            (Ok(cx), Ok(cy)) => Self::new(cx, cy),
            _ => Err(BoardError::OutOfBounds { x, y }),
        }
    }

    /// Row-major leaf index (`y * 10 + x`).
    #[inline]
    pub fn index(&self) -> usize {
        self.y as usize * BOARD_SIZE as usize + self.x as usize
    }

    /// Inverse of [`Coord::index`].
    pub fn from_index(index: usize) -> Option<Self> {
        if index >= CELL_COUNT {
            return None;
        }
        let size = BOARD_SIZE as usize;
        Some(Self { x: (index % size) as u8, y: (index / size) as u8 })
    }

    /// Every coordinate in leaf order.
    pub fn all() -> impl Iterator<Item = Coord> {
        (0..CELL_COUNT).filter_map(Coord::from_index)
    }
}

#[derive(Deserialize)]
struct RawCoord {
    x: u64,
    y: u64,
}

impl TryFrom<RawCoord> for Coord {
    type Error = BoardError;

    fn try_from(raw: RawCoord) -> Result<Self, Self::Error> {
        Coord::from_u64(raw.x, raw.y)
    }
}

impl fmt::Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// One entry of the placement list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    /// Column.
    pub x: u8,
    /// Row.
    pub y: u8,
    /// Whether a ship occupies this cell.
    pub is_ship: bool,
}

/// A full 10x10 board.
///
/// Cells missing from a placement list default to empty. Duplicate
/// entries are OR-ed: a cell is a ship if any entry says so.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Cell>", into = "Vec<Cell>")]
pub struct Board {
    cells: [bool; CELL_COUNT],
}

impl Default for Board {
    fn default() -> Self {
        Self::empty()
    }
}

impl Board {
    /// An empty board.
    pub fn empty() -> Self {
        Self { cells: [false; CELL_COUNT] }
    }

    /// Build a board from a placement list.
    pub fn from_cells(cells: &[Cell]) -> Result<Self, BoardError> {
        let mut board = Self::empty();
        for cell in cells {
            let coord = Coord::new(cell.x, cell.y)?;
            if cell.is_ship {
                board.cells[coord.index()] = true;
            }
        }
        Ok(board)
    }

    /// Build a board from ship coordinates.
    pub fn from_ships<I: IntoIterator<Item = Coord>>(ships: I) -> Self {
        let mut board = Self::empty();
        for coord in ships {
            board.cells[coord.index()] = true;
        }
        board
    }

    /// Is there a ship at `coord`?
    #[inline]
    pub fn is_ship(&self, coord: Coord) -> bool {
        self.cells[coord.index()]
    }

    /// Set the flag at `coord`.
    pub fn set(&mut self, coord: Coord, is_ship: bool) {
        self.cells[coord.index()] = is_ship;
    }

    /// Number of ship cells.
    pub fn ship_count(&self) -> usize {
        self.cells.iter().filter(|c| **c).count()
    }

    /// The complete 100-entry placement list, in leaf order.
    pub fn to_cells(&self) -> Vec<Cell> {
        Coord::all()
            .map(|c| Cell { x: c.x, y: c.y, is_ship: self.is_ship(c) })
            .collect()
    }
}

// Layout is secret; never print it.
impl fmt::Debug for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Board").field("ships", &self.ship_count()).finish()
    }
}

impl TryFrom<Vec<Cell>> for Board {
    type Error = BoardError;

    fn try_from(cells: Vec<Cell>) -> Result<Self, Self::Error> {
        Self::from_cells(&cells)
    }
}

impl From<Board> for Vec<Cell> {
    fn from(board: Board) -> Self {
        board.to_cells()
    }
}
