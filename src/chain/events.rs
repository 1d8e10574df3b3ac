//! Game events.
//!
//! Every game event is emitted through the world contract with
//! `keys = [EVENT_EMITTED, name_hash, ..]`. The variant is chosen from
//! `keys[1]` alone; payload shape is only validated, never used to guess.
//!
//! ```text
//! game_spawned     [1, game_id, n, player1, player2, ..]
//! board_committed  [1, game_id, 2, committer, root]
//! attack_made      [1, game_id, 3, attacker, x, y]
//! attack_revealed  [1, game_id, 4, attacker, x, y, is_hit]
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::RawEvent;
use crate::core::board::{BoardError, Coord};
use crate::core::felt::{felt_hex, felt_to_u64, Felt};

/// Marker topic carried by every world event.
pub const EVENT_EMITTED: &str = "0x1c93f6e4703ae90f75338f29bffbe9c1662200cee981f49afeec26e892debcd";

const GAME_SPAWNED: &str = "0x2506e765ec1694f56f145b20757bd19327889df50702d131f137eb4236b2839";
const BOARD_COMMITTED: &str = "0x2de79eb1e428c946e9dfd00f684497a7e32479e000451996515869403d982b6";
const ATTACK_MADE: &str = "0x5548cce77b1d5547ae403fe1c999eb6b5b6deec203bb41d643f1ce0745141dd";
const ATTACK_REVEALED: &str = "0x32863952ba56dc9359e218290f6dea0636735db9d6df4b73e51cd0ba973167a";

fn selector(hex: &'static str) -> Felt {
    Felt::from_hex(hex).expect("selector constants are valid felts")
}

/// The `EVENT_EMITTED` topic as a felt.
pub fn event_emitted() -> Felt {
    selector(EVENT_EMITTED)
}

/// Event decoding errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventDecodeError {
    /// Data shorter than the layout requires.
    #[error("{kind:?} event too short: {len} words")]
    Truncated {
        /// Event kind.
        kind: EventKind,
        /// Words present.
        len: usize,
    },

    /// Unexpected key or field count header.
    #[error("{kind:?} event header mismatch: expected {expected}, found {found}")]
    Header {
        /// Event kind.
        kind: EventKind,
        /// Expected count.
        expected: u64,
        /// Count on the wire.
        found: String,
    },

    /// A word that must be a small integer was not.
    #[error("{kind:?} event has invalid {field}")]
    InvalidValue {
        /// Event kind.
        kind: EventKind,
        /// Offending field.
        field: &'static str,
    },

    /// Coordinates off the board.
    #[error(transparent)]
    Board(#[from] BoardError),
}

/// Recognised event names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A game was created.
    GameSpawned,
    /// A player committed a board root.
    BoardCommitted,
    /// An attack landed and awaits the defender's reveal.
    AttackMade,
    /// The defender revealed an attacked cell.
    AttackRevealed,
}

impl EventKind {
    /// All kinds.
    pub const ALL: [EventKind; 4] = [
        EventKind::GameSpawned,
        EventKind::BoardCommitted,
        EventKind::AttackMade,
        EventKind::AttackRevealed,
    ];

    /// Event name hash (`keys[1]`).
    pub fn name_hash(&self) -> Felt {
        selector(match self {
            EventKind::GameSpawned => GAME_SPAWNED,
            EventKind::BoardCommitted => BOARD_COMMITTED,
            EventKind::AttackMade => ATTACK_MADE,
            EventKind::AttackRevealed => ATTACK_REVEALED,
        })
    }

    /// Look a kind up by its name hash.
    pub fn from_name_hash(hash: &Felt) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name_hash() == *hash)
    }

    /// Short label used in checkpoint scopes and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::GameSpawned => "spawn",
            EventKind::BoardCommitted => "board-committed",
            EventKind::AttackMade => "attack-made",
            EventKind::AttackRevealed => "attack-revealed",
        }
    }

    fn field_count(&self) -> Option<u64> {
        match self {
            EventKind::GameSpawned => None,
            EventKind::BoardCommitted => Some(2),
            EventKind::AttackMade => Some(3),
            EventKind::AttackRevealed => Some(4),
        }
    }
}

/// `game_spawned`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSpawned {
    /// Stable event id.
    pub id: String,
    /// Inclusion block.
    pub block_number: Option<u64>,
    /// Game id.
    pub game_id: u64,
    /// Moves first.
    #[serde(with = "felt_hex")]
    pub player1: Felt,
    /// Opponent.
    #[serde(with = "felt_hex")]
    pub player2: Felt,
}

/// `board_committed`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardCommitted {
    /// Stable event id.
    pub id: String,
    /// Inclusion block.
    pub block_number: Option<u64>,
    /// Game id.
    pub game_id: u64,
    /// Player who committed.
    #[serde(with = "felt_hex")]
    pub committer: Felt,
    /// Published Merkle root.
    #[serde(with = "felt_hex")]
    pub root: Felt,
}

/// `attack_made`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttackMade {
    /// Stable event id.
    pub id: String,
    /// Inclusion block.
    pub block_number: Option<u64>,
    /// Game id.
    pub game_id: u64,
    /// Attacking player.
    #[serde(with = "felt_hex")]
    pub attacker: Felt,
    /// Targeted cell on the defender's board.
    pub coord: Coord,
}

/// `attack_revealed`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttackRevealed {
    /// Stable event id.
    pub id: String,
    /// Inclusion block.
    pub block_number: Option<u64>,
    /// Game id.
    pub game_id: u64,
    /// Attacking player.
    #[serde(with = "felt_hex")]
    pub attacker: Felt,
    /// Revealed cell.
    pub coord: Coord,
    /// Whether the cell held a ship.
    pub is_hit: bool,
}

/// A decoded game event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GameEvent {
    /// See [`GameSpawned`].
    Spawned(GameSpawned),
    /// See [`BoardCommitted`].
    Committed(BoardCommitted),
    /// See [`AttackMade`].
    Attacked(AttackMade),
    /// See [`AttackRevealed`].
    Revealed(AttackRevealed),
}

impl GameEvent {
    /// Game the event belongs to.
    pub fn game_id(&self) -> u64 {
        match self {
            GameEvent::Spawned(e) => e.game_id,
            GameEvent::Committed(e) => e.game_id,
            GameEvent::Attacked(e) => e.game_id,
            GameEvent::Revealed(e) => e.game_id,
        }
    }

    /// Stable event id.
    pub fn id(&self) -> &str {
        match self {
            GameEvent::Spawned(e) => &e.id,
            GameEvent::Committed(e) => &e.id,
            GameEvent::Attacked(e) => &e.id,
            GameEvent::Revealed(e) => &e.id,
        }
    }

    /// Event kind.
    pub fn kind(&self) -> EventKind {
        match self {
            GameEvent::Spawned(_) => EventKind::GameSpawned,
            GameEvent::Committed(_) => EventKind::BoardCommitted,
            GameEvent::Attacked(_) => EventKind::AttackMade,
            GameEvent::Revealed(_) => EventKind::AttackRevealed,
        }
    }
}

fn small(kind: EventKind, field: &'static str, value: &Felt) -> Result<u64, EventDecodeError> {
    felt_to_u64(value).ok_or(EventDecodeError::InvalidValue { kind, field })
}

fn expect_header(kind: EventKind, value: &Felt, expected: u64) -> Result<(), EventDecodeError> {
    if felt_to_u64(value) == Some(expected) {
        Ok(())
    } else {
        Err(EventDecodeError::Header { kind, expected, found: value.to_hex_string() })
    }
}

/// Decode a raw event, tagging it by `keys[1]`.
///
/// Returns `Ok(None)` for topics this crate does not know. A known topic
/// whose payload does not match its layout is an error.
pub fn decode_event(raw: &RawEvent, id: &str) -> Result<Option<GameEvent>, EventDecodeError> {
    let Some(kind) = raw.keys.get(1).and_then(EventKind::from_name_hash) else {
        return Ok(None);
    };
    if raw.keys.first() != Some(&event_emitted()) {
        return Ok(None);
    }

    let data = &raw.data;
    let min_len = match kind.field_count() {
        Some(n) => 3 + n as usize,
        None => 5,
    };
    if data.len() < min_len {
        return Err(EventDecodeError::Truncated { kind, len: data.len() });
    }

    expect_header(kind, &data[0], 1)?;
    let game_id = small(kind, "game_id", &data[1])?;
    match kind.field_count() {
        Some(n) => expect_header(kind, &data[2], n)?,
        None => {
            let n = small(kind, "field_count", &data[2])?;
            if n < 2 {
                return Err(EventDecodeError::Header { kind, expected: 2, found: n.to_string() });
            }
        }
    }

    let id = id.to_string();
    let block_number = raw.block_number;
    let coord = || -> Result<Coord, EventDecodeError> {
        Ok(Coord::from_u64(small(kind, "x", &data[4])?, small(kind, "y", &data[5])?)?)
    };

    let event = match kind {
        EventKind::GameSpawned => GameEvent::Spawned(GameSpawned {
            id,
            block_number,
            game_id,
            player1: data[3],
            player2: data[4],
        }),
        EventKind::BoardCommitted => GameEvent::Committed(BoardCommitted {
            id,
            block_number,
            game_id,
            committer: data[3],
            root: data[4],
        }),
        EventKind::AttackMade => GameEvent::Attacked(AttackMade {
            id,
            block_number,
            game_id,
            attacker: data[3],
            coord: coord()?,
        }),
        EventKind::AttackRevealed => {
            let is_hit = match small(kind, "is_hit", &data[6])? {
                0 => false,
                1 => true,
                _ => return Err(EventDecodeError::InvalidValue { kind, field: "is_hit" }),
            };
            GameEvent::Revealed(AttackRevealed {
                id,
                block_number,
                game_id,
                attacker: data[3],
                coord: coord()?,
                is_hit,
            })
        }
    };
    Ok(Some(event))
}

/// Build a raw event in the world layout. Used by [`super::MemoryChain`].
pub fn encode_event(kind: EventKind, game_id: u64, fields: &[Felt]) -> (Vec<Felt>, Vec<Felt>) {
    let keys = vec![event_emitted(), kind.name_hash()];
    let mut data = Vec::with_capacity(3 + fields.len());
    data.push(Felt::ONE);
    data.push(Felt::from(game_id));
    data.push(Felt::from(fields.len() as u64));
    data.extend_from_slice(fields);
    (keys, data)
}
