//! Game State Projection
//!
//! Folds the accumulated event cache of one game into a snapshot.
//!
//! ```text
//! spawn ──► Setup ──(both committed | any reveal)──► Playing ──(10 hits)──► Finished
//! ```
//!
//! The fold always runs over the whole cache, so replaying the same
//! events any number of times yields the same snapshot.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

use crate::chain::{AttackRevealed, BoardCommitted, GameEvent, GameSpawned};
use crate::core::felt::{felt_hex, Felt};
use crate::HIT_THRESHOLD;

/// Parsed events accumulated for one game.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameCache {
    /// The game's spawn event.
    pub spawn: Option<GameSpawned>,
    /// Board commitments.
    pub commits: Vec<BoardCommitted>,
    /// Reveals in emission order.
    pub reveals: Vec<AttackRevealed>,
}

impl GameCache {
    /// Merge decoded events, ignoring other games and known ids.
    ///
    /// Returns whether anything was added.
    pub fn merge<I: IntoIterator<Item = GameEvent>>(&mut self, game_id: u64, events: I) -> bool {
        let mut known: HashSet<String> = self
            .spawn
            .iter()
            .map(|e| e.id.clone())
            .chain(self.commits.iter().map(|e| e.id.clone()))
            .chain(self.reveals.iter().map(|e| e.id.clone()))
            .collect();

        let mut changed = false;
        for event in events {
            if event.game_id() != game_id || !known.insert(event.id().to_string()) {
                continue;
            }
            match event {
                GameEvent::Spawned(e) => {
                    if self.spawn.is_none() {
                        self.spawn = Some(e);
                        changed = true;
                    }
                }
                GameEvent::Committed(e) => {
                    self.commits.push(e);
                    changed = true;
                }
                GameEvent::Revealed(e) => {
                    self.reveals.push(e);
                    changed = true;
                }
                GameEvent::Attacked(_) => {}
            }
        }
        changed
    }

    /// Whether `player` has a board commitment on record.
    pub fn has_committed(&self, player: &Felt) -> bool {
        self.commits.iter().any(|c| c.committer == *player)
    }
}

/// Lifecycle phase. Never moves backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GamePhase {
    /// Waiting for both boards.
    Setup,
    /// Attacks and reveals in progress.
    Playing,
    /// A player reached the hit threshold.
    Finished,
}

/// Derived view of one game from the local player's seat.
///
/// Replaced wholesale on every cycle; never patched in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameStateSnapshot {
    /// Game id.
    pub game_id: u64,
    /// Player 1 (moves first).
    pub player1: Felt,
    /// Player 2.
    pub player2: Felt,
    /// Current phase.
    pub phase: GamePhase,
    /// Player expected to attack next; `None` once finished.
    pub current_turn: Option<Felt>,
    /// True only while playing and it is the local player's turn.
    pub is_my_turn: bool,
    /// Winner once finished.
    pub winner: Option<Felt>,
    /// Player 1 has committed.
    pub player1_committed: bool,
    /// Player 2 has committed.
    pub player2_committed: bool,
    /// Hits scored by player 1.
    pub player1_hits: u32,
    /// Hits scored by player 2.
    pub player2_hits: u32,
    /// Every reveal in emission order.
    pub reveals: Vec<AttackRevealed>,
}

impl GameStateSnapshot {
    /// Whether the game is in progress.
    pub fn is_active(&self) -> bool {
        self.phase == GamePhase::Playing
    }

    /// Whether `player` may attack now.
    pub fn is_turn_of(&self, player: &Felt) -> bool {
        self.is_active() && self.current_turn.as_ref() == Some(player)
    }

    /// Whether `player` has committed a board.
    pub fn is_committed(&self, player: &Felt) -> bool {
        (*player == self.player1 && self.player1_committed)
            || (*player == self.player2 && self.player2_committed)
    }

    /// Hits scored by `player`.
    pub fn hits_for(&self, player: &Felt) -> u32 {
        if *player == self.player1 {
            self.player1_hits
        } else if *player == self.player2 {
            self.player2_hits
        } else {
            0
        }
    }
}

/// Fold a cache into a snapshot for `me`.
///
/// `None` when the spawn event has not been seen; the game does not exist.
pub fn project(cache: &GameCache, me: &Felt) -> Option<GameStateSnapshot> {
    let spawn = cache.spawn.as_ref()?;
    let players = [spawn.player1, spawn.player2];
    let committed = [cache.has_committed(&players[0]), cache.has_committed(&players[1])];

    let mut turn = 0usize;
    let mut hits = [0u32; 2];
    let mut winner: Option<usize> = None;

    // every reveal flips the turn; only seated attackers score
    for reveal in &cache.reveals {
        match players.iter().position(|p| *p == reveal.attacker) {
            Some(seat) if reveal.is_hit => {
                hits[seat] += 1;
                if hits[seat] >= HIT_THRESHOLD {
                    winner = Some(seat);
                    break;
                }
            }
            Some(_) => {}
            None => {
                debug!(
                    game_id = spawn.game_id,
                    event_id = %reveal.id,
                    "reveal by non-participant not scored"
                );
            }
        }
        turn ^= 1;
    }

    let phase = if winner.is_some() {
        GamePhase::Finished
    } else if committed.iter().all(|c| *c) || !cache.reveals.is_empty() {
        GamePhase::Playing
    } else {
        GamePhase::Setup
    };

    let current_turn = (phase != GamePhase::Finished).then(|| players[turn]);

    Some(GameStateSnapshot {
        game_id: spawn.game_id,
        player1: players[0],
        player2: players[1],
        phase,
        current_turn,
        is_my_turn: phase == GamePhase::Playing && current_turn.as_ref() == Some(me),
        winner: winner.map(|seat| players[seat]),
        player1_committed: committed[0],
        player2_committed: committed[1],
        player1_hits: hits[0],
        player2_hits: hits[1],
        reveals: cache.reveals.clone(),
    })
}

/// One game the local player is seated in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSummary {
    /// Game id.
    pub game_id: u64,
    /// The other player.
    #[serde(with = "felt_hex")]
    pub opponent: Felt,
    /// Whether the local player moves first.
    pub is_player1: bool,
}

/// Games involving `me`, newest id first.
pub fn my_games<'a, I>(spawns: I, me: &Felt) -> Vec<GameSummary>
where
    I: IntoIterator<Item = &'a GameSpawned>,
{
    let mut seen = HashSet::new();
    let mut games: Vec<GameSummary> = spawns
        .into_iter()
        .filter_map(|spawn| {
            let summary = if spawn.player1 == *me {
                GameSummary { game_id: spawn.game_id, opponent: spawn.player2, is_player1: true }
            } else if spawn.player2 == *me {
                GameSummary { game_id: spawn.game_id, opponent: spawn.player1, is_player1: false }
            } else {
                return None;
            };
            seen.insert(spawn.game_id).then_some(summary)
        })
        .collect();
    games.sort_by(|a, b| b.game_id.cmp(&a.game_id));
    games
}
