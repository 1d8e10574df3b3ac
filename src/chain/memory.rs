//! In-memory chain.
//!
//! A single-process stand-in for the world and actions contracts. It keeps
//! an append-only event log with block numbers, serves it through the same
//! paginated query the node exposes, and enforces the game rules the
//! verifier enforces: turn order, one outstanding attack, proof checks and
//! the stale-action rejections.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

use super::actions::GameAction;
use super::events::{self, EventKind};
use super::{ChainError, ChainReader, ChainWriter, EventPage, EventQuery, RawEvent, TxReceipt};
use crate::core::board::Coord;
use crate::core::felt::Felt;
use crate::proof::commitment::{attack_commitment, verify_reveal};

/// Hits needed to win.
const HIT_THRESHOLD: u32 = crate::HIT_THRESHOLD;

#[derive(Debug, Clone)]
struct GameRecord {
    players: [Felt; 2],
    roots: [Option<Felt>; 2],
    hits: [u32; 2],
    turn: usize,
    attack_commitment: Option<Felt>,
    pending_attack: Option<(usize, Coord)>,
    finished: bool,
}

impl GameRecord {
    fn seat(&self, address: &Felt) -> Option<usize> {
        self.players.iter().position(|p| p == address)
    }

    fn active(&self) -> bool {
        !self.finished && self.roots.iter().all(Option::is_some)
    }
}

#[derive(Debug)]
struct ChainState {
    world_address: Felt,
    block: u64,
    tx_count: u64,
    next_game_id: u64,
    games: HashMap<u64, GameRecord>,
    events: Vec<(Felt, RawEvent)>,
    submissions: Vec<(Felt, GameAction)>,
    fail_submits: u32,
    fail_fetches: u32,
}

impl ChainState {
    fn emit(&mut self, tx: Felt, index: u64, kind: EventKind, game_id: u64, fields: &[Felt]) {
        let (keys, data) = events::encode_event(kind, game_id, fields);
        let raw = RawEvent {
            block_number: Some(self.block),
            transaction_hash: tx,
            event_index: index,
            keys,
            data,
        };
        self.events.push((self.world_address, raw));
    }

    fn game_mut(&mut self, game_id: u64) -> Result<&mut GameRecord, ChainError> {
        self.games
            .get_mut(&game_id)
            .ok_or_else(|| ChainError::Rejected(format!("Game {game_id} does not exist")))
    }

    fn apply(&mut self, caller: Felt, action: &GameAction) -> Result<TxReceipt, ChainError> {
        if self.fail_submits > 0 {
            self.fail_submits -= 1;
            return Err(ChainError::Transient("injected submit failure".into()));
        }

        let tx = Felt::from(0x7800_0000u64 + self.tx_count);
        let block = self.block + 1;

        match action {
            GameAction::SpawnGame { opponent } => {
                if *opponent == caller {
                    return Err(ChainError::Rejected("Cannot play against yourself".into()));
                }
                let game_id = self.next_game_id;
                self.next_game_id += 1;
                self.games.insert(
                    game_id,
                    GameRecord {
                        players: [caller, *opponent],
                        roots: [None, None],
                        hits: [0, 0],
                        turn: 0,
                        attack_commitment: None,
                        pending_attack: None,
                        finished: false,
                    },
                );
                self.block = block;
                self.emit(tx, 0, EventKind::GameSpawned, game_id, &[caller, *opponent]);
            }
            GameAction::CommitBoard { game_id, root } => {
                let game = self.game_mut(*game_id)?;
                let seat = game.seat(&caller).ok_or_else(not_a_player)?;
                if game.roots[seat].is_some() {
                    return Err(ChainError::Rejected("Board already committed".into()));
                }
                game.roots[seat] = Some(*root);
                self.block = block;
                self.emit(tx, 0, EventKind::BoardCommitted, *game_id, &[caller, *root]);
            }
            GameAction::CommitAttack { game_id, commitment } => {
                let game = self.game_mut(*game_id)?;
                if !game.active() {
                    return Err(ChainError::Rejected("Game not active".into()));
                }
                let seat = game.seat(&caller).ok_or_else(not_a_player)?;
                if seat != game.turn {
                    return Err(ChainError::Rejected("Not your turn".into()));
                }
                if game.pending_attack.is_some() || game.attack_commitment.is_some() {
                    return Err(ChainError::Rejected("Attack already pending".into()));
                }
                game.attack_commitment = Some(*commitment);
                self.block = block;
            }
            GameAction::RevealAttack { game_id, coord, reveal_nonce } => {
                let game = self.game_mut(*game_id)?;
                if !game.active() {
                    return Err(ChainError::Rejected("Game not active".into()));
                }
                let seat = game.seat(&caller).ok_or_else(not_a_player)?;
                if seat != game.turn {
                    return Err(ChainError::Rejected("Not your turn".into()));
                }
                if game.attack_commitment != Some(attack_commitment(*coord, reveal_nonce)) {
                    return Err(ChainError::Rejected("Attack commitment mismatch".into()));
                }
                game.attack_commitment = None;
                game.pending_attack = Some((seat, *coord));
                self.block = block;
                self.emit(
                    tx,
                    0,
                    EventKind::AttackMade,
                    *game_id,
                    &[caller, Felt::from(coord.x), Felt::from(coord.y)],
                );
            }
            GameAction::Reveal { game_id, coord, nonce, is_ship, proof } => {
                let game = self.game_mut(*game_id)?;
                if !game.active() {
                    return Err(ChainError::Rejected("Game not active".into()));
                }
                let seat = game.seat(&caller).ok_or_else(not_a_player)?;
                let Some((attacker, target)) = game.pending_attack else {
                    return Err(ChainError::Rejected("no recorded attack".into()));
                };
                if attacker == seat {
                    return Err(ChainError::Rejected("Attacker cannot reveal".into()));
                }
                if target != *coord {
                    return Err(ChainError::Rejected("no recorded attack at this cell".into()));
                }
                let root = game.roots[seat].unwrap_or(Felt::ZERO);
                if !verify_reveal(&root, coord.x, coord.y, *is_ship, nonce, proof) {
                    return Err(ChainError::Rejected("Invalid proof".into()));
                }

                game.pending_attack = None;
                if *is_ship {
                    game.hits[attacker] += 1;
                }
                if game.hits[attacker] >= HIT_THRESHOLD {
                    game.finished = true;
                }
                game.turn = seat;
                let attacker_address = game.players[attacker];
                self.block = block;
                self.emit(
                    tx,
                    0,
                    EventKind::AttackRevealed,
                    *game_id,
                    &[
                        attacker_address,
                        Felt::from(coord.x),
                        Felt::from(coord.y),
                        if *is_ship { Felt::ONE } else { Felt::ZERO },
                    ],
                );
            }
        }

        self.tx_count += 1;
        self.submissions.push((caller, action.clone()));
        debug!(entrypoint = action.entrypoint(), block, "memory chain applied action");
        Ok(TxReceipt { transaction_hash: tx, block_number: block })
    }

    fn page(&mut self, query: &EventQuery) -> Result<EventPage, ChainError> {
        if self.fail_fetches > 0 {
            self.fail_fetches -= 1;
            return Err(ChainError::Transient("injected fetch failure".into()));
        }
        let offset = match &query.continuation_token {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| ChainError::Rejected(format!("invalid continuation token: {token}")))?,
            None => 0,
        };
        let matching: Vec<&RawEvent> = self
            .events
            .iter()
            .filter(|(address, _)| *address == query.address)
            .map(|(_, raw)| raw)
            .filter(|raw| raw.block_number.unwrap_or(u64::MAX) >= query.from_block)
            .filter(|raw| query.keys.iter().zip(&raw.keys).all(|(want, have)| want == have))
            .filter(|raw| raw.keys.len() >= query.keys.len())
            .collect();

        let chunk = query.chunk_size.max(1);
        let end = (offset + chunk).min(matching.len());
        let events = matching
            .get(offset..end)
            .unwrap_or_default()
            .iter()
            .map(|raw| (*raw).clone())
            .collect();
        let continuation_token = (end < matching.len()).then(|| end.to_string());
        Ok(EventPage { events, continuation_token })
    }
}

/// Shared in-memory chain. Clones share state.
#[derive(Clone, Debug)]
pub struct MemoryChain {
    state: Arc<Mutex<ChainState>>,
}

fn not_a_player() -> ChainError {
    ChainError::Rejected("Not a player".into())
}

impl MemoryChain {
    /// Create an empty chain for a world contract, starting at `start_block`.
    pub fn new(world_address: Felt, start_block: u64) -> Self {
        Self {
            state: Arc::new(Mutex::new(ChainState {
                world_address,
                block: start_block,
                tx_count: 0,
                next_game_id: 1,
                games: HashMap::new(),
                events: Vec::new(),
                submissions: Vec::new(),
                fail_submits: 0,
                fail_fetches: 0,
            })),
        }
    }

    /// A signer for `address` on this chain.
    pub fn account(&self, address: Felt) -> MemoryAccount {
        MemoryAccount { chain: self.clone(), address }
    }

    /// Fail the next `n` submissions with a transient error.
    pub fn fail_next_submits(&self, n: u32) {
        if let Ok(mut state) = self.lock() {
            state.fail_submits = n;
        }
    }

    /// Fail the next `n` event fetches with a transient error.
    pub fn fail_next_fetches(&self, n: u32) {
        if let Ok(mut state) = self.lock() {
            state.fail_fetches = n;
        }
    }

    /// Append an arbitrary event from `address`.
    pub fn push_raw_event(&self, address: Felt, mut raw: RawEvent) {
        if let Ok(mut state) = self.lock() {
            if raw.block_number.is_none() {
                raw.block_number = Some(state.block);
            }
            state.events.push((address, raw));
        }
    }

    /// Id of the most recently spawned game.
    pub fn latest_game_id(&self) -> Option<u64> {
        let state = self.lock().ok()?;
        state.next_game_id.checked_sub(1).filter(|id| *id > 0)
    }

    /// Number of accepted submissions to `entrypoint`.
    pub fn submission_count(&self, entrypoint: &str) -> usize {
        self.lock()
            .map(|state| {
                state.submissions.iter().filter(|(_, a)| a.entrypoint() == entrypoint).count()
            })
            .unwrap_or(0)
    }

    /// Attack still waiting for a reveal in `game_id`.
    pub fn pending_attack(&self, game_id: u64) -> Option<Coord> {
        let state = self.lock().ok()?;
        state.games.get(&game_id)?.pending_attack.map(|(_, coord)| coord)
    }

    fn lock(&self) -> Result<MutexGuard<'_, ChainState>, ChainError> {
        self.state.lock().map_err(|_| ChainError::Transient("memory chain lock poisoned".into()))
    }

    fn submit(&self, caller: Felt, action: &GameAction) -> Result<TxReceipt, ChainError> {
        self.lock()?.apply(caller, action)
    }
}

impl ChainReader for MemoryChain {
    async fn get_events(&self, query: EventQuery) -> Result<EventPage, ChainError> {
        self.lock()?.page(&query)
    }
}

/// A player account on a [`MemoryChain`].
#[derive(Clone, Debug)]
pub struct MemoryAccount {
    chain: MemoryChain,
    address: Felt,
}

impl ChainWriter for MemoryAccount {
    fn address(&self) -> Felt {
        self.address
    }

    async fn execute(&self, action: GameAction) -> Result<TxReceipt, ChainError> {
        self.chain.submit(self.address, &action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::events::{decode_event, GameEvent};
    use crate::core::board::Board;
    use crate::proof::commitment::{BoardCommitment, MasterSecret};

    const WORLD: u64 = 0xAAA;

    fn p1() -> Felt {
        Felt::from(0x111u64)
    }

    fn p2() -> Felt {
        Felt::from(0x222u64)
    }

    async fn all_events(chain: &MemoryChain, kind: EventKind) -> Vec<GameEvent> {
        let page = chain
            .get_events(EventQuery::for_kind(Felt::from(WORLD), kind, 0, 100))
            .await
            .unwrap();
        page.events.iter().filter_map(|raw| decode_event(raw, "id").unwrap()).collect()
    }

    async fn attack(
        account: &MemoryAccount,
        game_id: u64,
        coord: Coord,
    ) -> Result<TxReceipt, ChainError> {
        let nonce = Felt::from(77u64);
        account
            .execute(GameAction::CommitAttack {
                game_id,
                commitment: attack_commitment(coord, &nonce),
            })
            .await?;
        account.execute(GameAction::RevealAttack { game_id, coord, reveal_nonce: nonce }).await
    }

    #[tokio::test]
    async fn test_game_flow_and_rejections() {
        let chain = MemoryChain::new(Felt::from(WORLD), 100);
        let a = chain.account(p1());
        let b = chain.account(p2());

        a.execute(GameAction::SpawnGame { opponent: p2() }).await.unwrap();
        let game_id = chain.latest_game_id().unwrap();
        assert_eq!(game_id, 1);

        let board = Board::from_ships([Coord::new(3, 7).unwrap()]);
        let secret = MasterSecret::from_felt(Felt::from(5u64));
        let commitment = BoardCommitment::commit(&board, &secret);
        a.execute(GameAction::CommitBoard { game_id, root: Felt::from(1u64) }).await.unwrap();

        let early = attack(&a, game_id, Coord::new(0, 0).unwrap()).await.unwrap_err();
        assert!(early.is_stale());

        b.execute(GameAction::CommitBoard { game_id, root: commitment.root() }).await.unwrap();

        let not_turn = attack(&b, game_id, Coord::new(0, 0).unwrap()).await.unwrap_err();
        assert_eq!(not_turn, ChainError::Rejected("Not your turn".into()));

        attack(&a, game_id, Coord::new(3, 7).unwrap()).await.unwrap();
        assert_eq!(chain.pending_attack(game_id), Some(Coord::new(3, 7).unwrap()));

        let disclosure = commitment.prove(3, 7).unwrap();
        let self_reveal = a.execute(GameAction::reveal(game_id, disclosure)).await;
        assert!(self_reveal.unwrap_err().is_stale());

        let mut forged = commitment.prove(3, 7).unwrap();
        forged.is_ship = false;
        let bad = b.execute(GameAction::reveal(game_id, forged)).await.unwrap_err();
        assert!(!bad.is_stale());

        b.execute(GameAction::reveal(game_id, commitment.prove(3, 7).unwrap())).await.unwrap();
        assert_eq!(chain.pending_attack(game_id), None);

        let disclosure = commitment.prove(3, 7).unwrap();
        let again = b.execute(GameAction::reveal(game_id, disclosure)).await.unwrap_err();
        assert!(again.is_stale());

        let reveals = all_events(&chain, EventKind::AttackRevealed).await;
        assert!(matches!(&reveals[..], [GameEvent::Revealed(r)] if r.is_hit && r.attacker == p1()));
        assert_eq!(all_events(&chain, EventKind::BoardCommitted).await.len(), 2);
        assert_eq!(chain.submission_count("reveal"), 1);
    }

    #[tokio::test]
    async fn test_pagination() {
        let chain = MemoryChain::new(Felt::from(WORLD), 100);
        let a = chain.account(p1());
        for _ in 0..5 {
            a.execute(GameAction::SpawnGame { opponent: p2() }).await.unwrap();
        }

        let mut query = EventQuery::for_kind(Felt::from(WORLD), EventKind::GameSpawned, 0, 2);
        let mut seen = 0;
        let mut pages = 0;
        loop {
            let page = chain.get_events(query.clone()).await.unwrap();
            seen += page.events.len();
            pages += 1;
            match page.continuation_token {
                Some(token) => query.continuation_token = Some(token),
                None => break,
            }
        }
        assert_eq!(seen, 5);
        assert_eq!(pages, 3);

        let late = chain
            .get_events(EventQuery::for_kind(Felt::from(WORLD), EventKind::GameSpawned, 104, 10))
            .await
            .unwrap();
        assert_eq!(late.events.len(), 2);

        let foreign = chain
            .get_events(EventQuery::for_kind(Felt::from(1u64), EventKind::GameSpawned, 0, 10))
            .await
            .unwrap();
        assert!(foreign.events.is_empty());
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let chain = MemoryChain::new(Felt::from(WORLD), 0);
        chain.fail_next_submits(1);
        chain.fail_next_fetches(1);
        let a = chain.account(p1());

        let err = a.execute(GameAction::SpawnGame { opponent: p2() }).await.unwrap_err();
        assert!(matches!(err, ChainError::Transient(_)));
        a.execute(GameAction::SpawnGame { opponent: p2() }).await.unwrap();

        let query = EventQuery::for_kind(Felt::from(WORLD), EventKind::GameSpawned, 0, 10);
        assert!(chain.get_events(query.clone()).await.is_err());
        assert_eq!(chain.get_events(query).await.unwrap().events.len(), 1);
    }
}
