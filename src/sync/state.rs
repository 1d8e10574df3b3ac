//! Game state subscription.
//!
//! Every cycle drains the spawn, commit and reveal classes from their own
//! checkpoints, merges the fresh events into the durable game cache and
//! refolds the full cache into a new [`GameStateSnapshot`], published on a
//! `watch` channel.

use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use super::checkpoint::{Checkpoint, CheckpointScope, CheckpointStore};
use super::driver::{Cancellation, PollCycle};
use super::fetch::{absorb, decode_for_game, drain};
use super::projector::{my_games, project, GameCache, GameStateSnapshot, GameSummary};
use super::{SyncError, SyncHealth};
use crate::chain::{decode_event, ChainReader, EventKind, GameEvent, RawEvent};
use crate::codes;
use crate::config::{Deployment, SyncConfig};
use crate::core::felt::Felt;
use crate::storage::{keys, read_json, write_json, KeyValueStore};

/// Event classes folded into the snapshot.
pub const STATE_CLASSES: [EventKind; 3] =
    [EventKind::GameSpawned, EventKind::BoardCommitted, EventKind::AttackRevealed];

/// Everything one cycle wants to persist and publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateDelta {
    /// Advanced checkpoints, one per class.
    pub checkpoints: Vec<(CheckpointScope, Checkpoint)>,
    /// The merged cache.
    pub cache: GameCache,
    /// Whether `cache` differs from the stored one.
    pub cache_changed: bool,
    /// The refolded snapshot.
    pub snapshot: Option<GameStateSnapshot>,
    /// Fresh events in this cycle.
    pub fresh_events: usize,
}

/// One drained window for one class.
#[derive(Debug, Clone)]
pub struct ClassWindow {
    /// Checkpoint scope of the class.
    pub scope: CheckpointScope,
    /// Checkpoint the window was fetched from.
    pub checkpoint: Checkpoint,
    /// Every event returned since `checkpoint.from_block`.
    pub events: Vec<RawEvent>,
}

/// Pure cycle step: absorb each window, merge and refold.
pub fn plan_state(
    game_id: u64,
    me: &Felt,
    mut cache: GameCache,
    windows: Vec<ClassWindow>,
    max_seen: usize,
) -> StateDelta {
    let mut checkpoints = Vec::with_capacity(windows.len());
    let mut cache_changed = false;
    let mut fresh_events = 0;

    for window in windows {
        let absorbed = absorb(&window.checkpoint, window.events, max_seen);
        fresh_events += absorbed.fresh.len();
        cache_changed |= cache.merge(game_id, decode_for_game(&absorbed.fresh, game_id));
        checkpoints.push((window.scope, absorbed.checkpoint));
    }

    let snapshot = project(&cache, me);
    StateDelta { checkpoints, cache, cache_changed, snapshot, fresh_events }
}

/// Turn and phase tracking for one game.
pub struct GameStateSync<R> {
    reader: R,
    world_address: Felt,
    fingerprint: String,
    default_block: u64,
    chunk_size: usize,
    game_id: u64,
    me: Felt,
    durable: Arc<dyn KeyValueStore>,
    checkpoints: CheckpointStore,
    snapshot_tx: watch::Sender<Option<GameStateSnapshot>>,
    health: SyncHealth,
}

impl<R: ChainReader> GameStateSync<R> {
    /// Create a subscription, priming the snapshot from the stored cache.
    pub fn new(
        reader: R,
        deployment: &Deployment,
        config: &SyncConfig,
        durable: Arc<dyn KeyValueStore>,
        game_id: u64,
        me: Felt,
    ) -> Self {
        let fingerprint = deployment.fingerprint();
        let cache: GameCache =
            read_json(&*durable, &keys::game_cache(&fingerprint, game_id, &me)).unwrap_or_default();
        let (snapshot_tx, _) = watch::channel(project(&cache, &me));

        Self {
            reader,
            world_address: deployment.world_address,
            fingerprint,
            default_block: deployment.deployed_block,
            chunk_size: config.chunk_size,
            game_id,
            me,
            checkpoints: CheckpointStore::new(durable.clone(), config.max_seen_event_ids),
            durable,
            snapshot_tx,
            health: SyncHealth::default(),
        }
    }

    /// Receive every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Option<GameStateSnapshot>> {
        self.snapshot_tx.subscribe()
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> Option<GameStateSnapshot> {
        self.snapshot_tx.borrow().clone()
    }

    /// Cycle counters.
    pub fn health(&self) -> &SyncHealth {
        &self.health
    }

    fn scope(&self, kind: EventKind) -> CheckpointScope {
        CheckpointScope::new(kind.as_str(), self.fingerprint.clone(), self.game_id, self.me)
    }

    fn cache_key(&self) -> String {
        keys::game_cache(&self.fingerprint, self.game_id, &self.me)
    }

    /// Fetch every class and compute the delta. Writes nothing.
    #[instrument(skip(self), fields(game_id = self.game_id))]
    pub async fn poll(&self) -> Result<StateDelta, SyncError> {
        let cache: GameCache = read_json(&*self.durable, &self.cache_key()).unwrap_or_default();

        let mut windows = Vec::with_capacity(STATE_CLASSES.len());
        for kind in STATE_CLASSES {
            let scope = self.scope(kind);
            let checkpoint = self.checkpoints.load(&scope, self.default_block);
            let from = checkpoint.from_block;
            let events =
                drain(&self.reader, self.world_address, kind, from, self.chunk_size).await?;
            windows.push(ClassWindow { scope, checkpoint, events });
        }

        Ok(plan_state(self.game_id, &self.me, cache, windows, self.checkpoints.max_seen()))
    }

    /// Persist a delta and publish its snapshot.
    ///
    /// The cache is written before the checkpoints so that a cursor never
    /// moves past events that were not stored.
    pub fn apply(&mut self, delta: StateDelta, cancel: &Cancellation) -> Result<(), SyncError> {
        if delta.cache_changed {
            cancel.check()?;
            write_json(&*self.durable, &self.cache_key(), &delta.cache)?;
        }
        for (scope, checkpoint) in &delta.checkpoints {
            cancel.check()?;
            self.checkpoints.save(scope, checkpoint)?;
        }
        cancel.check()?;

        if let Some(snapshot) = &delta.snapshot {
            let previous = self.snapshot_tx.borrow().as_ref().map(|s| (s.phase, s.is_my_turn));
            if previous != Some((snapshot.phase, snapshot.is_my_turn)) {
                info!(
                    game_id = self.game_id,
                    phase = ?snapshot.phase,
                    is_my_turn = snapshot.is_my_turn,
                    "game state changed"
                );
            }
        }
        self.snapshot_tx.send_replace(delta.snapshot);
        self.health.record_success(delta.fresh_events);
        Ok(())
    }
}

impl<R: ChainReader + 'static> PollCycle for GameStateSync<R> {
    fn name(&self) -> &'static str {
        "game-state"
    }

    async fn run_cycle(&mut self, cancel: &Cancellation) -> Result<(), SyncError> {
        let result = match self.poll().await {
            Ok(delta) => self.apply(delta, cancel),
            Err(e) => Err(e),
        };
        match &result {
            Err(SyncError::Cancelled) => debug!(game_id = self.game_id, "state cycle cancelled"),
            Err(e) => self.health.record_error(e),
            Ok(()) => {}
        }
        result
    }
}

/// List every game `me` is seated in, newest first.
pub async fn fetch_my_games<R: ChainReader + ?Sized>(
    reader: &R,
    deployment: &Deployment,
    config: &SyncConfig,
    me: &Felt,
) -> Result<Vec<GameSummary>, SyncError> {
    let events = drain(
        reader,
        deployment.world_address,
        EventKind::GameSpawned,
        deployment.deployed_block,
        config.chunk_size,
    )
    .await?;

    let spawns: Vec<_> = events
        .iter()
        .filter_map(|raw| match decode_event(raw, &super::compute_event_id(raw)) {
            Ok(Some(GameEvent::Spawned(spawn))) => Some(spawn),
            Ok(_) => None,
            Err(e) => {
                warn!(
                    code = codes::EVENT_PARSE_FAILED,
                    error = %e,
                    "skipping malformed spawn event"
                );
                None
            }
        })
        .collect();
    Ok(my_games(&spawns, me))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{ChainWriter, GameAction, MemoryChain};
    use crate::storage::MemoryStore;
    use crate::sync::projector::GamePhase;

    fn p1() -> Felt {
        Felt::from(0x111u64)
    }

    fn p2() -> Felt {
        Felt::from(0x222u64)
    }

    fn deployment() -> Deployment {
        Deployment {
            world_address: Felt::from(0xAAAu64),
            deployed_block: 100,
            ..Deployment::default()
        }
    }

    fn config() -> SyncConfig {
        SyncConfig { chunk_size: 2, ..SyncConfig::default() }
    }

    async fn spawned() -> (MemoryChain, u64) {
        let chain = MemoryChain::new(deployment().world_address, 100);
        chain.account(p1()).execute(GameAction::SpawnGame { opponent: p2() }).await.unwrap();
        let game_id = chain.latest_game_id().unwrap();
        (chain, game_id)
    }

    #[tokio::test]
    async fn test_poll_writes_nothing() {
        let (chain, game_id) = spawned().await;
        let store = Arc::new(MemoryStore::new());
        let sync =
            GameStateSync::new(chain, &deployment(), &config(), store.clone(), game_id, p1());

        let delta = sync.poll().await.unwrap();
        assert!(delta.cache_changed);
        assert_eq!(delta.snapshot.unwrap().phase, GamePhase::Setup);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_apply_persists_and_publishes() {
        let (chain, game_id) = spawned().await;
        let (a, b) = (chain.account(p1()), chain.account(p2()));
        a.execute(GameAction::CommitBoard { game_id, root: Felt::ONE }).await.unwrap();
        b.execute(GameAction::CommitBoard { game_id, root: Felt::from(2u64) }).await.unwrap();

        let store = Arc::new(MemoryStore::new());
        let me = p1();
        let mut sync =
            GameStateSync::new(chain.clone(), &deployment(), &config(), store.clone(), game_id, me);
        let mut rx = sync.subscribe();
        assert!(rx.borrow().is_none());

        let cancel = Cancellation::new();
        sync.run_cycle(&cancel).await.unwrap();
        assert!(rx.has_changed().unwrap());
        let snap = rx.borrow_and_update().clone().unwrap();
        assert_eq!(snap.phase, GamePhase::Playing);
        assert!(snap.is_my_turn);

        // a fresh instance resumes from storage
        let resumed = GameStateSync::new(chain, &deployment(), &config(), store, game_id, p1());
        assert_eq!(resumed.snapshot(), Some(snap.clone()));
        let delta = resumed.poll().await.unwrap();
        assert!(!delta.cache_changed);
        assert_eq!(delta.snapshot, Some(snap));
    }

    #[tokio::test]
    async fn test_cancelled_cycle_writes_nothing() {
        let (chain, game_id) = spawned().await;
        let store = Arc::new(MemoryStore::new());
        let mut sync =
            GameStateSync::new(chain, &deployment(), &config(), store.clone(), game_id, p1());

        let delta = sync.poll().await.unwrap();
        let cancel = Cancellation::new();
        cancel.cancel();
        assert!(matches!(sync.apply(delta, &cancel), Err(SyncError::Cancelled)));
        assert!(store.is_empty());
        assert!(sync.snapshot().is_none());
    }

    #[tokio::test]
    async fn test_fetch_failure_keeps_checkpoint() {
        let (chain, game_id) = spawned().await;
        let store = Arc::new(MemoryStore::new());
        let me = p1();
        let mut sync =
            GameStateSync::new(chain.clone(), &deployment(), &config(), store.clone(), game_id, me);

        chain.fail_next_fetches(1);
        assert!(sync.run_cycle(&Cancellation::new()).await.is_err());
        assert_eq!(sync.health().errors, 1);
        assert!(store.is_empty());

        sync.run_cycle(&Cancellation::new()).await.unwrap();
        assert_eq!(sync.health().cycles, 1);
        assert_eq!(sync.health().processed_events, 1);
    }

    #[test]
    fn test_plan_is_idempotent_over_duplicate_windows() {
        let game_id = 1;
        let (keys, data) =
            crate::chain::events::encode_event(EventKind::GameSpawned, game_id, &[p1(), p2()]);
        let raw = RawEvent {
            block_number: Some(101),
            transaction_hash: Felt::ONE,
            event_index: 0,
            keys,
            data,
        };
        let scope = CheckpointScope::new("spawn", "fp", game_id, p1());
        let window = ClassWindow { scope, checkpoint: Checkpoint::new(100), events: vec![raw] };

        let first = plan_state(game_id, &p1(), GameCache::default(), vec![window.clone()], 10);
        assert_eq!(first.fresh_events, 1);

        let replay = ClassWindow { checkpoint: first.checkpoints[0].1.clone(), ..window };
        let second = plan_state(game_id, &p1(), first.cache.clone(), vec![replay], 10);
        assert_eq!(second.fresh_events, 0);
        assert!(!second.cache_changed);
        assert_eq!(second.snapshot, first.snapshot);
    }

    #[tokio::test]
    async fn test_my_games_listing() {
        let chain = MemoryChain::new(deployment().world_address, 100);
        chain.account(p1()).execute(GameAction::SpawnGame { opponent: p2() }).await.unwrap();
        chain.account(p2()).execute(GameAction::SpawnGame { opponent: p1() }).await.unwrap();
        chain
            .account(Felt::from(9u64))
            .execute(GameAction::SpawnGame { opponent: Felt::from(8u64) })
            .await
            .unwrap();

        let games = fetch_my_games(&chain, &deployment(), &config(), &p1()).await.unwrap();
        let ids: Vec<u64> = games.iter().map(|g| g.game_id).collect();
        assert_eq!(ids, vec![2, 1]);
        assert!(!games[0].is_player1);
        assert!(games[1].is_player1);
    }
}
