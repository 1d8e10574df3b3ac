//! Auto-Reveal Coordinator
//!
//! Answers every opponent attack on the local board with a reveal proof.
//!
//! ```text
//! attack_made ──► pending (FIFO) ──► vault.load ──► prove ──► reveal()
//!                     ▲                   │                      │
//!                     │              locked: keep           ok / stale: done
//!                     └──────────── transient failure: retry next cycle
//! ```
//!
//! Pending attacks are stored durably, so a sighting that the checkpoint
//! already consumed survives reloads and waits for the vault to unlock.
//! `attack_revealed` events against the local board are matched back to
//! pending attacks per coordinate, oldest first; attacks on the same cell
//! are assumed to resolve in submission order.

use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use super::checkpoint::{Checkpoint, CheckpointScope, CheckpointStore};
use super::driver::{Cancellation, PollCycle};
use super::fetch::{absorb, decode_for_game, drain};
use super::projector::{GamePhase, GameStateSnapshot};
use super::state::ClassWindow;
use super::SyncError;
use crate::chain::{
    AttackMade, ChainError, ChainReader, ChainWriter, EventKind, GameAction, GameEvent,
};
use crate::codes;
use crate::config::{Deployment, SyncConfig};
use crate::core::board::{Coord, CELL_COUNT};
use crate::core::felt::{felt_key, Felt};
use crate::proof::commitment::BoardCommitment;
use crate::storage::{keys, read_json, write_json, KeyValueStore};
use crate::vault::SecretVault;

/// Checkpoint class for attacks against the local board.
pub const ATTACK_CLASS: &str = "attack-made";

/// Checkpoint class for reveal acknowledgements. Distinct from the state
/// subscription's reveal class so the two cursors never collide.
pub const REVEAL_ACK_CLASS: &str = "attack-reveal-ack";

/// Attacks awaiting a reveal, plus local reveals awaiting their event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingReveals {
    /// Unanswered attacks, in arrival order.
    pub attacks: VecDeque<AttackMade>,
    /// Attacks revealed from here whose `attack_revealed` is not yet seen.
    pub awaiting_ack: VecDeque<AttackMade>,
}

impl PendingReveals {
    /// Whether no attack is waiting.
    pub fn is_empty(&self) -> bool {
        self.attacks.is_empty()
    }

    /// Queue an attack unless its id is already known.
    pub fn push(&mut self, attack: AttackMade) -> bool {
        let known = self.attacks.iter().chain(&self.awaiting_ack).any(|a| a.id == attack.id);
        if known {
            return false;
        }
        self.attacks.push_back(attack);
        true
    }

    /// Remove a queued attack by event id.
    pub fn remove(&mut self, id: &str) -> Option<AttackMade> {
        let index = self.attacks.iter().position(|a| a.id == id)?;
        self.attacks.remove(index)
    }

    /// Match one reveal of `coord` to the oldest outstanding attack on it.
    pub fn acknowledge(&mut self, coord: Coord) -> Option<AttackMade> {
        if let Some(index) = self.awaiting_ack.iter().position(|a| a.coord == coord) {
            return self.awaiting_ack.remove(index);
        }
        let index = self.attacks.iter().position(|a| a.coord == coord)?;
        self.attacks.remove(index)
    }

    /// Record a locally completed reveal.
    pub fn mark_revealed(&mut self, attack: AttackMade) {
        self.awaiting_ack.push_back(attack);
        while self.awaiting_ack.len() > CELL_COUNT {
            self.awaiting_ack.pop_front();
        }
    }
}

/// Outcome of one reveal attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevealOutcome {
    /// Accepted on chain.
    Submitted {
        /// Reveal transaction.
        transaction_hash: Felt,
    },
    /// Rejected as already resolved; will not be retried.
    Stale(String),
    /// The vault has no usable secrets for this game.
    SecretsLocked,
    /// Transient failure; retried next cycle.
    Failed(ChainError),
    /// Already in flight or completed.
    Skipped,
}

/// Coordinator counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevealHealth {
    /// Attacks resolved (submitted or stale).
    pub processed: u64,
    /// Submission attempts.
    pub attempts: u64,
    /// Failed submissions and polls.
    pub errors: u64,
    /// Most recent failure.
    pub last_error: Option<String>,
    /// Secrets were missing on the last attempt.
    pub secrets_locked: bool,
}

/// Everything one cycle wants to persist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevealDelta {
    /// Advanced checkpoints.
    pub checkpoints: Vec<(CheckpointScope, Checkpoint)>,
    /// The updated queue.
    pub pending: PendingReveals,
    /// Whether `pending` differs from the stored queue.
    pub pending_changed: bool,
    /// Fresh events in this cycle.
    pub fresh_events: usize,
}

/// Pure cycle step: queue new attacks, then apply acknowledgements.
pub fn plan_reveals(
    game_id: u64,
    me: &Felt,
    mut pending: PendingReveals,
    attacks: ClassWindow,
    acks: ClassWindow,
    max_seen: usize,
) -> RevealDelta {
    let mut pending_changed = false;

    let absorbed_attacks = absorb(&attacks.checkpoint, attacks.events, max_seen);
    for event in decode_for_game(&absorbed_attacks.fresh, game_id) {
        if let GameEvent::Attacked(attack) = event {
            if attack.attacker != *me {
                pending_changed |= pending.push(attack);
            }
        }
    }

    let absorbed_acks = absorb(&acks.checkpoint, acks.events, max_seen);
    for event in decode_for_game(&absorbed_acks.fresh, game_id) {
        if let GameEvent::Revealed(reveal) = event {
            if reveal.attacker != *me {
                pending_changed |= pending.acknowledge(reveal.coord).is_some();
            }
        }
    }

    RevealDelta {
        fresh_events: absorbed_attacks.fresh.len() + absorbed_acks.fresh.len(),
        checkpoints: vec![
            (attacks.scope, absorbed_attacks.checkpoint),
            (acks.scope, absorbed_acks.checkpoint),
        ],
        pending,
        pending_changed,
    }
}

/// Reveals the local board's attacked cells as attacks land.
pub struct RevealCoordinator<R, W> {
    reader: R,
    writer: W,
    vault: SecretVault,
    durable: Arc<dyn KeyValueStore>,
    checkpoints: CheckpointStore,
    world_address: Felt,
    fingerprint: String,
    default_block: u64,
    chunk_size: usize,
    game_id: u64,
    me: Felt,
    in_flight: HashSet<String>,
    health: RevealHealth,
    game_state: Option<watch::Receiver<Option<GameStateSnapshot>>>,
}

impl<R: ChainReader, W: ChainWriter> RevealCoordinator<R, W> {
    /// Create a coordinator revealing on behalf of `writer.address()`.
    pub fn new(
        reader: R,
        writer: W,
        vault: SecretVault,
        deployment: &Deployment,
        config: &SyncConfig,
        durable: Arc<dyn KeyValueStore>,
        game_id: u64,
    ) -> Self {
        let me = writer.address();
        Self {
            reader,
            writer,
            vault,
            checkpoints: CheckpointStore::new(durable.clone(), config.max_seen_event_ids),
            durable,
            world_address: deployment.world_address,
            fingerprint: deployment.fingerprint(),
            default_block: deployment.deployed_block,
            chunk_size: config.chunk_size,
            game_id,
            me,
            in_flight: HashSet::new(),
            health: RevealHealth::default(),
            game_state: None,
        }
    }

    /// Stop retrying once this snapshot feed reports the game finished.
    pub fn with_game_state(mut self, rx: watch::Receiver<Option<GameStateSnapshot>>) -> Self {
        self.game_state = Some(rx);
        self
    }

    /// Counters.
    pub fn health(&self) -> &RevealHealth {
        &self.health
    }

    /// Whether the last attempt found the vault locked.
    pub fn secrets_locked(&self) -> bool {
        self.health.secrets_locked
    }

    /// Attacks still waiting, as stored.
    pub fn pending(&self) -> PendingReveals {
        read_json(&*self.durable, &self.pending_key()).unwrap_or_default()
    }

    fn pending_key(&self) -> String {
        keys::pending_reveals(&self.fingerprint, self.game_id, &self.me)
    }

    fn scope(&self, class: &str) -> CheckpointScope {
        CheckpointScope::new(class, self.fingerprint.clone(), self.game_id, self.me)
    }

    fn game_finished(&self) -> bool {
        self.game_state
            .as_ref()
            .map(|rx| matches!(rx.borrow().as_ref(), Some(s) if s.phase == GamePhase::Finished))
            .unwrap_or(false)
    }

    async fn window(&self, class: &str, kind: EventKind) -> Result<ClassWindow, SyncError> {
        let scope = self.scope(class);
        let checkpoint = self.checkpoints.load(&scope, self.default_block);
        let from = checkpoint.from_block;
        let events = drain(&self.reader, self.world_address, kind, from, self.chunk_size).await?;
        Ok(ClassWindow { scope, checkpoint, events })
    }

    /// Fetch attacks and acknowledgements and compute the delta. Writes nothing.
    #[instrument(skip(self), fields(game_id = self.game_id))]
    pub async fn poll(&self) -> Result<RevealDelta, SyncError> {
        let attacks = self.window(ATTACK_CLASS, EventKind::AttackMade).await?;
        let acks = self.window(REVEAL_ACK_CLASS, EventKind::AttackRevealed).await?;
        let max_seen = self.checkpoints.max_seen();
        Ok(plan_reveals(self.game_id, &self.me, self.pending(), attacks, acks, max_seen))
    }

    /// Persist a delta, then work through the pending queue.
    pub async fn apply(
        &mut self,
        delta: RevealDelta,
        cancel: &Cancellation,
    ) -> Result<Vec<RevealOutcome>, SyncError> {
        let RevealDelta { checkpoints, mut pending, mut pending_changed, .. } = delta;
        // only reveals still waiting for their ack count as in flight
        self.in_flight.retain(|id| pending.awaiting_ack.iter().any(|a| a.id == *id));

        // queue first: a consumed cursor must never outrun a stored sighting
        if pending_changed {
            cancel.check()?;
            write_json(&*self.durable, &self.pending_key(), &pending)?;
            pending_changed = false;
        }
        for (scope, checkpoint) in &checkpoints {
            cancel.check()?;
            self.checkpoints.save(scope, checkpoint)?;
        }

        if self.game_finished() && !pending.is_empty() {
            info!(
                game_id = self.game_id,
                dropped = pending.attacks.len(),
                "game finished, dropping pending reveals"
            );
            pending.attacks.clear();
            pending_changed = true;
        }

        let mut outcomes = Vec::with_capacity(pending.attacks.len());
        let work: Vec<AttackMade> = pending.attacks.iter().cloned().collect();
        for attack in work {
            cancel.check()?;
            let outcome = self.reveal_attack(&attack).await;
            match &outcome {
                RevealOutcome::Submitted { .. } => {
                    pending.remove(&attack.id);
                    pending.mark_revealed(attack);
                    pending_changed = true;
                }
                RevealOutcome::Stale(_) => {
                    pending.remove(&attack.id);
                    pending_changed = true;
                }
                RevealOutcome::SecretsLocked
                | RevealOutcome::Failed(_)
                | RevealOutcome::Skipped => {}
            }
            outcomes.push(outcome);
        }

        if pending_changed {
            cancel.check()?;
            write_json(&*self.durable, &self.pending_key(), &pending)?;
        }
        Ok(outcomes)
    }

    /// Prove and submit the reveal for one attack.
    pub async fn reveal_attack(&mut self, attack: &AttackMade) -> RevealOutcome {
        if self.in_flight.contains(&attack.id) {
            debug!(event_id = %attack.id, "reveal already in flight");
            return RevealOutcome::Skipped;
        }

        let Some(secrets) = self.vault.load(self.game_id, &self.me) else {
            if !self.health.secrets_locked {
                warn!(
                    code = codes::SECRET_LOCKED,
                    game_id = self.game_id,
                    coord = %attack.coord,
                    "board secrets locked, import a recovery package to reveal"
                );
            }
            self.health.secrets_locked = true;
            return RevealOutcome::SecretsLocked;
        };
        self.health.secrets_locked = false;
        self.in_flight.insert(attack.id.clone());

        let disclosure = BoardCommitment::commit(&secrets.board, &secrets.master_secret)
            .prove_coord(attack.coord);
        let action = GameAction::reveal(self.game_id, disclosure);
        info!(
            code = codes::TX_EXECUTE,
            entrypoint = action.entrypoint(),
            game_id = self.game_id,
            coord = %attack.coord,
            attacker = %felt_key(&attack.attacker),
            "submitting reveal"
        );
        self.health.attempts += 1;

        match self.writer.execute(action).await {
            Ok(receipt) => {
                info!(
                    code = codes::TX_CONFIRMED,
                    game_id = self.game_id,
                    coord = %attack.coord,
                    tx = %felt_key(&receipt.transaction_hash),
                    "reveal confirmed"
                );
                self.health.processed += 1;
                RevealOutcome::Submitted { transaction_hash: receipt.transaction_hash }
            }
            Err(e) if e.is_stale() => {
                info!(
                    game_id = self.game_id,
                    coord = %attack.coord,
                    reason = %e,
                    "attack already resolved"
                );
                self.in_flight.remove(&attack.id);
                self.health.processed += 1;
                RevealOutcome::Stale(e.to_string())
            }
            Err(e) => {
                warn!(
                    code = codes::ATTACK_REVEAL_FAILED,
                    game_id = self.game_id,
                    coord = %attack.coord,
                    error = %e,
                    "reveal failed, will retry"
                );
                self.in_flight.remove(&attack.id);
                self.health.errors += 1;
                self.health.last_error = Some(e.to_string());
                RevealOutcome::Failed(e)
            }
        }
    }
}

impl<R, W> PollCycle for RevealCoordinator<R, W>
where
    R: ChainReader + 'static,
    W: ChainWriter + 'static,
{
    fn name(&self) -> &'static str {
        "auto-reveal"
    }

    async fn run_cycle(&mut self, cancel: &Cancellation) -> Result<(), SyncError> {
        let result = match self.poll().await {
            Ok(delta) => self.apply(delta, cancel).await.map(|_| ()),
            Err(e) => Err(e),
        };
        if let Err(e) = &result {
            if !matches!(e, SyncError::Cancelled) {
                self.health.errors += 1;
                self.health.last_error = Some(e.to_string());
            }
        }
        result
    }
}
