//! Chain Synchronization
//!
//! Incremental, idempotent replay of game events into local state.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       SYNC LAYER                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  checkpoint.rs - Resumable cursors and stable event ids     │
//! │  fetch.rs      - Page draining and pure absorption          │
//! │  projector.rs  - Event cache and the game state fold        │
//! │  state.rs      - Turn/phase subscription                    │
//! │  reveal.rs     - Auto-reveal coordinator                    │
//! │  driver.rs     - Single-flight interval loop, cancellation  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each subscription splits a cycle into `poll()`, which reads and returns
//! a delta without touching storage, and `apply()`, which persists the
//! delta behind a cancellation check.

pub mod checkpoint;
pub mod driver;
pub mod fetch;
pub mod projector;
pub mod reveal;
pub mod state;

use serde::Serialize;
use thiserror::Error;

use crate::chain::ChainError;
use crate::storage::StoreError;

pub use checkpoint::{compute_event_id, Checkpoint, CheckpointScope, CheckpointStore};
pub use driver::{spawn_subscription, Cancellation, PollCycle, SubscriptionHandle};
pub use fetch::{absorb, drain, Absorbed, FreshEvent};
pub use projector::{my_games, project, GameCache, GamePhase, GameStateSnapshot, GameSummary};
pub use reveal::{PendingReveals, RevealCoordinator, RevealDelta, RevealHealth, RevealOutcome};
pub use state::{GameStateSync, StateDelta};

/// Sync errors.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Chain read failed; the cycle is retried next tick.
    #[error("chain error: {0}")]
    Chain(#[from] ChainError),

    /// Persisting sync state failed.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// The subscription was torn down.
    #[error("subscription cancelled")]
    Cancelled,
}

/// Counters surfaced for observability.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncHealth {
    /// Completed cycles.
    pub cycles: u64,
    /// Failed cycles.
    pub errors: u64,
    /// Fresh events absorbed.
    pub processed_events: u64,
    /// Most recent failure.
    pub last_error: Option<String>,
}

impl SyncHealth {
    /// Record a completed cycle.
    pub fn record_success(&mut self, processed: usize) {
        self.cycles += 1;
        self.processed_events += processed as u64;
    }

    /// Record a failed cycle.
    pub fn record_error(&mut self, error: &SyncError) {
        self.errors += 1;
        self.last_error = Some(error.to_string());
    }
}
