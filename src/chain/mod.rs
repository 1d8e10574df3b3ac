//! Chain Boundary
//!
//! The two seams between this crate and the chain: a paginated event
//! reader and an action submitter. Both are traits so that sync logic can
//! run against [`MemoryChain`] in tests and the demo.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      CHAIN BOUNDARY                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  events.rs   - Event selectors and strict wire decoding     │
//! │  actions.rs  - Write actions and their calldata             │
//! │  memory.rs   - In-memory chain with contract semantics      │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod actions;
pub mod events;
pub mod memory;

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;

use crate::core::felt::{felt_hex, felt_hex_vec, Felt};

pub use actions::GameAction;
pub use events::{
    decode_event, AttackMade, AttackRevealed, BoardCommitted, EventDecodeError, EventKind,
    GameEvent,
    GameSpawned, EVENT_EMITTED,
};
pub use memory::{MemoryAccount, MemoryChain};

/// Revert reasons meaning "this action was already resolved".
pub const STALE_REASONS: [&str; 3] =
    ["no recorded attack", "Attacker cannot reveal", "Game not active"];

/// Chain boundary errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    /// Network or node failure. Worth retrying.
    #[error("transient chain error: {0}")]
    Transient(String),

    /// The contract rejected the action.
    #[error("action rejected: {0}")]
    Rejected(String),
}

impl ChainError {
    /// True for rejections that resubmitting can never fix.
    pub fn is_stale(&self) -> bool {
        match self {
            ChainError::Rejected(reason) => STALE_REASONS.iter().any(|r| reason.contains(r)),
            ChainError::Transient(_) => false,
        }
    }
}

/// One emitted event as returned by the node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEvent {
    /// Block the event landed in; `None` while pending.
    pub block_number: Option<u64>,
    /// Emitting transaction.
    #[serde(with = "felt_hex")]
    pub transaction_hash: Felt,
    /// Position within the transaction's events.
    pub event_index: u64,
    /// Topics.
    #[serde(with = "felt_hex_vec")]
    pub keys: Vec<Felt>,
    /// Payload.
    #[serde(with = "felt_hex_vec")]
    pub data: Vec<Felt>,
}

/// Filter for one page of events.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventQuery {
    /// Emitting contract.
    pub address: Felt,
    /// Topic filter: `[EVENT_EMITTED, name_hash]`.
    pub keys: Vec<Felt>,
    /// First block to include.
    pub from_block: u64,
    /// Page size.
    pub chunk_size: usize,
    /// Continuation token from the previous page.
    pub continuation_token: Option<String>,
}

impl EventQuery {
    /// Query for every event of `kind` emitted by `address` since `from_block`.
    pub fn for_kind(address: Felt, kind: EventKind, from_block: u64, chunk_size: usize) -> Self {
        Self {
            address,
            keys: vec![events::event_emitted(), kind.name_hash()],
            from_block,
            chunk_size,
            continuation_token: None,
        }
    }
}

/// One page of results.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EventPage {
    /// Matching events in emission order.
    pub events: Vec<RawEvent>,
    /// Set when more pages follow.
    pub continuation_token: Option<String>,
}

/// Result of an accepted action.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxReceipt {
    /// Submitted transaction.
    pub transaction_hash: Felt,
    /// Block it was included in.
    pub block_number: u64,
}

/// Paginated read access to emitted events.
pub trait ChainReader: Send + Sync {
    /// Fetch one page of events.
    fn get_events(
        &self,
        query: EventQuery,
    ) -> impl Future<Output = Result<EventPage, ChainError>> + Send;
}

/// Action submission for one account.
pub trait ChainWriter: Send + Sync {
    /// The submitting account.
    fn address(&self) -> Felt;

    /// Submit an action and wait for its inclusion.
    fn execute(
        &self,
        action: GameAction,
    ) -> impl Future<Output = Result<TxReceipt, ChainError>> + Send;
}

impl<T: ChainReader + ?Sized> ChainReader for Arc<T> {
    fn get_events(
        &self,
        query: EventQuery,
    ) -> impl Future<Output = Result<EventPage, ChainError>> + Send {
        (**self).get_events(query)
    }
}

impl<T: ChainWriter + ?Sized> ChainWriter for Arc<T> {
    fn address(&self) -> Felt {
        (**self).address()
    }

    fn execute(
        &self,
        action: GameAction,
    ) -> impl Future<Output = Result<TxReceipt, ChainError>> + Send {
        (**self).execute(action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stale_classification() {
        assert!(ChainError::Rejected("Game not active".into()).is_stale());
        assert!(ChainError::Rejected("revert: no recorded attack at cell".into()).is_stale());
        assert!(ChainError::Rejected("Attacker cannot reveal".into()).is_stale());
        assert!(!ChainError::Rejected("Invalid proof".into()).is_stale());
        assert!(!ChainError::Transient("Game not active".into()).is_stale());
    }

    #[test]
    fn test_query_topics() {
        let q = EventQuery::for_kind(Felt::from(5u64), EventKind::AttackMade, 100, 50);
        assert_eq!(q.keys.len(), 2);
        assert_eq!(q.keys[0], events::event_emitted());
        assert_eq!(q.keys[1], EventKind::AttackMade.name_hash());
        assert!(q.continuation_token.is_none());
    }
}
