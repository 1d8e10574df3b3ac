//! Paginated fetch and absorption.
//!
//! [`drain`] follows continuation tokens to the end before returning;
//! [`absorb`] is the pure step that filters a drained window against a
//! checkpoint and computes the advanced checkpoint.

use std::collections::HashSet;
use tracing::{debug, warn};

use super::checkpoint::{compute_event_id, Checkpoint};
use crate::chain::{
    decode_event, ChainError, ChainReader, EventKind, EventQuery, GameEvent, RawEvent,
};
use crate::codes;
use crate::core::felt::Felt;

/// Upper bound on pages per drain; protects against a node that never
/// stops returning tokens.
pub const MAX_PAGES: usize = 10_000;

/// Fetch every event of `kind` since `from_block`, following all pages.
pub async fn drain<R: ChainReader + ?Sized>(
    reader: &R,
    address: Felt,
    kind: EventKind,
    from_block: u64,
    chunk_size: usize,
) -> Result<Vec<RawEvent>, ChainError> {
    let mut query = EventQuery::for_kind(address, kind, from_block, chunk_size);
    let mut events = Vec::new();

    for _ in 0..MAX_PAGES {
        let page = reader.get_events(query.clone()).await?;
        events.extend(page.events);
        match page.continuation_token {
            Some(token) => query.continuation_token = Some(token),
            None => {
                debug!(kind = kind.as_str(), from_block, count = events.len(), "drained events");
                return Ok(events);
            }
        }
    }
    Err(ChainError::Transient(format!("{} pagination did not terminate", kind.as_str())))
}

/// A fresh event together with its stable id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreshEvent {
    /// Stable id.
    pub id: String,
    /// Raw event.
    pub raw: RawEvent,
}

/// Result of absorbing one drained window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Absorbed {
    /// Events not seen before, in fetch order.
    pub fresh: Vec<FreshEvent>,
    /// Checkpoint to persist once the cycle's effects are applied.
    pub checkpoint: Checkpoint,
}

/// Filter `events` against `checkpoint` and advance it.
///
/// `fromBlock` moves to the highest block observed; duplicates inside the
/// window (and across it, via the seen ids) are dropped.
pub fn absorb(checkpoint: &Checkpoint, events: Vec<RawEvent>, max_seen: usize) -> Absorbed {
    let mut next = checkpoint.clone();
    let mut fresh = Vec::new();
    let mut seen: HashSet<String> = checkpoint.seen_event_ids.iter().cloned().collect();
    for raw in events {
        if let Some(block) = raw.block_number {
            next.from_block = next.from_block.max(block);
        }
        let id = compute_event_id(&raw);
        if !seen.insert(id.clone()) {
            continue;
        }
        next.seen_event_ids.push_back(id.clone());
        fresh.push(FreshEvent { id, raw });
    }
    next.truncate(max_seen);
    Absorbed { fresh, checkpoint: next }
}

/// Decode fresh events for one game, logging and skipping malformed ones.
pub fn decode_for_game(fresh: &[FreshEvent], game_id: u64) -> Vec<GameEvent> {
    fresh
        .iter()
        .filter_map(|event| match decode_event(&event.raw, &event.id) {
            Ok(Some(decoded)) if decoded.game_id() == game_id => Some(decoded),
            Ok(_) => None,
            Err(e) => {
                warn!(
                    code = codes::EVENT_PARSE_FAILED,
                    event_id = %event.id,
                    error = %e,
                    "skipping malformed event"
                );
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::events::encode_event;
    use crate::chain::{GameAction, MemoryChain};
    use crate::chain::ChainWriter;

    fn raw(block: u64, tx: u64) -> RawEvent {
        let players = [Felt::from(1u64), Felt::from(2u64)];
        let (keys, data) = encode_event(EventKind::GameSpawned, 1, &players);
        RawEvent {
            block_number: Some(block),
            transaction_hash: Felt::from(tx),
            event_index: 0,
            keys,
            data,
        }
    }

    #[test]
    fn test_absorb_advances_and_dedupes() {
        let start = Checkpoint::new(100);
        let first = absorb(&start, vec![raw(101, 1), raw(105, 2), raw(105, 2)], 10);
        assert_eq!(first.fresh.len(), 2);
        assert_eq!(first.checkpoint.from_block, 105);
        assert_eq!(first.checkpoint.seen_event_ids.len(), 2);

        // inclusive re-query returns block 105 again
        let second = absorb(&first.checkpoint, vec![raw(105, 2), raw(106, 3)], 10);
        assert_eq!(second.fresh.len(), 1);
        assert_eq!(second.fresh[0].raw.transaction_hash, Felt::from(3u64));
        assert_eq!(second.checkpoint.from_block, 106);
    }

    #[test]
    fn test_absorb_never_rewinds() {
        let start = Checkpoint::new(200);
        let out = absorb(&start, vec![raw(150, 1)], 10);
        assert_eq!(out.checkpoint.from_block, 200);

        let mut pending = raw(0, 9);
        pending.block_number = None;
        let out = absorb(&start, vec![pending], 10);
        assert_eq!(out.checkpoint.from_block, 200);
        assert_eq!(out.fresh.len(), 1);
    }

    #[test]
    fn test_absorb_bounds_window() {
        let events = (0..10).map(|i| raw(100, i)).collect();
        let out = absorb(&Checkpoint::new(100), events, 4);
        assert_eq!(out.fresh.len(), 10);
        assert_eq!(out.checkpoint.seen_event_ids.len(), 4);
    }

    #[test]
    fn test_decode_for_game_filters() {
        let mut other_game = raw(1, 2);
        other_game.data[1] = Felt::from(9u64);
        let mut broken = raw(1, 3);
        broken.data.truncate(3);
        let mut unknown = raw(1, 4);
        unknown.keys[1] = Felt::from(5u64);

        let fresh: Vec<FreshEvent> = [raw(1, 1), other_game, broken, unknown]
            .into_iter()
            .map(|raw| FreshEvent { id: compute_event_id(&raw), raw })
            .collect();
        let decoded = decode_for_game(&fresh, 1);
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].id(), fresh[0].id);
    }

    #[tokio::test]
    async fn test_drain_follows_every_page() {
        let world = Felt::from(0xAAAu64);
        let chain = MemoryChain::new(world, 10);
        let account = chain.account(Felt::from(1u64));
        for _ in 0..7 {
            account.execute(GameAction::SpawnGame { opponent: Felt::from(2u64) }).await.unwrap();
        }
        let events = drain(&chain, world, EventKind::GameSpawned, 0, 3).await.unwrap();
        assert_eq!(events.len(), 7);
    }

    #[tokio::test]
    async fn test_drain_error_aborts() {
        let world = Felt::from(0xAAAu64);
        let chain = MemoryChain::new(world, 10);
        chain.fail_next_fetches(1);
        assert!(drain(&chain, world, EventKind::GameSpawned, 0, 3).await.is_err());
    }
}
