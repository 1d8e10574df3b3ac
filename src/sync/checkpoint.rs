//! Event checkpoints.
//!
//! A checkpoint is the resumable cursor for one event class:
//!
//! ```text
//! { fromBlock, seenEventIds: [oldest .. newest] }
//! ```
//!
//! Queries restart at `fromBlock` inclusive, so the last block is always
//! re-read and the seen-id window filters what was already absorbed.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::debug;

use crate::chain::RawEvent;
use crate::core::felt::Felt;
use crate::core::hash::LocalHasher;
use crate::storage::{keys, read_json, write_json, KeyValueStore, StoreError};

/// Stable identity for one emitted event.
///
/// Derived from block, transaction, index, keys and data, so a re-fetch
/// from another page or cycle yields the same id.
pub fn compute_event_id(event: &RawEvent) -> String {
    let mut hasher = LocalHasher::for_event_id();
    hasher.update_opt_u64(event.block_number);
    hasher.update_felt(&event.transaction_hash);
    hasher.update_u64(event.event_index);
    hasher.update_felts(&event.keys);
    hasher.update_felts(&event.data);
    hasher.finalize_hex()
}

/// What a checkpoint belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CheckpointScope {
    /// Event class label.
    pub class: String,
    /// Deployment fingerprint.
    pub fingerprint: String,
    /// Game id.
    pub game_id: u64,
    /// Observing address.
    pub address: Felt,
}

impl CheckpointScope {
    /// Build a scope.
    pub fn new(
        class: impl Into<String>,
        fingerprint: impl Into<String>,
        game_id: u64,
        address: Felt,
    ) -> Self {
        Self { class: class.into(), fingerprint: fingerprint.into(), game_id, address }
    }

    /// Storage key.
    pub fn key(&self) -> String {
        keys::checkpoint(&self.class, &self.fingerprint, self.game_id, &self.address)
    }
}

/// Cursor plus dedup window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    /// First block of the next query.
    pub from_block: u64,
    /// Recently absorbed event ids, oldest first.
    pub seen_event_ids: VecDeque<String>,
}

impl Checkpoint {
    /// Fresh checkpoint at `from_block`.
    pub fn new(from_block: u64) -> Self {
        Self { from_block, seen_event_ids: VecDeque::new() }
    }

    /// Keep only the newest `limit` ids.
    pub fn truncate(&mut self, limit: usize) {
        while self.seen_event_ids.len() > limit {
            self.seen_event_ids.pop_front();
        }
    }
}

/// Loads and saves checkpoints through a durable store.
#[derive(Clone)]
pub struct CheckpointStore {
    store: Arc<dyn KeyValueStore>,
    max_seen: usize,
}

impl CheckpointStore {
    /// Create a checkpoint store keeping up to `max_seen` ids per scope.
    pub fn new(store: Arc<dyn KeyValueStore>, max_seen: usize) -> Self {
        Self { store, max_seen }
    }

    /// Id window size.
    pub fn max_seen(&self) -> usize {
        self.max_seen
    }

    /// Stored checkpoint, clamped to at least `default_block`.
    pub fn load(&self, scope: &CheckpointScope, default_block: u64) -> Checkpoint {
        match read_json::<Checkpoint, _>(&*self.store, &scope.key()) {
            Some(mut checkpoint) => {
                if checkpoint.from_block < default_block {
                    debug!(
                        class = %scope.class,
                        stored = checkpoint.from_block,
                        default_block,
                        "clamping stale checkpoint"
                    );
                    checkpoint.from_block = default_block;
                }
                checkpoint
            }
            None => Checkpoint::new(default_block),
        }
    }

    /// Persist, keeping only the newest ids.
    pub fn save(&self, scope: &CheckpointScope, checkpoint: &Checkpoint) -> Result<(), StoreError> {
        let mut bounded = checkpoint.clone();
        bounded.truncate(self.max_seen);
        write_json(&*self.store, &scope.key(), &bounded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn scope(class: &str) -> CheckpointScope {
        CheckpointScope::new(class, "0xw@100", 1, Felt::from(0xabcu64))
    }

    fn raw(tx: u64, index: u64) -> RawEvent {
        RawEvent {
            block_number: Some(150),
            transaction_hash: Felt::from(tx),
            event_index: index,
            keys: vec![Felt::from(1u64), Felt::from(2u64)],
            data: vec![Felt::from(3u64)],
        }
    }

    #[test]
    fn test_default_when_missing() {
        let store = CheckpointStore::new(Arc::new(MemoryStore::new()), 10);
        assert_eq!(store.load(&scope("spawn"), 100), Checkpoint::new(100));
    }

    #[test]
    fn test_save_load_and_clamp() {
        let store = CheckpointStore::new(Arc::new(MemoryStore::new()), 10);
        let mut cp = Checkpoint::new(50);
        cp.seen_event_ids.push_back("a".into());
        store.save(&scope("spawn"), &cp).unwrap();

        let loaded = store.load(&scope("spawn"), 100);
        assert_eq!(loaded.from_block, 100);
        assert_eq!(loaded.seen_event_ids, VecDeque::from(vec!["a".to_string()]));

        let later = store.load(&scope("spawn"), 10);
        assert_eq!(later.from_block, 50);
    }

    #[test]
    fn test_seen_window_is_bounded() {
        let store = CheckpointStore::new(Arc::new(MemoryStore::new()), 3);
        let mut cp = Checkpoint::new(1);
        for i in 0..5 {
            cp.seen_event_ids.push_back(format!("id-{i}"));
        }
        store.save(&scope("spawn"), &cp).unwrap();

        let loaded = store.load(&scope("spawn"), 1);
        let newest: VecDeque<String> = ["id-2", "id-3", "id-4"].map(String::from).into();
        assert_eq!(loaded.seen_event_ids, newest);
    }

    #[test]
    fn test_scopes_do_not_collide() {
        let store = CheckpointStore::new(Arc::new(MemoryStore::new()), 10);
        store.save(&scope("spawn"), &Checkpoint::new(500)).unwrap();
        assert_eq!(store.load(&scope("attack-made"), 100).from_block, 100);
    }

    #[test]
    fn test_event_id_is_stable() {
        assert_eq!(compute_event_id(&raw(1, 0)), compute_event_id(&raw(1, 0)));
        assert_ne!(compute_event_id(&raw(1, 0)), compute_event_id(&raw(1, 1)));
        assert_ne!(compute_event_id(&raw(1, 0)), compute_event_id(&raw(2, 0)));

        let mut other = raw(1, 0);
        other.data.push(Felt::ZERO);
        assert_ne!(compute_event_id(&raw(1, 0)), compute_event_id(&other));
        assert_eq!(compute_event_id(&raw(1, 0)).len(), 64);
    }
}
