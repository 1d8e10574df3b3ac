//! # Dark Waters Client Core
//!
//! Hidden-board battleship against an on-chain verifier. Boards are
//! committed as Merkle roots, kept encrypted locally, and revealed one
//! cell at a time; game state is rebuilt by replaying chain events.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     DARK WATERS CORE                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Board, felts, local digests              │
//! │  ├── board.rs    - 10x10 layout and coordinates             │
//! │  ├── felt.rs     - Field element conversions                │
//! │  └── hash.rs     - SHA-256 event identities                 │
//! │                                                             │
//! │  proof/          - Commitment engine (wire contract)        │
//! │  ├── merkle.rs   - Sorted-pair Poseidon tree                │
//! │  └── commitment.rs - Nonces, leaves, reveal proofs          │
//! │                                                             │
//! │  vault/          - Encrypted board secrets                  │
//! │  storage/        - Injected key-value stores                │
//! │                                                             │
//! │  chain/          - Chain boundary                           │
//! │  ├── events.rs   - Tagged event decoding                    │
//! │  ├── actions.rs  - Write actions                            │
//! │  └── memory.rs   - In-memory chain                          │
//! │                                                             │
//! │  sync/           - Event replay                             │
//! │  ├── checkpoint.rs - Cursors and dedup windows              │
//! │  ├── projector.rs  - Game state fold                        │
//! │  ├── state.rs      - Turn/phase subscription                │
//! │  ├── reveal.rs     - Auto-reveal coordinator                │
//! │  └── driver.rs     - Interval loop and cancellation         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Consistency
//!
//! The chain is the only source of truth. Derived state is recomputed
//! from the full local event cache on every cycle, so duplicate or
//! re-ordered page delivery never double-counts a hit or a turn.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod chain;
pub mod codes;
pub mod config;
pub mod core;
pub mod proof;
pub mod storage;
pub mod sync;
pub mod vault;

// Re-export commonly used types
pub use chain::{ChainError, ChainReader, ChainWriter, GameAction, MemoryChain};
pub use config::{Deployment, SyncConfig};
pub use core::board::{Board, Cell, Coord};
pub use core::felt::Felt;
pub use proof::commitment::{commit, verify_reveal, BoardCommitment, MasterSecret};
pub use storage::{FileStore, KeyValueStore, MemoryStore};
pub use sync::{GamePhase, GameStateSnapshot, GameStateSync, RevealCoordinator};
pub use vault::{RecoveryPackage, SecretVault};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Hits that end a game.
pub const HIT_THRESHOLD: u32 = 10;
