//! Runtime configuration.
//!
//! Defaults target the Sepolia deployment. Every value can be overridden
//! through `DARK_WATERS_*` environment variables.

use std::time::Duration;

use crate::core::felt::{felt_key, parse_felt, Felt};

const DEFAULT_WORLD_ADDRESS: &str =
    "0x042ec066eef86a6ae688ccc48ad45a887ab142386d9a43e7949e17f9198ee8ff";
const DEFAULT_ACTIONS_ADDRESS: &str =
    "0x01b7e17ad6bbc599b91ae78065708d5d49d6eaccf97908f36e9c1066d7c7085f";

/// Default seen-id window per checkpoint.
pub const DEFAULT_MAX_SEEN_EVENT_IDS: usize = 4000;

/// Where the game contracts live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deployment {
    /// World contract; emits every game event.
    pub world_address: Felt,
    /// Actions contract; receives every write.
    pub actions_address: Felt,
    /// JSON-RPC endpoint.
    pub rpc_url: String,
    /// First block that can hold game events.
    pub deployed_block: u64,
    /// Chain id string.
    pub chain_id: String,
}

impl Default for Deployment {
    fn default() -> Self {
        Self {
            world_address: parse_felt(DEFAULT_WORLD_ADDRESS)
                .unwrap_or(Felt::ZERO),
            actions_address: parse_felt(DEFAULT_ACTIONS_ADDRESS)
                .unwrap_or(Felt::ZERO),
            rpc_url: "https://api.cartridge.gg/x/starknet/sepolia".to_string(),
            deployed_block: 6_449_650,
            chain_id: "SN_SEPOLIA".to_string(),
        }
    }
}

impl Deployment {
    /// Load from environment, falling back to defaults per field.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            world_address: env_felt("DARK_WATERS_WORLD_ADDRESS").unwrap_or(defaults.world_address),
            actions_address: env_felt("DARK_WATERS_ACTIONS_ADDRESS")
                .unwrap_or(defaults.actions_address),
            rpc_url: std::env::var("DARK_WATERS_RPC_URL").unwrap_or(defaults.rpc_url),
            deployed_block: env_parse("DARK_WATERS_DEPLOYED_BLOCK")
                .unwrap_or(defaults.deployed_block),
            chain_id: std::env::var("DARK_WATERS_CHAIN_ID").unwrap_or(defaults.chain_id),
        }
    }

    /// Scope tag for persisted sync state.
    ///
    /// Changes whenever the world contract or its start block changes, so
    /// checkpoints from another deployment are never reused.
    pub fn fingerprint(&self) -> String {
        format!("{}@{}", felt_key(&self.world_address), self.deployed_block)
    }
}

/// Polling and pagination settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Period of the game state subscription.
    pub state_poll_interval: Duration,
    /// Period of the auto-reveal subscription.
    pub reveal_poll_interval: Duration,
    /// Events per page.
    pub chunk_size: usize,
    /// Seen ids kept per checkpoint.
    pub max_seen_event_ids: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            state_poll_interval: Duration::from_millis(5000),
            reveal_poll_interval: Duration::from_millis(4000),
            chunk_size: 1000,
            max_seen_event_ids: DEFAULT_MAX_SEEN_EVENT_IDS,
        }
    }
}

impl SyncConfig {
    /// Load from environment, falling back to defaults per field.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            state_poll_interval: env_parse("DARK_WATERS_STATE_POLL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.state_poll_interval),
            reveal_poll_interval: env_parse("DARK_WATERS_REVEAL_POLL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.reveal_poll_interval),
            chunk_size: env_parse("DARK_WATERS_CHUNK_SIZE")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.chunk_size),
            max_seen_event_ids: defaults.max_seen_event_ids,
        }
    }
}

fn env_felt(name: &str) -> Option<Felt> {
    std::env::var(name).ok().as_deref().and_then(parse_felt)
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_deployment() {
        let d = Deployment::default();
        assert_ne!(d.world_address, Felt::ZERO);
        assert_ne!(d.actions_address, Felt::ZERO);
        assert_eq!(d.deployed_block, 6_449_650);
        assert_eq!(
            d.fingerprint(),
            "0x42ec066eef86a6ae688ccc48ad45a887ab142386d9a43e7949e17f9198ee8ff@6449650"
        );
    }

    #[test]
    fn test_fingerprint_tracks_deployment() {
        let a = Deployment::default();
        let b = Deployment { deployed_block: a.deployed_block + 1, ..a.clone() };
        let c = Deployment { world_address: Felt::from(1u64), ..a.clone() };
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn test_sync_defaults() {
        let c = SyncConfig::default();
        assert_eq!(c.state_poll_interval, Duration::from_secs(5));
        assert_eq!(c.reveal_poll_interval, Duration::from_secs(4));
        assert_eq!(c.chunk_size, 1000);
        assert_eq!(c.max_seen_event_ids, 4000);
    }
}
