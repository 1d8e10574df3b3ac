//! Storage key layout.
//!
//! ```text
//! durable   vault:{game}:{address}                          encrypted payload
//! durable   checkpoint:{class}:{fingerprint}:{game}:{address}
//! durable   game-cache:{fingerprint}:{game}:{address}
//! durable   pending-reveals:{fingerprint}:{game}:{address}
//! session   vault-key:{game}:{address}                      raw key hex
//! legacy    board:{game}:{address}, salt:{game}:{address}, board, salt
//! ```
//!
//! Addresses are always rendered with [`felt_key`] so that differently
//! padded spellings share one slot.

use crate::core::felt::{felt_key, Felt};

/// Unscoped legacy plaintext board.
pub const LEGACY_BOARD: &str = "board";

/// Unscoped legacy plaintext salt.
pub const LEGACY_SALT: &str = "salt";

/// Encrypted vault payload (durable).
pub fn vault(game_id: u64, address: &Felt) -> String {
    format!("vault:{}:{}", game_id, felt_key(address))
}

/// Vault decryption key (ephemeral).
pub fn vault_session_key(game_id: u64, address: &Felt) -> String {
    format!("vault-key:{}:{}", game_id, felt_key(address))
}

/// Scoped legacy plaintext board.
pub fn legacy_board(game_id: u64, address: &Felt) -> String {
    format!("{}:{}:{}", LEGACY_BOARD, game_id, felt_key(address))
}

/// Scoped legacy plaintext salt.
pub fn legacy_salt(game_id: u64, address: &Felt) -> String {
    format!("{}:{}:{}", LEGACY_SALT, game_id, felt_key(address))
}

/// Event checkpoint for one subscription scope.
pub fn checkpoint(class: &str, fingerprint: &str, game_id: u64, address: &Felt) -> String {
    format!("checkpoint:{}:{}:{}:{}", class, fingerprint, game_id, felt_key(address))
}

/// Accumulated parsed events for one game.
pub fn game_cache(fingerprint: &str, game_id: u64, address: &Felt) -> String {
    format!("game-cache:{}:{}:{}", fingerprint, game_id, felt_key(address))
}

/// Attacks against the local board that still await a reveal.
pub fn pending_reveals(fingerprint: &str, game_id: u64, address: &Felt) -> String {
    format!("pending-reveals:{}:{}:{}", fingerprint, game_id, felt_key(address))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::felt::parse_felt;

    #[test]
    fn test_address_normalized() {
        let a = parse_felt("0x00ABC").unwrap();
        let b = parse_felt("0xabc").unwrap();
        assert_eq!(vault(3, &a), vault(3, &b));
        assert_eq!(vault(3, &a), "vault:3:0xabc");
        assert_eq!(vault_session_key(3, &a), "vault-key:3:0xabc");
    }

    #[test]
    fn test_scopes_are_disjoint() {
        let addr = Felt::from(1u64);
        let a = checkpoint("attack-made", "0x1@10", 1, &addr);
        let b = checkpoint("attack-revealed", "0x1@10", 1, &addr);
        let c = checkpoint("attack-made", "0x2@10", 1, &addr);
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a, "checkpoint:attack-made:0x1@10:1:0x1");
    }
}
