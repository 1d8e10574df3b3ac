//! Local Digests
//!
//! SHA-256 digests for identifiers that never leave the client, such as
//! event ids. Commitment hashing is Poseidon (see `proof/`).

use sha2::{Digest, Sha256};

use super::felt::Felt;

/// Digest output (256 bits / 32 bytes).
pub type LocalHash = [u8; 32];

/// Incremental hasher with domain separation.
///
/// Every variable-length field is length-prefixed so that
/// `("ab", "c")` and `("a", "bc")` never collide.
pub struct LocalHasher {
    hasher: Sha256,
}

impl LocalHasher {
    /// Create a new hasher with domain separator.
    pub fn new(domain: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(domain);
        Self { hasher }
    }

    /// Hasher for chain event identities.
    pub fn for_event_id() -> Self {
        Self::new(b"DARK_WATERS_EVENT_ID_V1")
    }

    /// Update with a u64 value (little-endian).
    #[inline]
    pub fn update_u64(&mut self, value: u64) {
        self.hasher.update(value.to_le_bytes());
    }

    /// Update with an optional u64 (presence tag first).
    #[inline]
    pub fn update_opt_u64(&mut self, value: Option<u64>) {
        match value {
            Some(v) => {
                self.hasher.update([1u8]);
                self.update_u64(v);
            }
            None => self.hasher.update([0u8]),
        }
    }

    /// Update with a felt (32 bytes big-endian).
    #[inline]
    pub fn update_felt(&mut self, value: &Felt) {
        self.hasher.update(value.to_bytes_be());
    }

    /// Update with a length-prefixed felt list.
    pub fn update_felts(&mut self, values: &[Felt]) {
        self.update_u64(values.len() as u64);
        for value in values {
            self.update_felt(value);
        }
    }

    /// Finalize and return the hash.
    pub fn finalize(self) -> LocalHash {
        self.hasher.finalize().into()
    }

    /// Finalize and return lowercase hex.
    pub fn finalize_hex(self) -> String {
        hex::encode(self.finalize())
    }
}
