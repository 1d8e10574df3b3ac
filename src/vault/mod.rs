//! Secret Vault
//!
//! Keeps a player's board layout and master secret encrypted at rest.
//!
//! The ciphertext goes to the durable store; the key goes to the session
//! store only. Once the session ends the vault is "locked" until the
//! player pastes a [`RecoveryPackage`] (or the key alone) back in. A
//! copied durable backup is useless without that key.

pub mod cipher;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::codes;
use crate::core::board::Board;
use crate::core::felt::{felt_hex, felt_key, parse_felt, Felt};
use crate::proof::commitment::MasterSecret;
use crate::storage::{keys, read_json, KeyValueStore, StoreError};

pub use cipher::SecretKey;

/// Payload format version.
pub const STORAGE_VERSION: u32 = 1;

/// Vault errors.
///
/// Only [`SecretVault::store`] surfaces these; the read-side operations
/// log them and report absence instead.
#[derive(Debug, Error)]
pub enum VaultError {
    /// Underlying store failed.
    #[error("vault storage error: {0}")]
    Store(#[from] StoreError),

    /// Bundle could not be encoded or decoded.
    #[error("vault serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Ciphertext or iv is not valid base64.
    #[error("vault encoding error: {0}")]
    Encoding(#[from] base64::DecodeError),

    /// Key is not 32 bytes of hex.
    #[error("invalid vault key")]
    InvalidKey,

    /// Encryption failed.
    #[error("vault encryption failed")]
    Encrypt,

    /// Authentication failed: wrong key or tampered payload.
    #[error("vault decryption failed")]
    Decrypt,
}

/// The plaintext kept inside the vault.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardSecrets {
    /// Committed layout.
    pub board: Board,
    /// Seed for every cell nonce.
    pub master_secret: MasterSecret,
    /// Creation time (Unix milliseconds).
    pub created_at: i64,
    /// Format version.
    pub version: u32,
}

/// Ciphertext as persisted under `vault:{game}:{address}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedPayload {
    /// Format version.
    pub version: u32,
    /// Base64 nonce.
    pub iv: String,
    /// Base64 ciphertext with authentication tag.
    pub ciphertext: String,
    /// Creation time (Unix milliseconds).
    pub created_at: i64,
}

/// Portable bundle that rebuilds a vault on another device.
///
/// Carries the key next to the ciphertext, so it must be handled as a
/// secret and only leave the vault on explicit user action.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryPackage {
    /// Format version.
    pub version: u32,
    /// Game the board belongs to.
    pub game_id: u64,
    /// Player address.
    #[serde(with = "felt_hex")]
    pub address: Felt,
    /// Hex decryption key.
    pub secret_key: String,
    /// The encrypted board.
    pub encrypted_payload: EncryptedPayload,
}

impl RecoveryPackage {
    /// Serialize for copy/paste transport.
    pub fn to_json(&self) -> Result<String, VaultError> {
        Ok(serde_json::to_string(self)?)
    }
}

impl fmt::Debug for RecoveryPackage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecoveryPackage")
            .field("version", &self.version)
            .field("game_id", &self.game_id)
            .field("address", &felt_key(&self.address))
            .field("secret_key", &"<redacted>")
            .finish_non_exhaustive()
    }
}

fn encrypt_bundle(bundle: &BoardSecrets, key: &SecretKey) -> Result<EncryptedPayload, VaultError> {
    let plaintext = serde_json::to_vec(bundle)?;
    let (iv, ciphertext) = cipher::seal(key, &plaintext)?;
    Ok(EncryptedPayload { version: STORAGE_VERSION, iv, ciphertext, created_at: bundle.created_at })
}

fn decrypt_bundle(payload: &EncryptedPayload, key: &SecretKey) -> Result<BoardSecrets, VaultError> {
    let plaintext = cipher::open(key, &payload.iv, &payload.ciphertext)?;
    Ok(serde_json::from_slice(&plaintext)?)
}

/// Encrypted, key-split storage for board secrets.
#[derive(Clone)]
pub struct SecretVault {
    durable: Arc<dyn KeyValueStore>,
    session: Arc<dyn KeyValueStore>,
}

impl SecretVault {
    /// Create a vault over a durable and a session-scoped store.
    pub fn new(durable: Arc<dyn KeyValueStore>, session: Arc<dyn KeyValueStore>) -> Self {
        Self { durable, session }
    }

    /// Encrypt and persist secrets under a fresh key.
    ///
    /// Replaces any earlier vault for the same game and address.
    pub fn store(
        &self,
        game_id: u64,
        address: &Felt,
        board: &Board,
        master_secret: &MasterSecret,
    ) -> Result<RecoveryPackage, VaultError> {
        let secret_key = SecretKey::generate();
        let bundle = BoardSecrets {
            board: board.clone(),
            master_secret: *master_secret,
            created_at: Utc::now().timestamp_millis(),
            version: STORAGE_VERSION,
        };
        let encrypted_payload = encrypt_bundle(&bundle, &secret_key)?;

        let payload_json = serde_json::to_string(&encrypted_payload)?;
        self.install(game_id, address, &payload_json, &secret_key.to_hex())?;

        info!(game_id, address = %felt_key(address), "stored board secrets");

        Ok(RecoveryPackage {
            version: STORAGE_VERSION,
            game_id,
            address: *address,
            secret_key: secret_key.to_hex(),
            encrypted_payload,
        })
    }

    /// Load secrets, migrating legacy plaintext if needed.
    ///
    /// `None` is the normal "locked" state after the session key is gone.
    pub fn load(&self, game_id: u64, address: &Felt) -> Option<BoardSecrets> {
        let payload: Option<EncryptedPayload> =
            read_json(&*self.durable, &keys::vault(game_id, address));
        let session_key = self.read_session_key(game_id, address);

        if let (Some(payload), Some(raw_key)) = (&payload, &session_key) {
            match SecretKey::from_hex(raw_key).and_then(|key| decrypt_bundle(payload, &key)) {
                Ok(secrets) => return Some(secrets),
                Err(e) => warn!(
                    code = codes::SECRET_DECRYPT_FAILED,
                    game_id,
                    error = %e,
                    "stored vault did not decrypt with session key"
                ),
            }
        }

        self.migrate_legacy(game_id, address)
    }

    /// Install a user-supplied key if it decrypts the stored payload.
    ///
    /// Never errors and never mutates state on a wrong key.
    pub fn unlock(&self, game_id: u64, address: &Felt, secret_key: &str) -> bool {
        let payload: Option<EncryptedPayload> =
            read_json(&*self.durable, &keys::vault(game_id, address));
        let Some(payload) = payload else {
            debug!(game_id, "unlock requested but no vault is stored");
            return false;
        };
        let Ok(key) = SecretKey::from_hex(secret_key) else {
            return false;
        };
        if decrypt_bundle(&payload, &key).is_err() {
            debug!(game_id, "unlock key rejected");
            return false;
        }
        match self.session.set(&keys::vault_session_key(game_id, address), &key.to_hex()) {
            Ok(()) => {
                info!(game_id, address = %felt_key(address), "vault unlocked");
                true
            }
            Err(e) => {
                warn!(game_id, error = %e, "failed to install session key");
                false
            }
        }
    }

    /// Install a pasted recovery package.
    ///
    /// Rejects malformed JSON, missing fields and keys that do not open
    /// the enclosed payload. Either both halves are installed or neither is.
    pub fn import_recovery_package(&self, raw: &str) -> Option<RecoveryPackage> {
        let package: RecoveryPackage = match serde_json::from_str(raw) {
            Ok(package) => package,
            Err(e) => {
                debug!(error = %e, "rejected recovery package");
                return None;
            }
        };
        let key = SecretKey::from_hex(&package.secret_key).ok()?;
        if decrypt_bundle(&package.encrypted_payload, &key).is_err() {
            debug!(game_id = package.game_id, "recovery package key does not open its payload");
            return None;
        }

        let payload_json = serde_json::to_string(&package.encrypted_payload).ok()?;
        let installed =
            self.install(package.game_id, &package.address, &payload_json, &package.secret_key);
        if let Err(e) = installed {
            warn!(game_id = package.game_id, error = %e, "failed to install recovery package");
            return None;
        }

        info!(
            game_id = package.game_id,
            address = %felt_key(&package.address),
            "imported recovery package"
        );
        Some(package)
    }

    /// The current recovery package, if both halves are present.
    pub fn read_recovery_package(&self, game_id: u64, address: &Felt) -> Option<RecoveryPackage> {
        let encrypted_payload: EncryptedPayload =
            read_json(&*self.durable, &keys::vault(game_id, address))?;
        let secret_key = self.read_session_key(game_id, address)?;
        Some(RecoveryPackage {
            version: STORAGE_VERSION,
            game_id,
            address: *address,
            secret_key,
            encrypted_payload,
        })
    }

    /// Whether a ciphertext exists, regardless of the session key.
    pub fn has_payload(&self, game_id: u64, address: &Felt) -> bool {
        matches!(self.durable.get(&keys::vault(game_id, address)), Ok(Some(_)))
    }

    /// Write ciphertext then key; restores the old ciphertext if the key write fails.
    fn install(
        &self,
        game_id: u64,
        address: &Felt,
        payload_json: &str,
        key_hex: &str,
    ) -> Result<(), StoreError> {
        let durable_key = keys::vault(game_id, address);
        let previous = self.durable.get(&durable_key)?;
        self.durable.set(&durable_key, payload_json)?;

        if let Err(e) = self.session.set(&keys::vault_session_key(game_id, address), key_hex) {
            warn!(game_id, error = %e, "session key write failed, restoring previous payload");
            let rollback = match &previous {
                Some(old) => self.durable.set(&durable_key, old),
                None => self.durable.delete(&durable_key),
            };
            if let Err(e) = rollback {
                warn!(game_id, error = %e, "restoring previous payload failed");
            }
            return Err(e);
        }
        Ok(())
    }

    fn read_session_key(&self, game_id: u64, address: &Felt) -> Option<String> {
        match self.session.get(&keys::vault_session_key(game_id, address)) {
            Ok(key) => key,
            Err(e) => {
                warn!(game_id, error = %e, "session store read failed");
                None
            }
        }
    }

    fn read_legacy_salt(&self, key: &str) -> Option<Felt> {
        let raw = self.durable.get(key).ok().flatten()?;
        parse_felt(raw.trim().trim_matches('"'))
    }

    fn migrate_legacy(&self, game_id: u64, address: &Felt) -> Option<BoardSecrets> {
        let board: Board = read_json(&*self.durable, &keys::legacy_board(game_id, address))
            .or_else(|| read_json(&*self.durable, keys::LEGACY_BOARD))?;
        let salt = self
            .read_legacy_salt(&keys::legacy_salt(game_id, address))
            .or_else(|| self.read_legacy_salt(keys::LEGACY_SALT))?;

        let package = match self.store(game_id, address, &board, &MasterSecret::from_felt(salt)) {
            Ok(package) => package,
            Err(e) => {
                warn!(game_id, error = %e, "legacy secret migration failed");
                return None;
            }
        };

        for key in [
            keys::LEGACY_BOARD.to_string(),
            keys::LEGACY_SALT.to_string(),
            keys::legacy_board(game_id, address),
            keys::legacy_salt(game_id, address),
        ] {
            if let Err(e) = self.durable.delete(&key) {
                warn!(game_id, key = %key, error = %e, "failed to delete legacy secret");
            }
        }
        info!(game_id, address = %felt_key(address), "migrated legacy plaintext secrets");

        let key = SecretKey::from_hex(&package.secret_key).ok()?;
        decrypt_bundle(&package.encrypted_payload, &key).ok()
    }
}
