//! Vault encryption.
//!
//! ChaCha20-Poly1305 with a random 256-bit key per stored vault and a
//! random 96-bit nonce ("iv") per encryption. Binary values travel as
//! base64 inside JSON; the key travels as `0x`-hex.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use std::fmt;

use super::VaultError;

/// Symmetric key length in bytes.
pub const KEY_LEN: usize = 32;

/// Nonce length in bytes.
pub const IV_LEN: usize = 12;

/// A vault decryption key.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretKey([u8; KEY_LEN]);

impl SecretKey {
    /// Draw a fresh key from the OS RNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Parse `0x`-prefixed (or bare) hex.
    pub fn from_hex(raw: &str) -> Result<Self, VaultError> {
        let trimmed = raw.trim();
        let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let bytes = hex::decode(digits).map_err(|_| VaultError::InvalidKey)?;
        let bytes: [u8; KEY_LEN] = bytes.try_into().map_err(|_| VaultError::InvalidKey)?;
        Ok(Self(bytes))
    }

    /// Render as `0x`-prefixed hex.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    fn cipher(&self) -> ChaCha20Poly1305 {
        ChaCha20Poly1305::new(Key::from_slice(&self.0))
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(<redacted>)")
    }
}

/// Encrypt `plaintext`, returning base64 `(iv, ciphertext)`.
pub fn seal(key: &SecretKey, plaintext: &[u8]) -> Result<(String, String), VaultError> {
    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut iv);
    let ciphertext = key
        .cipher()
        .encrypt(Nonce::from_slice(&iv), plaintext)
        .map_err(|_| VaultError::Encrypt)?;
    Ok((STANDARD.encode(iv), STANDARD.encode(ciphertext)))
}

/// Decrypt base64 `(iv, ciphertext)`.
///
/// A wrong key and a tampered ciphertext both fail authentication.
pub fn open(key: &SecretKey, iv_b64: &str, ciphertext_b64: &str) -> Result<Vec<u8>, VaultError> {
    let iv = STANDARD.decode(iv_b64)?;
    if iv.len() != IV_LEN {
        return Err(VaultError::Decrypt);
    }
    let ciphertext = STANDARD.decode(ciphertext_b64)?;
    key.cipher()
        .decrypt(Nonce::from_slice(&iv), ciphertext.as_slice())
        .map_err(|_| VaultError::Decrypt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_open() {
        let key = SecretKey::generate();
        let (iv, ct) = seal(&key, b"fleet layout").unwrap();
        assert_eq!(open(&key, &iv, &ct).unwrap(), b"fleet layout");
    }

    #[test]
    fn test_wrong_key_fails() {
        let (iv, ct) = seal(&SecretKey::generate(), b"fleet layout").unwrap();
        assert!(matches!(open(&SecretKey::generate(), &iv, &ct), Err(VaultError::Decrypt)));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let key = SecretKey::generate();
        let (iv, ct) = seal(&key, b"fleet layout").unwrap();
        let mut raw = STANDARD.decode(&ct).unwrap();
        raw[0] ^= 0x01;
        assert!(open(&key, &iv, &STANDARD.encode(raw)).is_err());
    }

    #[test]
    fn test_key_hex() {
        let key = SecretKey::generate();
        let hex = key.to_hex();
        assert!(hex.starts_with("0x"));
        assert_eq!(hex.len(), 2 + KEY_LEN * 2);
        assert_eq!(SecretKey::from_hex(&hex).unwrap(), key);
        assert_eq!(SecretKey::from_hex(&hex[2..]).unwrap(), key);

        assert!(SecretKey::from_hex("0x1234").is_err());
        assert!(SecretKey::from_hex("not hex").is_err());
    }

    #[test]
    fn test_fresh_iv_per_seal() {
        let key = SecretKey::generate();
        let (iv1, _) = seal(&key, b"x").unwrap();
        let (iv2, _) = seal(&key, b"x").unwrap();
        assert_ne!(iv1, iv2);
    }
}
