//! AES-256-GCM encryption of client ids, keyed by a process-bound key.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::RngCore;
use rand::rngs::OsRng;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{CryptoError, CryptoResult};

const KEY_LEN: usize = 32;
const IV_LEN: usize = 12;

/// A symmetric key generated once per process start and held only in
/// memory.
///
/// Spec §4.1: `client_id` is "encrypted with a process-bound key" — the key
/// itself is never persisted, so a restart invalidates any ciphertext
/// written by a previous process (the spec's failure semantics already
/// account for this: "a failed encrypt or DB write ... will not survive
/// restart").
#[derive(ZeroizeOnDrop)]
pub struct ProcessKey {
    bytes: [u8; KEY_LEN],
}

impl ProcessKey {
    /// Generate a fresh random key.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Construct from existing key bytes (for tests, or a deployment that
    /// wants a fixed key for a given process lifetime).
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKeyLength`] if `bytes` is not 32 bytes.
    pub fn from_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        if bytes.len() != KEY_LEN {
            return Err(CryptoError::InvalidKeyLength {
                expected: KEY_LEN,
                actual: bytes.len(),
            });
        }
        let mut owned = [0u8; KEY_LEN];
        owned.copy_from_slice(bytes);
        Ok(Self { bytes: owned })
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.bytes))
    }

    /// Encrypt a client id for storage, generating a fresh random IV.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::EncryptionFailed`] if the underlying AEAD
    /// operation fails (not expected for well-formed inputs).
    pub fn encrypt(&self, client_id: &str) -> CryptoResult<EncryptedClientId> {
        let mut iv = [0u8; IV_LEN];
        OsRng.fill_bytes(&mut iv);
        let nonce = Nonce::from_slice(&iv);
        let ciphertext = self
            .cipher()
            .encrypt(nonce, client_id.as_bytes())
            .map_err(|_| CryptoError::EncryptionFailed)?;
        Ok(EncryptedClientId { ciphertext, iv })
    }

    /// Decrypt a previously-encrypted client id.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::DecryptionFailed`] if the key, IV, or
    /// ciphertext do not match (wrong process key, corrupted row, etc).
    /// Spec §4.1: callers reading at init must drop the row silently on this
    /// error rather than propagate it.
    pub fn decrypt(&self, encrypted: &EncryptedClientId) -> CryptoResult<String> {
        let nonce = Nonce::from_slice(&encrypted.iv);
        let plaintext = self
            .cipher()
            .decrypt(nonce, encrypted.ciphertext.as_slice())
            .map_err(|_| CryptoError::DecryptionFailed)?;
        String::from_utf8(plaintext).map_err(|_| CryptoError::DecryptionFailed)
    }
}

/// An encrypted client id, ready to be written beside its IV (spec §4.1,
/// §6 DB schema: `client_id BLOB`, `iv BLOB`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedClientId {
    /// AES-256-GCM ciphertext (includes the authentication tag).
    pub ciphertext: Vec<u8>,
    /// The 96-bit nonce used for this encryption.
    pub iv: [u8; IV_LEN],
}

impl Drop for EncryptedClientId {
    fn drop(&mut self) {
        self.ciphertext.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_then_decrypt_round_trips() {
        let key = ProcessKey::generate();
        let encrypted = key.encrypt("client-1-abcdef012345").unwrap();
        let decrypted = key.decrypt(&encrypted).unwrap();
        assert_eq!(decrypted, "client-1-abcdef012345");
    }

    #[test]
    fn wrong_key_fails_to_decrypt() {
        let key_a = ProcessKey::generate();
        let key_b = ProcessKey::generate();
        let encrypted = key_a.encrypt("client-1").unwrap();
        assert!(key_b.decrypt(&encrypted).is_err());
    }

    #[test]
    fn rejects_wrong_key_length() {
        let err = ProcessKey::from_bytes(&[0u8; 10]).unwrap_err();
        assert!(matches!(err, CryptoError::InvalidKeyLength { expected: 32, actual: 10 }));
    }
}
