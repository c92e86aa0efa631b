//! Cryptographic error types.

use thiserror::Error;

/// Errors that can occur during client-id encryption/decryption.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// The key material supplied was the wrong length.
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength {
        /// Expected length in bytes.
        expected: usize,
        /// Actual length in bytes.
        actual: usize,
    },

    /// The IV (nonce) supplied was the wrong length.
    #[error("invalid iv length: expected {expected}, got {actual}")]
    InvalidIvLength {
        /// Expected length in bytes.
        expected: usize,
        /// Actual length in bytes.
        actual: usize,
    },

    /// Encryption failed (should not happen for well-formed inputs; surfaced
    /// so callers can log and fall back to in-memory-only per spec §4.1).
    #[error("encryption failed")]
    EncryptionFailed,

    /// Decryption failed — wrong key, corrupted ciphertext, or tampered IV.
    #[error("decryption failed")]
    DecryptionFailed,
}

/// Result type for cryptographic operations.
pub type CryptoResult<T> = Result<T, CryptoError>;
