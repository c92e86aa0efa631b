//! Remote Task Dispatch Crypto - client-id-at-rest encryption.
//!
//! The identity store (spec §4.1) persists each client's `client_id`
//! encrypted, with the IV stored beside the ciphertext. This crate provides
//! the process-bound key and the encrypt/decrypt primitive used by
//! `rtd-storage`; it does not itself talk to any database.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod cipher;
pub mod error;

pub use cipher::{EncryptedClientId, ProcessKey};
pub use error::{CryptoError, CryptoResult};
