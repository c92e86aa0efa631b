//! Storage tier: a namespaced [`kv::KvStore`] plus the encrypted
//! [`identity::IdentityStore`] built on top of it (spec §4.1, component
//! C1).
//!
//! This crate only specifies the record shape and access pattern; the
//! actual persistence engine is swappable behind the `kv` feature
//! (`MemoryKvStore` always, `SurrealKvStore` with `--features kv`).

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

mod error;
mod identity;
mod kv;

pub use error::{StorageError, StorageResult};
pub use identity::{IdentityEntry, IdentityStore};
pub use kv::{KvEntry, KvStore, MemoryKvStore};

#[cfg(feature = "kv")]
pub use kv::SurrealKvStore;
