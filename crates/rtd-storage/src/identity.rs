//! The persistent identity store (spec §4.1, component C1).
//!
//! Maps a stable `UidName` to an encrypted `ClientId` plus its creation
//! time. Backed by a [`KvStore`] namespace; the `client_id` column is
//! encrypted with a [`ProcessKey`], the IV stored beside the ciphertext —
//! mirroring the single-table schema in spec §6 (`uid_name` PK, `client_id`
//! BLOB, `id_creation_time` INT64, `iv` BLOB).
//!
//! Per spec §4.1: a failed encrypt or write is logged here and returned as
//! an error; it is the caller's (client registry's) responsibility to keep
//! using the in-memory token for the current run rather than treat this as
//! fatal. Rows that fail to decrypt at `list_all` time are dropped silently,
//! not surfaced as an error for the whole listing.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use rtd_core::UidName;
use rtd_crypto::{EncryptedClientId, ProcessKey};

use crate::error::{StorageError, StorageResult};
use crate::kv::KvStore;

const NAMESPACE: &str = "identity:clients";

/// A single row of the persistent identity table.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredRow {
    ciphertext: Vec<u8>,
    iv: [u8; 12],
    id_creation_time_ms: i64,
}

/// A decrypted identity entry, as handed to and returned from the store's
/// callers.
#[derive(Debug, Clone)]
pub struct IdentityEntry {
    /// The stable principal this entry belongs to.
    pub uid_name: UidName,
    /// The plaintext client id (decrypted on read, encrypted on write).
    pub client_id: String,
    /// When this client id was first created, in epoch milliseconds.
    pub id_creation_time_ms: i64,
}

/// The persistent identity store: `upsert`, `lookup`, `list_all`, `close`
/// (spec §4.1).
pub struct IdentityStore {
    kv: Arc<dyn KvStore>,
    key: ProcessKey,
}

impl IdentityStore {
    /// Construct a store over an existing `KvStore` and process key.
    #[must_use]
    pub fn new(kv: Arc<dyn KvStore>, key: ProcessKey) -> Self {
        Self { kv, key }
    }

    /// Insert or replace the row for `entry.uid_name`.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if encryption or the underlying write
    /// fails. Per spec §4.1, callers should log this and keep serving the
    /// in-memory token rather than fail the registration.
    pub async fn upsert(&self, entry: &IdentityEntry) -> StorageResult<()> {
        let encrypted = self
            .key
            .encrypt(&entry.client_id)
            .map_err(|e| StorageError::Internal(e.to_string()))?;
        let row = StoredRow {
            ciphertext: encrypted.ciphertext,
            iv: encrypted.iv,
            id_creation_time_ms: entry.id_creation_time_ms,
        };
        let bytes =
            serde_json::to_vec(&row).map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.kv
            .set(NAMESPACE, entry.uid_name.as_str(), bytes)
            .await?;
        Ok(())
    }

    /// Look up the entry for a single `uid_name`.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the underlying read fails or the row
    /// cannot be decrypted.
    pub async fn lookup(&self, uid_name: &UidName) -> StorageResult<Option<IdentityEntry>> {
        let Some(bytes) = self.kv.get(NAMESPACE, uid_name.as_str()).await? else {
            return Ok(None);
        };
        let row: StoredRow =
            serde_json::from_slice(&bytes).map_err(|e| StorageError::Serialization(e.to_string()))?;
        let decrypted = self
            .key
            .decrypt(&EncryptedClientId {
                ciphertext: row.ciphertext,
                iv: row.iv,
            })
            .map_err(|_| StorageError::DecryptFailed(uid_name.to_string()))?;
        Ok(Some(IdentityEntry {
            uid_name: uid_name.clone(),
            client_id: decrypted,
            id_creation_time_ms: row.id_creation_time_ms,
        }))
    }

    /// List every row, silently dropping any that fail to decrypt (spec
    /// §4.1: "Reads at init that fail to decrypt a row drop that row
    /// silently").
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] only if listing keys itself fails — a
    /// single bad row never fails the whole listing.
    pub async fn list_all(&self) -> StorageResult<Vec<IdentityEntry>> {
        let keys = self.kv.list_keys(NAMESPACE).await?;
        let mut entries = Vec::with_capacity(keys.len());
        for key in keys {
            let uid_name = UidName::new(key);
            match self.lookup(&uid_name).await {
                Ok(Some(entry)) => entries.push(entry),
                Ok(None) => {},
                Err(e) => warn!(%uid_name, error = %e, "dropping undecryptable identity row"),
            }
        }
        Ok(entries)
    }

    /// Remove the row for `uid_name`, if any.
    ///
    /// Used when a serverless client supersedes a previously-regular client
    /// (spec §4.4 `register`: "purge the old token (memory + DB)") and when
    /// the underlying package is uninstalled.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the underlying delete fails.
    pub async fn remove(&self, uid_name: &UidName) -> StorageResult<()> {
        self.kv.delete(NAMESPACE, uid_name.as_str()).await
    }

    /// Release any resources held by the store. A no-op for the in-memory
    /// and `SurrealKV` backends, present so callers have a single shutdown
    /// hook regardless of backend (spec §4.1 operation list).
    pub fn close(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKvStore;

    fn store() -> IdentityStore {
        IdentityStore::new(Arc::new(MemoryKvStore::new()), ProcessKey::generate())
    }

    #[tokio::test]
    async fn upsert_then_lookup_round_trips() {
        let store = store();
        let uid = UidName::new("com.example.app");
        store
            .upsert(&IdentityEntry {
                uid_name: uid.clone(),
                client_id: "client-1-abc".to_string(),
                id_creation_time_ms: 1000,
            })
            .await
            .unwrap();

        let entry = store.lookup(&uid).await.unwrap().unwrap();
        assert_eq!(entry.client_id, "client-1-abc");
        assert_eq!(entry.id_creation_time_ms, 1000);
    }

    #[tokio::test]
    async fn lookup_of_missing_uid_is_none() {
        let store = store();
        let uid = UidName::new("com.example.missing");
        assert!(store.lookup(&uid).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_all_drops_rows_it_cannot_decrypt() {
        let kv = Arc::new(MemoryKvStore::new());
        let store = IdentityStore::new(Arc::clone(&kv) as Arc<dyn KvStore>, ProcessKey::generate());
        let uid = UidName::new("com.example.app");
        store
            .upsert(&IdentityEntry {
                uid_name: uid.clone(),
                client_id: "client-1".to_string(),
                id_creation_time_ms: 0,
            })
            .await
            .unwrap();

        // Corrupt the row directly via the raw KvStore so it no longer
        // decrypts with this process's key.
        kv.set(NAMESPACE, uid.as_str(), b"not json".to_vec())
            .await
            .unwrap();

        let all = store.list_all().await.unwrap();
        assert!(all.is_empty());
    }

    #[tokio::test]
    async fn remove_deletes_the_row() {
        let store = store();
        let uid = UidName::new("com.example.app");
        store
            .upsert(&IdentityEntry {
                uid_name: uid.clone(),
                client_id: "client-1".to_string(),
                id_creation_time_ms: 0,
            })
            .await
            .unwrap();
        store.remove(&uid).await.unwrap();
        assert!(store.lookup(&uid).await.unwrap().is_none());
    }
}
