//! Raw key-value storage tier.
//!
//! Direct byte-level `get`/`set`/`delete`/`list_keys`, namespaced so several
//! logical tables can share one backing store. [`MemoryKvStore`] is always
//! available (tests, ephemeral deployments); [`SurrealKvStore`] backs it
//! with an embedded, versioned LSM-tree store behind the `kv` feature.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::{StorageError, StorageResult};

/// A single stored entry, namespace-qualified.
#[derive(Debug, Clone)]
pub struct KvEntry {
    /// Namespace the entry belongs to.
    pub namespace: String,
    /// Key within the namespace.
    pub key: String,
    /// Raw value bytes.
    pub value: Vec<u8>,
}

/// Namespaced byte-level key-value store.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Fetch a value by namespace and key.
    async fn get(&self, namespace: &str, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Store a value, overwriting any existing entry for the same key.
    async fn set(&self, namespace: &str, key: &str, value: Vec<u8>) -> StorageResult<()>;

    /// Remove a value. Removing a missing key is not an error.
    async fn delete(&self, namespace: &str, key: &str) -> StorageResult<()>;

    /// List all keys currently stored in a namespace.
    async fn list_keys(&self, namespace: &str) -> StorageResult<Vec<String>>;
}

/// In-memory `KvStore`. Data does not survive process restart.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    data: RwLock<HashMap<(String, String), Vec<u8>>>,
}

impl MemoryKvStore {
    /// Create an empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, namespace: &str, key: &str) -> StorageResult<Option<Vec<u8>>> {
        let data = self
            .data
            .read()
            .map_err(|e| StorageError::Internal(e.to_string()))?;
        Ok(data.get(&(namespace.to_string(), key.to_string())).cloned())
    }

    async fn set(&self, namespace: &str, key: &str, value: Vec<u8>) -> StorageResult<()> {
        let mut data = self
            .data
            .write()
            .map_err(|e| StorageError::Internal(e.to_string()))?;
        data.insert((namespace.to_string(), key.to_string()), value);
        Ok(())
    }

    async fn delete(&self, namespace: &str, key: &str) -> StorageResult<()> {
        let mut data = self
            .data
            .write()
            .map_err(|e| StorageError::Internal(e.to_string()))?;
        data.remove(&(namespace.to_string(), key.to_string()));
        Ok(())
    }

    async fn list_keys(&self, namespace: &str) -> StorageResult<Vec<String>> {
        let data = self
            .data
            .read()
            .map_err(|e| StorageError::Internal(e.to_string()))?;
        Ok(data
            .keys()
            .filter(|(ns, _)| ns == namespace)
            .map(|(_, key)| key.clone())
            .collect())
    }
}

#[cfg(feature = "kv")]
mod surreal {
    use std::path::Path;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::KvStore;
    use crate::error::{StorageError, StorageResult};

    fn encode(namespace: &str, key: &str) -> Vec<u8> {
        format!("{namespace}\0{key}").into_bytes()
    }

    /// `SurrealKV`-backed `KvStore`: an embedded, versioned, ACID-compliant
    /// LSM-tree store. Data survives process restarts at the given path.
    pub struct SurrealKvStore {
        inner: Mutex<surrealkv::Store>,
    }

    impl SurrealKvStore {
        /// Open (or create) a `SurrealKV` store at `path`.
        ///
        /// # Errors
        ///
        /// Returns [`StorageError::Connection`] if the store cannot be opened.
        pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
            let mut opts = surrealkv::Options::new();
            opts.dir = path.as_ref().to_path_buf();
            let store = surrealkv::Store::new(opts)
                .map_err(|e| StorageError::Connection(e.to_string()))?;
            Ok(Self {
                inner: Mutex::new(store),
            })
        }
    }

    #[async_trait]
    impl KvStore for SurrealKvStore {
        async fn get(&self, namespace: &str, key: &str) -> StorageResult<Option<Vec<u8>>> {
            let store = self
                .inner
                .lock()
                .map_err(|e| StorageError::Internal(e.to_string()))?;
            let mut txn = store
                .begin()
                .map_err(|e| StorageError::Internal(e.to_string()))?;
            let value = txn
                .get(&encode(namespace, key))
                .map_err(|e| StorageError::Internal(e.to_string()))?;
            Ok(value.map(|v| v.to_vec()))
        }

        async fn set(&self, namespace: &str, key: &str, value: Vec<u8>) -> StorageResult<()> {
            let store = self
                .inner
                .lock()
                .map_err(|e| StorageError::Internal(e.to_string()))?;
            let mut txn = store
                .begin()
                .map_err(|e| StorageError::Internal(e.to_string()))?;
            txn.set(&encode(namespace, key), &value)
                .map_err(|e| StorageError::Internal(e.to_string()))?;
            txn.commit()
                .map_err(|e| StorageError::Internal(e.to_string()))?;
            Ok(())
        }

        async fn delete(&self, namespace: &str, key: &str) -> StorageResult<()> {
            let store = self
                .inner
                .lock()
                .map_err(|e| StorageError::Internal(e.to_string()))?;
            let mut txn = store
                .begin()
                .map_err(|e| StorageError::Internal(e.to_string()))?;
            txn.delete(&encode(namespace, key))
                .map_err(|e| StorageError::Internal(e.to_string()))?;
            txn.commit()
                .map_err(|e| StorageError::Internal(e.to_string()))?;
            Ok(())
        }

        async fn list_keys(&self, namespace: &str) -> StorageResult<Vec<String>> {
            let prefix = format!("{namespace}\0");
            let store = self
                .inner
                .lock()
                .map_err(|e| StorageError::Internal(e.to_string()))?;
            let mut txn = store
                .begin()
                .map_err(|e| StorageError::Internal(e.to_string()))?;
            let keys = txn
                .scan(prefix.as_bytes().to_vec().., None)
                .map_err(|e| StorageError::Internal(e.to_string()))?;
            Ok(keys
                .into_iter()
                .filter_map(|(k, _, _)| {
                    let k = String::from_utf8(k.to_vec()).ok()?;
                    k.strip_prefix(&prefix).map(str::to_string)
                })
                .collect())
        }
    }
}

#[cfg(feature = "kv")]
pub use surreal::SurrealKvStore;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let store = MemoryKvStore::new();
        store.set("ns", "k", vec![1, 2, 3]).await.unwrap();
        assert_eq!(store.get("ns", "k").await.unwrap(), Some(vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = MemoryKvStore::new();
        store.delete("ns", "missing").await.unwrap();
        store.set("ns", "k", vec![1]).await.unwrap();
        store.delete("ns", "k").await.unwrap();
        store.delete("ns", "k").await.unwrap();
        assert_eq!(store.get("ns", "k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn list_keys_is_namespace_scoped() {
        let store = MemoryKvStore::new();
        store.set("ns1", "a", vec![1]).await.unwrap();
        store.set("ns2", "b", vec![2]).await.unwrap();
        let mut keys = store.list_keys("ns1").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["a".to_string()]);
    }
}
