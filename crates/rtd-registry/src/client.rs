//! The client registry (C4, spec §4.4): one `ClientToken` per registered
//! `UidName`, all mutated under a single lock.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::warn;

use rtd_core::{ClientId, TaskId, UidName};
use rtd_hal::HalWrapper;
use rtd_storage::{IdentityEntry, IdentityStore};

use crate::error::{RegistryError, RegistryResult};
use crate::serverless::ServerlessRegistry;

/// The `RegistrationInfo` delivered to a client on `register` (spec §4.4):
/// serverless clients receive only their `client_id`; regular clients also
/// receive the HAL's identity fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationInfo {
    /// Delivered to serverless clients.
    Serverless {
        /// The client's (config-assigned) id.
        client_id: ClientId,
    },
    /// Delivered to regular clients.
    Regular {
        /// The client's (generated or restored) id.
        client_id: ClientId,
        /// The HAL's wakeup service name.
        wakeup_service_name: String,
        /// The HAL's reported vehicle id.
        vehicle_id: String,
        /// The HAL's reported processor id.
        processor_id: String,
    },
}

/// Receives the outbound notifications a registered client may observe
/// (spec §6): registration updates, remote task delivery, and the
/// shutdown-starting warning.
#[async_trait]
pub trait ClientCallback: Send + Sync {
    /// `on_client_registration_updated(info)`.
    async fn on_client_registration_updated(&self, info: RegistrationInfo);

    /// `on_serverless_client_registered(client_id)`.
    async fn on_serverless_client_registered(&self, client_id: ClientId);

    /// `on_remote_task_requested(client_id, task_id, data, max_duration_s)`.
    ///
    /// # Errors
    ///
    /// A transport error here (spec §4.10) removes the task from the
    /// connection's active set without retry; the task is never
    /// reconsidered.
    async fn on_remote_task_requested(
        &self,
        client_id: ClientId,
        task_id: TaskId,
        data: Vec<u8>,
        max_duration_s: u64,
    ) -> RegistryResult<()>;

    /// `on_shutdown_starting()`.
    async fn on_shutdown_starting(&self);
}

/// A single client's registration state (spec §3).
struct ClientToken {
    client_id: ClientId,
    #[allow(dead_code)]
    id_creation_time_ms: i64,
    is_serverless: bool,
    callback: Option<Arc<dyn ClientCallback>>,
    is_ready_for_shutdown: bool,
}

/// A read-only snapshot of one client token, for dump/debug output.
#[derive(Debug, Clone)]
pub struct ClientSnapshot {
    /// The token's principal.
    pub uid_name: UidName,
    /// The token's client id.
    pub client_id: ClientId,
    /// Whether this is a serverless token.
    pub is_serverless: bool,
    /// Whether a live callback handle is attached.
    pub has_callback: bool,
    /// Whether the client has confirmed readiness for shutdown.
    pub is_ready_for_shutdown: bool,
}

/// The client registry (C4): resolves `UidName -> ClientToken`, one lock
/// guarding the whole map (spec §4.4).
pub struct ClientRegistry {
    tokens: RwLock<HashMap<UidName, ClientToken>>,
    identity_store: Arc<IdentityStore>,
    serverless: Arc<ServerlessRegistry>,
    hal: Arc<dyn HalWrapper>,
    client_id_prefix: String,
}

impl ClientRegistry {
    /// Construct an empty registry over the given collaborators.
    #[must_use]
    pub fn new(
        identity_store: Arc<IdentityStore>,
        serverless: Arc<ServerlessRegistry>,
        hal: Arc<dyn HalWrapper>,
        client_id_prefix: impl Into<String>,
    ) -> Self {
        Self {
            tokens: RwLock::new(HashMap::new()),
            identity_store,
            serverless,
            hal,
            client_id_prefix: client_id_prefix.into(),
        }
    }

    /// Restore every persisted (non-serverless) token from the identity
    /// store. Call once at boot, before serving any RPCs.
    pub async fn restore_from_identity_store(&self) {
        let entries = match self.identity_store.list_all().await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "failed to restore persisted client identities");
                return;
            },
        };
        let mut tokens = self.tokens.write().await;
        for entry in entries {
            tokens.insert(
                entry.uid_name.clone(),
                ClientToken {
                    client_id: ClientId::from_existing(entry.client_id),
                    id_creation_time_ms: entry.id_creation_time_ms,
                    is_serverless: false,
                    callback: None,
                    is_ready_for_shutdown: false,
                },
            );
        }
    }

    /// `register(caller_uid) -> RegistrationInfo` (spec §4.4). Does not
    /// store a callback — callers must follow up with
    /// [`attach_callback`](Self::attach_callback) only after the caller has
    /// been notified of its `RegistrationInfo`.
    pub async fn register(&self, uid: &UidName) -> RegistrationInfo {
        if let Some(client_id) = self.serverless.client_id_for_package(uid.as_str()).await {
            self.register_serverless(uid, client_id.clone()).await;
            return RegistrationInfo::Serverless { client_id };
        }
        self.register_regular(uid).await
    }

    async fn register_serverless(&self, uid: &UidName, client_id: ClientId) {
        let mut tokens = self.tokens.write().await;
        if let Some(existing) = tokens.get(uid) {
            if !existing.is_serverless {
                if let Err(e) = self.identity_store.remove(uid).await {
                    warn!(%uid, error = %e, "failed to purge superseded non-serverless token");
                }
            }
        }
        tokens.insert(
            uid.clone(),
            ClientToken {
                client_id,
                id_creation_time_ms: now_ms(),
                is_serverless: true,
                callback: None,
                is_ready_for_shutdown: false,
            },
        );
    }

    async fn register_regular(&self, uid: &UidName) -> RegistrationInfo {
        let existing_client_id = {
            let tokens = self.tokens.read().await;
            tokens.get(uid).map(|t| t.client_id.clone())
        };

        let client_id = if let Some(client_id) = existing_client_id {
            client_id
        } else {
            let (client_id, creation_ms) = match self.identity_store.lookup(uid).await {
                Ok(Some(entry)) => (ClientId::from_existing(entry.client_id), entry.id_creation_time_ms),
                Ok(None) => (ClientId::generate(&self.client_id_prefix), now_ms()),
                Err(e) => {
                    warn!(%uid, error = %e, "identity lookup failed, generating a fresh client_id");
                    (ClientId::generate(&self.client_id_prefix), now_ms())
                },
            };

            if let Err(e) = self
                .identity_store
                .upsert(&IdentityEntry {
                    uid_name: uid.clone(),
                    client_id: client_id.to_string(),
                    id_creation_time_ms: creation_ms,
                })
                .await
            {
                warn!(%uid, error = %e, "failed to persist client identity; token remains in-memory for this run");
            }

            let mut tokens = self.tokens.write().await;
            tokens.insert(
                uid.clone(),
                ClientToken {
                    client_id: client_id.clone(),
                    id_creation_time_ms: creation_ms,
                    is_serverless: false,
                    callback: None,
                    is_ready_for_shutdown: false,
                },
            );
            client_id
        };

        RegistrationInfo::Regular {
            client_id,
            wakeup_service_name: self.hal.get_wakeup_service_name(),
            vehicle_id: self.hal.get_vehicle_id(),
            processor_id: self.hal.get_processor_id(),
        }
    }

    /// Attach a callback handle to an already-registered token. Must only be
    /// called after the caller observed its `RegistrationInfo` (spec §4.4).
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownClient`] if `uid` was never
    /// registered.
    pub async fn attach_callback(
        &self,
        uid: &UidName,
        callback: Arc<dyn ClientCallback>,
    ) -> RegistryResult<ClientId> {
        let mut tokens = self.tokens.write().await;
        let token = tokens
            .get_mut(uid)
            .ok_or_else(|| RegistryError::UnknownClient(uid.to_string()))?;
        token.callback = Some(callback);
        Ok(token.client_id.clone())
    }

    /// `unregister(caller_uid, callback)` (spec §4.4): idempotent, only
    /// clears the callback if it matches the one on file. Returns whether a
    /// callback was actually cleared.
    pub async fn unregister(&self, uid: &UidName, callback: &Arc<dyn ClientCallback>) -> bool {
        let mut tokens = self.tokens.write().await;
        let Some(token) = tokens.get_mut(uid) else {
            return false;
        };
        match &token.callback {
            Some(existing) if Arc::ptr_eq(existing, callback) => {
                token.callback = None;
                true
            },
            _ => false,
        }
    }

    /// Clear a token's callback unconditionally (death-watch path: the
    /// client process is known gone).
    pub async fn clear_callback(&self, uid: &UidName) {
        let mut tokens = self.tokens.write().await;
        if let Some(token) = tokens.get_mut(uid) {
            token.callback = None;
        }
    }

    /// Validate that `client_id` matches the token registered for `uid`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownClient`] if `uid` has no token, or
    /// [`RegistryError::ClientIdMismatch`] if the ids differ.
    pub async fn validate_client_id(&self, uid: &UidName, client_id: &ClientId) -> RegistryResult<()> {
        let tokens = self.tokens.read().await;
        let token = tokens
            .get(uid)
            .ok_or_else(|| RegistryError::UnknownClient(uid.to_string()))?;
        if &token.client_id != client_id {
            return Err(RegistryError::ClientIdMismatch);
        }
        Ok(())
    }

    /// `confirm_ready_for_shutdown(caller_uid, client_id)` (spec §4.4): sets
    /// the flag and reports whether every token with a live callback is now
    /// ready.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownClient`] or
    /// [`RegistryError::ClientIdMismatch`].
    pub async fn confirm_ready_for_shutdown(&self, uid: &UidName, client_id: &ClientId) -> RegistryResult<bool> {
        let mut tokens = self.tokens.write().await;
        let token = tokens
            .get_mut(uid)
            .ok_or_else(|| RegistryError::UnknownClient(uid.to_string()))?;
        if &token.client_id != client_id {
            return Err(RegistryError::ClientIdMismatch);
        }
        token.is_ready_for_shutdown = true;
        let all_ready = tokens
            .values()
            .filter(|t| t.callback.is_some())
            .all(|t| t.is_ready_for_shutdown);
        Ok(all_ready)
    }

    /// Whether `client_id` currently has a live (attached) callback.
    pub async fn has_live_callback(&self, client_id: &ClientId) -> bool {
        let tokens = self.tokens.read().await;
        tokens
            .values()
            .any(|t| &t.client_id == client_id && t.callback.is_some())
    }

    /// The callback handle for `client_id`, if attached.
    pub async fn callback_for(&self, client_id: &ClientId) -> Option<Arc<dyn ClientCallback>> {
        let tokens = self.tokens.read().await;
        tokens
            .values()
            .find(|t| &t.client_id == client_id)
            .and_then(|t| t.callback.clone())
    }

    /// Whether any token (serverless or persisted) is known for `client_id`
    /// or `uid` (spec §4.8 step 2: "no serverless entry and no persisted
    /// token").
    pub async fn is_known_client_id(&self, client_id: &ClientId) -> bool {
        let tokens = self.tokens.read().await;
        tokens.values().any(|t| &t.client_id == client_id) || self.serverless.is_serverless(client_id).await
    }

    /// Resolve a `client_id` back to its `UidName`, if registered.
    pub async fn uid_for_client_id(&self, client_id: &ClientId) -> Option<UidName> {
        let tokens = self.tokens.read().await;
        tokens
            .iter()
            .find(|(_, t)| &t.client_id == client_id)
            .map(|(uid, _)| uid.clone())
    }

    /// Remove a token entirely (package uninstalled or no persisted row on
    /// restart). Returns the removed `client_id`, if any.
    pub async fn remove(&self, uid: &UidName) -> Option<ClientId> {
        let mut tokens = self.tokens.write().await;
        let token = tokens.remove(uid)?;
        if !token.is_serverless {
            if let Err(e) = self.identity_store.remove(uid).await {
                warn!(%uid, error = %e, "failed to purge identity row on token removal");
            }
        }
        Some(token.client_id)
    }

    /// Every currently registered token that has a live callback attached,
    /// used to fan out `on_shutdown_starting` (spec §4.7).
    pub async fn callbacks_with_live_connection(&self) -> Vec<Arc<dyn ClientCallback>> {
        let tokens = self.tokens.read().await;
        tokens.values().filter_map(|t| t.callback.clone()).collect()
    }

    /// A read-only snapshot of every token, for dump/debug output
    /// (SPEC_FULL §3).
    pub async fn snapshot(&self) -> Vec<ClientSnapshot> {
        let tokens = self.tokens.read().await;
        tokens
            .iter()
            .map(|(uid, token)| ClientSnapshot {
                uid_name: uid.clone(),
                client_id: token.client_id.clone(),
                is_serverless: token.is_serverless,
                has_callback: token.callback.is_some(),
                is_ready_for_shutdown: token.is_ready_for_shutdown,
            })
            .collect()
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtd_crypto::ProcessKey;
    use rtd_hal::testing::MockHal;
    use rtd_storage::MemoryKvStore;
    use tokio::sync::Mutex as TokioMutex;

    struct NoopCallback {
        received: TokioMutex<Vec<String>>,
    }

    impl NoopCallback {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                received: TokioMutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ClientCallback for NoopCallback {
        async fn on_client_registration_updated(&self, _info: RegistrationInfo) {
            self.received.lock().await.push("registration_updated".to_owned());
        }

        async fn on_serverless_client_registered(&self, _client_id: ClientId) {
            self.received.lock().await.push("serverless_registered".to_owned());
        }

        async fn on_remote_task_requested(
            &self,
            _client_id: ClientId,
            _task_id: TaskId,
            _data: Vec<u8>,
            _max_duration_s: u64,
        ) -> RegistryResult<()> {
            self.received.lock().await.push("task_requested".to_owned());
            Ok(())
        }

        async fn on_shutdown_starting(&self) {
            self.received.lock().await.push("shutdown_starting".to_owned());
        }
    }

    fn registry() -> ClientRegistry {
        let identity_store = Arc::new(IdentityStore::new(
            Arc::new(MemoryKvStore::new()),
            ProcessKey::generate(),
        ));
        let serverless = Arc::new(ServerlessRegistry::empty());
        let hal: Arc<dyn HalWrapper> = Arc::new(MockHal::new());
        ClientRegistry::new(identity_store, serverless, hal, "client")
    }

    #[tokio::test]
    async fn register_regular_client_generates_client_id() {
        let registry = registry();
        let uid = UidName::new("com.example.app");
        let info = registry.register(&uid).await;
        match info {
            RegistrationInfo::Regular { client_id, .. } => {
                assert!(client_id.as_str().starts_with("client-"));
            },
            RegistrationInfo::Serverless { .. } => panic!("expected regular registration"),
        }
    }

    #[tokio::test]
    async fn register_is_idempotent_for_the_same_uid() {
        let registry = registry();
        let uid = UidName::new("com.example.app");
        let first = registry.register(&uid).await;
        let second = registry.register(&uid).await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn attach_callback_then_unregister_round_trips() {
        let registry = registry();
        let uid = UidName::new("com.example.app");
        registry.register(&uid).await;
        let callback = NoopCallback::new();
        let client_id = registry.attach_callback(&uid, callback.clone()).await.unwrap();
        assert!(registry.has_live_callback(&client_id).await);

        assert!(registry.unregister(&uid, &(callback.clone() as Arc<dyn ClientCallback>)).await);
        assert!(!registry.has_live_callback(&client_id).await);
    }

    #[tokio::test]
    async fn unregister_with_wrong_callback_identity_is_a_noop() {
        let registry = registry();
        let uid = UidName::new("com.example.app");
        registry.register(&uid).await;
        let callback_a = NoopCallback::new();
        let callback_b = NoopCallback::new();
        registry.attach_callback(&uid, callback_a.clone()).await.unwrap();

        let cleared = registry
            .unregister(&uid, &(callback_b as Arc<dyn ClientCallback>))
            .await;
        assert!(!cleared);
    }

    #[tokio::test]
    async fn validate_client_id_rejects_mismatch() {
        let registry = registry();
        let uid = UidName::new("com.example.app");
        registry.register(&uid).await;
        let wrong = ClientId::from_existing("not-the-real-id");
        let err = registry.validate_client_id(&uid, &wrong).await.unwrap_err();
        assert!(matches!(err, RegistryError::ClientIdMismatch));
    }

    #[tokio::test]
    async fn confirm_ready_for_shutdown_requires_all_live_callbacks() {
        let registry = registry();
        let uid_a = UidName::new("com.example.a");
        let uid_b = UidName::new("com.example.b");
        let RegistrationInfo::Regular { client_id: cid_a, .. } = registry.register(&uid_a).await else {
            unreachable!()
        };
        let RegistrationInfo::Regular { client_id: cid_b, .. } = registry.register(&uid_b).await else {
            unreachable!()
        };
        registry.attach_callback(&uid_a, NoopCallback::new()).await.unwrap();
        registry.attach_callback(&uid_b, NoopCallback::new()).await.unwrap();

        assert!(!registry.confirm_ready_for_shutdown(&uid_a, &cid_a).await.unwrap());
        assert!(registry.confirm_ready_for_shutdown(&uid_b, &cid_b).await.unwrap());
    }

    #[tokio::test]
    async fn serverless_registration_purges_existing_regular_token() {
        let identity_store = Arc::new(IdentityStore::new(
            Arc::new(MemoryKvStore::new()),
            ProcessKey::generate(),
        ));
        let serverless = Arc::new(ServerlessRegistry::empty());
        serverless
            .add("com.example.app".to_owned(), ClientId::from_existing("cid-serverless"))
            .await
            .unwrap();
        let hal: Arc<dyn HalWrapper> = Arc::new(MockHal::new());
        let registry = ClientRegistry::new(identity_store.clone(), serverless, hal, "client");

        // Pre-existing regular registration for the same uid, before it
        // gains serverless access.
        let uid = UidName::new("com.example.other");
        registry.register(&uid).await;

        let uid_serverless = UidName::new("com.example.app");
        let info = registry.register(&uid_serverless).await;
        assert_eq!(
            info,
            RegistrationInfo::Serverless {
                client_id: ClientId::from_existing("cid-serverless")
            }
        );
        assert!(identity_store.lookup(&uid_serverless).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn remove_clears_token_and_persisted_row() {
        let registry = registry();
        let uid = UidName::new("com.example.app");
        registry.register(&uid).await;
        let removed = registry.remove(&uid).await;
        assert!(removed.is_some());
        assert!(registry.uid_for_client_id(&removed.unwrap()).await.is_none());
    }
}
