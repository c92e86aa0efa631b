//! The serverless registry (C3, spec §4.3): a static `package -> client_id`
//! table, mutable at runtime only through the privileged
//! `add_serverless_remote_task_client`/`remove_serverless_remote_task_client`
//! RPCs (spec §6).

use std::collections::{HashMap, HashSet};

use rtd_config::ServerlessConfig;
use rtd_core::ClientId;
use tokio::sync::RwLock;
use tracing::warn;

use crate::error::{RegistryError, RegistryResult};

struct State {
    by_package: HashMap<String, ClientId>,
    client_ids: HashSet<ClientId>,
}

/// Maps packages granted serverless access to their `client_id` (spec §4.3).
///
/// A config parse failure disables serverless behavior for the session
/// (spec §4.3: "a parse failure disables all serverless behavior for the
/// session") — callers construct an [`empty`](Self::empty) registry in that
/// case rather than fail startup.
pub struct ServerlessRegistry {
    state: RwLock<State>,
}

impl ServerlessRegistry {
    /// Build the registry from an already-parsed, duplicate-free config.
    #[must_use]
    pub fn from_config(config: &ServerlessConfig) -> Self {
        let mut by_package = HashMap::with_capacity(config.entries.len());
        let mut client_ids = HashSet::with_capacity(config.entries.len());
        for entry in &config.entries {
            let client_id = ClientId::from_existing(entry.client_id.clone());
            client_ids.insert(client_id.clone());
            by_package.insert(entry.package.clone(), client_id);
        }
        Self {
            state: RwLock::new(State {
                by_package,
                client_ids,
            }),
        }
    }

    /// An empty registry: no package has serverless access. Used when the
    /// static config failed to parse.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            state: RwLock::new(State {
                by_package: HashMap::new(),
                client_ids: HashSet::new(),
            }),
        }
    }

    /// The `client_id` a serverless package was assigned, if any.
    pub async fn client_id_for_package(&self, package: &str) -> Option<ClientId> {
        self.state.read().await.by_package.get(package).cloned()
    }

    /// Whether `client_id` belongs to a serverless registration.
    pub async fn is_serverless(&self, client_id: &ClientId) -> bool {
        self.state.read().await.client_ids.contains(client_id)
    }

    /// Grant a package serverless access (spec §6
    /// `add_serverless_remote_task_client`).
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicatePackage`] if the package already has
    /// an entry, or [`RegistryError::DuplicateClientId`] if the client id is
    /// already assigned to a different package.
    pub async fn add(&self, package: String, client_id: ClientId) -> RegistryResult<()> {
        let mut state = self.state.write().await;
        if state.by_package.contains_key(&package) {
            return Err(RegistryError::DuplicatePackage(package));
        }
        if state.client_ids.contains(&client_id) {
            return Err(RegistryError::DuplicateClientId(client_id.to_string()));
        }
        state.client_ids.insert(client_id.clone());
        state.by_package.insert(package, client_id);
        Ok(())
    }

    /// Revoke a package's serverless access (spec §6
    /// `remove_serverless_remote_task_client`). Returns the `client_id` that
    /// was removed, if the package had one.
    pub async fn remove(&self, package: &str) -> Option<ClientId> {
        let mut state = self.state.write().await;
        let client_id = state.by_package.remove(package)?;
        state.client_ids.remove(&client_id);
        Some(client_id)
    }
}

/// Load a [`ServerlessRegistry`] from YAML source, falling back to an empty
/// (serverless-disabled) registry on any parse error (spec §4.3).
#[must_use]
pub fn load_or_disable(yaml_source: &str) -> ServerlessRegistry {
    match ServerlessConfig::parse_yaml(yaml_source) {
        Ok(config) => ServerlessRegistry::from_config(&config),
        Err(e) => {
            warn!(error = %e, "serverless config failed to parse; disabling serverless behavior for this session");
            ServerlessRegistry::empty()
        },
    }
}
