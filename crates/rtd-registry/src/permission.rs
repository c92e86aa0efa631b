//! The privileged-caller permission gate (spec §6: "control permission
//! required" for `set_post_task_power_state`, "privileged" for
//! `add_serverless_remote_task_client`/`remove_serverless_remote_task_client`).
//! A static `UidName` allowlist, loaded the same way as the serverless
//! config (spec §4.3's config shape) — there is no RPC to grant or revoke
//! the permission at runtime.

use std::collections::HashSet;

use async_trait::async_trait;
use rtd_config::PrivilegedConfig;
use rtd_core::UidName;
use tracing::warn;

/// Decides whether a caller holds the control/privileged permission.
#[async_trait]
pub trait PermissionChecker: Send + Sync {
    /// Whether `caller` holds the privileged/control permission.
    async fn is_privileged(&self, caller: &UidName) -> bool;
}

/// A static, config-loaded set of privileged callers.
pub struct PermissionRegistry {
    privileged: HashSet<UidName>,
}

impl PermissionRegistry {
    /// Build the registry from an already-parsed config document.
    #[must_use]
    pub fn from_config(config: &PrivilegedConfig) -> Self {
        Self {
            privileged: config.callers.iter().map(|c| UidName::new(c.clone())).collect(),
        }
    }

    /// A registry granting nobody the privileged permission.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            privileged: HashSet::new(),
        }
    }
}

#[async_trait]
impl PermissionChecker for PermissionRegistry {
    async fn is_privileged(&self, caller: &UidName) -> bool {
        self.privileged.contains(caller)
    }
}

/// Load a [`PermissionRegistry`] from YAML source, falling back to an empty
/// (nobody-privileged) registry on any parse error.
#[must_use]
pub fn load_or_disable(yaml_source: &str) -> PermissionRegistry {
    match PrivilegedConfig::parse_yaml(yaml_source) {
        Ok(config) => PermissionRegistry::from_config(&config),
        Err(e) => {
            warn!(error = %e, "privileged-caller config failed to parse; nobody will hold the privileged permission");
            PermissionRegistry::empty()
        },
    }
}
