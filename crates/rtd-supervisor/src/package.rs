//! The package-manager boundary: the (out-of-scope) platform collaborator
//! that enumerates installed packages and broadcasts package-removal events
//! (spec §1 Non-goals names this collaborator directly: "no real ...
//! package-manager ... implementations — these remain trait-bound external
//! collaborators with in-memory test doubles"). The discovery side mirrors
//! [`ServiceBinder`](crate::ServiceBinder)'s plain-query shape; the removal
//! side mirrors the HAL wrapper's push-registration shape.

use std::sync::Arc;

use async_trait::async_trait;

use rtd_core::UidName;

/// Receives the package manager's `on_package_removed` broadcast (spec
/// §4.9: "On package-removed (observed via OS broadcast), invoke
/// `unschedule_all(client_id)` for that package").
#[async_trait]
pub trait PackageRemovalHandler: Send + Sync {
    /// `uid`'s package was just uninstalled.
    async fn on_package_removed(&self, uid: UidName);
}

/// Enumerates installed packages (spec §4.8 step 3's post-boot discovery
/// sweep candidates) and delivers package-removal events to a registered
/// handler.
#[async_trait]
pub trait PackageManager: Send + Sync {
    /// Every package currently installed that this core should consider a
    /// discovery candidate.
    async fn installed_packages(&self) -> Vec<UidName>;

    /// Register the handler invoked on an inbound package-removed
    /// broadcast. Called once at daemon startup.
    fn set_removal_handler(&self, handler: Arc<dyn PackageRemovalHandler>);
}
