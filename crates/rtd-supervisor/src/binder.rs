//! The service-binder boundary: the (out-of-scope) package/user-manager
//! collaborator that actually starts and stops a client package's service
//! component (spec §4.6 diagram). Mirrors the HAL wrapper's trait-plus-mock
//! shape: this crate ships only the trait and an in-memory test double.

use async_trait::async_trait;

use rtd_core::UidName;

/// Binds and unbinds a discovered client package's service component.
///
/// `bind` returning is the diagram's `onNullBinding`/`onConnected` moment —
/// both outcomes move the connection to `Bound` (a one-way service bind
/// that never calls back is as good as a live connection for this core's
/// purposes); the distinction matters to the real platform binder, not to
/// dispatch.
#[async_trait]
pub trait ServiceBinder: Send + Sync {
    /// Start (or reuse) the package's service component.
    async fn bind(&self, uid: &UidName);

    /// Tear down the package's service component.
    async fn unbind(&self, uid: &UidName);
}
