//! In-memory [`ServiceBinder`] and [`PackageManager`] test doubles.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Mutex as AsyncMutex;

use rtd_core::UidName;

use crate::binder::ServiceBinder;
use crate::package::{PackageManager, PackageRemovalHandler};

/// Records `bind`/`unbind` calls per `UidName`; never actually starts
/// anything.
pub struct MockServiceBinder {
    bind_calls: Mutex<HashMap<UidName, u32>>,
    unbind_calls: Mutex<HashMap<UidName, u32>>,
}

impl MockServiceBinder {
    /// A binder that has recorded no calls.
    #[must_use]
    pub fn new() -> Self {
        Self {
            bind_calls: Mutex::new(HashMap::new()),
            unbind_calls: Mutex::new(HashMap::new()),
        }
    }

    /// Number of times `bind` was called for `uid`.
    #[must_use]
    pub fn bind_calls(&self, uid: &UidName) -> u32 {
        self.bind_calls.lock().unwrap().get(uid).copied().unwrap_or(0)
    }

    /// Number of times `unbind` was called for `uid`.
    #[must_use]
    pub fn unbind_calls(&self, uid: &UidName) -> u32 {
        self.unbind_calls.lock().unwrap().get(uid).copied().unwrap_or(0)
    }
}

impl Default for MockServiceBinder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ServiceBinder for MockServiceBinder {
    async fn bind(&self, uid: &UidName) {
        *self.bind_calls.lock().unwrap().entry(uid.clone()).or_insert(0) += 1;
    }

    async fn unbind(&self, uid: &UidName) {
        *self.unbind_calls.lock().unwrap().entry(uid.clone()).or_insert(0) += 1;
    }
}

/// Serves a fixed installed-package list and lets tests simulate a
/// package-removed broadcast; never actually queries or watches anything.
pub struct MockPackageManager {
    installed: Vec<UidName>,
    handler: AsyncMutex<Option<Arc<dyn PackageRemovalHandler>>>,
}

impl MockPackageManager {
    /// A package manager reporting exactly `installed` as candidates.
    #[must_use]
    pub fn new(installed: Vec<UidName>) -> Self {
        Self {
            installed,
            handler: AsyncMutex::new(None),
        }
    }

    /// Deliver a package-removed broadcast to whatever handler is
    /// registered, as the real package manager would.
    pub async fn simulate_removed(&self, uid: UidName) {
        let handler = self.handler.lock().await.clone();
        if let Some(handler) = handler {
            handler.on_package_removed(uid).await;
        }
    }
}

#[async_trait]
impl PackageManager for MockPackageManager {
    async fn installed_packages(&self) -> Vec<UidName> {
        self.installed.clone()
    }

    fn set_removal_handler(&self, handler: Arc<dyn PackageRemovalHandler>) {
        // Registration is synchronous by contract; `try_lock` never
        // contends in practice since this runs once at startup.
        if let Ok(mut slot) = self.handler.try_lock() {
            *slot = Some(handler);
        }
    }
}
