//! In-memory [`PowerController`] test double.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::power::{PowerController, PowerState};

/// Records `request_shutdown`/`acknowledge_state_change` calls.
pub struct MockPowerController {
    request_shutdown_calls: AtomicUsize,
    acknowledge_calls: AtomicUsize,
    last_request: Mutex<Option<(PowerState, bool)>>,
    vehicle_in_use_supported: bool,
    shutdown_request_supported: bool,
}

impl MockPowerController {
    /// A controller that reports both capabilities as supported.
    #[must_use]
    pub fn new() -> Self {
        Self {
            request_shutdown_calls: AtomicUsize::new(0),
            acknowledge_calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
            vehicle_in_use_supported: true,
            shutdown_request_supported: true,
        }
    }

    /// Number of times `request_shutdown` was called.
    #[must_use]
    pub fn request_shutdown_calls(&self) -> usize {
        self.request_shutdown_calls.load(Ordering::SeqCst)
    }

    /// Number of times `acknowledge_state_change` was called.
    #[must_use]
    pub fn acknowledge_calls(&self) -> usize {
        self.acknowledge_calls.load(Ordering::SeqCst)
    }

    /// The arguments of the last `request_shutdown` call, if any.
    #[must_use]
    pub fn last_request(&self) -> Option<(PowerState, bool)> {
        self.last_request.lock().unwrap().clone()
    }
}

impl Default for MockPowerController {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PowerController for MockPowerController {
    async fn request_shutdown(&self, next_power_state: PowerState, run_garage_mode: bool) {
        self.request_shutdown_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some((next_power_state, run_garage_mode));
    }

    async fn acknowledge_state_change(&self) {
        self.acknowledge_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn is_vehicle_in_use_supported(&self) -> bool {
        self.vehicle_in_use_supported
    }

    fn is_shutdown_request_supported(&self) -> bool {
        self.shutdown_request_supported
    }
}
