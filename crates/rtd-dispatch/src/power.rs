//! The power/lifecycle coordinator (C7, spec §4.7).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use rtd_core::retry::{RetryOutcome, retry};
use rtd_events::{DispatchEvent, EventBus};
use rtd_hal::HalWrapper;
use rtd_registry::ClientRegistry;
use rtd_supervisor::Supervisor;

/// Power states the platform's power collaborator reports (spec §4.7
/// table). `Other` covers any transition the table leaves unmapped
/// (`ready`/`wakeup`/`complete` all "—": no HAL call, no shutdown logic).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PowerState {
    /// The device is about to power off.
    ShutdownPrepare,
    /// Returning from a suspended/hibernated/VHAL-pending state.
    WaitForVhalOrResume,
    /// The device has finished powering down to a low state.
    PostShutdownOrSuspendEnter,
    /// Fully powered and running.
    On,
    /// Any power state not named above.
    Other(String),
}

impl PowerState {
    /// `(ready_for_task, wakeup_required, needs_complete)`, or `None` for
    /// states the table leaves unmapped (spec §4.7).
    #[must_use]
    fn mapping(&self) -> Option<(bool, bool, bool)> {
        match self {
            Self::ShutdownPrepare => Some((false, false, true)),
            Self::WaitForVhalOrResume => Some((true, false, false)),
            Self::PostShutdownOrSuspendEnter => Some((false, true, true)),
            Self::On | Self::Other(_) => None,
        }
    }

    /// Map a platform state name (spec §4.7 table) onto a `PowerState`.
    /// Any name this core's RPC surface doesn't recognize by its canonical
    /// spelling becomes `Other`, which carries no HAL/shutdown semantics.
    #[must_use]
    pub fn from_wire_name(name: &str) -> Self {
        match name {
            "SHUTDOWN_PREPARE" => Self::ShutdownPrepare,
            "WAIT_FOR_VHAL" | "SUSPEND_EXIT" | "HIBERNATION_EXIT" => Self::WaitForVhalOrResume,
            "POST_SHUTDOWN_ENTER" | "POST_SUSPEND_ENTER" | "POST_HIBERNATION_ENTER" => Self::PostShutdownOrSuspendEnter,
            "ON" => Self::On,
            other => Self::Other(other.to_owned()),
        }
    }
}

/// The out-of-scope power-management collaborator (spec §1, §6):
/// `request_shutdown` and the acknowledgment of a relayed state change.
#[async_trait]
pub trait PowerController: Send + Sync {
    /// Request that the platform actually power down.
    async fn request_shutdown(&self, next_power_state: PowerState, run_garage_mode: bool);

    /// Acknowledge a state change that required completion (spec §4.7:
    /// "acknowledges the power controller after the state change has been
    /// relayed").
    async fn acknowledge_state_change(&self);

    /// Whether this collaborator supports reporting vehicle-in-use state
    /// (spec §6 `is_vehicle_in_use_supported`).
    fn is_vehicle_in_use_supported(&self) -> bool;

    /// Whether this collaborator supports `request_shutdown` (spec §6
    /// `is_shutdown_request_supported`).
    fn is_shutdown_request_supported(&self) -> bool;
}

struct CoordinatorState {
    next_power_state: PowerState,
    vehicle_in_use: bool,
    run_garage_mode: bool,
}

/// Retry and budget tunables the coordinator needs (spec §6).
#[derive(Debug, Clone, Copy)]
pub struct PowerTunables {
    /// `NOTIFY_AP_STATE_MAX_RETRY`.
    pub notify_ap_state_max_retry: u32,
    /// `NOTIFY_AP_STATE_RETRY_SLEEP_MS`.
    pub notify_ap_state_retry_sleep: Duration,
    /// `ALLOWED_SYSTEM_UPTIME_MS`.
    pub allowed_system_uptime: Duration,
    /// `SHUTDOWN_WARNING_MARGIN_MS`.
    pub shutdown_warning_margin: Duration,
}

/// Listens to power transitions, relays AP state to the HAL, and drives the
/// wake-window budget and shutdown decision (spec §4.7).
pub struct PowerCoordinator {
    hal: Arc<dyn HalWrapper>,
    power: Arc<dyn PowerController>,
    supervisor: Arc<Supervisor>,
    client_registry: Arc<ClientRegistry>,
    tunables: PowerTunables,
    state: Mutex<CoordinatorState>,
    budget_deadline: Instant,
    events: EventBus<DispatchEvent>,
    timers: std::sync::Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl PowerCoordinator {
    /// Construct a coordinator with the wake-window budget starting now,
    /// publishing lifecycle events onto `events` (SPEC_FULL §3).
    #[must_use]
    pub fn new(
        hal: Arc<dyn HalWrapper>,
        power: Arc<dyn PowerController>,
        supervisor: Arc<Supervisor>,
        client_registry: Arc<ClientRegistry>,
        tunables: PowerTunables,
        events: EventBus<DispatchEvent>,
    ) -> Self {
        Self {
            hal,
            power,
            supervisor,
            client_registry,
            tunables,
            state: Mutex::new(CoordinatorState {
                next_power_state: PowerState::On,
                vehicle_in_use: false,
                run_garage_mode: false,
            }),
            budget_deadline: Instant::now() + tunables.allowed_system_uptime,
            events,
            timers: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Arm the wake-window budget timers: a warning at
    /// `budget - SHUTDOWN_WARNING_MARGIN` and a forced wrap-up at `budget`
    /// (spec §4.7). Call once, after construction, on an `Arc`-wrapped
    /// coordinator.
    pub fn start(self: &Arc<Self>) {
        let warning_at = self
            .budget_deadline
            .checked_sub(self.tunables.shutdown_warning_margin)
            .unwrap_or_else(Instant::now);
        let warning_delay = warning_at.saturating_duration_since(Instant::now());
        let budget_delay = self.budget_deadline.saturating_duration_since(Instant::now());

        let warn_self = Arc::clone(self);
        let warning_handle = tokio::spawn(async move {
            tokio::time::sleep(warning_delay).await;
            warn_self.notify_shutdown_starting().await;
        });

        let budget_self = Arc::clone(self);
        let budget_handle = tokio::spawn(async move {
            tokio::time::sleep(budget_delay).await;
            budget_self.maybe_shutdown(true).await;
        });

        let mut timers = self.timers.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        timers.push(warning_handle);
        timers.push(budget_handle);
    }

    /// Cancel the wake-window budget timers armed by [`Self::start`] (spec
    /// "Cancellation": release stops the coordinator from driving any
    /// further shutdown on its own).
    pub fn cancel_timers(&self) {
        let mut timers = self.timers.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        for handle in timers.drain(..) {
            handle.abort();
        }
    }

    async fn notify_shutdown_starting(&self) {
        let callbacks = self.client_registry.callbacks_with_live_connection().await;
        debug!(count = callbacks.len(), "wake-window budget warning margin reached");
        self.events.publish(DispatchEvent::ShutdownStarting);
        for callback in callbacks {
            callback.on_shutdown_starting().await;
        }
    }

    /// Process a power state transition (spec §4.7). Callers must invoke
    /// this strictly in the order states are received.
    pub async fn on_power_state_changed(&self, state: PowerState) {
        {
            let mut st = self.state.lock().await;
            st.next_power_state = state.clone();
        }

        if state == PowerState::ShutdownPrepare {
            self.supervisor.force_unbind_all().await;
        }

        if let Some((ready, wakeup, needs_complete)) = state.mapping() {
            self.notify_hal_with_retry(ready, wakeup).await;
            if needs_complete {
                self.power.acknowledge_state_change().await;
            }
        }
    }

    async fn notify_hal_with_retry(&self, ready: bool, wakeup: bool) {
        let hal = Arc::clone(&self.hal);
        let outcome = retry(
            self.tunables.notify_ap_state_max_retry,
            self.tunables.notify_ap_state_retry_sleep,
            move || {
                let hal = Arc::clone(&hal);
                async move { hal.notify_ap_state_change(ready, wakeup).await }
            },
        )
        .await;

        if let Err(RetryOutcome::Exhausted { attempts }) = outcome {
            error!(attempts, ready, wakeup, "notify_ap_state_change exhausted its retry budget");
        }
    }

    /// Record a vehicle in-use state change from the power collaborator.
    pub async fn set_vehicle_in_use(&self, in_use: bool) {
        self.state.lock().await.vehicle_in_use = in_use;
    }

    /// `set_post_task_power_state` (spec §6): what to request once all work
    /// is done.
    pub async fn set_post_task_power_state(&self, next_state: PowerState, run_garage_mode: bool) {
        let mut st = self.state.lock().await;
        st.next_power_state = next_state;
        st.run_garage_mode = run_garage_mode;
    }

    /// The duration remaining for a newly requested task before the
    /// coordinator would prefer to shut down (spec §4.8 step 1): the full
    /// uptime budget if the vehicle is in use or the next power state is
    /// `On`, otherwise the remaining wake-window.
    pub async fn task_max_duration(&self) -> Duration {
        let st = self.state.lock().await;
        if st.vehicle_in_use || st.next_power_state == PowerState::On {
            self.tunables.allowed_system_uptime
        } else {
            self.budget_deadline.saturating_duration_since(Instant::now())
        }
    }

    /// `maybe_shutdown(force)` (spec §4.7): refuse if the next power state
    /// is `On`, the vehicle is in use, or (unless forced) any task is
    /// active anywhere; otherwise force-unbind every supervisor and request
    /// shutdown.
    pub async fn maybe_shutdown(&self, force: bool) {
        let (next_state, vehicle_in_use, run_garage_mode) = {
            let st = self.state.lock().await;
            (st.next_power_state.clone(), st.vehicle_in_use, st.run_garage_mode)
        };

        if next_state == PowerState::On {
            return;
        }
        if vehicle_in_use {
            return;
        }
        if !force && self.supervisor.global_active_task_count().await > 0 {
            return;
        }

        self.supervisor.force_unbind_all().await;
        self.events.publish(DispatchEvent::ShutdownRequested { run_garage_mode });
        self.power.request_shutdown(next_state, run_garage_mode).await;
    }

    /// Whether the power collaborator reports vehicle-in-use support (spec
    /// §6).
    #[must_use]
    pub fn is_vehicle_in_use_supported(&self) -> bool {
        self.power.is_vehicle_in_use_supported()
    }

    /// Whether the power collaborator supports `request_shutdown` (spec
    /// §6).
    #[must_use]
    pub fn is_shutdown_request_supported(&self) -> bool {
        self.power.is_shutdown_request_supported()
    }
}
