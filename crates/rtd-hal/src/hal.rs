//! The HAL wrapper trait (C2, spec §4.2): the single seam between this
//! crate and the real wakeup/remote-access hardware abstraction, which is
//! explicitly out of scope (spec §1) and never implemented here.

use std::sync::Arc;

use async_trait::async_trait;
use rtd_core::ClientId;

use crate::error::HalResult;
use crate::types::{ScheduleInfo, TaskType};

/// Receives the HAL's inbound `on_remote_task_requested` callback.
///
/// Registered once via [`HalWrapper::set_remote_task_handler`]; the
/// dispatcher is the only production implementor (spec §4.8).
#[async_trait]
pub trait RemoteTaskHandler: Send + Sync {
    /// Called by the HAL when a remote task arrives for `client_id`.
    async fn on_remote_task_requested(&self, client_id: ClientId, data: Vec<u8>);
}

/// Wraps the low-level wakeup/remote-access HAL (spec §4.2).
#[async_trait]
pub trait HalWrapper: Send + Sync {
    /// Initialize the HAL connection. Called once at process start.
    async fn init(&self) -> HalResult<()>;

    /// Release the HAL connection. Called once at graceful shutdown.
    async fn release(&self) -> HalResult<()>;

    /// Inform the HAL of the current power-relevant state.
    ///
    /// Returns whether the HAL acknowledged the request. Per spec §7, a
    /// failure here enters bounded retry at the caller (the power
    /// coordinator), never here.
    async fn notify_ap_state_change(&self, ready_for_task: bool, wakeup_required: bool) -> HalResult<bool>;

    /// The name of the wakeup service, reported to regular clients as part
    /// of `RegistrationInfo` (spec §4.4).
    fn get_wakeup_service_name(&self) -> String;

    /// The vehicle identifier, reported to regular clients.
    fn get_vehicle_id(&self) -> String;

    /// The processor identifier, reported to regular clients.
    fn get_processor_id(&self) -> String;

    /// Whether this HAL build supports task scheduling at all (spec §4.9).
    fn is_task_schedule_supported(&self) -> bool;

    /// Schedule a future task invocation for a serverless client.
    async fn schedule(&self, info: ScheduleInfo) -> HalResult<()>;

    /// Cancel a single scheduled entry.
    async fn unschedule(&self, client_id: &ClientId, schedule_id: &str) -> HalResult<()>;

    /// Cancel every scheduled entry for a client.
    async fn unschedule_all(&self, client_id: &ClientId) -> HalResult<()>;

    /// Whether a given schedule entry is still active.
    async fn is_scheduled(&self, client_id: &ClientId, schedule_id: &str) -> HalResult<bool>;

    /// List every scheduled entry for a client.
    async fn list_scheduled(&self, client_id: &ClientId) -> HalResult<Vec<ScheduleInfo>>;

    /// The task types this HAL build can schedule.
    fn supported_task_types(&self) -> Vec<TaskType>;

    /// Register the handler invoked on an inbound remote task request.
    fn set_remote_task_handler(&self, handler: Arc<dyn RemoteTaskHandler>);
}
