//! JSON-RPC API definition for the remote task dispatch core (spec §6).
//!
//! Uses jsonrpsee proc macros to define the RPC interface. The daemon
//! implements the server side; an in-vehicle client implements the client
//! side. Callback delivery (`on_client_registration_updated`,
//! `on_remote_task_requested`, `on_shutdown_starting`,
//! `on_serverless_client_registered`) has no natural request/response shape
//! over JSON-RPC, so it rides a single subscription per registered client:
//! opening `subscribeClientEvents` is this wire protocol's equivalent of
//! handing the dispatcher a live callback handle, and the subscription
//! closing is this wire protocol's equivalent of `unregister`.

use jsonrpsee::proc_macros::rpc;
use jsonrpsee::types::ErrorObjectOwned;
use jsonrpsee::PendingSubscriptionSink;
use rtd_hal::ScheduleInfo;
use serde::{Deserialize, Serialize};

/// Wire form of [`rtd_registry::RegistrationInfo`] (spec §6
/// `onClientRegistrationUpdated`): domain types stay serde-free, so this
/// crate owns the boundary conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RegistrationInfoWire {
    /// Delivered to serverless clients.
    Serverless {
        /// The client's (config-assigned) id.
        client_id: String,
    },
    /// Delivered to regular clients.
    Regular {
        /// The client's (generated or restored) id.
        client_id: String,
        /// The HAL's wakeup service name.
        wakeup_service_name: String,
        /// The HAL's reported vehicle id.
        vehicle_id: String,
        /// The HAL's reported processor id.
        processor_id: String,
    },
}

impl From<rtd_registry::RegistrationInfo> for RegistrationInfoWire {
    fn from(info: rtd_registry::RegistrationInfo) -> Self {
        match info {
            rtd_registry::RegistrationInfo::Serverless { client_id } => Self::Serverless {
                client_id: client_id.to_string(),
            },
            rtd_registry::RegistrationInfo::Regular {
                client_id,
                wakeup_service_name,
                vehicle_id,
                processor_id,
            } => Self::Regular {
                client_id: client_id.to_string(),
                wakeup_service_name,
                vehicle_id,
                processor_id,
            },
        }
    }
}

/// One message delivered over a client's `subscribeClientEvents` stream
/// (spec §6 outbound callback table).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ClientEvent {
    /// `on_client_registration_updated(info)`.
    RegistrationUpdated {
        /// The updated registration info.
        info: RegistrationInfoWire,
    },
    /// `on_serverless_client_registered(client_id)`.
    ServerlessClientRegistered {
        /// The newly serverless-registered client id.
        client_id: String,
    },
    /// `on_remote_task_requested(client_id, task_id, data, max_duration_s)`.
    RemoteTaskRequested {
        /// The target client id.
        client_id: String,
        /// The task's unique id, echoed back in `reportTaskDone`.
        task_id: String,
        /// Opaque task payload.
        data: Vec<u8>,
        /// Time budget for this task, in seconds.
        max_duration_s: u64,
    },
    /// `on_shutdown_starting()`.
    ShutdownStarting,
}

/// Status information about the running daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonStatus {
    /// How long the daemon has been running (seconds).
    pub uptime_secs: u64,
    /// Number of packages currently registered (serverless + regular).
    pub registered_clients: usize,
    /// Number of active (delivered, unacknowledged) tasks across all clients.
    pub active_task_count: usize,
}

/// Error codes for the remote task dispatch core's JSON-RPC surface.
pub mod error_codes {
    /// The caller lacks the privilege required for this operation.
    pub const PERMISSION_DENIED: i32 = -32001;
    /// A request argument failed validation.
    pub const INVALID_ARGUMENT: i32 = -32002;
    /// The caller is not a currently registered client.
    pub const NOT_REGISTERED: i32 = -32003;
    /// The HAL could not be reached.
    pub const HAL_UNAVAILABLE: i32 = -32004;
    /// The HAL rejected the request.
    pub const HAL_REJECTED: i32 = -32005;
    /// A persistence operation failed.
    pub const PERSISTENCE_FAILED: i32 = -32006;
    /// The operation missed its deadline.
    pub const BUDGET_EXPIRED: i32 = -32007;
}

/// Convert a [`rtd_dispatch::DispatchError`] to the wire error shape.
#[must_use]
pub fn dispatch_error_to_rpc(err: rtd_dispatch::DispatchError) -> ErrorObjectOwned {
    use rtd_dispatch::DispatchError;
    let (code, message) = match &err {
        DispatchError::PermissionDenied(m) => (error_codes::PERMISSION_DENIED, m.clone()),
        DispatchError::InvalidArgument(m) => (error_codes::INVALID_ARGUMENT, m.clone()),
        DispatchError::NotRegistered(m) => (error_codes::NOT_REGISTERED, m.clone()),
        DispatchError::HalUnavailable(m) => (error_codes::HAL_UNAVAILABLE, m.clone()),
        DispatchError::HalRejected(m) => (error_codes::HAL_REJECTED, m.clone()),
        DispatchError::PersistenceFailed(m) => (error_codes::PERSISTENCE_FAILED, m.clone()),
        DispatchError::BudgetExpired => (error_codes::BUDGET_EXPIRED, "budget expired".to_owned()),
    };
    ErrorObjectOwned::owned(code, message, None::<()>)
}

#[rpc(server, client, namespace = "rtd")]
pub trait RemoteTaskDispatch {
    /// `register(caller_uid)` (spec §6).
    #[method(name = "register")]
    async fn register(&self, uid: String) -> Result<RegistrationInfoWire, ErrorObjectOwned>;

    /// Opens this client's callback channel (spec §4.4 `attach_callback`)
    /// and streams every `ClientEvent` addressed to it until the
    /// subscription is dropped, at which point the client is unregistered.
    #[subscription(name = "subscribeClientEvents" => "clientEvent", unsubscribe = "unsubscribeClientEvents", item = ClientEvent)]
    async fn subscribe_client_events(&self, uid: String) -> jsonrpsee::core::SubscriptionResult;

    /// `report_task_done(caller_uid, client_id, task_id)` (spec §6).
    #[method(name = "reportTaskDone")]
    async fn report_task_done(&self, uid: String, client_id: String, task_id: String) -> Result<(), ErrorObjectOwned>;

    /// `confirm_ready_for_shutdown(caller_uid, client_id)` (spec §6).
    #[method(name = "confirmReadyForShutdown")]
    async fn confirm_ready_for_shutdown(&self, uid: String, client_id: String) -> Result<(), ErrorObjectOwned>;

    /// `set_post_task_power_state(next_state, run_garage_mode)` (spec §6,
    /// "control permission required"): `caller_uid` identifies the caller
    /// for the permission check.
    #[method(name = "setPostTaskPowerState")]
    async fn set_post_task_power_state(
        &self,
        caller_uid: String,
        next_state: String,
        run_garage_mode: bool,
    ) -> Result<(), ErrorObjectOwned>;

    /// `is_task_schedule_supported()` (spec §6).
    #[method(name = "isTaskScheduleSupported")]
    async fn is_task_schedule_supported(&self) -> Result<bool, ErrorObjectOwned>;

    /// `schedule_task(info)` (spec §6, §4.9).
    #[method(name = "scheduleTask")]
    async fn schedule_task(&self, client_id: String, info: ScheduleInfo) -> Result<(), ErrorObjectOwned>;

    /// `unschedule_task(schedule_id)` (spec §6, §4.9).
    #[method(name = "unscheduleTask")]
    async fn unschedule_task(&self, client_id: String, schedule_id: String) -> Result<(), ErrorObjectOwned>;

    /// `unschedule_all()` (spec §6, §4.9).
    #[method(name = "unscheduleAll")]
    async fn unschedule_all(&self, client_id: String) -> Result<(), ErrorObjectOwned>;

    /// `is_task_scheduled(schedule_id)` (spec §6, §4.9).
    #[method(name = "isTaskScheduled")]
    async fn is_task_scheduled(&self, client_id: String, schedule_id: String) -> Result<bool, ErrorObjectOwned>;

    /// `get_all_pending_scheduled_tasks()` (spec §6, §4.9).
    #[method(name = "getAllPendingScheduledTasks")]
    async fn get_all_pending_scheduled_tasks(&self, client_id: String) -> Result<Vec<ScheduleInfo>, ErrorObjectOwned>;

    /// `add_serverless_remote_task_client(package, client_id)` (spec §6,
    /// privileged): `caller_uid` identifies the caller for the permission
    /// check.
    #[method(name = "addServerlessRemoteTaskClient")]
    async fn add_serverless_remote_task_client(
        &self,
        caller_uid: String,
        package: String,
        client_id: String,
    ) -> Result<(), ErrorObjectOwned>;

    /// `remove_serverless_remote_task_client(package)` (spec §6,
    /// privileged): `caller_uid` identifies the caller for the permission
    /// check.
    #[method(name = "removeServerlessRemoteTaskClient")]
    async fn remove_serverless_remote_task_client(&self, caller_uid: String, package: String) -> Result<(), ErrorObjectOwned>;

    /// `is_vehicle_in_use_supported()` (spec §6).
    #[method(name = "isVehicleInUseSupported")]
    async fn is_vehicle_in_use_supported(&self) -> Result<bool, ErrorObjectOwned>;

    /// `is_shutdown_request_supported()` (spec §6).
    #[method(name = "isShutdownRequestSupported")]
    async fn is_shutdown_request_supported(&self) -> Result<bool, ErrorObjectOwned>;

    /// Daemon health/status, not named in spec §6 but standard operational
    /// surface for this kind of long-running service.
    #[method(name = "status")]
    async fn status(&self) -> Result<DaemonStatus, ErrorObjectOwned>;
}
