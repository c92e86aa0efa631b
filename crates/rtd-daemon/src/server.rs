//! The daemon's JSON-RPC server: binds [`RemoteTaskDispatchServer`] to the
//! wired-together dispatch core and serves it over a local WebSocket.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::types::ErrorObjectOwned;
use jsonrpsee::PendingSubscriptionSink;
use rtd_core::{ClientId, TaskId, UidName};
use rtd_dispatch::{DispatchError, Dispatcher, PowerCoordinator, PowerState, SchedulingProxy};
use rtd_registry::{ClientCallback, ClientRegistry, PermissionChecker, ServerlessRegistry};
use rtd_supervisor::Supervisor;
use tracing::{info, warn};

use crate::callback::SubscriptionCallback;
use crate::rpc::{dispatch_error_to_rpc, DaemonStatus, RegistrationInfoWire, RemoteTaskDispatchServer};

/// Shared state behind every RPC call.
pub struct RpcImpl {
    dispatcher: Arc<Dispatcher>,
    scheduling: Arc<SchedulingProxy>,
    registry: Arc<ClientRegistry>,
    serverless: Arc<ServerlessRegistry>,
    power: Arc<PowerCoordinator>,
    supervisor: Arc<Supervisor>,
    permissions: Arc<dyn PermissionChecker>,
    started_at: Instant,
}

impl RpcImpl {
    /// Construct the RPC handler over its dispatch-core collaborators.
    #[must_use]
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        scheduling: Arc<SchedulingProxy>,
        registry: Arc<ClientRegistry>,
        serverless: Arc<ServerlessRegistry>,
        power: Arc<PowerCoordinator>,
        supervisor: Arc<Supervisor>,
        permissions: Arc<dyn PermissionChecker>,
    ) -> Self {
        Self {
            dispatcher,
            scheduling,
            registry,
            serverless,
            power,
            supervisor,
            permissions,
            started_at: Instant::now(),
        }
    }

    fn client_id(raw: String) -> ClientId {
        ClientId::from_existing(raw)
    }

    /// Require `caller_uid` to hold the control/privileged permission
    /// (spec §6: "control permission required" / "privileged").
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::PermissionDenied`] if the caller does not.
    async fn require_privileged(&self, caller_uid: &str) -> Result<(), ErrorObjectOwned> {
        let caller = UidName::new(caller_uid);
        if self.permissions.is_privileged(&caller).await {
            Ok(())
        } else {
            Err(dispatch_error_to_rpc(DispatchError::PermissionDenied(format!(
                "{caller} lacks the control/privileged permission"
            ))))
        }
    }
}

#[async_trait]
impl RemoteTaskDispatchServer for RpcImpl {
    async fn register(&self, uid: String) -> Result<RegistrationInfoWire, ErrorObjectOwned> {
        let info = self.dispatcher.register(&UidName::new(uid)).await;
        Ok(info.into())
    }

    async fn subscribe_client_events(
        &self,
        pending: PendingSubscriptionSink,
        uid: String,
    ) -> jsonrpsee::core::SubscriptionResult {
        let uid = UidName::new(uid);
        let sink = pending.accept().await?;
        let closed = sink.clone();
        let callback: Arc<dyn ClientCallback> = Arc::new(SubscriptionCallback::new(sink));

        if let Err(e) = self.dispatcher.attach_callback(&uid, Arc::clone(&callback)).await {
            warn!(%uid, error = %e, "failed to attach callback for subscribing client");
            return Ok(());
        }

        let dispatcher = Arc::clone(&self.dispatcher);
        tokio::spawn(async move {
            closed.closed().await;
            dispatcher.unregister(&uid, &callback).await;
        });

        Ok(())
    }

    async fn report_task_done(&self, uid: String, client_id: String, task_id: String) -> Result<(), ErrorObjectOwned> {
        self.dispatcher
            .report_task_done(&UidName::new(uid), &Self::client_id(client_id), &TaskId::from_existing(task_id))
            .await
            .map_err(dispatch_error_to_rpc)
    }

    async fn confirm_ready_for_shutdown(&self, uid: String, client_id: String) -> Result<(), ErrorObjectOwned> {
        self.dispatcher
            .confirm_ready_for_shutdown(&UidName::new(uid), &Self::client_id(client_id))
            .await
            .map_err(dispatch_error_to_rpc)
    }

    async fn set_post_task_power_state(
        &self,
        caller_uid: String,
        next_state: String,
        run_garage_mode: bool,
    ) -> Result<(), ErrorObjectOwned> {
        self.require_privileged(&caller_uid).await?;
        self.power
            .set_post_task_power_state(PowerState::from_wire_name(&next_state), run_garage_mode)
            .await;
        Ok(())
    }

    async fn is_task_schedule_supported(&self) -> Result<bool, ErrorObjectOwned> {
        Ok(self.scheduling.is_task_schedule_supported())
    }

    async fn schedule_task(&self, client_id: String, info: rtd_hal::ScheduleInfo) -> Result<(), ErrorObjectOwned> {
        self.scheduling
            .schedule_task(&Self::client_id(client_id), info)
            .await
            .map_err(dispatch_error_to_rpc)
    }

    async fn unschedule_task(&self, client_id: String, schedule_id: String) -> Result<(), ErrorObjectOwned> {
        self.scheduling
            .unschedule_task(&Self::client_id(client_id), &schedule_id)
            .await
            .map_err(dispatch_error_to_rpc)
    }

    async fn unschedule_all(&self, client_id: String) -> Result<(), ErrorObjectOwned> {
        self.scheduling
            .unschedule_all(&Self::client_id(client_id))
            .await
            .map_err(dispatch_error_to_rpc)
    }

    async fn is_task_scheduled(&self, client_id: String, schedule_id: String) -> Result<bool, ErrorObjectOwned> {
        self.scheduling
            .is_task_scheduled(&Self::client_id(client_id), &schedule_id)
            .await
            .map_err(dispatch_error_to_rpc)
    }

    async fn get_all_pending_scheduled_tasks(&self, client_id: String) -> Result<Vec<rtd_hal::ScheduleInfo>, ErrorObjectOwned> {
        self.scheduling
            .get_all_pending_scheduled_tasks(&Self::client_id(client_id))
            .await
            .map_err(dispatch_error_to_rpc)
    }

    async fn add_serverless_remote_task_client(
        &self,
        caller_uid: String,
        package: String,
        client_id: String,
    ) -> Result<(), ErrorObjectOwned> {
        self.require_privileged(&caller_uid).await?;
        self.serverless
            .add(package, Self::client_id(client_id))
            .await
            .map_err(|e| dispatch_error_to_rpc(DispatchError::from(e)))
    }

    async fn remove_serverless_remote_task_client(&self, caller_uid: String, package: String) -> Result<(), ErrorObjectOwned> {
        self.require_privileged(&caller_uid).await?;
        self.serverless.remove(&package).await;
        Ok(())
    }

    async fn is_vehicle_in_use_supported(&self) -> Result<bool, ErrorObjectOwned> {
        Ok(self.power.is_vehicle_in_use_supported())
    }

    async fn is_shutdown_request_supported(&self) -> Result<bool, ErrorObjectOwned> {
        Ok(self.power.is_shutdown_request_supported())
    }

    async fn status(&self) -> Result<DaemonStatus, ErrorObjectOwned> {
        let snapshot = self.registry.snapshot().await;
        Ok(DaemonStatus {
            uptime_secs: self.started_at.elapsed().as_secs(),
            registered_clients: snapshot.len(),
            active_task_count: self.supervisor.global_active_task_count().await,
        })
    }
}

/// Bind and start the JSON-RPC server on `addr`.
///
/// # Errors
///
/// Returns an error if the server cannot bind to `addr`.
pub async fn start(addr: SocketAddr, rpc_impl: RpcImpl) -> anyhow::Result<ServerHandle> {
    let server = Server::builder().build(addr).await?;
    let local_addr = server.local_addr()?;
    let handle = server.start(rpc_impl.into_rpc());
    info!(addr = %local_addr, "remote task dispatch core listening");
    Ok(handle)
}
