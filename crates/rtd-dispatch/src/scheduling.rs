//! The scheduling proxy (C9, spec §4.9): validates and forwards
//! schedule/unschedule/list calls from serverless clients to the HAL.

use std::sync::Arc;

use rtd_core::ClientId;
use rtd_hal::types::{ScheduleInfo, TaskType};
use rtd_hal::HalWrapper;
use rtd_registry::ServerlessRegistry;

use crate::error::{DispatchError, DispatchResult};

/// Forwards schedule/unschedule/list calls from serverless clients to the
/// HAL, after rejecting non-serverless callers and malformed requests (spec
/// §4.9).
pub struct SchedulingProxy {
    hal: Arc<dyn HalWrapper>,
    serverless: Arc<ServerlessRegistry>,
}

impl SchedulingProxy {
    /// Construct a proxy over the HAL and the serverless identity table.
    #[must_use]
    pub fn new(hal: Arc<dyn HalWrapper>, serverless: Arc<ServerlessRegistry>) -> Self {
        Self { hal, serverless }
    }

    /// `is_task_schedule_supported()` (spec §6): a plain HAL passthrough,
    /// not identity-gated.
    #[must_use]
    pub fn is_task_schedule_supported(&self) -> bool {
        self.hal.is_task_schedule_supported()
    }

    /// `schedule_task(ScheduleInfo)` (spec §4.9): validates
    /// `schedule_id != null`, `count ≥ 0`, `start_time_epoch_s > 0`,
    /// `periodic_s ≥ 0`, `task_type ∈ {CUSTOM, ENTER_GARAGE_MODE}`, then
    /// forwards to the HAL.
    ///
    /// # Errors
    ///
    /// [`DispatchError::PermissionDenied`] if `client_id` is not a
    /// serverless client; [`DispatchError::InvalidArgument`] on a
    /// validation failure; [`DispatchError::HalUnavailable`] /
    /// [`DispatchError::HalRejected`] on a HAL error.
    pub async fn schedule_task(&self, client_id: &ClientId, info: ScheduleInfo) -> DispatchResult<()> {
        self.require_serverless(client_id).await?;
        if info.client_id != *client_id {
            return Err(DispatchError::InvalidArgument(
                "schedule_id client does not match caller".to_owned(),
            ));
        }
        if info.schedule_id.is_empty() {
            return Err(DispatchError::InvalidArgument("schedule_id must not be empty".to_owned()));
        }
        if info.count < 0 {
            return Err(DispatchError::InvalidArgument("count must be >= 0".to_owned()));
        }
        if info.start_time_epoch_s <= 0 {
            return Err(DispatchError::InvalidArgument("start_time_epoch_s must be > 0".to_owned()));
        }
        if info.periodic_s < 0 {
            return Err(DispatchError::InvalidArgument("periodic_s must be >= 0".to_owned()));
        }
        if !matches!(info.task_type, TaskType::Custom | TaskType::EnterGarageMode) {
            return Err(DispatchError::InvalidArgument("unsupported task_type".to_owned()));
        }

        self.hal.schedule(info).await.map_err(DispatchError::from)
    }

    /// `unschedule_task(schedule_id)` (spec §6): HAL passthrough after an
    /// identity check.
    ///
    /// # Errors
    ///
    /// See [`Self::schedule_task`].
    pub async fn unschedule_task(&self, client_id: &ClientId, schedule_id: &str) -> DispatchResult<()> {
        self.require_serverless(client_id).await?;
        self.hal.unschedule(client_id, schedule_id).await.map_err(DispatchError::from)
    }

    /// `unschedule_all()` (spec §6, and spec §4.9's package-removed path:
    /// "invoke `unschedule_all(client_id)` for that package").
    ///
    /// # Errors
    ///
    /// See [`Self::schedule_task`].
    pub async fn unschedule_all(&self, client_id: &ClientId) -> DispatchResult<()> {
        self.require_serverless(client_id).await?;
        self.hal.unschedule_all(client_id).await.map_err(DispatchError::from)
    }

    /// `is_task_scheduled(schedule_id)` (spec §6).
    ///
    /// # Errors
    ///
    /// See [`Self::schedule_task`].
    pub async fn is_task_scheduled(&self, client_id: &ClientId, schedule_id: &str) -> DispatchResult<bool> {
        self.require_serverless(client_id).await?;
        self.hal.is_scheduled(client_id, schedule_id).await.map_err(DispatchError::from)
    }

    /// `get_all_pending_scheduled_tasks()` (spec §6). Unknown HAL task
    /// types are mapped to `CUSTOM` with a warning by
    /// [`TaskType::from_hal_str`](rtd_hal::types::TaskType::from_hal_str)
    /// upstream; `list_scheduled` here already returns typed entries.
    ///
    /// # Errors
    ///
    /// See [`Self::schedule_task`].
    pub async fn get_all_pending_scheduled_tasks(&self, client_id: &ClientId) -> DispatchResult<Vec<ScheduleInfo>> {
        self.require_serverless(client_id).await?;
        self.hal.list_scheduled(client_id).await.map_err(DispatchError::from)
    }

    async fn require_serverless(&self, client_id: &ClientId) -> DispatchResult<()> {
        if self.serverless.is_serverless(client_id).await {
            Ok(())
        } else {
            Err(DispatchError::PermissionDenied(format!(
                "{client_id} is not a serverless client"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtd_hal::testing::MockHal;

    async fn proxy_with(serverless_client: Option<&str>) -> (SchedulingProxy, Arc<MockHal>) {
        let hal = Arc::new(MockHal::new());
        let serverless = Arc::new(ServerlessRegistry::empty());
        if let Some(cid) = serverless_client {
            let cid = ClientId::from_existing(cid.to_owned());
            serverless.add("com.example.serverless".to_owned(), cid).await.unwrap();
        }
        let proxy = SchedulingProxy::new(hal.clone() as Arc<dyn HalWrapper>, serverless);
        (proxy, hal)
    }

    fn valid_info(client_id: &ClientId) -> ScheduleInfo {
        ScheduleInfo {
            client_id: client_id.clone(),
            schedule_id: "sched-1".to_owned(),
            count: 1,
            start_time_epoch_s: 1_900_000_000,
            periodic_s: 0,
            task_type: TaskType::Custom,
        }
    }

    #[tokio::test]
    async fn schedule_rejects_non_serverless_caller() {
        let (proxy, _hal) = proxy_with(None).await;
        let client_id = ClientId::from_existing("not-serverless");
        let err = proxy.schedule_task(&client_id, valid_info(&client_id)).await.unwrap_err();
        assert!(matches!(err, DispatchError::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn schedule_rejects_empty_schedule_id() {
        let (proxy, _hal) = proxy_with(Some("cid-sl")).await;
        let client_id = ClientId::from_existing("cid-sl");
        let mut info = valid_info(&client_id);
        info.schedule_id = String::new();
        let err = proxy.schedule_task(&client_id, info).await.unwrap_err();
        assert!(matches!(err, DispatchError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn schedule_rejects_non_positive_start_time() {
        let (proxy, _hal) = proxy_with(Some("cid-sl")).await;
        let client_id = ClientId::from_existing("cid-sl");
        let mut info = valid_info(&client_id);
        info.start_time_epoch_s = 0;
        let err = proxy.schedule_task(&client_id, info).await.unwrap_err();
        assert!(matches!(err, DispatchError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn schedule_forwards_valid_request_to_hal() {
        let (proxy, _hal) = proxy_with(Some("cid-sl")).await;
        let client_id = ClientId::from_existing("cid-sl");
        proxy.schedule_task(&client_id, valid_info(&client_id)).await.unwrap();

        assert!(proxy.is_task_scheduled(&client_id, "sched-1").await.unwrap());
    }

    #[tokio::test]
    async fn unschedule_all_clears_every_entry_for_client() {
        let (proxy, _hal) = proxy_with(Some("cid-sl")).await;
        let client_id = ClientId::from_existing("cid-sl");
        proxy.schedule_task(&client_id, valid_info(&client_id)).await.unwrap();

        proxy.unschedule_all(&client_id).await.unwrap();

        let remaining = proxy.get_all_pending_scheduled_tasks(&client_id).await.unwrap();
        assert!(remaining.is_empty());
    }
}
