//! An in-memory [`HalWrapper`] test double, the only implementation this
//! crate ships: the real HAL is an external collaborator (spec §1).

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use rtd_core::ClientId;

use crate::error::{HalError, HalResult};
use crate::hal::{HalWrapper, RemoteTaskHandler};
use crate::types::{ScheduleInfo, TaskType};

/// A configurable in-memory stand-in for the real HAL, for unit and
/// integration tests.
pub struct MockHal {
    wakeup_service_name: String,
    vehicle_id: String,
    processor_id: String,
    schedule_supported: bool,
    supported_types: Vec<TaskType>,
    scheduled: Mutex<HashMap<(ClientId, String), ScheduleInfo>>,
    handler: Mutex<Option<Arc<dyn RemoteTaskHandler>>>,
    /// Queued `notify_ap_state_change` outcomes; `None` entries mean
    /// `Err(HalError::Unavailable)`, used to drive retry tests. Once
    /// exhausted, every call succeeds returning `true`.
    notify_outcomes: Mutex<VecDeque<Option<bool>>>,
    init_calls: AtomicUsize,
    release_calls: AtomicUsize,
}

impl MockHal {
    /// Construct a mock with sensible defaults: scheduling supported,
    /// `notify_ap_state_change` always succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self {
            wakeup_service_name: "mock.wakeup".to_owned(),
            vehicle_id: "VEHICLE-0001".to_owned(),
            processor_id: "PROC-0001".to_owned(),
            schedule_supported: true,
            supported_types: vec![TaskType::Custom, TaskType::EnterGarageMode],
            scheduled: Mutex::new(HashMap::new()),
            handler: Mutex::new(None),
            notify_outcomes: Mutex::new(VecDeque::new()),
            init_calls: AtomicUsize::new(0),
            release_calls: AtomicUsize::new(0),
        }
    }

    /// Queue the outcomes `notify_ap_state_change` returns in order;
    /// `None` means "fail this attempt". Used to exercise the retry path.
    pub async fn queue_notify_outcomes(&self, outcomes: Vec<Option<bool>>) {
        let mut queue = self.notify_outcomes.lock().await;
        queue.extend(outcomes);
    }

    /// Make task scheduling unsupported on this mock.
    #[must_use]
    pub fn without_scheduling(mut self) -> Self {
        self.schedule_supported = false;
        self.supported_types.clear();
        self
    }

    /// Deliver a remote task request to whatever handler is registered, as
    /// the HAL would.
    pub async fn simulate_remote_task(&self, client_id: ClientId, data: Vec<u8>) {
        let handler = self.handler.lock().await.clone();
        if let Some(handler) = handler {
            handler.on_remote_task_requested(client_id, data).await;
        }
    }

    /// How many times `init()` has been called.
    pub fn init_call_count(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst)
    }

    /// How many times `release()` has been called.
    pub fn release_call_count(&self) -> usize {
        self.release_calls.load(Ordering::SeqCst)
    }
}

impl Default for MockHal {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HalWrapper for MockHal {
    async fn init(&self) -> HalResult<()> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn release(&self) -> HalResult<()> {
        self.release_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn notify_ap_state_change(&self, _ready_for_task: bool, _wakeup_required: bool) -> HalResult<bool> {
        let mut queue = self.notify_outcomes.lock().await;
        match queue.pop_front() {
            Some(Some(result)) => Ok(result),
            Some(None) => Err(HalError::Unavailable("mock notify failure".to_owned())),
            None => Ok(true),
        }
    }

    fn get_wakeup_service_name(&self) -> String {
        self.wakeup_service_name.clone()
    }

    fn get_vehicle_id(&self) -> String {
        self.vehicle_id.clone()
    }

    fn get_processor_id(&self) -> String {
        self.processor_id.clone()
    }

    fn is_task_schedule_supported(&self) -> bool {
        self.schedule_supported
    }

    async fn schedule(&self, info: ScheduleInfo) -> HalResult<()> {
        if !self.schedule_supported {
            return Err(HalError::SchedulingNotSupported);
        }
        let mut scheduled = self.scheduled.lock().await;
        scheduled.insert((info.client_id.clone(), info.schedule_id.clone()), info);
        Ok(())
    }

    async fn unschedule(&self, client_id: &ClientId, schedule_id: &str) -> HalResult<()> {
        let mut scheduled = self.scheduled.lock().await;
        scheduled.remove(&(client_id.clone(), schedule_id.to_owned()));
        Ok(())
    }

    async fn unschedule_all(&self, client_id: &ClientId) -> HalResult<()> {
        let mut scheduled = self.scheduled.lock().await;
        scheduled.retain(|(cid, _), _| cid != client_id);
        Ok(())
    }

    async fn is_scheduled(&self, client_id: &ClientId, schedule_id: &str) -> HalResult<bool> {
        let scheduled = self.scheduled.lock().await;
        Ok(scheduled.contains_key(&(client_id.clone(), schedule_id.to_owned())))
    }

    async fn list_scheduled(&self, client_id: &ClientId) -> HalResult<Vec<ScheduleInfo>> {
        let scheduled = self.scheduled.lock().await;
        Ok(scheduled
            .iter()
            .filter(|((cid, _), _)| cid == client_id)
            .map(|(_, info)| info.clone())
            .collect())
    }

    fn supported_task_types(&self) -> Vec<TaskType> {
        self.supported_types.clone()
    }

    fn set_remote_task_handler(&self, handler: Arc<dyn RemoteTaskHandler>) {
        // Registration is synchronous by contract; `try_lock` never
        // contends in practice since this runs once at startup.
        if let Ok(mut slot) = self.handler.try_lock() {
            *slot = Some(handler);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RecordingHandler {
        calls: Mutex<Vec<(ClientId, Vec<u8>)>>,
    }

    #[async_trait]
    impl RemoteTaskHandler for RecordingHandler {
        async fn on_remote_task_requested(&self, client_id: ClientId, data: Vec<u8>) {
            self.calls.lock().await.push((client_id, data));
        }
    }

    #[tokio::test]
    async fn simulate_remote_task_invokes_registered_handler() {
        let hal = MockHal::new();
        let handler = Arc::new(RecordingHandler {
            calls: Mutex::new(Vec::new()),
        });
        hal.set_remote_task_handler(handler.clone());

        let client_id = ClientId::from_existing("c1");
        hal.simulate_remote_task(client_id.clone(), vec![0xAA, 0xBB]).await;

        let calls = handler.calls.lock().await;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, client_id);
        assert_eq!(calls[0].1, vec![0xAA, 0xBB]);
    }

    #[tokio::test]
    async fn notify_outcomes_are_consumed_in_order() {
        let hal = MockHal::new();
        hal.queue_notify_outcomes(vec![None, None, Some(true)]).await;

        assert!(hal.notify_ap_state_change(true, false).await.is_err());
        assert!(hal.notify_ap_state_change(true, false).await.is_err());
        assert!(hal.notify_ap_state_change(true, false).await.unwrap());
        // Queue exhausted: defaults to success.
        assert!(hal.notify_ap_state_change(true, false).await.unwrap());
    }

    #[tokio::test]
    async fn schedule_lifecycle_round_trips() {
        let hal = MockHal::new();
        let client_id = ClientId::from_existing("c1");
        let info = ScheduleInfo {
            client_id: client_id.clone(),
            schedule_id: "sched-1".to_owned(),
            count: 1,
            start_time_epoch_s: 1_000,
            periodic_s: 0,
            task_type: TaskType::Custom,
        };
        hal.schedule(info).await.unwrap();
        assert!(hal.is_scheduled(&client_id, "sched-1").await.unwrap());
        assert_eq!(hal.list_scheduled(&client_id).await.unwrap().len(), 1);

        hal.unschedule(&client_id, "sched-1").await.unwrap();
        assert!(!hal.is_scheduled(&client_id, "sched-1").await.unwrap());
    }

    #[tokio::test]
    async fn scheduling_disabled_mock_rejects_schedule() {
        let hal = MockHal::new().without_scheduling();
        let info = ScheduleInfo {
            client_id: ClientId::from_existing("c1"),
            schedule_id: "sched-1".to_owned(),
            count: 1,
            start_time_epoch_s: 1_000,
            periodic_s: 0,
            task_type: TaskType::Custom,
        };
        assert!(matches!(
            hal.schedule(info).await,
            Err(HalError::SchedulingNotSupported)
        ));
    }

    #[tokio::test]
    async fn init_and_release_are_counted() {
        let hal = MockHal::new();
        hal.init().await.unwrap();
        hal.init().await.unwrap();
        hal.release().await.unwrap();
        assert_eq!(hal.init_call_count(), 2);
        assert_eq!(hal.release_call_count(), 1);
    }
}
