//! The dispatcher (C8, spec §4.8): glues the HAL callback through the
//! pending queue and supervisor to the client's callback, and carries the
//! cross-component orchestration (register post-action, unregister
//! cleanup, `report_task_done`, `confirm_ready_for_shutdown`) that touches
//! both the client registry and the supervisor's active-task set.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use rtd_core::{ClientId, Task, TaskId, UidName};
use rtd_events::{DispatchEvent, EventBus};
use rtd_hal::RemoteTaskHandler;
use rtd_registry::{ClientCallback, ClientRegistry, RegistrationInfo};
use rtd_supervisor::{PendingTaskQueue, Supervisor};

use crate::error::DispatchResult;
use crate::power::PowerCoordinator;

/// Timing the dispatcher needs that isn't owned by any single collaborator
/// (spec §6).
#[derive(Debug, Clone, Copy)]
pub struct DispatchTunables {
    /// `MAX_TASK_PENDING_MS`: how long a task may wait in the queue.
    pub max_task_pending: Duration,
    /// `TASK_UNBIND_DELAY_MS`: delay before re-evaluating shutdown after an
    /// unregister.
    pub task_unbind_delay: Duration,
}

/// Routes HAL task-requests to the right client and orchestrates the
/// registration/unregistration/completion lifecycle (spec §4.8).
pub struct Dispatcher {
    queue: Arc<PendingTaskQueue>,
    supervisor: Arc<Supervisor>,
    registry: Arc<ClientRegistry>,
    coordinator: Arc<PowerCoordinator>,
    tunables: DispatchTunables,
    events: EventBus<DispatchEvent>,
}

impl Dispatcher {
    /// Construct a dispatcher over its four collaborators, publishing
    /// lifecycle events onto `events` (SPEC_FULL §3).
    #[must_use]
    pub fn new(
        queue: Arc<PendingTaskQueue>,
        supervisor: Arc<Supervisor>,
        registry: Arc<ClientRegistry>,
        coordinator: Arc<PowerCoordinator>,
        tunables: DispatchTunables,
        events: EventBus<DispatchEvent>,
    ) -> Self {
        Self {
            queue,
            supervisor,
            registry,
            coordinator,
            tunables,
            events,
        }
    }

    /// Subscribe to this dispatcher's lifecycle event stream.
    #[must_use]
    pub fn subscribe_events(&self) -> rtd_events::EventReceiver<DispatchEvent> {
        self.events.subscribe()
    }

    /// `register(caller_uid)` (spec §4.4): ensures the package is marked
    /// discovered (a client that is registering is, by construction,
    /// already running) and resolves its `RegistrationInfo`. Callers must
    /// notify the client of the returned info *before* calling
    /// [`attach_callback`](Self::attach_callback).
    pub async fn register(&self, uid: &UidName) -> RegistrationInfo {
        self.supervisor.discover(uid, true).await;
        let info = self.registry.register(uid).await;
        let (client_id, is_serverless) = match &info {
            RegistrationInfo::Serverless { client_id } => (client_id.clone(), true),
            RegistrationInfo::Regular { client_id, .. } => (client_id.clone(), false),
        };
        self.events.publish(DispatchEvent::ClientRegistered {
            uid_name: uid.clone(),
            client_id,
            is_serverless,
        });
        info
    }

    /// Store the client's callback handle and re-run dispatch for any
    /// tasks that queued up while registration was in flight (spec §4.4:
    /// "re-run dispatch for any pending tasks addressed to this client").
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::DispatchError::NotRegistered`] if `uid` was
    /// never registered.
    pub async fn attach_callback(&self, uid: &UidName, callback: Arc<dyn ClientCallback>) -> DispatchResult<()> {
        let client_id = self.registry.attach_callback(uid, callback).await?;
        self.deliver_pending(uid, &client_id).await;
        Ok(())
    }

    /// `unregister(caller_uid, callback)` (spec §4.4): idempotent; on an
    /// actual clear, drops the connection's active tasks and schedules a
    /// shutdown reevaluation after `TASK_UNBIND_DELAY`.
    pub async fn unregister(&self, uid: &UidName, callback: &Arc<dyn ClientCallback>) {
        if !self.registry.unregister(uid, callback).await {
            return;
        }
        self.supervisor.clear_active(uid).await;
        self.events.publish(DispatchEvent::ClientUnregistered { uid_name: uid.clone() });

        let coordinator = Arc::clone(&self.coordinator);
        let delay = self.tunables.task_unbind_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            coordinator.maybe_shutdown(false).await;
        });
    }

    /// `report_task_done(caller_uid, client_id, task_id)` (spec §4.4).
    ///
    /// # Errors
    ///
    /// [`crate::error::DispatchError::NotRegistered`] /
    /// [`crate::error::DispatchError::InvalidArgument`] if the client_id
    /// doesn't match, or if `task_id` was not active.
    pub async fn report_task_done(&self, uid: &UidName, client_id: &ClientId, task_id: &TaskId) -> DispatchResult<()> {
        self.registry.validate_client_id(uid, client_id).await?;
        self.supervisor.remove_active(uid, task_id).await?;
        self.events.publish(DispatchEvent::TaskAcknowledged {
            client_id: client_id.clone(),
            task_id: task_id.clone(),
        });
        self.coordinator.maybe_shutdown(false).await;
        Ok(())
    }

    /// `confirm_ready_for_shutdown(caller_uid, client_id)` (spec §4.4): if
    /// every registered client with a live callback is now ready, triggers
    /// an immediate forced wrap-up.
    ///
    /// # Errors
    ///
    /// See [`Self::report_task_done`].
    pub async fn confirm_ready_for_shutdown(&self, uid: &UidName, client_id: &ClientId) -> DispatchResult<()> {
        let all_ready = self.registry.confirm_ready_for_shutdown(uid, client_id).await?;
        if all_ready {
            self.coordinator.maybe_shutdown(true).await;
        }
        Ok(())
    }

    /// Orderly shutdown of the dispatch core itself (spec §5
    /// "Cancellation"): cancels the power coordinator's wake-window timers,
    /// force-unbinds every supervisor, and drains the pending queue. Queued
    /// tasks are dropped without acknowledgment; each drop is logged for
    /// diagnosability, not delivered.
    pub async fn release(&self) {
        self.coordinator.cancel_timers();
        self.supervisor.force_unbind_all().await;
        for task in self.queue.drain_all().await {
            warn!(client_id = %task.client_id, task_id = %task.task_id, "dropping pending task on release, no acknowledgment");
        }
    }

    /// If the client has a live callback, drain its pending queue, mark the
    /// drained task ids active, and deliver each in arrival order (spec
    /// §4.8 step 4, §5 ordering guarantee).
    async fn deliver_pending(&self, uid: &UidName, client_id: &ClientId) {
        if !self.registry.has_live_callback(client_id).await {
            return;
        }
        let tasks = self.queue.drain(client_id).await;
        if tasks.is_empty() {
            return;
        }

        let task_ids: Vec<TaskId> = tasks.iter().map(|t| t.task_id.clone()).collect();
        self.supervisor.add_active(uid, task_ids).await;

        let max_duration_s = self.coordinator.task_max_duration().await.as_secs();
        let Some(callback) = self.registry.callback_for(client_id).await else {
            return;
        };

        for task in tasks {
            let task_id = task.task_id.clone();
            let outcome = callback
                .on_remote_task_requested(client_id.clone(), task_id.clone(), task.payload, max_duration_s)
                .await;
            if let Err(e) = outcome {
                warn!(%client_id, %task_id, error = %e, "delivery transport error, removing task from active set");
                let _ = self.supervisor.remove_active(uid, &task_id).await;
            } else {
                self.events.publish(DispatchEvent::TaskDelivered {
                    client_id: client_id.clone(),
                    task_id,
                });
            }
        }
    }
}

#[async_trait]
impl RemoteTaskHandler for Dispatcher {
    async fn on_remote_task_requested(&self, client_id: ClientId, data: Vec<u8>) {
        let max_duration = self.coordinator.task_max_duration().await;
        if max_duration.is_zero() {
            self.queue.drain(&client_id).await;
            return;
        }

        if !self.registry.is_known_client_id(&client_id).await {
            self.queue.drain(&client_id).await;
            return;
        }

        let pending_deadline = tokio::time::Instant::now() + self.tunables.max_task_pending;
        let task_id = TaskId::generate();
        let task = Task::new(task_id.clone(), client_id.clone(), data, pending_deadline);
        self.queue.push(task).await;
        self.events.publish(DispatchEvent::TaskEnqueued {
            client_id: client_id.clone(),
            task_id,
        });

        let Some(uid) = self.registry.uid_for_client_id(&client_id).await else {
            return;
        };
        if !self.supervisor.is_discovered(&uid).await {
            return;
        }

        let bind_deadline = tokio::time::Instant::now() + max_duration;
        if let Err(e) = self.supervisor.bind_and_extend(&uid, bind_deadline).await {
            warn!(%uid, error = %e, "bind_and_extend failed despite is_discovered check");
            return;
        }

        self.deliver_pending(&uid, &client_id).await;
    }
}
