//! The pending task queue (C5, spec §4.5): a per-`client_id` FIFO of
//! received-but-undelivered tasks, each carrying its own expiry timer.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

use rtd_core::{ClientId, Task, TaskId};

struct ClientQueue {
    tasks: VecDeque<Task>,
    timers: HashMap<TaskId, JoinHandle<()>>,
}

impl ClientQueue {
    fn new() -> Self {
        Self {
            tasks: VecDeque::new(),
            timers: HashMap::new(),
        }
    }
}

/// Per-client FIFO of pending tasks (spec §4.5). Multiple pushes for the
/// same client preserve arrival order; a task that outlives its
/// `pending_deadline` is silently dropped (spec §4.10: "pending-task expiry
/// ... silently drop, the client was never notified").
pub struct PendingTaskQueue {
    state: Arc<Mutex<HashMap<ClientId, ClientQueue>>>,
}

impl PendingTaskQueue {
    /// An empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Enqueue `task` for `task.client_id` and arm its expiry timer. Arrival
    /// order among pushes for the same client is preserved.
    pub async fn push(&self, task: Task) {
        let client_id = task.client_id.clone();
        let task_id = task.task_id.clone();
        let sleep_for = task.pending_deadline.saturating_duration_since(tokio::time::Instant::now());

        let state = Arc::clone(&self.state);
        let timer_client_id = client_id.clone();
        let timer_task_id = task_id.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(sleep_for).await;
            Self::expire(&state, &timer_client_id, &timer_task_id).await;
        });

        let mut state = self.state.lock().await;
        let queue = state.entry(client_id).or_insert_with(ClientQueue::new);
        queue.tasks.push_back(task);
        queue.timers.insert(task_id, handle);
    }

    async fn expire(state: &Arc<Mutex<HashMap<ClientId, ClientQueue>>>, client_id: &ClientId, task_id: &TaskId) {
        let mut state = state.lock().await;
        let Some(queue) = state.get_mut(client_id) else {
            return;
        };
        // The task may already have been drained (delivered) before this
        // timer fired; only drop it if it's still sitting in the queue.
        let before = queue.tasks.len();
        queue.tasks.retain(|t| &t.task_id != task_id);
        if queue.tasks.len() != before {
            debug!(%client_id, %task_id, "pending task expired, dropping unacknowledged");
        }
        queue.timers.remove(task_id);
        if queue.tasks.is_empty() && queue.timers.is_empty() {
            state.remove(client_id);
        }
    }

    /// Remove and return every pending task for `client_id`, in arrival
    /// order, cancelling their expiry timers.
    pub async fn drain(&self, client_id: &ClientId) -> Vec<Task> {
        let mut state = self.state.lock().await;
        let Some(mut queue) = state.remove(client_id) else {
            return Vec::new();
        };
        for (_, handle) in queue.timers.drain() {
            handle.abort();
        }
        queue.tasks.into_iter().collect()
    }

    /// Number of tasks currently pending for `client_id`.
    pub async fn pending_count(&self, client_id: &ClientId) -> usize {
        self.state
            .lock()
            .await
            .get(client_id)
            .map_or(0, |q| q.tasks.len())
    }

    /// Remove and return every pending task across every client, cancelling
    /// all expiry timers. Used on shutdown, where the queue is drained
    /// without delivering or notifying anyone.
    pub async fn drain_all(&self) -> Vec<Task> {
        let mut state = self.state.lock().await;
        let mut drained = Vec::new();
        for (_, mut queue) in state.drain() {
            for (_, handle) in queue.timers.drain() {
                handle.abort();
            }
            drained.extend(queue.tasks.drain(..));
        }
        drained
    }
}

impl Default for PendingTaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn task(task_id: &str, client_id: &str, deadline: tokio::time::Instant) -> Task {
        Task::new(
            TaskId::from_existing(task_id),
            ClientId::from_existing(client_id),
            vec![0xAA],
            deadline,
        )
    }

    #[tokio::test]
    async fn push_preserves_arrival_order() {
        let queue = PendingTaskQueue::new();
        let far = tokio::time::Instant::now() + Duration::from_secs(60);
        queue.push(task("t1", "c1", far)).await;
        queue.push(task("t2", "c1", far)).await;

        let drained = queue.drain(&ClientId::from_existing("c1")).await;
        let ids: Vec<_> = drained.iter().map(|t| t.task_id.as_str().to_owned()).collect();
        assert_eq!(ids, vec!["t1", "t2"]);
    }

    #[tokio::test]
    async fn drain_of_unknown_client_is_empty() {
        let queue = PendingTaskQueue::new();
        let drained = queue.drain(&ClientId::from_existing("nobody")).await;
        assert!(drained.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn task_expires_and_is_dropped_from_queue() {
        let queue = PendingTaskQueue::new();
        let deadline = tokio::time::Instant::now() + Duration::from_millis(50);
        queue.push(task("t1", "c1", deadline)).await;
        assert_eq!(queue.pending_count(&ClientId::from_existing("c1")).await, 1);

        tokio::time::advance(Duration::from_millis(100)).await;
        tokio::task::yield_now().await;

        assert_eq!(queue.pending_count(&ClientId::from_existing("c1")).await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn drain_cancels_timer_before_it_fires() {
        let queue = PendingTaskQueue::new();
        let deadline = tokio::time::Instant::now() + Duration::from_millis(50);
        queue.push(task("t1", "c1", deadline)).await;

        let drained = queue.drain(&ClientId::from_existing("c1")).await;
        assert_eq!(drained.len(), 1);

        // Advancing time past the deadline must not resurrect or
        // double-count the already-drained task.
        tokio::time::advance(Duration::from_millis(100)).await;
        tokio::task::yield_now().await;
        assert_eq!(queue.pending_count(&ClientId::from_existing("c1")).await, 0);
    }
}
