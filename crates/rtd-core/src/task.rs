//! The `Task` record and its three-state lifecycle (spec §3).

use tokio::time::Instant;

use crate::ids::{ClientId, TaskId};

/// Maximum payload size accepted for a single task's opaque bytes.
///
/// The spec caps payload size at "an implementation cap" without naming one;
/// 64 KiB comfortably covers the "opaque bytes" use case (small JSON blobs,
/// serialized commands) without letting a single task monopolize memory.
pub const MAX_TASK_PAYLOAD_BYTES: usize = 64 * 1024;

/// The three mutually-exclusive states a [`Task`] can be in (spec §3
/// invariant 2): pending while enqueued, active after delivery to a
/// callback, terminal when acknowledged or expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Enqueued in the pending task queue, not yet delivered.
    Pending,
    /// Delivered to a client callback, awaiting acknowledgment.
    Active,
    /// Resolved: either acknowledged (`report_task_done`) or expired.
    Terminal,
}

/// A unit of remote work delivered from the HAL to a client.
#[derive(Debug, Clone)]
pub struct Task {
    /// Unique id for this task.
    pub task_id: TaskId,
    /// The client this task is addressed to.
    pub client_id: ClientId,
    /// Opaque payload bytes, capped at [`MAX_TASK_PAYLOAD_BYTES`].
    pub payload: Vec<u8>,
    /// Deadline by which the task must be delivered, or it is dropped
    /// unacknowledged (spec §4.5, §4.8: `now + MAX_TASK_PENDING`).
    pub pending_deadline: Instant,
    state: TaskState,
}

impl Task {
    /// Construct a new, pending task.
    ///
    /// Truncates `payload` to [`MAX_TASK_PAYLOAD_BYTES`] rather than
    /// rejecting it outright: the HAL's payloads are opaque and unauthenticated
    /// (spec §1 Non-goals), so the core does not reject on content, only
    /// bounds its own memory exposure.
    #[must_use]
    pub fn new(
        task_id: TaskId,
        client_id: ClientId,
        mut payload: Vec<u8>,
        pending_deadline: Instant,
    ) -> Self {
        payload.truncate(MAX_TASK_PAYLOAD_BYTES);
        Self {
            task_id,
            client_id,
            payload,
            pending_deadline,
            state: TaskState::Pending,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> TaskState {
        self.state
    }

    /// Transition pending -> active. No-op (returns `false`) if not pending.
    pub fn mark_active(&mut self) -> bool {
        if self.state == TaskState::Pending {
            self.state = TaskState::Active;
            true
        } else {
            false
        }
    }

    /// Transition active -> terminal (acknowledged). No-op if not active.
    pub fn mark_acknowledged(&mut self) -> bool {
        if self.state == TaskState::Active {
            self.state = TaskState::Terminal;
            true
        } else {
            false
        }
    }

    /// Transition pending -> terminal (expired). Spec §3 invariant 2: the
    /// only pending->terminal transition is on timeout, never from active.
    pub fn mark_expired(&mut self) -> bool {
        if self.state == TaskState::Pending {
            self.state = TaskState::Terminal;
            true
        } else {
            false
        }
    }
}
