//! The internal lifecycle event vocabulary published on the dispatch event
//! bus (SPEC_FULL §3 "log every task/client state transition").
//!
//! These are distinct from the outbound client RPC callbacks (spec §6:
//! `on_client_registration_updated`, `on_serverless_client_registered`,
//! `on_remote_task_requested`, `on_shutdown_starting`), which are delivered
//! directly to a single client's stored callback handle, not broadcast.
//! `DispatchEvent` exists for observability and test assertions: it is never
//! itself the transport for a client callback.

use rtd_core::{ClientId, TaskId, UidName};

/// A lifecycle event observable on the dispatch event bus.
#[derive(Debug, Clone)]
pub enum DispatchEvent {
    /// A client completed registration.
    ClientRegistered {
        /// The principal that registered.
        uid_name: UidName,
        /// The client id it was assigned or reused.
        client_id: ClientId,
        /// Whether this is a serverless registration.
        is_serverless: bool,
    },
    /// A client's token was torn down (package uninstalled or process exit
    /// with no persisted row).
    ClientUnregistered {
        /// The principal that was unregistered.
        uid_name: UidName,
    },
    /// A task was enqueued in the pending queue.
    TaskEnqueued {
        /// The client the task is addressed to.
        client_id: ClientId,
        /// The enqueued task's id.
        task_id: TaskId,
    },
    /// A task was delivered to a client's callback.
    TaskDelivered {
        /// The client the task was delivered to.
        client_id: ClientId,
        /// The delivered task's id.
        task_id: TaskId,
    },
    /// A task was acknowledged by its client.
    TaskAcknowledged {
        /// The client that acknowledged the task.
        client_id: ClientId,
        /// The acknowledged task's id.
        task_id: TaskId,
    },
    /// A task aged out of the pending queue without being delivered.
    TaskExpired {
        /// The client the task was addressed to.
        client_id: ClientId,
        /// The expired task's id.
        task_id: TaskId,
    },
    /// The power coordinator began the shutdown-starting notification.
    ShutdownStarting,
    /// The power coordinator issued `request_shutdown`.
    ShutdownRequested {
        /// Whether Garage Mode should run during this shutdown.
        run_garage_mode: bool,
    },
}
