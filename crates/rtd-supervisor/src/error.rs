//! Supervisor error types.

use thiserror::Error;

/// Errors from the client service supervisor.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// A task id was passed to `remove_active` that is not in the
    /// connection's active set.
    #[error("task {0} is not active for this connection")]
    TaskNotActive(String),

    /// No `ServiceConnection` exists yet for the given `UidName` (discovery
    /// has not found the package).
    #[error("no service connection for {0}")]
    NotDiscovered(String),
}

/// Result type for supervisor operations.
pub type SupervisorResult<T> = Result<T, SupervisorError>;
