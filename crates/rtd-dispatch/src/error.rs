//! The dispatch-core's public error kinds (spec §7): every component-level
//! error collapses into one of these before crossing the client RPC
//! surface.

use thiserror::Error;

use rtd_hal::HalError;
use rtd_registry::RegistryError;
use rtd_supervisor::SupervisorError;

/// The wire-level error kinds named in spec §7.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The caller lacks the privilege required for this operation.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// A request argument failed validation.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The caller is not a currently registered client.
    #[error("not registered: {0}")]
    NotRegistered(String),

    /// The HAL could not be reached.
    #[error("hal unavailable: {0}")]
    HalUnavailable(String),

    /// The HAL rejected the request.
    #[error("hal rejected: {0}")]
    HalRejected(String),

    /// A persistence operation failed (non-fatal to the caller; logged).
    #[error("persistence failed: {0}")]
    PersistenceFailed(String),

    /// The operation missed its deadline (e.g. `task_max_duration <= 0`).
    #[error("budget expired")]
    BudgetExpired,
}

/// Result type for dispatch-core operations.
pub type DispatchResult<T> = Result<T, DispatchError>;

impl From<RegistryError> for DispatchError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::UnknownClient(c) => Self::NotRegistered(c),
            RegistryError::ClientIdMismatch => Self::InvalidArgument("client_id does not match caller's token".to_owned()),
            RegistryError::DuplicatePackage(p) => Self::InvalidArgument(format!("package already serverless: {p}")),
            RegistryError::DuplicateClientId(c) => Self::InvalidArgument(format!("client_id already serverless: {c}")),
            RegistryError::TransportError(msg) => Self::HalUnavailable(msg),
        }
    }
}

impl From<SupervisorError> for DispatchError {
    fn from(e: SupervisorError) -> Self {
        match e {
            SupervisorError::TaskNotActive(t) => Self::InvalidArgument(format!("task not active: {t}")),
            SupervisorError::NotDiscovered(u) => Self::InvalidArgument(format!("package not discovered: {u}")),
        }
    }
}

impl From<HalError> for DispatchError {
    fn from(e: HalError) -> Self {
        match e {
            HalError::Unavailable(msg) => Self::HalUnavailable(msg),
            HalError::Rejected(msg) => Self::HalRejected(msg),
            HalError::SchedulingNotSupported => Self::HalRejected("scheduling not supported".to_owned()),
        }
    }
}
