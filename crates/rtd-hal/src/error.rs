//! HAL wrapper error types.

use thiserror::Error;

/// Errors surfaced by the HAL wrapper (spec §7 `HalUnavailable`/`HalRejected`).
#[derive(Debug, Error)]
pub enum HalError {
    /// The HAL transport itself could not be reached.
    #[error("HAL unavailable: {0}")]
    Unavailable(String),

    /// The HAL reached the call but rejected it.
    #[error("HAL rejected request: {0}")]
    Rejected(String),

    /// The HAL does not support task scheduling on this device.
    #[error("task scheduling is not supported on this HAL")]
    SchedulingNotSupported,
}

/// Result type for HAL operations.
pub type HalResult<T> = Result<T, HalError>;
