//! Core error types shared across the dispatch core crates.

use thiserror::Error;

/// Errors that can occur in foundation-level operations (id parsing, task
/// bookkeeping, retry exhaustion).
#[derive(Debug, Error)]
pub enum CoreError {
    /// A `ClientId`, `UidName`, or `TaskId` failed validation.
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// A task was referenced that is not known in the expected state.
    #[error("unknown task: {0}")]
    UnknownTask(String),

    /// A bounded retry loop exhausted its attempt budget.
    #[error("retry exhausted after {attempts} attempts: {reason}")]
    RetryExhausted {
        /// Number of attempts made before giving up.
        attempts: u32,
        /// The last failure's description.
        reason: String,
    },
}

/// Result type for foundation-level operations.
pub type CoreResult<T> = Result<T, CoreError>;
